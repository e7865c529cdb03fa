use super::{
    util::{select_extreme, select_metrics},
    ConnectionError, Extremum, FileMetrics, Oid, Operation, StorageAdapter, StorageFootprint,
    METRICS_TABLE,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, error, info};

impl From<rusqlite::Error> for ConnectionError {
    fn from(error: rusqlite::Error) -> Self {
        ConnectionError::SQLite(error)
    }
}

#[derive(Debug)]
/// In-process database emulating large objects with a blob table
pub struct SQLiteConnection {
    connection: Connection,
}

impl SQLiteConnection {
    pub fn open_in_memory() -> Result<Self, ConnectionError> {
        let connection = Connection::open_in_memory()?;

        // large objects outlive the metrics table, like in PostgreSQL
        connection.execute(LARGE_OBJECT_SCHEMA, [])?;

        Ok(Self { connection })
    }
}

fn row_to_metrics(row: &Row) -> rusqlite::Result<FileMetrics> {
    Ok(FileMetrics {
        file_path: row.get(0)?,
        oid: row.get(1)?,
        write_time: row.get(2)?,
        read_time: row.get(3)?,
        file_size: row.get(4)?,
    })
}

impl StorageAdapter for SQLiteConnection {
    fn init(&mut self) -> Result<(), ConnectionError> {
        let mut counter = 1;

        for table in SQL_SCHEMA {
            match self.connection.execute(table, []) {
                Ok(_) => info!("Applied SQL schema ({counter}/{SQL_SCHEMA_NUMBER})"),
                Err(error) => {
                    error!(error = ?error, table = table, "Failed to apply SQL schema ({counter}/{SQL_SCHEMA_NUMBER}): {error}");

                    return Err(ConnectionError::SQLite(error));
                }
            };

            counter += 1;
        }

        Ok(())
    }

    fn close(mut self) -> Result<(), ConnectionError> {
        let mut counter = 0;
        while let Err((connection, error)) = self.connection.close() {
            counter += 1;
            self.connection = connection;
            error!(error = ?error, "Failed to close SQLite connection: {error}, trying again {counter}/3");

            if counter == 3 {
                return Err(ConnectionError::SQLite(error));
            }
        }

        info!("Closed SQLite connection");

        Ok(())
    }

    fn create_object(&mut self, data: &[u8]) -> Result<Oid, ConnectionError> {
        let oid: Oid = self
            .connection
            .prepare_cached("insert into largeobjects (data) values (?) returning oid")?
            .query_row(params![data], |row| row.get(0))?;

        debug!(oid = oid, size = data.len(), "Created large object");

        Ok(oid)
    }

    fn read_object(&mut self, oid: Oid) -> Result<Vec<u8>, ConnectionError> {
        Ok(self
            .connection
            .prepare_cached("select data from largeobjects where oid = ?")?
            .query_row(params![oid], |row| row.get(0))?)
    }

    fn object_count(&mut self) -> Result<i64, ConnectionError> {
        Ok(self
            .connection
            .query_row("select count(*) from largeobjects", [], |row| row.get(0))?)
    }

    fn unlink_all_objects(&mut self) -> Result<u64, ConnectionError> {
        Ok(self.connection.execute("delete from largeobjects", [])? as u64)
    }

    fn insert_metrics(&mut self, metrics: &FileMetrics) -> Result<(), ConnectionError> {
        self.connection
            .prepare_cached(
                "insert into lo_benchmark
                 (file_path, \"oid\", write_to_db_time, read_from_db_time, file_size)
                 values (?, ?, ?, ?, ?)",
            )?
            .execute(params![
                metrics.file_path,
                metrics.oid,
                metrics.write_time,
                metrics.read_time,
                metrics.file_size
            ])?;

        Ok(())
    }

    fn record_read(&mut self, oid: Oid, read_time: i64) -> Result<(), ConnectionError> {
        let updated = self
            .connection
            .prepare_cached("update lo_benchmark set read_from_db_time = ? where \"oid\" = ?")?
            .execute(params![read_time, oid])?;

        if updated == 0 {
            Err(ConnectionError::MissingRow(oid))
        } else {
            Ok(())
        }
    }

    fn stored_objects(&mut self) -> Result<Vec<(Oid, String)>, ConnectionError> {
        self.connection
            .prepare_cached("select \"oid\", file_path from lo_benchmark order by \"oid\"")?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .try_fold(Vec::new(), |mut init, result| {
                init.push(result?);

                Ok::<Vec<(Oid, String)>, ConnectionError>(init)
            })
    }

    fn metrics(&mut self) -> Result<Vec<FileMetrics>, ConnectionError> {
        self.connection
            .prepare(&select_metrics())?
            .query_map([], row_to_metrics)?
            .try_fold(Vec::new(), |mut init, result| {
                init.push(result?);

                Ok::<Vec<FileMetrics>, ConnectionError>(init)
            })
    }

    fn extreme(
        &mut self,
        operation: Operation,
        extremum: Extremum,
    ) -> Result<Option<FileMetrics>, ConnectionError> {
        Ok(self
            .connection
            .query_row(&select_extreme(operation, extremum), [], row_to_metrics)
            .optional()?)
    }

    fn average(
        &mut self,
        operation: Operation,
        category: Option<&str>,
    ) -> Result<Option<f64>, ConnectionError> {
        let column = operation.column();
        let query = format!(
            "select avg({column}) from {METRICS_TABLE}
             where ?1 is null or instr(file_path, ?1) > 0"
        );

        Ok(self
            .connection
            .query_row(&query, params![category], |row| row.get(0))?)
    }

    fn total_size(&mut self) -> Result<Option<i64>, ConnectionError> {
        Ok(self
            .connection
            .query_row("select sum(file_size) from lo_benchmark", [], |row| {
                row.get(0)
            })?)
    }

    fn storage_footprint(&mut self) -> Result<StorageFootprint, ConnectionError> {
        let block_size = self
            .connection
            .query_row("pragma page_size", [], |row| row.get(0))?;
        let blocks = self
            .connection
            .query_row("pragma page_count", [], |row| row.get(0))?;

        Ok(StorageFootprint { block_size, blocks })
    }

    fn clear_metrics(&mut self) -> Result<u64, ConnectionError> {
        Ok(self.connection.execute("delete from lo_benchmark", [])? as u64)
    }

    fn drop_table(&mut self) -> Result<(), ConnectionError> {
        self.connection
            .execute("drop table if exists lo_benchmark", [])?;

        Ok(())
    }

    fn table_exists(&mut self) -> Result<bool, ConnectionError> {
        let count: i64 = self.connection.query_row(
            "select count(*) from sqlite_master where type = 'table' and name = ?",
            params![METRICS_TABLE],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }
}

const LARGE_OBJECT_SCHEMA: &str = "create table if not exists largeobjects (
    oid integer primary key autoincrement,
    data blob not null
);";

pub const SQL_SCHEMA: [&str; 1] = ["create table if not exists lo_benchmark (
    file_path text not null,
    \"oid\" integer not null unique,
    write_to_db_time integer,
    read_from_db_time integer,
    file_size integer not null
);"];
pub const SQL_SCHEMA_NUMBER: usize = SQL_SCHEMA.len();

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> SQLiteConnection {
        let mut connection = SQLiteConnection::open_in_memory().unwrap();
        connection.init().unwrap();
        connection
    }

    fn metrics(file_path: &str, oid: Oid, write_time: i64, file_size: i64) -> FileMetrics {
        FileMetrics {
            file_path: file_path.to_owned(),
            oid,
            write_time: Some(write_time),
            read_time: None,
            file_size,
        }
    }

    #[test]
    fn aggregates_on_empty_table_have_no_data() {
        let mut connection = connection();

        assert_eq!(connection.average(Operation::Write, None).unwrap(), None);
        assert_eq!(
            connection.average(Operation::Read, Some("small")).unwrap(),
            None
        );
        assert_eq!(
            connection
                .extreme(Operation::Write, Extremum::Slowest)
                .unwrap(),
            None
        );
        assert_eq!(connection.total_size().unwrap(), None);
    }

    #[test]
    fn average_ignores_rows_without_latency() {
        let mut connection = connection();

        connection.insert_metrics(&metrics("a", 1, 10, 100)).unwrap();
        connection.insert_metrics(&metrics("b", 2, 30, 100)).unwrap();
        connection.record_read(2, 8).unwrap();

        assert_eq!(connection.average(Operation::Read, None).unwrap(), Some(8.0));
        assert_eq!(
            connection.average(Operation::Write, None).unwrap(),
            Some(20.0)
        );
    }

    #[test]
    fn extreme_prefers_lowest_oid_on_ties() {
        let mut connection = connection();

        connection.insert_metrics(&metrics("b", 7, 5, 1)).unwrap();
        connection.insert_metrics(&metrics("a", 3, 5, 1)).unwrap();
        connection.insert_metrics(&metrics("c", 9, 1, 1)).unwrap();

        let slowest = connection
            .extreme(Operation::Write, Extremum::Slowest)
            .unwrap()
            .unwrap();
        let fastest = connection
            .extreme(Operation::Write, Extremum::Fastest)
            .unwrap()
            .unwrap();

        assert_eq!(slowest.oid, 3);
        assert_eq!(fastest.file_path, "c");
    }

    #[test]
    fn record_read_without_row_fails() {
        let mut connection = connection();

        assert!(matches!(
            connection.record_read(42, 1),
            Err(ConnectionError::MissingRow(42))
        ));
    }

    #[test]
    fn objects_survive_dropped_table() {
        let mut connection = connection();

        let oid = connection.create_object(b"payload").unwrap();
        connection.drop_table().unwrap();

        assert!(!connection.table_exists().unwrap());
        assert_eq!(connection.read_object(oid).unwrap(), b"payload");
        assert_eq!(connection.unlink_all_objects().unwrap(), 1);
        assert_eq!(connection.object_count().unwrap(), 0);
    }
}
