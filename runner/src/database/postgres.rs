use super::{
    util::{select_extreme, select_metrics},
    ConnectionError, Extremum, FileMetrics, Oid, Operation, StorageAdapter, StorageFootprint,
    METRICS_TABLE,
};
use crate::config::DatabaseConfig;
use postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};

impl From<postgres::Error> for ConnectionError {
    fn from(error: postgres::Error) -> Self {
        ConnectionError::Postgres(error)
    }
}

/// Large objects and metrics stored in a PostgreSQL database
pub struct PostgresConnection {
    client: Client,
}

impl PostgresConnection {
    pub fn load(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        let client = postgres::Config::new()
            .dbname(&config.dbname)
            .user(&config.user)
            .password(&config.password)
            .host(&config.host)
            .port(config.port)
            .connect(NoTls)?;

        info!(
            host = %config.host,
            port = config.port,
            dbname = %config.dbname,
            "Connected to PostgreSQL"
        );

        Ok(Self { client })
    }
}

fn row_to_metrics(row: &Row) -> Result<FileMetrics, ConnectionError> {
    Ok(FileMetrics {
        file_path: row.try_get(0)?,
        oid: row.try_get(1)?,
        write_time: row.try_get(2)?,
        read_time: row.try_get(3)?,
        file_size: row.try_get(4)?,
    })
}

impl StorageAdapter for PostgresConnection {
    fn init(&mut self) -> Result<(), ConnectionError> {
        let mut counter = 1;

        for table in SQL_SCHEMA {
            match self.client.batch_execute(table) {
                Ok(()) => info!("Applied SQL schema ({counter}/{SQL_SCHEMA_NUMBER})"),
                Err(error) => {
                    error!(error = ?error, table = table, "Failed to apply SQL schema ({counter}/{SQL_SCHEMA_NUMBER}): {error}");

                    return Err(ConnectionError::Postgres(error));
                }
            };

            counter += 1;
        }

        Ok(())
    }

    fn close(self) -> Result<(), ConnectionError> {
        self.client.close()?;

        info!("Closed PostgreSQL connection");

        Ok(())
    }

    fn create_object(&mut self, data: &[u8]) -> Result<Oid, ConnectionError> {
        let oid: Oid = self
            .client
            .query_one("select lo_from_bytea(0, $1)", &[&data])?
            .try_get(0)?;

        debug!(oid = oid, size = data.len(), "Created large object");

        Ok(oid)
    }

    fn read_object(&mut self, oid: Oid) -> Result<Vec<u8>, ConnectionError> {
        Ok(self
            .client
            .query_one("select lo_get($1)", &[&oid])?
            .try_get(0)?)
    }

    fn object_count(&mut self) -> Result<i64, ConnectionError> {
        Ok(self
            .client
            .query_one("select count(*) from pg_largeobject_metadata", &[])?
            .try_get(0)?)
    }

    fn unlink_all_objects(&mut self) -> Result<u64, ConnectionError> {
        let removed = self
            .client
            .query(
                "select lo_unlink(l.oid) from pg_largeobject_metadata l",
                &[],
            )?
            .len();

        Ok(removed as u64)
    }

    fn insert_metrics(&mut self, metrics: &FileMetrics) -> Result<(), ConnectionError> {
        self.client.execute(
            "insert into lo_benchmark
             (file_path, \"oid\", write_to_db_time, read_from_db_time, file_size)
             values ($1, $2, $3, $4, $5)",
            &[
                &metrics.file_path,
                &metrics.oid,
                &metrics.write_time,
                &metrics.read_time,
                &metrics.file_size,
            ],
        )?;

        Ok(())
    }

    fn record_read(&mut self, oid: Oid, read_time: i64) -> Result<(), ConnectionError> {
        let updated = self.client.execute(
            "update lo_benchmark set read_from_db_time = $1 where \"oid\" = $2",
            &[&read_time, &oid],
        )?;

        if updated == 0 {
            Err(ConnectionError::MissingRow(oid))
        } else {
            Ok(())
        }
    }

    fn stored_objects(&mut self) -> Result<Vec<(Oid, String)>, ConnectionError> {
        self.client
            .query(
                "select \"oid\", file_path from lo_benchmark order by \"oid\"",
                &[],
            )?
            .iter()
            .map(|row| -> Result<(Oid, String), ConnectionError> {
                Ok((row.try_get(0)?, row.try_get(1)?))
            })
            .collect()
    }

    fn metrics(&mut self) -> Result<Vec<FileMetrics>, ConnectionError> {
        self.client
            .query(select_metrics().as_str(), &[])?
            .iter()
            .map(row_to_metrics)
            .collect()
    }

    fn extreme(
        &mut self,
        operation: Operation,
        extremum: Extremum,
    ) -> Result<Option<FileMetrics>, ConnectionError> {
        self.client
            .query_opt(select_extreme(operation, extremum).as_str(), &[])?
            .as_ref()
            .map(row_to_metrics)
            .transpose()
    }

    fn average(
        &mut self,
        operation: Operation,
        category: Option<&str>,
    ) -> Result<Option<f64>, ConnectionError> {
        let column = operation.column();
        let query = format!(
            "select avg({column})::float8 from {METRICS_TABLE}
             where $1::text is null or strpos(file_path, $1::text) > 0"
        );

        Ok(self
            .client
            .query_one(query.as_str(), &[&category])?
            .try_get(0)?)
    }

    fn total_size(&mut self) -> Result<Option<i64>, ConnectionError> {
        Ok(self
            .client
            .query_one("select sum(file_size)::bigint from lo_benchmark", &[])?
            .try_get(0)?)
    }

    fn storage_footprint(&mut self) -> Result<StorageFootprint, ConnectionError> {
        let row = self.client.query_one(
            "select current_setting('block_size')::bigint,
                    pg_relation_size('pg_catalog.pg_largeobject')
                        / current_setting('block_size')::bigint",
            &[],
        )?;

        Ok(StorageFootprint {
            block_size: row.try_get(0)?,
            blocks: row.try_get(1)?,
        })
    }

    fn clear_metrics(&mut self) -> Result<u64, ConnectionError> {
        Ok(self.client.execute("delete from lo_benchmark", &[])?)
    }

    fn drop_table(&mut self) -> Result<(), ConnectionError> {
        self.client.batch_execute("drop table if exists lo_benchmark")?;

        info!("Dropped metrics table");

        Ok(())
    }

    fn table_exists(&mut self) -> Result<bool, ConnectionError> {
        Ok(self
            .client
            .query_one("select to_regclass('lo_benchmark') is not null", &[])?
            .try_get(0)?)
    }
}

// ref: https://www.postgresql.org/docs/current/lo-funcs.html
pub const SQL_SCHEMA: [&str; 1] = ["create table if not exists lo_benchmark (
    file_path varchar not null,
    \"oid\" oid not null unique,
    write_to_db_time bigint,
    read_from_db_time bigint,
    file_size bigint not null
);"];
pub const SQL_SCHEMA_NUMBER: usize = SQL_SCHEMA.len();
