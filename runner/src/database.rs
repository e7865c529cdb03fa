pub mod postgres;
#[cfg(test)]
pub mod sqlite;
pub mod util;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// identifier of a stored large object
pub type Oid = u32;

/// name of the table holding one row of metrics per stored file
pub const METRICS_TABLE: &str = "lo_benchmark";

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("PostgreSQL operation failed: {0}")]
    Postgres(::postgres::Error),
    #[cfg(test)]
    #[error("SQLite operation failed: {0}")]
    SQLite(rusqlite::Error),
    #[error("No metrics row found for large object {0}")]
    MissingRow(Oid),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// one row of the metrics table
pub struct FileMetrics {
    /// base name of the source file
    pub file_path: String,
    pub oid: Oid,
    /// upload duration in ms
    pub write_time: Option<i64>,
    /// download duration in ms, `None` until the object was read back
    pub read_time: Option<i64>,
    /// size of the source file in bytes
    pub file_size: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Write,
    Read,
}

impl Operation {
    /// column holding the latency of this operation
    pub fn column(&self) -> &'static str {
        match self {
            Self::Write => "write_to_db_time",
            Self::Read => "read_from_db_time",
        }
    }

    pub fn latency(&self, metrics: &FileMetrics) -> Option<i64> {
        match self {
            Self::Write => metrics.write_time,
            Self::Read => metrics.read_time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extremum {
    Slowest,
    Fastest,
}

impl Extremum {
    /// SQL aggregate selecting the row
    pub fn aggregate(&self) -> &'static str {
        match self {
            Self::Slowest => "max",
            Self::Fastest => "min",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// space the storage engine spends on large objects
pub struct StorageFootprint {
    pub block_size: i64,
    pub blocks: i64,
}

impl StorageFootprint {
    pub fn bytes(&self) -> i64 {
        self.block_size * self.blocks
    }
}

/// Storage engine able to hold large objects next to the metrics table.
///
/// Every call is a blocking round-trip; implementations are driven by a single
/// caller and never shared.
pub trait StorageAdapter {
    /// create the metrics table if it does not exist yet
    fn init(&mut self) -> Result<(), ConnectionError>;

    fn close(self) -> Result<(), ConnectionError>
    where
        Self: Sized;

    /// store `data` as a new large object
    fn create_object(&mut self, data: &[u8]) -> Result<Oid, ConnectionError>;

    fn read_object(&mut self, oid: Oid) -> Result<Vec<u8>, ConnectionError>;

    fn object_count(&mut self) -> Result<i64, ConnectionError>;

    /// remove every large object, returns the number of removed objects
    fn unlink_all_objects(&mut self) -> Result<u64, ConnectionError>;

    fn insert_metrics(&mut self, metrics: &FileMetrics) -> Result<(), ConnectionError>;

    /// set the read time of the row belonging to `oid`
    fn record_read(&mut self, oid: Oid, read_time: i64) -> Result<(), ConnectionError>;

    /// (oid, file_path) of every recorded object
    fn stored_objects(&mut self) -> Result<Vec<(Oid, String)>, ConnectionError>;

    fn metrics(&mut self) -> Result<Vec<FileMetrics>, ConnectionError>;

    /// row with the highest or lowest latency for `operation`
    fn extreme(
        &mut self,
        operation: Operation,
        extremum: Extremum,
    ) -> Result<Option<FileMetrics>, ConnectionError>;

    /// mean latency of `operation`, restricted to file paths containing `category`
    fn average(
        &mut self,
        operation: Operation,
        category: Option<&str>,
    ) -> Result<Option<f64>, ConnectionError>;

    /// sum of all recorded file sizes in bytes
    fn total_size(&mut self) -> Result<Option<i64>, ConnectionError>;

    fn storage_footprint(&mut self) -> Result<StorageFootprint, ConnectionError>;

    /// delete all rows of the metrics table, returns the number of deleted rows
    fn clear_metrics(&mut self) -> Result<u64, ConnectionError>;

    fn drop_table(&mut self) -> Result<(), ConnectionError>;

    fn table_exists(&mut self) -> Result<bool, ConnectionError>;
}
