use crate::{
    collector::Collector,
    config::{BenchmarkConfig, ConfigErrors},
    database::{
        ConnectionError, Extremum, FileMetrics, Oid, Operation, StorageAdapter, StorageFootprint,
    },
    report::Report,
};
use globset::GlobMatcher;
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("File operation failed: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to collect input files: {0}")]
    Collect(#[from] ConfigErrors),
    #[error("Path has no file name: {0:?}")]
    InvalidPath(PathBuf),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// number of files a bulk pass handled
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// wall-clock duration and outcome of a bulk pass
pub struct PassSummary {
    pub elapsed: Duration,
    pub outcome: BulkOutcome,
}

/// duration in whole milliseconds as stored in the metrics table
pub fn as_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Owns the connection and performs all measurements of a benchmark run
#[derive(Debug)]
pub struct BenchmarkRunner<A: StorageAdapter> {
    connection: A,
}

impl<A: StorageAdapter> BenchmarkRunner<A> {
    /// take ownership of `connection` and make sure the metrics table exists
    pub fn new(mut connection: A) -> Result<Self, ConnectionError> {
        if connection.table_exists()? {
            info!("Reusing existing metrics table");
        }
        connection.init()?;

        Ok(Self { connection })
    }

    pub fn connection(&mut self) -> &mut A {
        &mut self.connection
    }

    pub fn close(self) -> Result<(), ConnectionError> {
        self.connection.close()
    }

    /// store the file at `path` as a large object and record the write time
    #[instrument(level = "debug", skip(self))]
    pub fn upload(&mut self, path: &Path) -> Result<Oid, RunnerError> {
        let file_path = path
            .file_name()
            .ok_or_else(|| RunnerError::InvalidPath(path.to_path_buf()))?
            .to_string_lossy()
            .into_owned();
        let data = fs::read(path)?;

        let start = Instant::now();
        let oid = self.connection.create_object(&data)?;
        let elapsed = start.elapsed();

        self.connection.insert_metrics(&FileMetrics {
            file_path,
            oid,
            write_time: Some(as_millis(elapsed)),
            read_time: None,
            file_size: data.len() as i64,
        })?;

        debug!(oid = oid, size = data.len(), "Stored in {} ms", elapsed.as_millis());

        Ok(oid)
    }

    /// fetch the large object `oid` into `destination` and record the read time
    #[instrument(level = "debug", skip(self))]
    pub fn download(&mut self, oid: Oid, destination: &Path) -> Result<(), RunnerError> {
        let start = Instant::now();
        let data = self.connection.read_object(oid)?;
        fs::write(destination, &data)?;
        let elapsed = start.elapsed();

        self.connection.record_read(oid, as_millis(elapsed))?;

        debug!(oid = oid, size = data.len(), "Fetched in {} ms", elapsed.as_millis());

        Ok(())
    }

    /// upload every regular file directly under `dir`
    pub fn bulk_upload(
        &mut self,
        dir: &Path,
        glob: Option<&GlobMatcher>,
    ) -> Result<BulkOutcome, RunnerError> {
        let collector = Collector::load(dir, glob)?;
        let total = collector.len();
        let mut outcome = BulkOutcome::default();

        if collector.is_empty() {
            warn!("No files found in {}", dir.to_string_lossy());
        }

        info!("Uploading {total} files ({} bytes)", collector.total_size());

        for path in collector {
            match self.upload(&path) {
                Ok(_) => outcome.succeeded += 1,
                Err(error) => {
                    error!(error = ?error, path = ?path, "Failed to upload: {error}");
                    outcome.failed += 1;
                }
            }
        }

        info!("Uploaded {}/{total} files", outcome.succeeded);

        Ok(outcome)
    }

    /// download every recorded object into `dir` under its original file name
    pub fn bulk_download(&mut self, dir: &Path) -> Result<BulkOutcome, RunnerError> {
        let objects = self.connection.stored_objects()?;
        let total = objects.len();
        let mut outcome = BulkOutcome::default();

        for (oid, file_path) in objects {
            match self.download(oid, &dir.join(&file_path)) {
                Ok(()) => outcome.succeeded += 1,
                Err(error) => {
                    error!(error = ?error, oid = oid, file = %file_path, "Failed to download: {error}");
                    outcome.failed += 1;
                }
            }
        }

        info!("Downloaded {}/{total} objects", outcome.succeeded);

        Ok(outcome)
    }

    pub fn slowest(
        &mut self,
        operation: Operation,
    ) -> Result<Option<FileMetrics>, ConnectionError> {
        self.connection.extreme(operation, Extremum::Slowest)
    }

    pub fn fastest(
        &mut self,
        operation: Operation,
    ) -> Result<Option<FileMetrics>, ConnectionError> {
        self.connection.extreme(operation, Extremum::Fastest)
    }

    pub fn average(
        &mut self,
        operation: Operation,
        category: Option<&str>,
    ) -> Result<Option<f64>, ConnectionError> {
        self.connection.average(operation, category)
    }

    /// total size of all recorded files in kB (1000 bytes), rounded down
    pub fn total_size_kb(&mut self) -> Result<Option<i64>, ConnectionError> {
        Ok(self.connection.total_size()?.map(|bytes| bytes / 1000))
    }

    pub fn storage_footprint(&mut self) -> Result<StorageFootprint, ConnectionError> {
        self.connection.storage_footprint()
    }

    /// recorded files that have not been read back yet
    pub fn pending_reads(&mut self) -> Result<Vec<FileMetrics>, ConnectionError> {
        Ok(self
            .connection
            .metrics()?
            .into_iter()
            .filter(|metrics| metrics.read_time.is_none())
            .collect())
    }

    /// remove all large objects and metric rows left behind by an earlier run
    pub fn clear(&mut self) {
        match self.connection.unlink_all_objects() {
            Ok(removed) => info!("Removed {removed} large objects"),
            Err(error) => error!(error = ?error, "Failed to remove large objects: {error}"),
        }

        match self.connection.clear_metrics() {
            Ok(removed) => info!("Removed {removed} metric rows"),
            Err(error) => error!(error = ?error, "Failed to clear metrics table: {error}"),
        }
    }

    /// remove all large objects and the metrics table
    pub fn cleanup(&mut self) {
        match self.connection.unlink_all_objects() {
            Ok(removed) => info!("Removed {removed} large objects"),
            Err(error) => error!(error = ?error, "Failed to remove large objects: {error}"),
        }

        if let Err(error) = self.connection.drop_table() {
            error!(error = ?error, "Failed to drop metrics table: {error}");
        }

        match self.connection.object_count() {
            Ok(0) => {}
            Ok(count) => warn!("{count} large objects remain after cleanup"),
            Err(error) => error!(error = ?error, "Failed to count large objects: {error}"),
        }
    }
}

fn timed<T>(
    pass: impl FnOnce() -> Result<BulkOutcome, T>,
) -> (Result<BulkOutcome, T>, Duration) {
    let start = Instant::now();
    let result = pass();

    (result, start.elapsed())
}

fn summarize(
    name: &str,
    result: Result<BulkOutcome, RunnerError>,
    elapsed: Duration,
) -> PassSummary {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(error) => {
            error!(error = ?error, "{name} pass failed: {error}");
            BulkOutcome::default()
        }
    };

    PassSummary { elapsed, outcome }
}

/// Run the whole benchmark: clear, upload, download, report and clean up.
///
/// Failing steps are logged and the run continues, the connection is closed at the end.
pub fn run<A: StorageAdapter>(
    mut runner: BenchmarkRunner<A>,
    config: &BenchmarkConfig,
    glob: Option<&GlobMatcher>,
) -> Report {
    runner.clear();

    let (result, elapsed) = timed(|| runner.bulk_upload(&config.input, glob));
    let upload = summarize("Upload", result, elapsed);

    let (result, elapsed) = timed(|| runner.bulk_download(&config.output));
    let download = summarize("Download", result, elapsed);

    match runner.pending_reads() {
        Ok(pending) => {
            for metrics in pending {
                warn!(oid = metrics.oid, file = %metrics.file_path, "Object was not read back");
            }
        }
        Err(error) => error!(error = ?error, "Failed to check pending reads: {error}"),
    }

    let report = Report::collect(&mut runner, &config.categories, upload, download);

    if config.keep_objects {
        warn!("Keeping large objects and metrics table");
    } else {
        runner.cleanup();
    }

    if let Err(error) = runner.close() {
        error!(error = ?error, "Failed to close connection: {error}");
    }

    report
}
