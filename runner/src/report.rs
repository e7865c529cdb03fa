//! Aggregated benchmark results and their console rendering.

use crate::{
    database::{ConnectionError, FileMetrics, Operation, StorageAdapter, StorageFootprint},
    runner::{as_millis, BenchmarkRunner, PassSummary},
};
use bytesize::ByteSize;
use std::{fmt, time::Duration};
use tracing::error;
use yansi::Paint;

#[derive(Debug, Clone, PartialEq)]
/// result of a single aggregate query
pub enum Metric<T> {
    Value(T),
    /// the query succeeded but there was nothing to aggregate
    NoData,
    /// the query failed, the error has been logged
    Unavailable,
}

impl<T> Metric<T> {
    pub fn from_query(name: &str, result: Result<Option<T>, ConnectionError>) -> Self {
        match result {
            Ok(Some(value)) => Self::Value(value),
            Ok(None) => Self::NoData,
            Err(error) => {
                error!(error = ?error, "Failed to query {name}: {error}");

                Self::Unavailable
            }
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// render the value with `render`, or the reason why there is none
    fn render(&self, render: impl FnOnce(&T) -> String) -> String {
        match self {
            Self::Value(value) => render(value),
            Self::NoData => "no data".to_owned(),
            Self::Unavailable => "unavailable".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryAverages {
    pub name: String,
    pub write: Metric<f64>,
    pub read: Metric<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub slowest_write: Metric<FileMetrics>,
    pub fastest_write: Metric<FileMetrics>,
    pub average_write: Metric<f64>,
    pub slowest_read: Metric<FileMetrics>,
    pub fastest_read: Metric<FileMetrics>,
    pub average_read: Metric<f64>,
    pub categories: Vec<CategoryAverages>,
    pub total_size_kb: Metric<i64>,
    pub footprint: Metric<StorageFootprint>,
    pub upload: PassSummary,
    pub download: PassSummary,
}

impl Report {
    /// query every aggregate from the metrics table
    pub fn collect<A: StorageAdapter>(
        runner: &mut BenchmarkRunner<A>,
        categories: &[String],
        upload: PassSummary,
        download: PassSummary,
    ) -> Self {
        let categories = categories
            .iter()
            .map(|name| CategoryAverages {
                name: name.clone(),
                write: Metric::from_query(
                    "category write average",
                    runner.average(Operation::Write, Some(name.as_str())),
                ),
                read: Metric::from_query(
                    "category read average",
                    runner.average(Operation::Read, Some(name.as_str())),
                ),
            })
            .collect();

        Self {
            slowest_write: Metric::from_query("slowest write", runner.slowest(Operation::Write)),
            fastest_write: Metric::from_query("fastest write", runner.fastest(Operation::Write)),
            average_write: Metric::from_query(
                "average write",
                runner.average(Operation::Write, None),
            ),
            slowest_read: Metric::from_query("slowest read", runner.slowest(Operation::Read)),
            fastest_read: Metric::from_query("fastest read", runner.fastest(Operation::Read)),
            average_read: Metric::from_query(
                "average read",
                runner.average(Operation::Read, None),
            ),
            categories,
            total_size_kb: Metric::from_query("total size", runner.total_size_kb()),
            footprint: Metric::from_query(
                "storage footprint",
                runner.storage_footprint().map(Some),
            ),
            upload,
            download,
        }
    }
}

/// kB per second, `None` for passes that finished within the same millisecond
pub fn throughput(kb: i64, elapsed: Duration) -> Option<f64> {
    match as_millis(elapsed) {
        0 => None,
        ms => Some(kb as f64 * 1000.0 / ms as f64),
    }
}

fn extreme_line(metric: &Metric<FileMetrics>, operation: Operation) -> String {
    metric.render(|row| {
        let time = operation
            .latency(row)
            .map_or_else(|| "no data".to_owned(), |ms| format!("{ms} ms"));

        format!(
            "file {}, size {} kB, time {time}",
            row.file_path,
            row.file_size / 1000
        )
    })
}

fn millis_line(metric: &Metric<f64>) -> String {
    metric.render(|ms| format!("{ms:.1} ms"))
}

fn total_line(total_size_kb: &Metric<i64>, pass: &PassSummary) -> String {
    let elapsed = as_millis(pass.elapsed);

    total_size_kb.render(|kb| match throughput(*kb, pass.elapsed) {
        Some(rate) => format!("{kb} kB in {elapsed} ms ({rate:.2} kB/s)"),
        None => format!("{kb} kB in {elapsed} ms (n/a)"),
    })
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "## WRITE".bold())?;
        writeln!(
            f,
            "Slowest write to database: {}",
            extreme_line(&self.slowest_write, Operation::Write)
        )?;
        writeln!(
            f,
            "Fastest write to database: {}",
            extreme_line(&self.fastest_write, Operation::Write)
        )?;
        writeln!(f, "Average write time: {}", millis_line(&self.average_write))?;

        writeln!(f, "{}", "## READ".bold())?;
        writeln!(
            f,
            "Slowest read from database: {}",
            extreme_line(&self.slowest_read, Operation::Read)
        )?;
        writeln!(
            f,
            "Fastest read from database: {}",
            extreme_line(&self.fastest_read, Operation::Read)
        )?;
        writeln!(f, "Average read time: {}", millis_line(&self.average_read))?;

        if !self.categories.is_empty() {
            writeln!(f, "{}", "## CATEGORIES".bold())?;
            for category in &self.categories {
                writeln!(
                    f,
                    "{}: average write {}, average read {}",
                    category.name,
                    millis_line(&category.write),
                    millis_line(&category.read)
                )?;
            }
        }

        writeln!(f, "{}", "## TOTALS".bold())?;
        writeln!(
            f,
            "Written to database: {}",
            total_line(&self.total_size_kb, &self.upload)
        )?;
        writeln!(
            f,
            "Read from database and written to disk: {}",
            total_line(&self.total_size_kb, &self.download)
        )?;
        writeln!(
            f,
            "Large object storage: {}",
            self.footprint.render(|footprint| format!(
                "{} ({} blocks of {} bytes)",
                ByteSize::b(footprint.bytes().max(0) as u64),
                footprint.blocks,
                footprint.block_size
            ))
        )?;

        if self.upload.outcome.failed > 0 {
            writeln!(
                f,
                "{}",
                format!("{} FAILED UPLOADS", self.upload.outcome.failed)
                    .bold()
                    .red()
            )?;
        }
        if self.download.outcome.failed > 0 {
            writeln!(
                f,
                "{}",
                format!("{} FAILED DOWNLOADS", self.download.outcome.failed)
                    .bold()
                    .red()
            )?;
        }

        Ok(())
    }
}
