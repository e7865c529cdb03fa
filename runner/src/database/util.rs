use super::{Extremum, Operation, METRICS_TABLE};

/// columns of the metrics table in the order `FileMetrics` is read from a row
pub const METRICS_COLUMNS: &str =
    "file_path, \"oid\", write_to_db_time, read_from_db_time, file_size";

pub fn select_metrics() -> String {
    format!("select {METRICS_COLUMNS} from {METRICS_TABLE} order by \"oid\"")
}

/// query for the row with the highest or lowest latency of an operation
///
/// ties are broken by the lowest oid so the result is stable
pub fn select_extreme(operation: Operation, extremum: Extremum) -> String {
    let column = operation.column();
    let aggregate = extremum.aggregate();

    format!(
        "select {METRICS_COLUMNS} from {METRICS_TABLE}
         where {column} = (select {aggregate}({column}) from {METRICS_TABLE})
         order by \"oid\" limit 1"
    )
}
