use thiserror::Error;

/// Configuration-time errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum Error {
    #[error("collector {name} does not exist. Available collectors: {}", .available.join(","))]
    UnknownCollector { name: String, available: Vec<String> },
    #[error("no metric family allow/deny filter configured")]
    MissingFamilyFilter,
    #[error("metric allowlist and denylist are mutually exclusive")]
    ConflictingFamilyFilters,
    #[error("invalid metric family pattern {pattern:?}: {source}")]
    InvalidFamilyPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("shard {shard} out of range for {total} total shards")]
    InvalidShard { shard: u32, total: u32 },
}

/// Per-object failure while generating a metric family.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    #[error("invalid int-or-percent value {value:?} for {field}")]
    InvalidIntOrPercent { field: &'static str, value: String },
}
