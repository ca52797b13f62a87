use std::io;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure while turning a wide forecasting file into long records.
///
/// Decode errors are fatal for the file: a header that cannot be read
/// unambiguously is never guessed at.
#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("'{source_id}': header row {row} is missing")]
    MissingHeaderRow { source_id: String, row: usize },
    #[error("'{source_id}': no year-axis column (all header levels blank) was found")]
    MissingYearAxis { source_id: String },
    #[error("'{source_id}': column {column} has no country in its header")]
    MissingCountry { source_id: String, column: usize },
    #[error("'{source_id}': column {column} has an empty value-type header")]
    EmptyValueType { source_id: String, column: usize },
    #[error("'{source_id}': value-type header '{header}' has {count} tokens, at most 3 are allowed")]
    TooManyValueTokens {
        source_id: String,
        header: String,
        count: usize,
    },
}

/// Error type for loading, configuration, decoding and output failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("key table '{column}' is corrupt: {details}")]
    KeyTable { column: String, details: String },
}
