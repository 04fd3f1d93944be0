use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("missing required columns: {}", .missing.join(", "))]
    MissingColumns { missing: Vec<String> },

    #[error("no data available: no file supplied and no default dataset found")]
    NoDataAvailable,

    #[error("duplicate ({row}, {col}) pair: pivot requires one row per cell")]
    DuplicateKey { row: String, col: String },

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
