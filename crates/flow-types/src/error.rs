use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Partitioning mismatch: {0}")]
    Partitioning(String),

    #[error("Flow accumulation did not converge after {rounds} rounds ({unsolved} partitions unsolved): {message}")]
    NonConvergence {
        rounds: usize,
        unsolved: usize,
        message: String,
    },

    #[error("Internal consistency violation: {0}")]
    Internal(String),

    #[error("Result for partition ({row}, {col}) was abandoned before it was produced")]
    PartitionUnavailable { row: usize, col: usize },

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FlowResult<T> = Result<T, FlowError>;
