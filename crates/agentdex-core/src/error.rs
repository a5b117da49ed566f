use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The embedding or generation service was unreachable, rate-limited or failed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// A response arrived but could not be decoded into the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Index/map or dimensionality invariants were violated.
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// True for failures that only affect a single item of a batch.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Provider(_) | Error::Parse(_) | Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
