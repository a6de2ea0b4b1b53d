use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// A sample or identity record that cannot be used; the record is skipped.
    #[error("input data error {0}")]
    InputData(String),

    /// Malformed sector polygon. Fatal while loading the catalog.
    #[error("geometry error {0}")]
    Geometry(String),

    #[error("detection for {callsign} timed out after {secs}s")]
    DetectionTimeout { callsign: String, secs: u64 },

    #[error("detection failed {0:#}")]
    Detection(#[source] anyhow::Error),

    /// Store write failed; the entity's source rows are left untouched.
    #[error("persistence error {0:#}")]
    Persistence(#[source] anyhow::Error),

    #[error("aggregation already in progress for {0}")]
    ConcurrencyViolation(String),

    #[error("config error {0}")]
    Config(String),

    #[error("IO error {0}")]
    IOError(#[from] std::io::Error),

    #[error("serde error {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl EngineError {
    /// True for errors that leave the entity as-is for the next sweep.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::DetectionTimeout { .. }
                | EngineError::Detection(_)
                | EngineError::Persistence(_)
                | EngineError::ConcurrencyViolation(_)
        )
    }
}

macro_rules! input_error {
    ($fmt:literal $(, $arg:expr )* ) => {
        $crate::errors::EngineError::InputData( format!( $fmt $(, $arg)* ))
    };
}
pub(crate) use input_error;

macro_rules! geometry_error {
    ($fmt:literal $(, $arg:expr )* ) => {
        $crate::errors::EngineError::Geometry( format!( $fmt $(, $arg)* ))
    };
}
pub(crate) use geometry_error;
