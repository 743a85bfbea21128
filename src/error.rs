use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ShipError {
    /// Bad user input. Recovered locally by re-prompting the same step.
    #[error("{0}")]
    #[diagnostic(code(shipbot::validation))]
    Validation(String),

    #[error("storage unavailable: {0}")]
    #[diagnostic(
        code(shipbot::storage_unavailable),
        help("the session/progress backend could not be reached; retry shortly")
    )]
    StorageUnavailable(String),

    #[error("rate source timed out: {0}")]
    #[diagnostic(code(shipbot::rate_source_timeout))]
    RateSourceTimeout(String),

    #[error("rate source error: {0}")]
    #[diagnostic(code(shipbot::rate_source_error))]
    RateSourceError(String),

    #[error("no rates available for this shipment")]
    #[diagnostic(code(shipbot::no_rates))]
    NoRatesAvailable,

    #[error("incomplete shipment data, missing: {}", .0.join(", "))]
    #[diagnostic(code(shipbot::incomplete_shipment))]
    IncompleteShipmentData(Vec<String>),

    #[error("template not found: {0}")]
    #[diagnostic(code(shipbot::template_not_found))]
    TemplateNotFound(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl ShipError {
    /// Whether the same request may succeed if simply retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ShipError::StorageUnavailable(_) | ShipError::RateSourceTimeout(_)
        )
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for ShipError {
    fn from(e: rocksdb::Error) -> Self {
        ShipError::StorageUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ShipError>;
