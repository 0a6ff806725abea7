//! Error types for the Data API backend and result hydration.

use thiserror::Error;

/// Errors raised while turning wire values into display values.
#[derive(Debug, Error, PartialEq)]
pub enum HydrationError {
    /// The field carried a value kind other than the six scalar kinds.
    #[error("Unknown value type '{0}' from row")]
    UnknownValueType(String),

    /// A row had more fields than the result set declared columns.
    #[error("Row has {fields} fields but only {columns} columns were described")]
    MissingColumn { fields: usize, columns: usize },
}

/// Errors returned by a [`DataApi`](super::DataApi) backend call.
#[derive(Debug, Error)]
pub enum DataApiError {
    /// The service answered with an error.
    #[error("{message} ({code})")]
    Service { code: String, message: String },

    /// The request never produced a service response (network, credentials, timeout).
    #[error("{0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error(transparent)]
    Hydration(#[from] HydrationError),

    /// `BeginTransaction` succeeded without returning an id.
    #[error("backend returned no transaction id")]
    MissingTransactionId,
}
