use std::sync::Arc;

use thiserror::Error;

/// A type alias for `Result` with the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the eligibility engine.
///
/// Per-campaign predicate errors never escape evaluation: they are logged and the campaign is
/// treated as not eligible.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A campaign field has a shape that cannot be evaluated (e.g. limits that are not an array).
    #[error("invalid campaign definition: {0}")]
    InvalidCampaign(&'static str),

    /// An I/O error from the counter persistence layer.
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    #[error(transparent)]
    Io(Arc<std::io::Error>),

    /// Persisted counters could not be encoded or decoded.
    #[error("error (de)serializing persisted counters")]
    Serialization(#[source] Arc<serde_json::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(value))
    }
}
