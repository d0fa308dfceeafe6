//! Error types for pageheat

use thiserror::Error;

/// Errors surfaced by the heatmap engine and its pipeline stages.
///
/// None of these are fatal to the host: every variant maps to a visible
/// state (login prompt, stale view, or empty view).
#[derive(Debug, Error)]
pub enum HeatmapError {
    #[error("Authentication required")]
    AuthRequired,

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Malformed record at index {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("A refresh is already in flight")]
    RefreshInFlight,

    #[error("Engine has been disposed")]
    Disposed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse record batch: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure reported by a [`crate::engine::RecordSource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// 401-equivalent: the credential is expired or invalid.
    #[error("Credential rejected by record source")]
    Unauthorized,

    /// The fetch could not complete. Treated as transient.
    #[error("Fetch failed: {0}")]
    Network(String),
}

impl From<FetchError> for HeatmapError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Unauthorized => HeatmapError::AuthRequired,
            FetchError::Network(msg) => HeatmapError::NetworkFailure(msg),
        }
    }
}
