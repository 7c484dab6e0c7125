use thiserror::Error;

/// Top-level client error.
/// All variants carry a human-readable message for display/logging.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Gateway errors ───────────────────────────────────────────────────────
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Could not decode gateway response: {0}")]
    Decode(String),

    // ── Connection setup errors ──────────────────────────────────────────────
    #[error("No pending connection to check")]
    MissingConnection,

    #[error("Authorization is not complete yet (status: {status})")]
    NotAuthorized { status: String },

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    // ── Conversation errors ──────────────────────────────────────────────────
    #[error("No active session")]
    NoSession,

    // ── Storage errors ───────────────────────────────────────────────────────
    #[error("Local storage is unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Failed to write '{key}' to local storage: {message}")]
    StorageWrite { key: String, message: String },

    #[error("Stored value for '{key}' is corrupt: {source}")]
    StorageParse {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn empty_field(field_name: impl Into<String>) -> Self {
        AppError::EmptyField { field_name: field_name.into() }
    }

    pub fn storage_parse(key: impl Into<String>, source: serde_json::Error) -> Self {
        AppError::StorageParse { key: key.into(), source }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::EmptyField { .. })
    }

    pub fn is_gateway(&self) -> bool {
        matches!(
            self,
            AppError::Network(_) | AppError::Server { .. } | AppError::Decode(_)
        )
    }
}
