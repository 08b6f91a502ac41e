use thiserror::Error;

/// Errors surfaced by catalogue operations. `NotFound` and `Validation`
/// become short user-facing replies at the boundary where they occur;
/// corrupted files never appear here because the store recovers them
/// internally.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The requested key, category or season does not exist.
    #[error("not found")]
    NotFound,

    /// Malformed user input (rating out of range, bad import syntax, ...).
    #[error("{0}")]
    Validation(String),

    /// I/O failure while reading or replacing a category file.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CatalogError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Errors from the chat-platform collaborator. During the reconciliation
/// sweep these are isolated per category; during interactive commands they
/// surface as a generic failure reply.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("missing permission: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Unknown(String),
}
