//! Errors surfaced by the data-access collaborators.

/// Result type for data-access operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur during data-access operations.
///
/// These are produced by the underlying data engine. The request proxies pass
/// them through untouched; the only variant they create themselves is
/// [`DataError::ManagerReleased`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataError {
    #[error("Document not found: {name} ({id})")]
    NotFound { name: String, id: String },

    #[error("Unknown manager: {0}")]
    UnknownManager(String),

    #[error("No manager registered for model: {0}")]
    UnknownModel(String),

    #[error("Unknown repository: {0}")]
    UnknownRepository(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Mapping error for {model}: {message}")]
    Mapping { model: String, message: String },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Manager for repository {0} has been released")]
    ManagerReleased(String),

    #[error("Adapter error: {0}")]
    Adapter(String),
}
