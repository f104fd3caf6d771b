//! Error types for the remote control plane boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The named stack does not exist remotely. Distinct from every other failure.
    #[error("stack {stack} does not exist")]
    NotFound { stack: String },

    #[error("remote call {operation} failed: {detail}")]
    Remote { operation: String, detail: String },

    #[error("failed to parse {operation} response: {detail}")]
    Parse { operation: String, detail: String },

    #[error("connector io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    pub fn not_found(stack: impl Into<String>) -> Self {
        Self::NotFound {
            stack: stack.into(),
        }
    }

    pub fn remote(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Remote {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
