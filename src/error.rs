use thiserror::Error;

/// Errors surfaced by the node adapter, the provider transport and the swap engine.
///
/// `VerificationFailed` and `TxMismatch` mean the provider returned data that does not match
/// what was independently recomputed. They are never retried.
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("lightning node connection: {0}")]
    Connection(String),

    #[error("decode invoice: {0}")]
    Decode(String),

    #[error("swap service transport: {0}")]
    Network(String),

    #[error("swap service rejected request (status {status}): {message}")]
    ServiceRejected { status: u16, message: String },

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("swap status not ready: {0}")]
    StatusNotReady(String),

    #[error("lockup transaction mismatch: {0}")]
    TxMismatch(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid swap state: {0}")]
    InvalidState(String),
}

impl SwapError {
    /// Transient failures the caller may retry later. Everything else is final for this swap.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Network(_) | Self::StatusNotReady(_)
        )
    }

    /// Failures that point at a misbehaving or buggy provider.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::VerificationFailed(_) | Self::TxMismatch(_))
    }
}

impl From<reqwest::Error> for SwapError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Network(format!("deadline exceeded: {e}"))
        } else {
            Self::Network(e.to_string())
        }
    }
}
