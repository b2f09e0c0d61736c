use alloy::primitives::B256;
use thiserror::Error;

/// Main error type for the bracket pipeline
#[derive(Error, Debug)]
pub enum BracketError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Transaction service error: status {status}: {body}")]
    Service { status: u16, body: String },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Validation errors (rejected before any network call)
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unsupported token: {0}")]
    UnsupportedToken(String),

    #[error("Invalid price relationship: {0}")]
    InvalidPriceRelationship(String),

    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(String),

    // Funding errors
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    // Multisig flow
    #[error("Proposal not found on service: {0}")]
    ProposalNotFound(B256),

    #[error("Proposal already executed: {0}")]
    AlreadyExecuted(B256),

    #[error("Awaiting confirmations: {have}/{need}")]
    AwaitingConfirmations { have: usize, need: usize },

    #[error("Execution reverted: {0}")]
    ExecutionReverted(String),

    // Price oracle errors
    #[error("Price unavailable for token: {0}")]
    PriceUnavailable(String),

    // Crypto/signing errors
    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Signature error: {0}")]
    Signature(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl BracketError {
    /// Whether the caller may retry the same operation later without
    /// rebuilding anything. Only the confirmation-wait state qualifies;
    /// everything else needs either new input or a new proposal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BracketError::AwaitingConfirmations { .. })
    }
}

/// Result type alias for BracketError
pub type Result<T> = std::result::Result<T, BracketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn awaiting_confirmations_is_retryable() {
        let err = BracketError::AwaitingConfirmations { have: 1, need: 2 };
        assert!(err.is_retryable());
        assert!(!BracketError::ExecutionReverted("out of gas".into()).is_retryable());
        assert!(!BracketError::Validation("bad intent".into()).is_retryable());
    }
}
