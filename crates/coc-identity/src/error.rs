use thiserror::Error;

/// Errors that can occur during identity operations
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid public key: {0}")]
    InvalidKey(String),

    #[error("Invalid digest: {0}")]
    InvalidDigest(String),
}

/// Result type for identity operations
pub type IdentityResult<T> = Result<T, IdentityError>;
