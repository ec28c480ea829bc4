// error.rs — Error types for webhook secret handling.

use thiserror::Error;

/// Errors that can occur while loading a master key or verifying a secret.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The master key is empty.
    #[error("webhook master key is empty")]
    EmptyMasterKey,

    /// The environment variable holding the master key is not set.
    #[error("environment variable {var} is not set")]
    MissingEnv { var: String },

    /// The presented secret is not valid standard base64.
    #[error("presented secret is not valid base64: {0}")]
    Malformed(#[from] base64::DecodeError),

    /// The presented secret does not match the derived one.
    #[error("webhook secret does not match")]
    Mismatch,
}
