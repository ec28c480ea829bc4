// master_key.rs — The service-wide key every webhook secret is derived from.
//
// The key is used as the PBKDF2 salt. It never leaves this crate in clear:
// `Debug` is redacted, there is no `Serialize`, and the bytes are wiped on drop.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::SecretError;

/// Default environment variable holding the master key.
pub const DEFAULT_MASTER_KEY_ENV: &str = "HOOKS_SECRET_KEY";

/// The webhook master key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    bytes: Vec<u8>,
}

impl MasterKey {
    /// Wrap a master key. Empty keys are rejected.
    pub fn new(value: impl Into<Vec<u8>>) -> Result<Self, SecretError> {
        let bytes = value.into();
        if bytes.is_empty() {
            return Err(SecretError::EmptyMasterKey);
        }
        Ok(Self { bytes })
    }

    /// Read the master key from an environment variable.
    pub fn from_env(var: &str) -> Result<Self, SecretError> {
        let value = std::env::var(var).map_err(|_| SecretError::MissingEnv {
            var: var.to_string(),
        })?;
        Self::new(value)
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(MasterKey::new(""), Err(SecretError::EmptyMasterKey)));
    }

    #[test]
    fn debug_output_is_redacted() {
        let key = MasterKey::new("super-secret-value").unwrap();
        let printed = format!("{:?}", key);
        assert!(!printed.contains("super-secret-value"));
        assert!(printed.contains("redacted"));
    }

    #[test]
    fn missing_env_var_is_reported() {
        let result = MasterKey::from_env("HOOKS_SECRET_KEY_DEFINITELY_NOT_SET_42");
        assert!(matches!(result, Err(SecretError::MissingEnv { .. })));
    }
}
