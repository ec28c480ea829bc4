//! # hooks-secret
//!
//! Deterministic derivation of per-target webhook secrets.
//!
//! A webhook receiver authenticates deliveries by recomputing the secret from
//! the hook's identifying fields and the service master key. No shared store
//! is involved: the same inputs always produce the same secret.
//!
//! ## Quick Example
//!
//! ```rust
//! use hooks_secret::{derive_repository_secret, verify_repository_secret, MasterKey};
//!
//! let key = MasterKey::new("master-key").unwrap();
//! let secret = derive_repository_secret(&key, "PROJ", "github", "org/repo", "uuid-1");
//! verify_repository_secret(&key, "PROJ", "github", "org/repo", "uuid-1", &secret).unwrap();
//! ```

pub mod derive;
pub mod error;
pub mod master_key;

pub use derive::{
    derive_repository_secret, derive_secret, derive_workflow_secret, verify_repository_secret,
    verify_secret, verify_workflow_secret, SecretScope,
};
pub use error::SecretError;
pub use master_key::{MasterKey, DEFAULT_MASTER_KEY_ENV};
