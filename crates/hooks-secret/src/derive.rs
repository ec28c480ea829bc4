// derive.rs — PBKDF2-HMAC-SHA512 webhook secret derivation.
//
// passphrase = identifying fields joined with '-'
// secret     = base64(PBKDF2(SHA-512, passphrase, salt = master key, 4096 rounds, 128 bytes))
//
// Changing any constant here invalidates every secret already handed out.

use std::num::NonZeroU32;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::pbkdf2;

use crate::error::SecretError;
use crate::master_key::MasterKey;

const ITERATIONS: NonZeroU32 = match NonZeroU32::new(4096) {
    Some(n) => n,
    None => panic!("iteration count must be non-zero"),
};

/// Length of the derived key material, before base64 encoding.
pub const SECRET_LEN: usize = 128;

const SEPARATOR: &str = "-";

/// What a secret authenticates: every delivery for a repository, or the
/// deliveries of one workflow's webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretScope<'a> {
    Repository {
        project_key: &'a str,
        vcs_name: &'a str,
        repo_name: &'a str,
        uuid: &'a str,
    },
    Workflow {
        project_key: &'a str,
        vcs_name: &'a str,
        repo_name: &'a str,
        workflow_name: &'a str,
        uuid: &'a str,
    },
}

impl SecretScope<'_> {
    fn passphrase(&self) -> String {
        match self {
            SecretScope::Repository {
                project_key,
                vcs_name,
                repo_name,
                uuid,
            } => [*project_key, *vcs_name, *repo_name, *uuid].join(SEPARATOR),
            SecretScope::Workflow {
                project_key,
                vcs_name,
                repo_name,
                workflow_name,
                uuid,
            } => [*project_key, *vcs_name, *repo_name, *workflow_name, *uuid].join(SEPARATOR),
        }
    }
}

/// Derive the base64-encoded secret for a scope.
pub fn derive_secret(key: &MasterKey, scope: &SecretScope<'_>) -> String {
    let mut out = [0u8; SECRET_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA512,
        ITERATIONS,
        key.as_bytes(),
        scope.passphrase().as_bytes(),
        &mut out,
    );
    STANDARD.encode(out)
}

/// Check a presented secret against the one derived for `scope`.
///
/// The comparison runs in constant time.
pub fn verify_secret(
    key: &MasterKey,
    scope: &SecretScope<'_>,
    presented: &str,
) -> Result<(), SecretError> {
    let decoded = STANDARD.decode(presented.trim())?;
    // ring verifies against the length of `decoded`; a truncated secret must not pass.
    if decoded.len() != SECRET_LEN {
        return Err(SecretError::Mismatch);
    }
    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA512,
        ITERATIONS,
        key.as_bytes(),
        scope.passphrase().as_bytes(),
        &decoded,
    )
    .map_err(|_| {
        tracing::debug!("webhook secret verification failed");
        SecretError::Mismatch
    })
}

/// Secret authenticating webhook deliveries for a whole repository.
pub fn derive_repository_secret(
    key: &MasterKey,
    project_key: &str,
    vcs_name: &str,
    repo_name: &str,
    uuid: &str,
) -> String {
    derive_secret(
        key,
        &SecretScope::Repository {
            project_key,
            vcs_name,
            repo_name,
            uuid,
        },
    )
}

/// Secret authenticating webhook deliveries that target one workflow.
pub fn derive_workflow_secret(
    key: &MasterKey,
    project_key: &str,
    vcs_name: &str,
    repo_name: &str,
    workflow_name: &str,
    uuid: &str,
) -> String {
    derive_secret(
        key,
        &SecretScope::Workflow {
            project_key,
            vcs_name,
            repo_name,
            workflow_name,
            uuid,
        },
    )
}

pub fn verify_repository_secret(
    key: &MasterKey,
    project_key: &str,
    vcs_name: &str,
    repo_name: &str,
    uuid: &str,
    presented: &str,
) -> Result<(), SecretError> {
    verify_secret(
        key,
        &SecretScope::Repository {
            project_key,
            vcs_name,
            repo_name,
            uuid,
        },
        presented,
    )
}

pub fn verify_workflow_secret(
    key: &MasterKey,
    project_key: &str,
    vcs_name: &str,
    repo_name: &str,
    workflow_name: &str,
    uuid: &str,
    presented: &str,
) -> Result<(), SecretError> {
    verify_secret(
        key,
        &SecretScope::Workflow {
            project_key,
            vcs_name,
            repo_name,
            workflow_name,
            uuid,
        },
        presented,
    )
}
