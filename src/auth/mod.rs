//! Local authentication for the operator console.
//!
//! One hashed credential, a failed-attempt ledger with timed lockout, and a
//! single idle-timed session. [`AuthGate`] is the only component allowed to
//! move any of them between states; everything else reads derived booleans.

mod credential;
mod gate;
mod ledger;
mod policy;
mod session;
mod store;

pub use credential::CredentialStore;
#[cfg(test)]
pub(crate) use credential::cheap_hashing;
pub use gate::{AuthGate, AuthOutcome, AuthState, CredentialStatus, SecurityStatus, SessionGuard};
pub use ledger::AttemptLedger;
pub use policy::{PasswordPolicy, PolicyViolation};
pub use session::{Session, SessionStore};

use std::path::PathBuf;

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("storage unavailable at {}: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed state in {}: {reason}", path.display())]
    MalformedState { path: PathBuf, reason: String },

    #[error(transparent)]
    WeakPassword(#[from] PolicyViolation),

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Invalid password")]
    InvalidCredential,

    #[error("Account locked for another {0} seconds")]
    Locked(u64),

    #[error("Session expired - please log in again")]
    SessionExpired,

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Cannot read from terminal: {0}")]
    Prompt(String),
}

impl AuthError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AuthError::StorageUnavailable {
            path: path.into(),
            source,
        }
    }
}
