//! Password strength policy.
//!
//! Checked by the gate before a credential is stored; the credential store
//! itself accepts any string.

use serde::{Deserialize, Serialize};

/// Reason a candidate password was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("Password must be at least {0} characters long")]
    TooShort(usize),

    #[error("Password must contain both letters and numbers")]
    MissingLetterOrDigit,
}

/// Configuration for password strength
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PasswordPolicy {
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default = "default_true")]
    pub require_letter: bool,
    #[serde(default = "default_true")]
    pub require_digit: bool,
}

fn default_min_length() -> usize {
    6
}

fn default_true() -> bool {
    true
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
            require_letter: default_true(),
            require_digit: default_true(),
        }
    }
}

impl PasswordPolicy {
    /// Check a candidate password against the policy
    pub fn check(&self, password: &str) -> Result<(), PolicyViolation> {
        if password.chars().count() < self.min_length {
            return Err(PolicyViolation::TooShort(self.min_length));
        }

        let has_letter = password.chars().any(char::is_alphabetic);
        let has_digit = password.chars().any(|c| c.is_ascii_digit());

        if (self.require_letter && !has_letter) || (self.require_digit && !has_digit) {
            return Err(PolicyViolation::MissingLetterOrDigit);
        }

        Ok(())
    }
}
