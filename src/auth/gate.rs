//! The authentication state machine.
//!
//! Startup resolves to one of three states: `Locked` if a lockout is in force,
//! `NoCredential` on first run, otherwise `AwaitingPassword`. First-run setup
//! reprompts without limit; login allows `max_login_rounds` prompts per
//! process. A lockout is only consulted at startup, so crossing the threshold
//! mid-run ends this run as rejected and the next run starts `Locked`.

use super::{
    AttemptLedger, AuthError, CredentialStore, PasswordPolicy, Session, SessionStore,
};
use crate::audit::AuditLog;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::prompt::Prompter;
use chrono::{DateTime, Duration, Utc};
use std::cell::Cell;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoCredential,
    Locked,
    AwaitingPassword,
    Authenticated,
    SessionExpired,
    Exited,
}

/// How a call to [`AuthGate::authenticate`] ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Access granted; the session is recorded
    Granted(Session),
    /// A lockout was already in force at startup
    Locked { until: DateTime<Utc> },
    /// Password prompts exhausted. `locked_until` is set when this run's
    /// failures triggered a lockout.
    Rejected { locked_until: Option<DateTime<Utc>> },
    /// The operator interrupted a prompt
    Cancelled,
}

impl AuthOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, AuthOutcome::Granted(_))
    }
}

/// Point-in-time view for the console's status command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityStatus {
    pub credential: CredentialStatus,
    pub failed_attempts: u32,
    pub locked_for_secs: Option<u64>,
    pub session: Option<Session>,
    pub session_remaining: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStatus {
    Missing,
    Set,
    Unreadable,
}

pub struct AuthGate {
    credentials: CredentialStore,
    ledger: AttemptLedger,
    sessions: SessionStore,
    policy: PasswordPolicy,
    audit: AuditLog,
    max_login_rounds: u32,
    state: Cell<AuthState>,
}

impl AuthGate {
    /// Build a gate over the on-disk state described by `config`
    pub fn open(config: &Config) -> Result<Self, AuthError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        let paths = config.paths();
        let audit = if config.audit.enabled {
            AuditLog::new(&paths.audit_log)
        } else {
            AuditLog::disabled()
        };
        let security = &config.security;

        let gate = Self {
            credentials: CredentialStore::new(&paths.credential, &config.hashing)?,
            ledger: AttemptLedger::new(
                &paths.ledger,
                security.max_fail_attempts,
                Duration::seconds(security.lockout_duration_secs as i64),
                clock.clone(),
                audit.clone(),
            ),
            sessions: SessionStore::new(
                &paths.session,
                Duration::seconds(security.session_timeout_secs as i64),
                clock,
            ),
            policy: config.password.clone(),
            audit,
            max_login_rounds: security.max_login_rounds,
            state: Cell::new(AuthState::Exited),
        };
        gate.state.set(gate.startup_state());
        Ok(gate)
    }

    pub fn state(&self) -> AuthState {
        self.state.get()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == AuthState::Authenticated
    }

    pub fn is_locked(&self) -> bool {
        self.ledger.is_locked()
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    fn startup_state(&self) -> AuthState {
        if self.is_locked() {
            AuthState::Locked
        } else if !self.credentials.exists() {
            AuthState::NoCredential
        } else {
            AuthState::AwaitingPassword
        }
    }

    /// Run first-run setup or login, depending on the startup state.
    ///
    /// Storage failures while persisting a password, the ledger or the new
    /// session are returned as errors; they never count as success.
    pub fn authenticate(&self, prompter: &mut dyn Prompter) -> Result<AuthOutcome, AuthError> {
        if let Some(until) = self.ledger.locked_until() {
            self.audit.warning("Login refused: account is locked");
            self.state.set(AuthState::Locked);
            return Ok(AuthOutcome::Locked { until });
        }

        let outcome = if self.credentials.exists() {
            self.run_login(prompter)?
        } else {
            self.run_setup(prompter)?
        };

        if outcome == AuthOutcome::Cancelled {
            self.state.set(AuthState::Exited);
        }
        Ok(outcome)
    }

    fn run_setup(&self, prompter: &mut dyn Prompter) -> Result<AuthOutcome, AuthError> {
        self.state.set(AuthState::NoCredential);
        prompter.say("Welcome! No password is set yet. Choose one to protect this console.");

        loop {
            let Some(password) = prompter.secret("Enter new password: ")? else {
                return Ok(AuthOutcome::Cancelled);
            };
            if let Err(violation) = self.policy.check(&password) {
                prompter.say(&violation.to_string());
                continue;
            }

            let Some(confirm) = prompter.secret("Confirm password: ")? else {
                return Ok(AuthOutcome::Cancelled);
            };
            if *password != *confirm {
                prompter.say(&AuthError::PasswordMismatch.to_string());
                continue;
            }

            self.credentials.set(&password)?;
            self.ledger.reset()?;
            self.audit.info("Password set successfully");
            prompter.say("Password set successfully!");
            return self.grant();
        }
    }

    fn run_login(&self, prompter: &mut dyn Prompter) -> Result<AuthOutcome, AuthError> {
        self.state.set(AuthState::AwaitingPassword);
        let rounds = self.max_login_rounds;

        for round in 1..=rounds {
            let Some(password) = prompter.secret("Enter password: ")? else {
                return Ok(AuthOutcome::Cancelled);
            };

            if self.credentials.verify(&password) {
                self.ledger.reset()?;
                self.audit.info("Successful login");
                prompter.say("Authentication successful!");
                return self.grant();
            }

            let record = self.ledger.record_failure()?;
            self.audit
                .warning(&format!("Failed login attempt {}", record.failed_count));

            if let Some(until) = record.lockout_until {
                self.state.set(AuthState::Locked);
                let secs = self.ledger.lockout_remaining_secs().unwrap_or_default();
                prompter.say(&format!(
                    "Invalid password. Too many failed attempts. {}",
                    AuthError::Locked(secs)
                ));
                return Ok(AuthOutcome::Rejected {
                    locked_until: Some(until),
                });
            }

            let remaining = rounds - round;
            if remaining > 0 {
                prompter.say(&format!(
                    "Invalid password. {} attempts remaining.",
                    remaining
                ));
            } else {
                prompter.say("Invalid password. Maximum attempts reached.");
            }
        }

        self.state.set(AuthState::Exited);
        Ok(AuthOutcome::Rejected { locked_until: None })
    }

    fn grant(&self) -> Result<AuthOutcome, AuthError> {
        let session = self.sessions.create()?;
        self.audit
            .info(&format!("Session {} started", session.short_id()));
        self.state.set(AuthState::Authenticated);
        Ok(AuthOutcome::Granted(session))
    }

    pub fn is_session_valid(&self) -> bool {
        self.sessions.is_valid()
    }

    /// Check the session before running a command; an expired session is
    /// removed and the gate moves to `Exited`.
    pub fn check_session(&self) -> Result<(), AuthError> {
        if !self.is_authenticated() {
            return Err(AuthError::SessionExpired);
        }
        if self.sessions.is_valid() {
            return Ok(());
        }

        self.state.set(AuthState::SessionExpired);
        self.audit.info("Session expired");
        self.end_session("Session ended (expired)");
        Err(AuthError::SessionExpired)
    }

    /// Record activity for an accepted command
    pub fn touch_session(&self) {
        if let Err(e) = self.sessions.touch() {
            tracing::warn!("could not record session activity: {}", e);
        }
    }

    /// Explicit logout or exit
    pub fn logout(&self) -> Result<(), AuthError> {
        self.sessions.invalidate()?;
        self.audit.info("Logged out");
        self.state.set(AuthState::Exited);
        Ok(())
    }

    /// Operator interrupt from any state
    pub fn interrupt(&self) {
        self.end_session("Session ended (interrupted)");
    }

    /// Remove the session if one is recorded and move to `Exited`.
    /// Never fails: this runs on every exit path.
    fn end_session(&self, reason: &str) {
        let had_session = self.sessions.current().is_some();
        if let Err(e) = self.sessions.invalidate() {
            self.audit
                .error(&format!("Could not remove session record: {}", e));
        }
        if had_session {
            self.audit.info(reason);
        }
        self.state.set(AuthState::Exited);
    }

    /// Replace the password after checking the current one.
    ///
    /// A wrong current password counts as a failed attempt; the resulting
    /// lockout, if any, applies from the next start.
    pub fn change_password(&self, current: &str, new: &str) -> Result<(), AuthError> {
        if !self.credentials.verify(current) {
            let record = self.ledger.record_failure()?;
            self.audit.warning(&format!(
                "Password change refused: invalid current password (failed attempt {})",
                record.failed_count
            ));
            return Err(AuthError::InvalidCredential);
        }

        self.policy.check(new)?;
        self.credentials.set(new)?;
        self.audit.info("Password changed successfully");
        Ok(())
    }

    /// Hold the active session until the guard is dropped
    pub fn session_guard(&self) -> SessionGuard<'_> {
        SessionGuard { gate: self }
    }

    pub fn status(&self) -> SecurityStatus {
        let credential = if !self.credentials.exists() {
            CredentialStatus::Missing
        } else if self.credentials.stored_hash().is_ok() {
            CredentialStatus::Set
        } else {
            CredentialStatus::Unreadable
        };

        SecurityStatus {
            credential,
            failed_attempts: self.ledger.failed_count(),
            locked_for_secs: self.ledger.lockout_remaining_secs(),
            session: self.sessions.current(),
            session_remaining: self.sessions.remaining(),
        }
    }
}

/// Scoped ownership of the active session.
///
/// Dropping the guard removes the session record, whichever way the console
/// loop ends: logout, exit, expiry, interrupt, error or panic.
pub struct SessionGuard<'a> {
    gate: &'a AuthGate,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if self.gate.state() != AuthState::Exited || self.gate.sessions.current().is_some() {
            self.gate.end_session("Session ended");
        }
    }
}
