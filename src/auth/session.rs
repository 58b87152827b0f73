//! The single active operator session.
//!
//! A session is valid while less than the idle timeout has passed since its
//! last activity. Expiry is only ever checked on demand; nothing runs in the
//! background.

use super::store::{self, Loaded};
use super::AuthError;
use crate::clock::Clock;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Persisted session record
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Session {
    pub id: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub last_activity: DateTime<Utc>,
}

impl Session {
    /// Leading part of the id, enough to tell sessions apart in messages
    pub fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}

pub struct SessionStore {
    path: PathBuf,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(path: &Path, timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.to_path_buf(),
            timeout,
            clock,
        }
    }

    /// Start a fresh session, replacing whatever session was recorded before
    pub fn create(&self) -> Result<Session, AuthError> {
        let now = self.now();
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            start_time: now,
            last_activity: now,
        };
        store::write_json(&self.path, &session)?;
        Ok(session)
    }

    /// The recorded session, if one exists and parses
    pub fn current(&self) -> Option<Session> {
        match store::read_json::<Session>(&self.path) {
            Ok(Loaded::Present(session)) => Some(session),
            Ok(Loaded::Absent) => None,
            Ok(Loaded::Malformed(reason)) => {
                tracing::warn!("ignoring malformed session record: {}", reason);
                None
            }
            Err(e) => {
                tracing::warn!("ignoring unreadable session record: {}", e);
                None
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.current().is_some_and(|session| self.is_live(&session))
    }

    /// Time left before the session idles out
    pub fn remaining(&self) -> Option<Duration> {
        let session = self.current()?;
        let remaining = self.timeout - self.idle_for(&session);
        (remaining > Duration::zero()).then_some(remaining)
    }

    /// Record activity now. Does nothing when no session is recorded.
    pub fn touch(&self) -> Result<(), AuthError> {
        let Some(mut session) = self.current() else {
            return Ok(());
        };
        session.last_activity = self.now();
        store::write_json(&self.path, &session)
    }

    /// Remove the session record. Idempotent.
    pub fn invalidate(&self) -> Result<(), AuthError> {
        store::remove(&self.path)
    }

    /// Now, at the whole-second precision the record is stored with
    fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(0)
    }

    fn is_live(&self, session: &Session) -> bool {
        self.idle_for(session) < self.timeout
    }

    fn idle_for(&self, session: &Session) -> Duration {
        // Activity stamped in the future counts as just now
        (self.clock.now() - session.last_activity).max(Duration::zero())
    }
}
