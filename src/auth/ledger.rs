//! Failed-attempt counter and lockout expiry.
//!
//! A missing, corrupt or unreadable ledger reads as "zero failures, not
//! locked". There is no administrator to clear a stuck lockout, so a storage
//! fault must never deny access on its own.

use super::store::{self, Loaded};
use super::AuthError;
use crate::audit::AuditLog;
use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Persisted ledger state
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AttemptRecord {
    pub failed_count: u32,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub lockout_until: Option<DateTime<Utc>>,
}

pub struct AttemptLedger {
    path: PathBuf,
    max_fail_attempts: u32,
    lockout_duration: Duration,
    clock: Arc<dyn Clock>,
    audit: AuditLog,
}

impl AttemptLedger {
    pub fn new(
        path: &Path,
        max_fail_attempts: u32,
        lockout_duration: Duration,
        clock: Arc<dyn Clock>,
        audit: AuditLog,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            max_fail_attempts,
            lockout_duration,
            clock,
            audit,
        }
    }

    /// Current record, degraded to the zero record on any read problem
    pub fn record(&self) -> AttemptRecord {
        match store::read_json::<AttemptRecord>(&self.path) {
            Ok(Loaded::Present(record)) => record,
            Ok(Loaded::Absent) => AttemptRecord::default(),
            Ok(Loaded::Malformed(reason)) => {
                tracing::warn!("ignoring malformed attempt ledger: {}", reason);
                AttemptRecord::default()
            }
            Err(e) => {
                tracing::warn!("ignoring unreadable attempt ledger: {}", e);
                AttemptRecord::default()
            }
        }
    }

    pub fn failed_count(&self) -> u32 {
        self.record().failed_count
    }

    pub fn is_locked(&self) -> bool {
        self.locked_until().is_some()
    }

    /// Lockout expiry if a lockout is in force right now
    pub fn locked_until(&self) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.record().lockout_until.filter(|until| now < *until)
    }

    /// Whole seconds left on the current lockout, rounded up
    pub fn lockout_remaining_secs(&self) -> Option<u64> {
        let now = self.clock.now();
        self.locked_until().map(|until| {
            let millis = (until - now).num_milliseconds().max(0) as u64;
            millis.div_ceil(1000)
        })
    }

    /// Count one failure, locking out once the threshold is reached.
    ///
    /// Persisted before returning so a crash right after still counts it.
    pub fn record_failure(&self) -> Result<AttemptRecord, AuthError> {
        let mut record = self.record();
        record.failed_count = record.failed_count.saturating_add(1);

        let locking = record.failed_count >= self.max_fail_attempts;
        record.lockout_until = if locking {
            let now = self.clock.now();
            Some(
                now.checked_add_signed(self.lockout_duration)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            )
        } else {
            // A stale expiry from an earlier, lower threshold
            None
        };

        store::write_json(&self.path, &record)?;

        if locking {
            self.audit.warning(&format!(
                "Account locked due to {} failed attempts",
                record.failed_count
            ));
        }
        Ok(record)
    }

    /// Forget all failures and any lockout
    pub fn reset(&self) -> Result<(), AuthError> {
        store::remove(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use tempfile::{tempdir, TempDir};

    fn ledger() -> (TempDir, AttemptLedger, Arc<ManualClock>) {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new());
        let audit = AuditLog::new(&dir.path().join("access.log"));
        let ledger = AttemptLedger::new(
            &dir.path().join("ledger.json"),
            3,
            Duration::seconds(300),
            clock.clone(),
            audit,
        );
        (dir, ledger, clock)
    }

    #[test]
    fn test_empty_ledger() {
        let (_dir, ledger, _clock) = ledger();
        assert_eq!(ledger.failed_count(), 0);
        assert!(!ledger.is_locked());
        assert!(ledger.lockout_remaining_secs().is_none());
    }

    #[test]
    fn test_locks_at_threshold() {
        let (_dir, ledger, _clock) = ledger();

        ledger.record_failure().unwrap();
        ledger.record_failure().unwrap();
        assert_eq!(ledger.failed_count(), 2);
        assert!(!ledger.is_locked());

        let record = ledger.record_failure().unwrap();
        assert_eq!(record.failed_count, 3);
        assert!(record.lockout_until.is_some());
        assert!(ledger.is_locked());
        assert_eq!(ledger.lockout_remaining_secs(), Some(300));
    }

    #[test]
    fn test_lockout_expires() {
        let (_dir, ledger, clock) = ledger();
        for _ in 0..3 {
            ledger.record_failure().unwrap();
        }

        clock.advance_secs(299);
        assert!(ledger.is_locked());
        assert_eq!(ledger.lockout_remaining_secs(), Some(1));

        clock.advance_secs(1);
        assert!(!ledger.is_locked());
        // The count survives expiry; only a successful login clears it
        assert_eq!(ledger.failed_count(), 3);
    }

    #[test]
    fn test_failure_after_expiry_relocks() {
        let (_dir, ledger, clock) = ledger();
        for _ in 0..3 {
            ledger.record_failure().unwrap();
        }
        clock.advance_secs(301);
        assert!(!ledger.is_locked());

        ledger.record_failure().unwrap();
        assert!(ledger.is_locked());
    }

    #[test]
    fn test_reset_clears_everything() {
        let (dir, ledger, _clock) = ledger();
        for _ in 0..5 {
            ledger.record_failure().unwrap();
        }
        ledger.reset().unwrap();

        assert_eq!(ledger.failed_count(), 0);
        assert!(!ledger.is_locked());
        assert!(!dir.path().join("ledger.json").exists());
        ledger.reset().unwrap();
    }

    #[test]
    fn test_malformed_ledger_degrades_to_unlocked() {
        let (dir, ledger, _clock) = ledger();
        std::fs::write(dir.path().join("ledger.json"), "{\"failed_count\": 9, \"lock").unwrap();

        assert_eq!(ledger.failed_count(), 0);
        assert!(!ledger.is_locked());

        // A failure overwrites the corrupt record
        ledger.record_failure().unwrap();
        assert_eq!(ledger.failed_count(), 1);
    }

    #[test]
    fn test_persisted_format() {
        let (dir, ledger, clock) = ledger();
        for _ in 0..3 {
            ledger.record_failure().unwrap();
        }
        let raw = std::fs::read_to_string(dir.path().join("ledger.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["failed_count"], 3);
        assert_eq!(
            value["lockout_until"].as_i64(),
            Some(clock.now().timestamp() + 300)
        );
    }

    #[test]
    fn test_failure_below_raised_threshold_clears_stale_expiry() {
        let (dir, _ledger, clock) = ledger();
        let stale = AttemptRecord {
            failed_count: 3,
            lockout_until: Some(clock.now() - Duration::seconds(60)),
        };
        store::write_json(&dir.path().join("ledger.json"), &stale).unwrap();

        let raised = AttemptLedger::new(
            &dir.path().join("ledger.json"),
            10,
            Duration::seconds(300),
            clock.clone(),
            AuditLog::disabled(),
        );
        let record = raised.record_failure().unwrap();

        assert_eq!(record.failed_count, 4);
        assert_eq!(record.lockout_until, None);
        assert_eq!(raised.record().lockout_until, None);
    }

    #[test]
    fn test_huge_lockout_duration_saturates() {
        let dir = tempdir().unwrap();
        let ledger = AttemptLedger::new(
            &dir.path().join("ledger.json"),
            1,
            Duration::seconds(i64::MAX / 1000),
            Arc::new(ManualClock::new()),
            AuditLog::disabled(),
        );

        let record = ledger.record_failure().unwrap();
        assert_eq!(record.lockout_until, Some(DateTime::<Utc>::MAX_UTC));
        assert!(ledger.is_locked());
    }

    #[test]
    fn test_lockout_is_audited() {
        let (dir, ledger, _clock) = ledger();
        for _ in 0..3 {
            ledger.record_failure().unwrap();
        }
        let log = std::fs::read_to_string(dir.path().join("access.log")).unwrap();
        assert!(log.contains("WARNING - Account locked due to 3 failed attempts"));
    }
}
