//! Time source for lockout and session expiry.
//!
//! All expiry decisions compare against the wall clock. A rollback only makes a
//! lockout last longer; moving the clock forward requires control of the local
//! machine, which is already inside the trust boundary of a single-operator tool.

use chrono::{DateTime, Utc};

/// Source of "now" shared by the attempt ledger and the session store
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub use manual::ManualClock;
