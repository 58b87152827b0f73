use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Severity of an audit event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Append-only security audit log.
///
/// Each event is one `timestamp - LEVEL - message` line. The file is opened per
/// event so a long-running console never holds a stale handle after rotation.
/// Every event is also emitted as a tracing event.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: Option<PathBuf>,
}

impl AuditLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
        }
    }

    /// Audit log that only forwards to tracing
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn log(&self, level: AuditLevel, message: &str) {
        match level {
            AuditLevel::Info => tracing::info!(target: "warden::audit", "{}", message),
            AuditLevel::Warning => tracing::warn!(target: "warden::audit", "{}", message),
            AuditLevel::Error => tracing::error!(target: "warden::audit", "{}", message),
        }

        let Some(path) = &self.path else {
            return;
        };
        if let Err(e) = self.append(path, level, message) {
            // The audit trail must never block authentication
            tracing::warn!("failed to write audit log {}: {}", path.display(), e);
        }
    }

    fn append(&self, path: &Path, level: AuditLevel, message: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", format_line(level, message))?;
        file.flush()
    }

    pub fn info(&self, message: &str) {
        self.log(AuditLevel::Info, message);
    }

    pub fn warning(&self, message: &str) {
        self.log(AuditLevel::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.log(AuditLevel::Error, message);
    }
}

fn format_line(level: AuditLevel, message: &str) -> String {
    format!(
        "{} - {} - {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        level.as_str(),
        message.replace('\n', " ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_appends_one_line_per_event() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("access.log");
        let audit = AuditLog::new(&path);

        audit.info("Password set successfully");
        audit.warning("Failed login attempt 1");

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - INFO - Password set successfully"));
        assert!(lines[1].ends_with(" - WARNING - Failed login attempt 1"));
    }

    #[test]
    fn test_line_format_has_timestamp() {
        let line = format_line(AuditLevel::Error, "boom");
        let parts: Vec<&str> = line.splitn(3, " - ").collect();
        assert_eq!(parts.len(), 3);
        assert!(chrono::NaiveDateTime::parse_from_str(parts[0], "%Y-%m-%d %H:%M:%S").is_ok());
        assert_eq!(parts[1], "ERROR");
        assert_eq!(parts[2], "boom");
    }

    #[test]
    fn test_multiline_message_stays_on_one_line() {
        let line = format_line(AuditLevel::Info, "a\nb");
        assert!(line.ends_with(" - INFO - a b"));
    }

    #[test]
    fn test_unwritable_path_does_not_panic() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").unwrap();
        let audit = AuditLog::new(&blocker.join("access.log"));
        audit.error("still fine");
    }

    #[test]
    fn test_disabled_writes_nothing() {
        let audit = AuditLog::disabled();
        assert!(audit.path.is_none());
        audit.info("ignored");
    }
}
