use crate::auth::PasswordPolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound for lockout and session durations: 100 years
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

/// Lockout and session limits
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SecurityConfig {
    #[serde(default = "default_max_fail_attempts")]
    pub max_fail_attempts: u32,
    #[serde(default = "default_lockout_duration_secs")]
    pub lockout_duration_secs: u64,
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    /// Password prompts allowed per process invocation
    #[serde(default = "default_max_login_rounds")]
    pub max_login_rounds: u32,
}

fn default_max_fail_attempts() -> u32 {
    3
}
fn default_lockout_duration_secs() -> u64 {
    300
}
fn default_session_timeout_secs() -> u64 {
    3600
}
fn default_max_login_rounds() -> u32 {
    3
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_fail_attempts: default_max_fail_attempts(),
            lockout_duration_secs: default_lockout_duration_secs(),
            session_timeout_secs: default_session_timeout_secs(),
            max_login_rounds: default_max_login_rounds(),
        }
    }
}

/// Argon2id work factor for new password hashes
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HashingConfig {
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
}

fn default_memory_kib() -> u32 {
    argon2::Params::DEFAULT_M_COST
}
fn default_iterations() -> u32 {
    argon2::Params::DEFAULT_T_COST
}
fn default_parallelism() -> u32 {
    argon2::Params::DEFAULT_P_COST
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
        }
    }
}

/// Security audit log settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Override for the log location (default: <data_dir>/access.log)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            file: None,
        }
    }
}

/// Where each piece of persisted state lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub credential: PathBuf,
    pub ledger: PathBuf,
    pub session: PathBuf,
    pub audit_log: PathBuf,
    pub history: PathBuf,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub password: PasswordPolicy,
    #[serde(default)]
    pub hashing: HashingConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Config {
    /// Default state directory: ~/.warden
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".warden")
    }

    /// Load configuration from the default path (~/.warden/config.toml).
    /// Built-in defaults apply when the file does not exist.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        let user_config = Self::default_data_dir().join("config.toml");
        if user_config.exists() {
            let user = Self::load_from(&user_config)?;
            config.merge(user);
        }

        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge another config into this one (other takes priority).
    /// Sections are taken whole; data_dir only if set.
    pub fn merge(&mut self, other: Config) {
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
        self.security = other.security;
        self.password = other.password;
        self.hashing = other.hashing;

        if other.audit.file.is_some() {
            self.audit.file = other.audit.file;
        }
        self.audit.enabled = other.audit.enabled;
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    pub fn paths(&self) -> StatePaths {
        let dir = self.data_dir();
        StatePaths {
            credential: dir.join("credential"),
            ledger: dir.join("ledger.json"),
            session: dir.join("session.json"),
            audit_log: self
                .audit
                .file
                .clone()
                .unwrap_or_else(|| dir.join("access.log")),
            history: dir.join("history"),
        }
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut require_nonzero = |field: &str, value: u64| {
            if value == 0 {
                errors.push(ValidationError {
                    field: field.to_string(),
                    message: "Must be greater than 0".to_string(),
                });
            }
        };

        require_nonzero(
            "security.max_fail_attempts",
            self.security.max_fail_attempts.into(),
        );
        require_nonzero(
            "security.lockout_duration_secs",
            self.security.lockout_duration_secs,
        );
        require_nonzero(
            "security.session_timeout_secs",
            self.security.session_timeout_secs,
        );
        require_nonzero(
            "security.max_login_rounds",
            self.security.max_login_rounds.into(),
        );
        require_nonzero("password.min_length", self.password.min_length as u64);

        for (field, value) in [
            (
                "security.lockout_duration_secs",
                self.security.lockout_duration_secs,
            ),
            (
                "security.session_timeout_secs",
                self.security.session_timeout_secs,
            ),
        ] {
            if value > MAX_DURATION_SECS {
                errors.push(ValidationError {
                    field: field.to_string(),
                    message: format!(
                        "Value {} is too large (maximum {})",
                        value, MAX_DURATION_SECS
                    ),
                });
            }
        }

        if let Err(e) = argon2::Params::new(
            self.hashing.memory_kib,
            self.hashing.iterations,
            self.hashing.parallelism,
            None,
        ) {
            errors.push(ValidationError {
                field: "hashing".to_string(),
                message: format!("Invalid Argon2 parameters: {}", e),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
