//! File-per-record persistence shared by the three stores.

use super::AuthError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Result of reading a persisted record that may legitimately be missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loaded<T> {
    Absent,
    Malformed(String),
    Present(T),
}

impl<T> Loaded<T> {
    /// Report a malformed record as an error instead of folding it into absence
    pub fn strict(self, path: &Path) -> Result<Option<T>, AuthError> {
        match self {
            Loaded::Absent => Ok(None),
            Loaded::Present(value) => Ok(Some(value)),
            Loaded::Malformed(reason) => Err(AuthError::MalformedState {
                path: path.to_path_buf(),
                reason,
            }),
        }
    }
}

pub fn read_text(path: &Path) -> Result<Loaded<String>, AuthError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Loaded::Present(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Loaded::Absent),
        Err(e) if e.kind() == ErrorKind::InvalidData => Ok(Loaded::Malformed(e.to_string())),
        Err(e) => Err(AuthError::storage(path, e)),
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Loaded<T>, AuthError> {
    Ok(match read_text(path)? {
        Loaded::Present(content) => match serde_json::from_str(&content) {
            Ok(value) => Loaded::Present(value),
            Err(e) => Loaded::Malformed(e.to_string()),
        },
        Loaded::Absent => Loaded::Absent,
        Loaded::Malformed(reason) => Loaded::Malformed(reason),
    })
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AuthError> {
    let content = serde_json::to_vec(value).map_err(|e| {
        AuthError::storage(path, std::io::Error::new(ErrorKind::InvalidData, e))
    })?;
    write_atomic(path, &content)
}

/// Replace `path` with `bytes` so that a crash leaves either the old or the new content
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AuthError::storage(parent, e))?;
    }

    let temp_path = temp_path_for(path);
    let result = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&temp_path, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(AuthError::storage(path, e));
    }
    Ok(())
}

/// Delete a record; deleting a missing record succeeds
pub fn remove(path: &Path) -> Result<(), AuthError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AuthError::storage(path, e)),
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
