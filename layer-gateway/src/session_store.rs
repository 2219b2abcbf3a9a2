//! Phone number → session file mapping.
//!
//! One session file per normalized phone number lives under the configured
//! data directory. The file content is owned by layer-client's
//! `BinaryFileBackend`; this module only decides where it goes and removes it.

use std::io;
use std::path::{Path, PathBuf};

use crate::errors::{GatewayError, Result};

/// Outcome of [`SessionStore::delete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    data_dir: PathBuf,
}

impl SessionStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Session file for `phone`, creating the data directory if needed.
    pub fn path_for(&self, phone: &str) -> Result<PathBuf> {
        let path = self.locate(phone)?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(path)
    }

    /// `true` if a session file was ever written for `phone`.
    pub fn exists(&self, phone: &str) -> Result<bool> {
        Ok(self.locate(phone)?.is_file())
    }

    pub fn delete(&self, phone: &str) -> Result<DeleteOutcome> {
        let path = self.locate(phone)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("[gateway] Session removed: {}", path.display());
                Ok(DeleteOutcome::Deleted)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DeleteOutcome::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    fn locate(&self, phone: &str) -> Result<PathBuf> {
        let digits = normalize_phone(phone)?;
        Ok(self.data_dir.join(format!("session_{digits}.session")))
    }
}

/// Strip `+` and spaces; what remains must be a non-empty run of digits.
pub fn normalize_phone(phone: &str) -> Result<String> {
    let digits: String = phone.chars().filter(|c| *c != '+' && *c != ' ').collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(GatewayError::BadRequest(format!("invalid phone number: {phone:?}")));
    }
    Ok(digits)
}
