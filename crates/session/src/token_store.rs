//! Token persistence.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;

use crate::ports::TokenStore;

/// Process-local token slot.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<String> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn set(&self, token: &str) {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = Some(token.to_string());
    }

    fn remove(&self) {
        *self.slot.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

/// Token persisted in a single file, surviving restarts.
///
/// IO failures never propagate: a token that cannot be read is treated as
/// absent, and a failed write is logged.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

const TOKEN_FILE: &str = "token";

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store the token under the platform data directory, in `app_name/token`.
    pub fn in_data_dir(app_name: &str) -> anyhow::Result<Self> {
        let base = dirs::data_dir().context("no platform data directory available")?;
        Ok(Self::new(base.join(app_name).join(TOKEN_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> anyhow::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                let token = raw.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read token file {:?}", self.path)),
        }
    }

    fn write(&self, token: &str) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create token directory {parent:?}"))?;
        }
        std::fs::write(&self.path, token)
            .with_context(|| format!("failed to write token file {:?}", self.path))
    }

    fn delete(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove token file {:?}", self.path)),
        }
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Option<String> {
        self.read().unwrap_or_else(|err| {
            tracing::warn!("treating token as absent: {err:#}");
            None
        })
    }

    fn set(&self, token: &str) {
        if let Err(err) = self.write(token) {
            tracing::error!("token not persisted: {err:#}");
        }
    }

    fn remove(&self) {
        if let Err(err) = self.delete() {
            tracing::error!("token not removed: {err:#}");
        }
    }
}
