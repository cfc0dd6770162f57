use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::SessionSettings;

/// On-disk store of the collaborator's session credentials.
///
/// The collaborator writes its material under `<root>/session-<client_id>`;
/// this type only knows where that is and how to throw it away.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    root: PathBuf,
    client_id: String,
}

impl CredentialStore {
    pub fn new(root: impl Into<PathBuf>, client_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            client_id: client_id.into(),
        }
    }

    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self::new(settings.data_dir.clone(), settings.client_id.clone())
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Directory holding this session's credentials
    pub fn session_dir(&self) -> PathBuf {
        self.root.join(format!("session-{}", self.client_id))
    }

    /// Whether persisted credentials exist for this session
    pub fn exists(&self) -> bool {
        self.session_dir().exists()
    }

    /// Delete the whole store.
    ///
    /// Returns `true` if anything was removed. A missing root is not an error.
    pub fn purge(&self) -> Result<bool> {
        if !self.root.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&self.root)
            .with_context(|| format!("Failed to remove session store: {}", self.root.display()))?;
        Ok(true)
    }
}
