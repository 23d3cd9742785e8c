//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::CliError;
use crate::filesys::{ensure_dir, JsonFile};

/// Environment variable overriding the base directory
pub const HOME_ENV_VAR: &str = "DECKHAND_HOME";

/// Storage layout for the CLI
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn settings_file(&self) -> JsonFile {
        JsonFile::new(self.base_dir.join("settings.json"))
    }

    /// Directory for rolling diagnostic logs
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Create the base and logs directories
    pub async fn setup(&self) -> Result<(), CliError> {
        ensure_dir(&self.base_dir).await?;
        ensure_dir(&self.logs_dir()).await
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        if let Some(home) = std::env::var_os(HOME_ENV_VAR) {
            return Self::new(home);
        }

        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".deckhand");

        Self::new(base_dir)
    }
}
