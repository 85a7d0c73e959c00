//! Connection descriptor file published for same-host discovery
//!
//! Written once per launcher run, overwriting whatever a previous run left
//! behind; a fresh run therefore invalidates every older descriptor. The
//! password inside is plaintext and lives exactly as long as the launcher
//! process that generated it.

use crate::errors::{Error, Result};
use rand::Rng;
use rand::distr::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Length of the generated admin password.
const PASSWORD_LENGTH: usize = 30;

/// Connection parameters a co-located client needs to reach the launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    /// Port the control endpoint listens on
    pub port: u16,
    /// Admin password generated for this launcher run
    pub admin_password: String,
    /// Command line the supervisor launches
    pub launch_command: String,
}

impl ConnectionDescriptor {
    /// Creates a descriptor with a freshly generated admin password.
    #[must_use]
    pub fn generate(port: u16, launch_command: String) -> Self {
        Self {
            port,
            admin_password: random_password(PASSWORD_LENGTH),
            launch_command,
        }
    }

    /// Writes the descriptor into `dir`, replacing any previous one.
    ///
    /// # Errors
    /// `Io` when the directory cannot be created or the file not written.
    pub async fn write(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(crate::DESCRIPTOR_FILE_NAME);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }

    /// Reads the descriptor a running launcher published into `dir`.
    ///
    /// # Errors
    /// `Connection` when no descriptor exists there — the usual sign that
    /// no launcher is running in this directory.
    pub async fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(crate::DESCRIPTOR_FILE_NAME);
        let contents = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::Connection(format!(
                "no connection descriptor at {}: {e}",
                path.display()
            ))
        })?;
        Ok(serde_json::from_str(&contents)?)
    }
}

fn random_password(length: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
