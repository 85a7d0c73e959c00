//! Update orchestration: poll, download, atomic swap, restart
//!
//! One polling cycle compares the feed's latest version against the
//! installed one and, when they differ, stages the download next to the
//! artifact and renames it into place so concurrent readers never see a
//! half-written file. The installed version survives launcher restarts
//! through a side-car marker file next to the artifact.

use crate::errors::{Error, Result};
use crate::release::ReleaseSource;
use crate::supervisor::ProcessSupervisor;
use regex::Regex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What a completed polling cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The installed artifact already matches the feed
    UpToDate,
    /// A new version was downloaded, installed and the process (re)started
    Installed {
        /// The version tag that is now installed
        version: String,
    },
}

/// Orchestrates update checks against a [`ReleaseSource`] and keeps the
/// supervised process on the installed artifact.
pub struct ArtifactUpdater<S> {
    source: S,
    supervisor: Arc<ProcessSupervisor>,
    artifact_path: PathBuf,
    pattern: Regex,
    /// Version tag of the installed artifact, seeded from the side-car
    /// marker at startup. Only the poll task writes it, but RPC-triggered
    /// starts read it concurrently.
    installed: Mutex<Option<String>>,
}

impl<S: ReleaseSource> ArtifactUpdater<S> {
    /// Creates an updater for `artifact_path`, recovering the installed
    /// version from the side-car marker when one exists.
    pub fn new(
        source: S,
        supervisor: Arc<ProcessSupervisor>,
        artifact_path: PathBuf,
        pattern: Regex,
    ) -> Self {
        let installed = std::fs::read_to_string(marker_path(&artifact_path))
            .ok()
            .map(|tag| tag.trim().to_owned())
            .filter(|tag| !tag.is_empty());
        if let Some(tag) = &installed {
            debug!("recovered installed version {tag} from marker");
        }
        Self {
            source,
            supervisor,
            artifact_path,
            pattern,
            installed: Mutex::new(installed),
        }
    }

    /// One scheduled update check. Every failure is logged and recovered
    /// by the next cycle; nothing escalates out of the scheduler.
    pub async fn poll_cycle(&self) {
        match self.check_and_update().await {
            Ok(CycleOutcome::UpToDate) => debug!("artifact is up to date"),
            Ok(CycleOutcome::Installed { version }) => {
                info!("updated artifact to {version}");
            }
            Err(e) if e.is_transient() => warn!("update check skipped: {e}"),
            Err(e) => warn!("update cycle failed: {e}"),
        }
    }

    /// Locates the latest release and installs it when it differs from the
    /// installed version; otherwise makes sure the process got its first
    /// start.
    ///
    /// # Errors
    /// Everything the release source, the filesystem and the supervisor
    /// can fail with; the installed artifact is left unchanged on error.
    pub async fn check_and_update(&self) -> Result<CycleOutcome> {
        let release = self.source.find_latest().await?;
        let asset = release.matching_asset(&self.pattern)?;

        let mut installed = self.installed.lock().await;
        if installed.as_deref() == Some(release.tag.as_str()) {
            drop(installed);
            self.try_first_start().await?;
            return Ok(CycleOutcome::UpToDate);
        }

        info!(
            "found version {} (installed: {}); downloading {}",
            release.tag,
            installed.as_deref().unwrap_or("none"),
            asset.name
        );
        let bytes = self.source.download(asset).await?;
        self.install(&bytes).await?;
        tokio::fs::write(marker_path(&self.artifact_path), &release.tag).await?;
        *installed = Some(release.tag.clone());
        drop(installed);

        if self.supervisor.ever_started().await {
            self.supervisor.restart().await?;
        } else {
            self.supervisor.start().await?;
        }
        Ok(CycleOutcome::Installed {
            version: release.tag,
        })
    }

    /// Starts the process if it never ran in this launcher run and an
    /// artifact is installed; otherwise does nothing.
    ///
    /// # Errors
    /// As [`ProcessSupervisor::start`].
    pub async fn try_first_start(&self) -> Result<()> {
        if self.supervisor.ever_started().await {
            return Ok(());
        }
        if !tokio::fs::try_exists(&self.artifact_path).await? {
            debug!(
                "no artifact at {} yet; nothing to start",
                self.artifact_path.display()
            );
            return Ok(());
        }
        self.supervisor.start().await
    }

    /// Starts the process on behalf of a control-channel caller.
    ///
    /// # Errors
    /// `Config` when no artifact is installed yet, otherwise as
    /// [`ProcessSupervisor::start`] (notably `AlreadyRunning`).
    pub async fn start_process(&self) -> Result<()> {
        if !tokio::fs::try_exists(&self.artifact_path).await? {
            return Err(Error::Config(format!(
                "no artifact installed at {}",
                self.artifact_path.display()
            )));
        }
        self.supervisor.start().await
    }

    /// Stages the bytes next to the artifact and renames them into place.
    async fn install(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self
            .artifact_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = staging_path(&self.artifact_path);
        tokio::fs::write(&staging, bytes).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o755)).await?;
        }
        // Rename is atomic on one filesystem, so a concurrent reader sees
        // either the old artifact or the new one, never a partial file.
        tokio::fs::rename(&staging, &self.artifact_path).await?;
        Ok(())
    }
}

fn suffixed(artifact: &Path, suffix: &str) -> PathBuf {
    let mut name = artifact
        .file_name()
        .map_or_else(OsString::new, ToOwned::to_owned);
    name.push(suffix);
    artifact.with_file_name(name)
}

/// Side-car file recording the installed version tag.
fn marker_path(artifact: &Path) -> PathBuf {
    suffixed(artifact, ".version")
}

/// Staging file a download is written to before the atomic rename.
fn staging_path(artifact: &Path) -> PathBuf {
    suffixed(artifact, ".part")
}
