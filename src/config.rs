//! Launcher configuration loading from `ul/config.toml`
//!
//! The configuration names the artifact the launcher keeps up to date, the
//! repository whose release feed is polled, the asset filename pattern, the
//! polling rate and the local control endpoint address. It is read once at
//! startup and treated as immutable for the lifetime of the process.

use crate::errors::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Template written on first run so the operator has something to fill in.
const CONFIG_TEMPLATE: &str = r#"# updating-launcher configuration

# Local path of the artifact that is kept up to date and run.
artifact_path = "app/bot"

[github]
# Repository whose release feed is polled for new artifact versions.
owner = ""
repo = ""

[checking]
# Regular expression a release asset's filename must fully match.
file_pattern = ""
# Poll interval in minutes; -1 runs a single check at startup and never again.
rate = 30

[process]
# Extra arguments passed to the managed process.
args = []

[control]
# Local control endpoint the `ul` CLI connects to.
host = "127.0.0.1"
port = 6290
"#;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Local path of the artifact that is kept up to date and run
    pub artifact_path: PathBuf,
    /// Release feed coordinates
    pub github: GitHubConfig,
    /// Update checking behavior
    pub checking: CheckingConfig,
    /// Managed process launch options
    #[serde(default)]
    pub process: ProcessConfig,
    /// Control endpoint address
    #[serde(default)]
    pub control: ControlConfig,
}

/// Repository whose release feed is polled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Repository owner (user or organization)
    pub owner: String,
    /// Repository name
    pub repo: String,
}

/// Update checking behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckingConfig {
    /// Regular expression a release asset's filename must fully match
    pub file_pattern: String,
    /// Poll interval in minutes; -1 runs a single check at startup only
    pub rate: i64,
}

/// Managed process launch options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Extra arguments passed to the managed process
    #[serde(default)]
    pub args: Vec<String>,
}

/// Control endpoint address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Host the control endpoint binds to
    #[serde(default = "default_control_host")]
    pub host: String,
    /// Port the control endpoint binds to
    #[serde(default = "default_control_port")]
    pub port: u16,
}

fn default_control_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_control_port() -> u16 {
    crate::control::proto::DEFAULT_PORT
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: default_control_host(),
            port: default_control_port(),
        }
    }
}

impl CheckingConfig {
    /// The compiled asset filename pattern.
    ///
    /// # Errors
    /// Returns `Error::Config` if the pattern is not a valid regular
    /// expression.
    pub fn compiled_pattern(&self) -> Result<Regex> {
        Regex::new(&self.file_pattern)
            .map_err(|e| Error::Config(format!("invalid file_pattern `{}`: {e}", self.file_pattern)))
    }

    /// The polling period, or `None` when checking runs once at startup.
    #[must_use]
    pub fn poll_period(&self) -> Option<Duration> {
        u64::try_from(self.rate)
            .ok()
            .map(|minutes| Duration::from_secs(minutes * 60))
    }
}

/// Loads the launcher configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing or invalid (empty pattern, zero rate)
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<LauncherConfig> {
    let contents = std::fs::read_to_string(path.as_ref())
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    let config: LauncherConfig = toml::from_str(&contents)
        .map_err(|e| Error::Config(format!("Failed to parse config.toml: {e}")))?;

    validate(&config)?;
    Ok(config)
}

/// Loads the configuration, scaffolding a template on first run.
///
/// Mirrors the launcher's first-run behavior: when no configuration exists
/// yet, a commented template is written and an error asks the operator to
/// fill it in before the launcher can do anything useful.
///
/// # Errors
/// Returns `Error::Config` when the file was just created, plus everything
/// [`load_config`] can return.
pub fn load_or_init(path: &Path) -> Result<LauncherConfig> {
    if !path.exists() {
        std::fs::write(path, CONFIG_TEMPLATE)?;
        return Err(Error::Config(format!(
            "A new configuration file was created at {}! Please configure it.",
            path.display()
        )));
    }
    load_config(path)
}

fn validate(config: &LauncherConfig) -> Result<()> {
    if config.github.owner.is_empty() || config.github.repo.is_empty() {
        return Err(Error::Config(
            "github.owner and github.repo must be set".to_string(),
        ));
    }
    if config.checking.file_pattern.is_empty() {
        return Err(Error::Config(
            "checking.file_pattern must be set".to_string(),
        ));
    }
    config.checking.compiled_pattern()?;
    if config.checking.rate == 0 || config.checking.rate < -1 {
        return Err(Error::Config(format!(
            "checking.rate must be a positive number of minutes or -1, got {}",
            config.checking.rate
        )));
    }
    Ok(())
}
