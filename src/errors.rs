use thiserror::Error;

/// Unified error type for the launcher, the control endpoint and the CLI.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("no published release was found")]
    NotFound,

    #[error("no release asset fully matches `{0}`")]
    NoMatchingAsset(String),

    #[error("the managed process is already running")]
    AlreadyRunning,

    #[error("another lifecycle operation is in progress")]
    OperationInProgress,

    #[error("invalid credentials")]
    AuthenticationFailure,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(value.to_string())
    }
}

impl Error {
    /// Whether the next scheduled update cycle is expected to recover from
    /// this error on its own.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::NotFound | Error::NoMatchingAsset(_)
        )
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
