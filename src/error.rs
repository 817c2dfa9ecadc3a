use std::path::PathBuf;
use thiserror::Error;

/// Failures of the process supervisor
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no active session")]
    NoSession,
    #[error("failed to write to child input: {0}")]
    Input(String),
}

/// Failures of the release updater. None of these ever reach the install flow.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("redirect from {0} has no Location header")]
    MissingLocation(String),
    #[error("gave up after {0} redirects")]
    TooManyRedirects(usize),
    #[error("archive is larger than {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("invalid URL {0}")]
    InvalidUrl(String),
    #[error("invalid version tag {0:?}")]
    VersionParse(String),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<zip::result::ZipError> for UpdateError {
    fn from(e: zip::result::ZipError) -> Self {
        UpdateError::Archive(e.to_string())
    }
}

/// No terminal emulator could be started for a detached script
#[derive(Debug, Error)]
#[error("could not start a terminal for {script:?} (tried: {tried})")]
pub struct TerminalUnavailable {
    pub script: PathBuf,
    pub tried: String,
}
