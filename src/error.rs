use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatrError {
    #[error("package {0} not found")]
    NotFound(String),

    #[error("package {0} already installed")]
    AlreadyInstalled(String),

    #[error("package {0} is not installed")]
    NotInstalled(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status: {0}")]
    UnexpectedStatus(u16),

    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid path in archive: {0}")]
    InvalidArchivePath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state database error: {0}")]
    State(#[from] rusqlite::Error),

    #[error("resolving {name}: {source}")]
    Resolve {
        name: String,
        #[source]
        source: Box<ChatrError>,
    },

    #[error("dependency cycle detected: {0}")]
    Cycle(String),

    #[error("{0} extraction is only supported on macOS")]
    PlatformUnsupported(&'static str),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ChatrError {
    /// True for errors that a plan reports as a notice rather than a failure.
    pub fn is_already_installed(&self) -> bool {
        matches!(self, ChatrError::AlreadyInstalled(_))
    }
}

pub type Result<T> = std::result::Result<T, ChatrError>;
