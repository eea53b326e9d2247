use std::path::PathBuf;

/// Boxed error returned by change handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{program} command failed: {message}")]
    CommandError { program: String, message: String },

    #[error("Unable to find squeeze basedir from {}", .0.display())]
    BaseDirNotFound(PathBuf),

    #[error("Unsupported repo_type \"{0}\" provided")]
    UnsupportedRepoError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Failed to parse config: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Repository does not have a commit identified by \"{0}\"")]
    UnknownCommit(String),

    #[error("Commit \"{0}\" not in history")]
    StaleRevision(String),

    #[error("Unrecognised status line: {0:?}")]
    ParseError(String),

    #[error("Lock file {} is held by running process {pid}", .path.display())]
    Locked { path: PathBuf, pid: u32 },

    #[error("Handler failed: {0}")]
    HandlerError(HandlerError),
}

pub type Result<T> = std::result::Result<T, Error>;
