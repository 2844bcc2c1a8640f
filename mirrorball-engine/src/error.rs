use std::path::PathBuf;
use thiserror::Error;

use crate::result::FailureKind;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    StatusError { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to write {}: {source}", path.display())]
    FileSystemError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot prepare output directory {}: {source}", path.display())]
    OutputRootError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

impl MirrorError {
    pub fn file_system(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MirrorError::FileSystemError {
            path: path.into(),
            source,
        }
    }

    /// Bucket used by the run summary.
    pub fn kind(&self) -> FailureKind {
        match self {
            MirrorError::HttpError(_) | MirrorError::StatusError { .. } => FailureKind::Network,
            MirrorError::FileSystemError { .. } | MirrorError::OutputRootError { .. } => {
                FailureKind::FileSystem
            }
            MirrorError::InvalidUrl(_) => FailureKind::InvalidUrl,
            MirrorError::ConfigError(_) | MirrorError::JoinError(_) => FailureKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
