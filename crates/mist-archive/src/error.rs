use std::path::PathBuf;

use mist_db::MistError;

/// Errors produced while writing or reading a backup bundle.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Db(#[from] MistError),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid archive: {0}")]
    Format(String),

    #[error("archive already exists: {}", .0.display())]
    Exists(PathBuf),
}

impl ArchiveError {
    /// The mistDb error code, when the failure came from the store.
    pub fn code(&self) -> Option<u32> {
        match self {
            Self::Db(err) => Some(err.code()),
            _ => None,
        }
    }
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;
