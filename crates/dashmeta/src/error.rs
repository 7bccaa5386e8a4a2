use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashMetaError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error("Invalid manifest xml: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error(transparent)]
    MissingExecutable(#[from] which::Error),

    #[error("Failed to replace {path}: {source}")]
    PersistError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}: directory not found")]
    NotADirectory(PathBuf),

    #[error(transparent)]
    JoinError(#[from] tokio::task::JoinError),
}

pub type DashMetaResult<T> = Result<T, DashMetaError>;
