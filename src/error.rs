use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong when creating, loading, or persisting an [`crate::Index`].
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: corrupt index ({reason})")]
    Corrupt { path: PathBuf, reason: String },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("requested capacity exceeds the representable range")]
    CapacityExceeded,
}

pub type Result<T> = std::result::Result<T, IndexError>;
