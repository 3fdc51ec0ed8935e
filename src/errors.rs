//! Typed errors for the blob command boundary.
//!
//! The backend catches every failure at the command boundary and the
//! transport maps the kind to a negative wire status (errno-style, as the
//! ring protocol expects). Layers above the backend — recovery, CLI — use
//! anyhow and treat per-unit failures as transient.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    /// Key missing from the index (READ/DEL path).
    #[error("key not found")]
    NotFound,

    /// Bounds violation, malformed IoAttr or unknown command.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// OS-level read/write failure; offset names the failing record.
    #[error("i/o error at offset {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// Allocation failure during history assembly.
    #[error("failed to allocate {0} bytes for history data")]
    OutOfMemory(usize),

    /// Command present in the dispatch table but not implemented.
    #[error("unsupported command: {0}")]
    Unsupported(&'static str),
}

impl BlobError {
    pub fn io(offset: u64, source: io::Error) -> Self {
        BlobError::Io { offset, source }
    }

    /// Negative status code for the wire reply.
    pub fn wire_status(&self) -> i32 {
        match self {
            BlobError::NotFound => -2,           // -ENOENT
            BlobError::Io { .. } => -5,          // -EIO
            BlobError::OutOfMemory(_) => -12,    // -ENOMEM
            BlobError::InvalidArgument(_) => -22, // -EINVAL
            BlobError::Unsupported(_) => -95,    // -EOPNOTSUPP
        }
    }
}

pub type BlobResult<T> = std::result::Result<T, BlobError>;
