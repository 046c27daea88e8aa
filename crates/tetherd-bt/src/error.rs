//! Error types for the bluetoothctl backend.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BtError {
    #[error("bluetoothctl command failed: {0}")]
    CommandFailed(String),

    #[error("no bluetooth controller available")]
    NoController,

    #[error("bluetoothctl io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BtError {
    /// Whether the signal source is unrecoverably absent (binary missing or
    /// no controller), as opposed to a transient command failure.
    pub fn is_source_unavailable(&self) -> bool {
        match self {
            Self::NoController => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            Self::CommandFailed(_) => false,
        }
    }
}
