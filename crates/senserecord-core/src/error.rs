//! Error taxonomy for session operations
//!
//! Driver failures are wrapped in [`DeviceError`], filesystem failures in
//! [`FilesystemError`], and both surface through [`SessionError`] with enough
//! context to show an operator. Nothing here is retried automatically.

use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by a board driver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("No driver available for {0}")]
    NoDriver(String),

    #[error("Board session is not prepared")]
    NotPrepared,

    #[error("Board is already streaming")]
    AlreadyStreaming,

    #[error("Board is not streaming")]
    NotStreaming,

    #[error("Invalid stream sink: {0}")]
    InvalidSink(String),

    #[error("Invalid buffer size: {0}")]
    InvalidBufferSize(usize),

    #[error("Stream I/O failed: {0}")]
    Io(String),

    #[error("{0}")]
    Other(String),
}

/// Failures touching the output tree
#[derive(Error, Debug)]
pub enum FilesystemError {
    #[error(
        "Output root does not exist: {}. Check the config or create the directory.",
        .0.display()
    )]
    MissingOutputRoot(PathBuf),

    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write sidecar file {}: {source}", path.display())]
    SidecarWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode sidecar file {}: {source}", path.display())]
    SidecarEncode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors surfaced by session, registry, and path operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Board name {0} is unknown")]
    UnknownDevice(String),

    #[error("Board error on {device}: {source}")]
    Device {
        device: String,
        #[source]
        source: DeviceError,
    },

    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    #[error(
        "A file already exists at {}. Delete it or enter different recording information.",
        path.display()
    )]
    Collision { path: PathBuf },

    #[error("{0} is already recording")]
    AlreadyRecording(String),

    #[error("{0} had no active sessions to stop")]
    NotRecording(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl SessionError {
    pub(crate) fn device(device: &str, source: DeviceError) -> Self {
        Self::Device {
            device: device.to_string(),
            source,
        }
    }
}

/// Result alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collision_message_names_path() {
        let err = SessionError::Collision {
            path: PathBuf::from("/tmp/study/sub-01.csv"),
        };
        assert!(err.to_string().contains("/tmp/study/sub-01.csv"));
    }

    #[test]
    fn test_device_error_wraps_source() {
        let err = SessionError::device("CYTON_BOARD", DeviceError::NotPrepared);
        assert_eq!(
            err.to_string(),
            "Board error on CYTON_BOARD: Board session is not prepared"
        );
    }

    #[test]
    fn test_filesystem_error_is_transparent() {
        let err: SessionError =
            FilesystemError::MissingOutputRoot(PathBuf::from("/nope")).into();
        assert!(err.to_string().starts_with("Output root does not exist: /nope"));
    }
}
