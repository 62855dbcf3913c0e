//! Sense Record Core - recording session manager for biosensor boards
//!
//! This library owns everything with real state in senserecord: it validates
//! board identities against a compiled-in catalog, tracks per-board session
//! state with liveness probes, derives BIDS `sourcedata` paths for CSV output,
//! and drives a board driver through the start/stop lifecycle, writing a JSON
//! sidecar once a recording completes.
//!
//! Front-ends (the CLI and the REST server) are thin adapters over
//! [`RecordingSession`] and [`SessionRegistry`].

pub mod catalog;
pub mod config;
pub mod driver;
pub mod error;
pub mod params;
pub mod paths;
pub mod registry;
pub mod session;
pub mod sidecar;

pub use catalog::DeviceSpec;
pub use config::{BoardConfig, ConfigError, StudyConfig, TaskConfig};
pub use driver::{DefaultDriver, DeviceConnection, DeviceDriver};
pub use error::{DeviceError, FilesystemError, SessionError, SessionResult};
pub use params::ConnectionParams;
pub use paths::{RecordingParams, RecordingPaths};
pub use registry::{SessionRegistry, SharedSession};
pub use session::{RecordingSession, SessionState, SessionStatus};
pub use sidecar::RecordingMetadata;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Ring buffer size handed to the driver when a stream starts
pub const STREAM_BUFFER_SIZE: usize = 45000;
