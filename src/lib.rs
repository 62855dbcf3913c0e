//! Sense Record - biosensor recording session manager
//!
//! This library re-exports the recording core from `senserecord-core` and
//! the REST API from `senserecord-server`. The `senserecord` binary is the
//! command-line front-end over both.

pub use senserecord_core::{
    catalog, config, driver, error, params, paths, registry, session, sidecar,
};
pub use senserecord_server as server;

pub use senserecord_core::{
    ConfigError, ConnectionParams, DefaultDriver, RecordingMetadata, RecordingParams,
    RecordingSession, SessionError, SessionRegistry, SessionState, StudyConfig,
};
pub use senserecord_core::{STREAM_BUFFER_SIZE, VERSION};
