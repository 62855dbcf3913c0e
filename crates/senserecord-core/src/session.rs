//! Recording session state machine
//!
//! A [`RecordingSession`] owns one board connection and moves between
//! [`SessionState::Ready`], [`SessionState::Recording`], and
//! [`SessionState::Unreachable`]:
//!
//! - `ping()` probes with prepare + release, but never while recording
//! - `start()` resolves output paths first, then prepares and starts the stream
//! - `stop()` always leaves `Recording`, re-probes, then writes the sidecar
//! - `release()` is the forced teardown for front-ends recovering from errors
//! - `write_sidecar()` rewrites the sidecar of the last recording on retry
//!
//! Hardware failures are reported, never retried here.

use crate::catalog::{self, DeviceSpec};
use crate::driver::{DeviceConnection, DeviceDriver};
use crate::error::{SessionError, SessionResult};
use crate::params::ConnectionParams;
use crate::paths::{RecordingParams, RecordingPaths};
use crate::sidecar::{self, RecordingMetadata};
use crate::STREAM_BUFFER_SIZE;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Board answered the last probe and is idle
    Ready,
    /// A stream is being written to disk
    Recording,
    /// The last probe or prepare failed
    Unreachable,
}

/// Snapshot reported to front-ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub ready: bool,
    pub recording: bool,
}

/// Everything known about the current or most recent recording
#[derive(Debug, Clone)]
struct ActiveRecording {
    output_root: PathBuf,
    params: RecordingParams,
    metadata: RecordingMetadata,
    paths: RecordingPaths,
}

/// One logical connection lifecycle to a single board
pub struct RecordingSession {
    device: &'static DeviceSpec,
    connection_params: ConnectionParams,
    connection: Box<dyn DeviceConnection>,
    state: SessionState,
    recording: Option<ActiveRecording>,
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("device", &self.device.name)
            .field("connection_params", &self.connection_params)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl RecordingSession {
    /// Validate `identity` against the catalog, connect, and probe
    pub fn open(
        identity: &str,
        connection_params: ConnectionParams,
        driver: &dyn DeviceDriver,
    ) -> SessionResult<Self> {
        let device = catalog::resolve(identity)
            .ok_or_else(|| SessionError::UnknownDevice(identity.to_string()))?;
        Self::new(device, connection_params, driver)
    }

    /// Connect to a catalog board and run an initial probe
    pub fn new(
        device: &'static DeviceSpec,
        connection_params: ConnectionParams,
        driver: &dyn DeviceDriver,
    ) -> SessionResult<Self> {
        let connection = driver
            .connect(device, &connection_params)
            .map_err(|e| SessionError::device(device.name, e))?;
        let mut session = Self {
            device,
            connection_params,
            connection,
            state: SessionState::Unreachable,
            recording: None,
        };
        session.ping();
        Ok(session)
    }

    pub fn device(&self) -> &'static DeviceSpec {
        self.device
    }

    /// Board identity
    pub fn name(&self) -> &'static str {
        self.device.name
    }

    pub fn connection_params(&self) -> &ConnectionParams {
        &self.connection_params
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    pub fn is_recording(&self) -> bool {
        self.state == SessionState::Recording
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            ready: self.is_ready(),
            recording: self.is_recording(),
        }
    }

    /// Output root of the current or most recent recording
    pub fn output_root(&self) -> Option<&Path> {
        self.recording.as_ref().map(|r| r.output_root.as_path())
    }

    /// Resolved parameters of the current or most recent recording
    pub fn recording_params(&self) -> Option<&RecordingParams> {
        self.recording.as_ref().map(|r| &r.params)
    }

    pub fn metadata(&self) -> Option<&RecordingMetadata> {
        self.recording.as_ref().map(|r| &r.metadata)
    }

    /// Directory holding the data file
    pub fn data_path(&self) -> Option<&Path> {
        self.recording.as_ref().map(|r| r.paths.directory.as_path())
    }

    pub fn data_file(&self) -> Option<&str> {
        self.recording.as_ref().map(|r| r.paths.data_file.as_str())
    }

    pub fn sidecar_file(&self) -> Option<&str> {
        self.recording.as_ref().map(|r| r.paths.sidecar_file.as_str())
    }

    /// Liveness probe
    ///
    /// While recording this returns `false` without touching the connection.
    /// Otherwise prepares and immediately releases the board.
    pub fn ping(&mut self) -> bool {
        if self.is_recording() {
            return false;
        }
        let probe = self
            .connection
            .prepare()
            .and_then(|()| self.connection.release());
        match probe {
            Ok(()) => {
                self.state = SessionState::Ready;
                true
            }
            Err(e) => {
                tracing::debug!(board = self.device.name, error = %e, "Board probe failed");
                self.state = SessionState::Unreachable;
                false
            }
        }
    }

    /// Start streaming to a new data file under `output_root`
    ///
    /// Path validation, directory creation, and the collision check all run
    /// before the board is touched.
    pub fn start(
        &mut self,
        output_root: &Path,
        params: RecordingParams,
        metadata: RecordingMetadata,
    ) -> SessionResult<RecordingPaths> {
        if self.is_recording() {
            return Err(SessionError::AlreadyRecording(self.device.name.to_string()));
        }

        let mut params = params;
        params.resolve_defaults();
        let paths = RecordingPaths::prepare(output_root, &params)?;

        if let Err(e) = self.connection.prepare() {
            self.state = SessionState::Unreachable;
            return Err(SessionError::device(self.device.name, e));
        }

        let sink = paths.sink();
        if let Err(e) = self.connection.start_stream(STREAM_BUFFER_SIZE, &sink) {
            tracing::error!(board = self.device.name, error = %e, "Failed to start stream");
            self.state = match self.connection.release() {
                Ok(()) => SessionState::Ready,
                Err(release_err) => {
                    tracing::warn!(
                        board = self.device.name,
                        error = %release_err,
                        "Failed to release board after aborted start"
                    );
                    SessionState::Unreachable
                }
            };
            remove_if_empty(&paths.data_path());
            return Err(SessionError::device(self.device.name, e));
        }

        self.state = SessionState::Recording;
        self.recording = Some(ActiveRecording {
            output_root: output_root.to_path_buf(),
            params,
            metadata,
            paths: paths.clone(),
        });

        tracing::info!(
            board = self.device.name,
            path = %paths.data_path().display(),
            "Recording started"
        );
        Ok(paths)
    }

    /// Stop the stream, release the board, and write the sidecar
    ///
    /// The session leaves `Recording` even when the hardware calls fail. The
    /// sidecar is only written after a clean stop; a failed sidecar write does
    /// not undo the stop. Returns the sidecar path.
    pub fn stop(&mut self) -> SessionResult<PathBuf> {
        if !self.is_recording() {
            return Err(SessionError::NotRecording(self.device.name.to_string()));
        }

        let hardware = self
            .connection
            .stop_stream()
            .and_then(|()| self.connection.release());

        self.state = SessionState::Ready;
        self.ping();

        if let Err(e) = hardware {
            tracing::error!(board = self.device.name, error = %e, "Failed to stop recording cleanly");
            return Err(SessionError::device(self.device.name, e));
        }

        if let Some(recording) = &self.recording {
            tracing::info!(
                board = self.device.name,
                path = %recording.paths.data_path().display(),
                "Recording stopped"
            );
        }
        self.write_sidecar()
    }

    /// Write the sidecar of the most recent recording
    ///
    /// Lets a front-end retry after a failed write without another stop.
    pub fn write_sidecar(&self) -> SessionResult<PathBuf> {
        if self.is_recording() {
            return Err(SessionError::AlreadyRecording(self.device.name.to_string()));
        }
        let recording = self
            .recording
            .as_ref()
            .ok_or_else(|| SessionError::NotRecording(self.device.name.to_string()))?;
        let sidecar_path = recording.paths.sidecar_path();
        let doc = sidecar::build_sidecar(self.device, &recording.metadata);
        sidecar::write_sidecar(&sidecar_path, &doc)?;
        Ok(sidecar_path)
    }

    /// Second attempt at finishing a recording whose `stop()` failed
    ///
    /// A sidecar failure only rewrites the sidecar. Any other failure forces a
    /// release first; the board is usually released already, so a release
    /// error is logged and the sidecar is written regardless.
    pub fn retry_stop(&mut self, failure: &SessionError) -> SessionResult<PathBuf> {
        if !matches!(failure, SessionError::Filesystem(_)) {
            if let Err(e) = self.release() {
                tracing::warn!(board = self.device.name, error = %e, "Forced release failed");
            }
        }
        self.write_sidecar()
    }

    /// Forced release without a clean stream stop
    ///
    /// The session is marked `Ready` whatever the board reports.
    pub fn release(&mut self) -> SessionResult<()> {
        let result = self.connection.release();
        if self.is_recording() {
            tracing::warn!(board = self.device.name, "Releasing board with an active recording");
        }
        self.state = SessionState::Ready;
        result.map_err(|e| SessionError::device(self.device.name, e))
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if !self.is_recording() {
            return;
        }
        tracing::warn!(board = self.device.name, "Session dropped while recording, stopping stream");
        if let Err(e) = self.connection.stop_stream() {
            tracing::warn!(board = self.device.name, error = %e, "Failed to stop stream on drop");
        }
        if let Err(e) = self.connection.release() {
            tracing::warn!(board = self.device.name, error = %e, "Failed to release board on drop");
        }
    }
}

/// Drop a zero-length data file left by a start that never streamed
fn remove_if_empty(path: &Path) {
    let empty = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(false);
    if empty {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove empty data file");
        }
    }
}
