//! REST API endpoints for senserecord
//!
//! All endpoints are under /api/v1/ and return JSON. Board endpoints answer
//! with the same envelope whether they succeed or fail:
//!
//! ```json
//! {"status": "ok", "result": {"board": {"name": "CYTON_BOARD", "is_ready": true, "is_recording": false}}, "details": []}
//! ```
//!
//! Session calls block on board I/O, so they run on the blocking pool.

use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use senserecord_core::error::FilesystemError;
use senserecord_core::registry::lock_session;
use senserecord_core::{
    catalog, ConnectionParams, RecordingMetadata, RecordingParams, SessionError, SessionStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Board fields of the response envelope
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BoardResult {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_recording: Option<bool>,
}

#[derive(Serialize, Debug, Clone)]
pub struct ResultBody {
    pub board: BoardResult,
}

/// Response envelope for board endpoints
#[derive(Serialize, Debug, Clone)]
pub struct ResultJson {
    pub status: &'static str,
    pub result: ResultBody,
    pub details: Vec<String>,
}

impl ResultJson {
    pub fn new(board: &str) -> Self {
        Self {
            status: "ok",
            result: ResultBody {
                board: BoardResult {
                    name: board.to_string(),
                    is_ready: None,
                    is_recording: None,
                },
            },
            details: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: SessionStatus) -> Self {
        self.result.board.is_ready = Some(status.ready);
        self.result.board.is_recording = Some(status.recording);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details.push(detail.into());
        self
    }

    fn error(mut self, detail: impl Into<String>) -> Self {
        self.status = "error";
        self.with_detail(detail)
    }
}

/// Failures a handler can report
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Session(e) => session_status_code(e),
            Self::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// HTTP status for a session error
pub fn session_status_code(err: &SessionError) -> StatusCode {
    match err {
        SessionError::UnknownDevice(_) | SessionError::InvalidParameter(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SessionError::Collision { .. }
        | SessionError::AlreadyRecording(_)
        | SessionError::NotRecording(_) => StatusCode::CONFLICT,
        SessionError::Filesystem(FilesystemError::MissingOutputRoot(_)) => StatusCode::BAD_REQUEST,
        SessionError::Filesystem(_) => StatusCode::INTERNAL_SERVER_ERROR,
        SessionError::Device { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Error envelope carrying whatever board status was known at failure time
#[derive(Debug)]
pub struct BoardFailure {
    pub board: String,
    pub status: Option<SessionStatus>,
    pub error: ApiError,
}

impl BoardFailure {
    fn new(board: &str, error: impl Into<ApiError>) -> Self {
        Self {
            board: board.to_string(),
            status: None,
            error: error.into(),
        }
    }

    fn with_status(mut self, status: SessionStatus) -> Self {
        self.status = Some(status);
        self
    }
}

impl IntoResponse for BoardFailure {
    fn into_response(self) -> Response {
        let code = self.error.status_code();
        let mut body = ResultJson::new(&self.board).error(self.error.to_string());
        if let Some(status) = self.status {
            body = body.with_status(status);
        }
        tracing::warn!(board = %self.board, status = %code, error = %self.error, "Request failed");
        (code, Json(body)).into_response()
    }
}

type BoardResponse = Result<Json<ResultJson>, BoardFailure>;

/// Catalog entry response
#[derive(Serialize)]
pub struct BoardInfoResponse {
    pub name: &'static str,
    pub sampling_rate: u32,
    pub channel_count: usize,
    pub channel_names: &'static [&'static str],
}

/// Tracked session response
#[derive(Serialize)]
pub struct SessionResponse {
    pub name: &'static str,
    pub is_ready: bool,
    pub is_recording: bool,
}

/// Request body for starting a recording
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct StartRequest {
    #[serde(alias = "bidsroot")]
    pub output_root: PathBuf,
    pub sub: String,
    pub ses: String,
    pub task: String,
    pub run: String,
    #[serde(alias = "type", default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub modality: Option<String>,
    #[serde(default)]
    pub acq: Option<String>,
    #[serde(default)]
    pub board_params: ConnectionParams,
    #[serde(default)]
    pub metadata: RecordingMetadata,
}

impl StartRequest {
    fn recording_params(&self) -> RecordingParams {
        let mut params = RecordingParams::new(&self.sub, &self.ses, &self.task, &self.run);
        params.data_type = self.data_type.clone();
        params.modality = self.modality.clone();
        params.acquisition = self.acq.clone();
        params
    }
}

/// Run blocking session work off the async executor
async fn blocking<T, F>(board: &str, f: F) -> Result<T, BoardFailure>
where
    F: FnOnce() -> Result<T, BoardFailure> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BoardFailure::new(board, e))?
}

/// GET /api/v1/boards
pub async fn list_boards() -> Json<Vec<BoardInfoResponse>> {
    Json(
        catalog::all()
            .iter()
            .map(|d| BoardInfoResponse {
                name: d.name,
                sampling_rate: d.sampling_rate,
                channel_count: d.channel_count(),
                channel_names: d.channel_names,
            })
            .collect(),
    )
}

/// GET /api/v1/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<Vec<SessionResponse>>, (StatusCode, String)> {
    let registry = state.registry;
    let snapshot = tokio::task::spawn_blocking(move || registry.snapshot())
        .await
        .map_err(|e| {
            let err = ApiError::from(e);
            tracing::error!(error = %err, "Failed to list sessions");
            (err.status_code(), err.to_string())
        })?;
    Ok(Json(
        snapshot
            .into_iter()
            .map(|(name, status)| SessionResponse {
                name,
                is_ready: status.ready,
                is_recording: status.recording,
            })
            .collect(),
    ))
}

/// GET /api/v1/status/{board}
///
/// Tracked boards are probed in place; untracked boards get a throwaway
/// session built from the query parameters, serialized with any start on
/// the same board.
pub async fn board_status(
    State(state): State<AppState>,
    Path(board): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
) -> BoardResponse {
    let params =
        ConnectionParams::from_pairs(&query).map_err(|e| BoardFailure::new(&board, e))?;

    let registry = state.registry;
    let name = board.clone();
    let status = blocking(&board, move || {
        registry
            .probe(&name, params)
            .map_err(|e| BoardFailure::new(&name, e))
    })
    .await?;

    Ok(Json(ResultJson::new(&board).with_status(status)))
}

/// POST /api/v1/start/{board}
pub async fn start_recording(
    State(state): State<AppState>,
    Path(board): Path<String>,
    Json(request): Json<StartRequest>,
) -> BoardResponse {
    let registry = state.registry;
    let name = board.clone();
    let (status, data_path) = blocking(&board, move || {
        let recording_params = request.recording_params();
        let session = registry
            .get_or_create(&name, request.board_params)
            .map_err(|e| BoardFailure::new(&name, e))?;
        let mut guard = lock_session(&session);
        match guard.start(&request.output_root, recording_params, request.metadata) {
            Ok(paths) => Ok((guard.status(), paths.data_path())),
            Err(e) => {
                guard.ping();
                Err(BoardFailure::new(&name, e).with_status(guard.status()))
            }
        }
    })
    .await?;

    tracing::info!(board = %board, path = %data_path.display(), "Recording started via API");
    Ok(Json(
        ResultJson::new(&board)
            .with_status(status)
            .with_detail(format!("Recording to {}", data_path.display())),
    ))
}

/// POST /api/v1/stop/{board}
///
/// A cleanly stopped session is dropped from the registry.
pub async fn stop_recording(
    State(state): State<AppState>,
    Path(board): Path<String>,
) -> BoardResponse {
    let registry = state.registry;
    let name = board.clone();
    let (status, sidecar) = blocking(&board, move || {
        let device = catalog::resolve(&name)
            .ok_or_else(|| BoardFailure::new(&name, SessionError::UnknownDevice(name.clone())))?;
        let session = registry.get(device.name).ok_or_else(|| {
            BoardFailure::new(&name, SessionError::NotRecording(name.clone()))
        })?;

        let mut guard = lock_session(&session);
        let result = match guard.stop() {
            Ok(sidecar) => Ok((guard.status(), sidecar)),
            Err(e) => Err(BoardFailure::new(&name, e).with_status(guard.status())),
        };
        drop(guard);
        if result.is_ok() {
            registry.remove(device.name);
        }
        result
    })
    .await?;

    tracing::info!(board = %board, sidecar = %sidecar.display(), "Recording stopped via API");
    Ok(Json(
        ResultJson::new(&board)
            .with_status(status)
            .with_detail(format!("Sidecar written to {}", sidecar.display())),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use senserecord_core::DeviceError;

    #[test]
    fn test_envelope_shape() {
        let body = ResultJson::new("CYTON_BOARD").with_status(SessionStatus {
            ready: true,
            recording: false,
        });
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "ok",
                "result": {"board": {"name": "CYTON_BOARD", "is_ready": true, "is_recording": false}},
                "details": []
            })
        );
    }

    #[test]
    fn test_error_envelope_omits_unknown_status() {
        let body = ResultJson::new("NOPE").error("Board name NOPE is unknown");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "error");
        assert!(json["result"]["board"].get("is_ready").is_none());
        assert_eq!(json["details"][0], "Board name NOPE is unknown");
    }

    #[test]
    fn test_status_code_mapping() {
        let cases = [
            (SessionError::UnknownDevice("X".into()), 422),
            (SessionError::InvalidParameter("bad".into()), 422),
            (SessionError::Collision { path: PathBuf::from("/x") }, 409),
            (SessionError::AlreadyRecording("X".into()), 409),
            (SessionError::NotRecording("X".into()), 409),
            (
                SessionError::Filesystem(FilesystemError::MissingOutputRoot("/x".into())),
                400,
            ),
            (
                SessionError::Device {
                    device: "X".into(),
                    source: DeviceError::NotPrepared,
                },
                503,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(session_status_code(&err).as_u16(), code, "{err}");
        }
    }

    #[test]
    fn test_start_request_accepts_aliases() {
        let request: StartRequest = serde_json::from_value(serde_json::json!({
            "bidsroot": "/data",
            "sub": "01", "ses": "01", "task": "rest", "run": "1",
            "type": "eeg",
            "board_params": {"serial_port": "/dev/ttyUSB0"}
        }))
        .unwrap();
        assert_eq!(request.output_root, PathBuf::from("/data"));
        let params = request.recording_params();
        assert_eq!(params.data_type.as_deref(), Some("eeg"));
        assert_eq!(request.board_params.serial_port.as_deref(), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn test_start_request_rejects_unknown_board_params() {
        let result: Result<StartRequest, _> = serde_json::from_value(serde_json::json!({
            "output_root": "/data",
            "sub": "01", "ses": "01", "task": "rest", "run": "1",
            "board_params": {"serial": "/dev/ttyUSB0"}
        }));
        assert!(result.is_err());
    }
}
