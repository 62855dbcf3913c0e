//! E2E tests for the REST API
//!
//! Each test binds a server to an ephemeral port with a mock driver and
//! talks to it over HTTP.

use senserecord_core::driver::mock::MockDriver;
use senserecord_server::{AppState, ServerConfig};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

struct TestServer {
    base: String,
    driver: MockDriver,
    client: reqwest::Client,
}

impl TestServer {
    async fn spawn() -> Self {
        let driver = MockDriver::new();
        let state = AppState::with_driver(Arc::new(driver.clone()), ServerConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(senserecord_server::serve(listener, state));
        Self {
            base: format!("http://{addr}/api/v1"),
            driver,
            client: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self
            .client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        let code = response.status().as_u16();
        (code, response.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Option<Value>) -> (u16, Value) {
        let mut request = self.client.post(format!("{}{path}", self.base));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.unwrap();
        let code = response.status().as_u16();
        (code, response.json().await.unwrap())
    }
}

fn start_body(root: &TempDir, run: &str) -> Value {
    json!({
        "bidsroot": root.path(),
        "sub": "01",
        "ses": "01",
        "task": "rest",
        "run": run,
        "modality": "eeg",
        "metadata": {
            "task": {"label": "Resting state"},
            "board": {"manufacturer": "OpenBCI"}
        }
    })
}

#[tokio::test]
async fn test_list_boards() {
    let server = TestServer::spawn().await;
    let (code, body) = server.get("/boards").await;
    assert_eq!(code, 200);
    let boards = body.as_array().unwrap();
    assert!(boards.iter().any(|b| b["name"] == "SYNTHETIC_BOARD"
        && b["sampling_rate"] == 250
        && b["channel_count"] == 16));
}

#[tokio::test]
async fn test_status_unknown_board_is_422() {
    let server = TestServer::spawn().await;
    let (code, body) = server.get("/status/NOT_A_BOARD").await;
    assert_eq!(code, 422);
    assert_eq!(body["status"], "error");
    assert_eq!(body["result"]["board"]["name"], "NOT_A_BOARD");
    assert_eq!(body["details"][0], "Board name NOT_A_BOARD is unknown");
    assert_eq!(server.driver.counters.connect.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_status_untracked_board_is_not_registered() {
    let server = TestServer::spawn().await;
    let (code, body) = server
        .get("/status/CYTON_BOARD?serial_port=/dev/ttyUSB0")
        .await;
    assert_eq!(code, 200);
    assert_eq!(
        body,
        json!({
            "status": "ok",
            "result": {"board": {"name": "CYTON_BOARD", "is_ready": true, "is_recording": false}},
            "details": []
        })
    );
    let (_, sessions) = server.get("/sessions").await;
    assert_eq!(sessions, json!([]));
}

#[tokio::test]
async fn test_status_rejects_unknown_connection_param() {
    let server = TestServer::spawn().await;
    let (code, body) = server.get("/status/CYTON_BOARD?serial=/dev/ttyUSB0").await;
    assert_eq!(code, 422);
    assert!(body["details"][0].as_str().unwrap().contains("serial"));
}

#[tokio::test]
async fn test_start_status_stop_cycle() {
    let server = TestServer::spawn().await;
    let root = TempDir::new().unwrap();

    let (code, body) = server
        .post("/start/SYNTHETIC_BOARD", Some(start_body(&root, "1")))
        .await;
    assert_eq!(code, 200, "{body}");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["result"]["board"]["is_recording"], true);
    assert_eq!(body["result"]["board"]["is_ready"], false);

    let (_, sessions) = server.get("/sessions").await;
    assert_eq!(sessions[0]["name"], "SYNTHETIC_BOARD");
    assert_eq!(sessions[0]["is_recording"], true);

    let prepares = server.driver.prepare_calls();
    let (code, body) = server.get("/status/SYNTHETIC_BOARD").await;
    assert_eq!(code, 200);
    assert_eq!(body["result"]["board"]["is_recording"], true);
    assert_eq!(server.driver.prepare_calls(), prepares);

    let (code, body) = server.post("/stop/SYNTHETIC_BOARD", None).await;
    assert_eq!(code, 200, "{body}");
    assert_eq!(body["result"]["board"]["is_recording"], false);
    assert_eq!(body["result"]["board"]["is_ready"], true);

    let sidecar = root
        .path()
        .join("sourcedata/sub-01/ses-01/eeg/sub-01_ses-01_task-rest_run-1_eeg.json");
    let doc: Value = serde_json::from_str(&std::fs::read_to_string(sidecar).unwrap()).unwrap();
    assert_eq!(doc["TaskName"], "Resting state");
    assert_eq!(doc["Manufacturer"], "OpenBCI");
    assert_eq!(doc["SamplingFrequency"], 250);

    let (_, sessions) = server.get("/sessions").await;
    assert_eq!(sessions, json!([]));
}

#[tokio::test]
async fn test_second_start_is_conflict() {
    let server = TestServer::spawn().await;
    let root = TempDir::new().unwrap();
    let (code, _) = server
        .post("/start/SYNTHETIC_BOARD", Some(start_body(&root, "1")))
        .await;
    assert_eq!(code, 200);

    let (code, body) = server
        .post("/start/SYNTHETIC_BOARD", Some(start_body(&root, "2")))
        .await;
    assert_eq!(code, 409);
    assert_eq!(body["status"], "error");
    assert_eq!(body["result"]["board"]["is_recording"], true);
    assert_eq!(server.driver.start_calls(), 1);
}

#[tokio::test]
async fn test_existing_file_is_conflict() {
    let server = TestServer::spawn().await;
    let root = TempDir::new().unwrap();
    let dir = root.path().join("sourcedata/sub-01/ses-01/eeg");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("sub-01_ses-01_task-rest_run-1_eeg.csv"), "keep").unwrap();

    let (code, body) = server
        .post("/start/SYNTHETIC_BOARD", Some(start_body(&root, "1")))
        .await;
    assert_eq!(code, 409);
    assert!(body["details"][0]
        .as_str()
        .unwrap()
        .contains("already exists"));
    assert_eq!(server.driver.start_calls(), 0);
}

#[tokio::test]
async fn test_missing_output_root_is_400() {
    let server = TestServer::spawn().await;
    let root = TempDir::new().unwrap();
    let mut body = start_body(&root, "1");
    body["bidsroot"] = json!(root.path().join("absent"));
    let (code, body) = server.post("/start/SYNTHETIC_BOARD", Some(body)).await;
    assert_eq!(code, 400);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_board_failure_is_503() {
    let server = TestServer::spawn().await;
    let root = TempDir::new().unwrap();
    server.driver.set_fail_start(true);
    let (code, body) = server
        .post("/start/SYNTHETIC_BOARD", Some(start_body(&root, "1")))
        .await;
    assert_eq!(code, 503);
    assert_eq!(body["result"]["board"]["is_recording"], false);
}

#[tokio::test]
async fn test_stop_without_recording_is_conflict() {
    let server = TestServer::spawn().await;
    let (code, body) = server.post("/stop/SYNTHETIC_BOARD", None).await;
    assert_eq!(code, 409);
    assert_eq!(
        body["details"][0],
        "SYNTHETIC_BOARD had no active sessions to stop"
    );

    let (code, _) = server.post("/stop/NOT_A_BOARD", None).await;
    assert_eq!(code, 422);
}

#[tokio::test]
async fn test_failed_stop_keeps_session_tracked() {
    let server = TestServer::spawn().await;
    let root = TempDir::new().unwrap();
    let (code, _) = server
        .post("/start/SYNTHETIC_BOARD", Some(start_body(&root, "1")))
        .await;
    assert_eq!(code, 200);

    server.driver.set_fail_stop(true);
    let (code, body) = server.post("/stop/SYNTHETIC_BOARD", None).await;
    assert_eq!(code, 503);
    assert_eq!(body["result"]["board"]["is_recording"], false);

    let (_, sessions) = server.get("/sessions").await;
    assert_eq!(sessions[0]["name"], "SYNTHETIC_BOARD");
}

#[tokio::test]
async fn test_status_and_start_share_one_connection() {
    let server = TestServer::spawn().await;
    let root = TempDir::new().unwrap();
    server
        .driver
        .set_prepare_delay(std::time::Duration::from_millis(300));

    let status = server.get("/status/CYTON_BOARD");
    let start = async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        server
            .post("/start/CYTON_BOARD", Some(start_body(&root, "1")))
            .await
    };
    let ((status_code, _), (start_code, body)) = tokio::join!(status, start);

    assert_eq!(status_code, 200);
    assert_eq!(start_code, 200, "{body}");
    assert_eq!(server.driver.counters.max_live(), 1);
    assert_eq!(server.driver.counters.max_preparing(), 1);
}

#[tokio::test]
async fn test_sessions_listed_while_another_board_starts() {
    let server = TestServer::spawn().await;
    let root = TempDir::new().unwrap();
    let (code, _) = server
        .post("/start/SYNTHETIC_BOARD", Some(start_body(&root, "1")))
        .await;
    assert_eq!(code, 200);
    server
        .driver
        .set_prepare_delay(std::time::Duration::from_millis(500));

    let slow = server.post("/start/CYTON_BOARD", Some(start_body(&root, "2")));
    let listing = async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let began = std::time::Instant::now();
        let (code, sessions) = server.get("/sessions").await;
        (code, sessions, began.elapsed())
    };
    let (_, (code, sessions, elapsed)) = tokio::join!(slow, listing);

    assert_eq!(code, 200);
    assert_eq!(sessions[0]["name"], "SYNTHETIC_BOARD");
    assert!(elapsed < std::time::Duration::from_millis(300), "{elapsed:?}");
}
