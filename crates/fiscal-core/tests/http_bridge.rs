use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use fiscal_core::{
    BridgeApi, Connectivity, DayCommand, DisplayNameStore, Disposition, FiscalDayPhase,
    HttpBridge, RemoteFailure, RemoteOperation, Severity, SyncCore,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct MockBridge {
    routes: Arc<Mutex<HashMap<String, (StatusCode, String)>>>,
    hits: Arc<Mutex<Vec<String>>>,
}

impl MockBridge {
    fn respond(&self, route: &str, status: StatusCode, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(route.to_string(), (status, body.to_string()));
    }

    fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

async fn answer(State(mock): State<MockBridge>, method: Method, uri: Uri) -> Response {
    let route = format!("{method} {}", uri.path());
    mock.hits.lock().unwrap().push(route.clone());
    let scripted = mock.routes.lock().unwrap().get(&route).cloned();
    match scripted {
        Some((status, body)) => (status, [(header::CONTENT_TYPE, "application/json")], body).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn spawn_bridge(mock: MockBridge) -> String {
    let app = Router::new().fallback(answer).with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

async fn connect(mock: &MockBridge) -> HttpBridge {
    let url = spawn_bridge(mock.clone()).await;
    HttpBridge::new(&url, Some(Duration::from_secs(5))).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_is_coerced_from_loose_payload() {
    let mock = MockBridge::default();
    mock.respond(
        "GET /status",
        StatusCode::OK,
        r#"{"online":"yes","fiscal_day_status":"FiscalDayCloseInitiated","watcher_running":1}"#,
    );
    let bridge = connect(&mock).await;

    let report = bridge.fetch_status().await.unwrap();
    assert_eq!(report.upstream_online, Some(true));
    assert_eq!(report.phase, FiscalDayPhase::CloseInitiated);
    assert!(report.watcher_running);

    mock.respond("GET /status", StatusCode::OK, r#"{"fiscal_day_open":false}"#);
    let report = bridge.fetch_status().await.unwrap();
    assert_eq!(report.upstream_online, None);
    assert_eq!(report.phase, FiscalDayPhase::Closed);
    assert!(!report.watcher_running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queue_and_config_are_mapped() {
    let mock = MockBridge::default();
    mock.respond(
        "GET /queue",
        StatusCode::OK,
        r#"[{"receipt":{"invoice_number":"INV-9","total":42.5,"date":"2024-01-01"}},{"pdf_path":"r2.pdf"}]"#,
    );
    mock.respond(
        "GET /get-config",
        StatusCode::OK,
        r#"{"trade_name":"Acme Retail","device_id":21,"vat_registered":true}"#,
    );
    let bridge = connect(&mock).await;

    let queue = bridge.fetch_queue().await.unwrap();
    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0].invoice_number, "INV-9");
    assert_eq!(queue[0].amount, 42.5);
    assert_eq!(queue[0].disposition, Disposition::Signed);
    assert_eq!(queue[1].invoice_number, "INV-2");
    assert_eq!(queue[1].pdf_path.as_deref(), Some("r2.pdf"));

    let config = bridge.fetch_config().await.unwrap();
    assert_eq!(config.trade_name(), Some("Acme Retail"));
    assert_eq!(config.len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commands_post_to_their_paths() {
    let mock = MockBridge::default();
    mock.respond("POST /open-day", StatusCode::OK, r#"{"success":true}"#);
    mock.respond(
        "POST /sync",
        StatusCode::OK,
        r#"{"success":false,"message":"Device busy"}"#,
    );
    let bridge = connect(&mock).await;

    let ack = bridge.submit_command(DayCommand::OpenDay).await.unwrap();
    assert!(ack.success);
    let ack = bridge.submit_command(DayCommand::Sync).await.unwrap();
    assert!(!ack.success);
    assert_eq!(ack.server_message(), Some("Device busy"));

    assert_eq!(
        bridge.submit_command(DayCommand::CloseDay).await,
        Err(RemoteFailure::command(DayCommand::CloseDay))
    );
    assert_eq!(
        mock.hits(),
        vec!["POST /open-day", "POST /sync", "POST /close-day"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_statuses_and_bad_bodies_collapse_to_failure() {
    let mock = MockBridge::default();
    mock.respond(
        "GET /status",
        StatusCode::INTERNAL_SERVER_ERROR,
        r#"{"online":true,"fiscal_day_status":"OPEN"}"#,
    );
    mock.respond("GET /queue", StatusCode::OK, r#"{"items":[]}"#);
    mock.respond("GET /get-config", StatusCode::OK, "not json");
    mock.respond(
        "POST /close-day",
        StatusCode::BAD_REQUEST,
        r#"{"success":false,"message":"Day not open"}"#,
    );
    let bridge = connect(&mock).await;

    assert_eq!(
        bridge.fetch_status().await,
        Err(RemoteFailure::new(RemoteOperation::Status))
    );
    assert_eq!(
        bridge.fetch_queue().await,
        Err(RemoteFailure::new(RemoteOperation::Queue))
    );
    assert_eq!(
        bridge.fetch_config().await,
        Err(RemoteFailure::new(RemoteOperation::Config))
    );
    assert!(bridge.submit_command(DayCommand::CloseDay).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_bridge_is_a_failure_not_a_panic() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let bridge = HttpBridge::new(&format!("http://{addr}"), None).unwrap();
    assert!(bridge.fetch_status().await.is_err());
    assert!(bridge.submit_command(DayCommand::Sync).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_core_reconciles_against_http_bridge() {
    let mock = MockBridge::default();
    mock.respond(
        "GET /status",
        StatusCode::OK,
        r#"{"online":true,"fiscal_day_status":"CLOSED","watcher_running":true}"#,
    );
    mock.respond(
        "GET /queue",
        StatusCode::OK,
        r#"[{"receipt":{"invoice_number":"INV-1","total":10}},{"receipt":{"invoice_number":"INV-2"},"status":"excluded"}]"#,
    );
    mock.respond("GET /get-config", StatusCode::OK, r#"{"trade_name":"Acme"}"#);
    mock.respond("POST /open-day", StatusCode::OK, r#"{"success":true}"#);
    let state_dir = tempfile::tempdir().unwrap();
    let core = SyncCore::new(connect(&mock).await, DisplayNameStore::new(state_dir.path()));

    core.load_startup_config().await;
    core.reconcile_pass().await;
    let snapshot = core.snapshot();
    assert_eq!(snapshot.connectivity, Connectivity::Online);
    assert_eq!(snapshot.phase, FiscalDayPhase::Closed);
    assert_eq!(snapshot.display_name, "Acme");
    assert_eq!(snapshot.queue_count(Disposition::Signed), 1);
    assert_eq!(snapshot.queue_count(Disposition::Excluded), 1);

    core.submit_command(DayCommand::OpenDay).await;
    assert_eq!(core.snapshot().phase, FiscalDayPhase::Open);

    // the bridge still reports CLOSED, which wins on the next pass
    core.reconcile_pass().await;
    assert_eq!(core.snapshot().phase, FiscalDayPhase::Closed);

    mock.respond("GET /status", StatusCode::SERVICE_UNAVAILABLE, "{}");
    core.reconcile_pass().await;
    let snapshot = core.snapshot();
    assert_eq!(snapshot.connectivity, Connectivity::Offline);
    assert_eq!(snapshot.phase, FiscalDayPhase::Closed);
    assert!(snapshot.watcher_running);
    assert_eq!(snapshot.queue.len(), 2);
    assert_eq!(snapshot.log[0].severity(), Severity::Error);

    let reopened = DisplayNameStore::new(state_dir.path());
    assert_eq!(reopened.load().unwrap().as_deref(), Some("Acme"));
}
