use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use waypoint::{
    ApiClient, ErrorKind, FixtureProvider, PlaceSteps, ReporterKind, SequenceReport,
    SequenceRunner, StepOutcome, SuiteConfig, PLACE_CRUD,
};

const PLACE_ID: &str = "ChIJ123";

/// Knobs for the mock place API.
#[derive(Clone, Default)]
struct Behaviour {
    omit_place_id: bool,
    /// Answer the add call with a body carrying neither `status`
    /// nor `place_id`.
    bare_add: bool,
    update_status: Option<StatusCode>,
    get_address: Option<String>,
}

#[derive(Default)]
struct MockState {
    behaviour: Behaviour,
    hits: Mutex<HashMap<&'static str, usize>>,
    address: Mutex<Option<String>>,
    keys: Mutex<Vec<String>>,
}

impl MockState {
    fn hit(&self, route: &'static str, query: &HashMap<String, String>) {
        *self.hits.lock().unwrap().entry(route).or_default() += 1;
        if let Some(key) = query.get("key") {
            self.keys.lock().unwrap().push(key.clone());
        }
    }
}

type Shared = Arc<MockState>;

async fn add_place(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.hit("add", &query);
    *state.address.lock().unwrap() = body["address"].as_str().map(str::to_string);
    if state.behaviour.bare_add {
        return ([("Server", "Apache/2.4.52 (Ubuntu)")], Json(json!({"scope": "APP"})));
    }

    let mut response = json!({
        "status": "OK",
        "scope": "APP",
        "reference": "a1b2c3",
        "id": "a1b2c3"
    });
    if !state.behaviour.omit_place_id {
        response["place_id"] = json!(PLACE_ID);
    }
    ([("Server", "Apache/2.4.52 (Ubuntu)")], Json(response))
}

async fn update_place(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.hit("update", &query);
    if let Some(status) = state.behaviour.update_status {
        return (status, Json(json!({"msg": "internal error"})));
    }
    if body["place_id"] != PLACE_ID {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "msg": "Update address operation failed, looks like the data doesn't exists"
            })),
        );
    }
    *state.address.lock().unwrap() = body["address"].as_str().map(str::to_string);
    (StatusCode::OK, Json(json!({"msg": "Address successfully updated"})))
}

async fn get_place(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    state.hit("get", &query);
    if query.get("place_id").map(String::as_str) != Some(PLACE_ID) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"msg": "Get operation failed, looks like place_id  doesn't exists"})),
        );
    }
    let address = state
        .behaviour
        .get_address
        .clone()
        .or_else(|| state.address.lock().unwrap().clone());
    (
        StatusCode::OK,
        Json(json!({
            "location": {"latitude": "-38.383494", "longitude": "33.427362"},
            "accuracy": "50",
            "name": "Frontline house",
            "address": address,
            "language": "French-IN"
        })),
    )
}

async fn delete_place(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.hit("delete", &query);
    if body["place_id"] == PLACE_ID {
        Json(json!({"status": "OK"}))
    } else {
        Json(json!({"msg": "Delete operation failed, looks like the data doesn't exists"}))
    }
}

struct TestServer {
    base_url: String,
    state: Shared,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    async fn spawn(behaviour: Behaviour) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(MockState {
            behaviour,
            ..Default::default()
        });
        let app = Router::new()
            .route("/maps/api/place/add/json", post(add_place))
            .route("/maps/api/place/update/json", put(update_place))
            .route("/maps/api/place/get/json", get(get_place))
            .route("/maps/api/place/delete/json", delete(delete_place))
            .with_state(state.clone());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let server = axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });

        let handle = tokio::spawn(async move {
            if let Err(err) = server.await {
                eprintln!("test server error: {err}");
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    fn hits(&self, route: &str) -> usize {
        self.state.hits.lock().unwrap().get(route).copied().unwrap_or(0)
    }

    async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                let _ = handle.await;
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

fn suite_config(base_url: &str, report_dir: &Path) -> SuiteConfig {
    SuiteConfig {
        base_url: base_url.to_string(),
        fixture_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/payloads"),
        report_dir: report_dir.to_path_buf(),
        expected_headers: HashMap::from([(
            "Server".to_string(),
            "Apache/2.4.52 (Ubuntu)".to_string(),
        )]),
        ..Default::default()
    }
}

async fn run_suite(config: &SuiteConfig) -> SequenceReport {
    let client = ApiClient::new(config.request_spec()).expect("client should build");
    let executor = PlaceSteps::new(
        client,
        FixtureProvider::new(&config.fixture_dir),
        config.place_settings(),
    );
    let mut runner = config.environment().into_iter().fold(
        SequenceRunner::new(&config.name, &PLACE_CRUD, config.build_reporter())
            .expect("place chain should be valid"),
        |runner, (key, value)| runner.with_environment(key, value),
    );
    runner.run(&executor).await
}

fn entries_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix))
        })
        .collect()
}

fn outcomes(report: &SequenceReport) -> Vec<StepOutcome> {
    report.steps.iter().map(|s| s.outcome).collect()
}

#[tokio::test]
async fn full_crud_sequence_passes_and_writes_both_reports() {
    let server = TestServer::spawn(Behaviour::default()).await;
    let reports = tempfile::tempdir().unwrap();
    let config = suite_config(&server.base_url, reports.path());

    let report = run_suite(&config).await;

    assert!(report.success(), "sequence should pass: {:#?}", report.steps);
    assert_eq!(report.count(StepOutcome::Passed), 4);
    assert!(report.report_error.is_none());
    assert_eq!(
        report.step("get_place").unwrap().message,
        "Successfully retrieved and validated updated address: Galaxy Apartments, Pune"
    );
    for route in ["add", "update", "get", "delete"] {
        assert_eq!(server.hits(route), 1, "route {route}");
    }
    assert!(server
        .state
        .keys
        .lock()
        .unwrap()
        .iter()
        .all(|k| k == "qaclick123"));

    let add = report.step("add_place").unwrap();
    assert!(add.artifacts.iter().any(|a| a.label == "Place ID"));
    let request = add.artifacts.iter().find(|a| a.label == "Request").unwrap();
    let request: Value = serde_json::from_str(request.as_text().unwrap()).unwrap();
    assert_eq!(request["method"], "POST");
    assert!(request["body"].as_str().unwrap().contains("Frontline house"));
    assert!(add
        .artifacts
        .iter()
        .any(|a| a.label == "Full URL" && a.as_text().unwrap().contains("key=qaclick123")));

    let step_dirs = entries_with_prefix(reports.path(), "step-results_");
    assert_eq!(step_dirs.len(), 1);
    let results = entries_with_prefix(&step_dirs[0], "0");
    assert_eq!(results.len(), 4, "{results:?}");
    assert!(step_dirs[0].join("environment.properties").is_file());

    let dashboards = entries_with_prefix(reports.path(), "dashboard_");
    assert_eq!(dashboards.len(), 1);
    let html = fs::read_to_string(&dashboards[0]).unwrap();
    for title in ["Add Place", "Update Place", "Get Place", "Delete Place"] {
        assert!(html.contains(title), "dashboard missing {title}");
    }

    server.shutdown().await;
}

#[tokio::test]
async fn missing_place_id_fails_update_without_sending_it() {
    let server = TestServer::spawn(Behaviour {
        omit_place_id: true,
        ..Default::default()
    })
    .await;
    let reports = tempfile::tempdir().unwrap();
    let config = SuiteConfig {
        reporters: vec![ReporterKind::Dashboard],
        ..suite_config(&server.base_url, reports.path())
    };

    let report = run_suite(&config).await;

    assert!(!report.success());
    assert_eq!(
        outcomes(&report),
        vec![
            StepOutcome::Passed,
            StepOutcome::Failed,
            StepOutcome::Skipped,
            StepOutcome::Skipped
        ]
    );
    let update = report.step("update_place").unwrap();
    assert_eq!(update.error_kind, Some(ErrorKind::MissingSharedState));
    assert!(update.message.contains("place_id"), "{}", update.message);
    assert_eq!(server.hits("update"), 0);
    assert_eq!(server.hits("get"), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn add_response_without_place_id_or_status_still_passes() {
    let server = TestServer::spawn(Behaviour {
        bare_add: true,
        ..Default::default()
    })
    .await;
    let reports = tempfile::tempdir().unwrap();
    let config = suite_config(&server.base_url, reports.path());

    let report = run_suite(&config).await;

    assert_eq!(report.step("add_place").unwrap().outcome, StepOutcome::Passed);
    let update = report.step("update_place").unwrap();
    assert_eq!(update.outcome, StepOutcome::Failed);
    assert_eq!(update.error_kind, Some(ErrorKind::MissingSharedState));
    assert_eq!(server.hits("update"), 0);
    assert_eq!(report.count(StepOutcome::Skipped), 2);

    server.shutdown().await;
}

#[tokio::test]
async fn transport_error_fails_first_step_and_skips_the_rest() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let reports = tempfile::tempdir().unwrap();
    let config = suite_config(&format!("http://{addr}"), reports.path());

    let report = run_suite(&config).await;

    let add = report.step("add_place").unwrap();
    assert_eq!(add.outcome, StepOutcome::Failed);
    assert_eq!(add.error_kind, Some(ErrorKind::Transport));
    assert!(add.message.starts_with("add_place: "), "{}", add.message);
    assert!(
        add.message.to_lowercase().contains("refused"),
        "cause missing from message: {}",
        add.message
    );
    assert_eq!(report.count(StepOutcome::Skipped), 3);
    assert!(report.report_path.is_some());
}

#[tokio::test]
async fn server_error_on_update_is_an_unexpected_status() {
    let server = TestServer::spawn(Behaviour {
        update_status: Some(StatusCode::INTERNAL_SERVER_ERROR),
        ..Default::default()
    })
    .await;
    let reports = tempfile::tempdir().unwrap();
    let config = suite_config(&server.base_url, reports.path());

    let report = run_suite(&config).await;

    let update = report.step("update_place").unwrap();
    assert_eq!(update.outcome, StepOutcome::Failed);
    assert_eq!(update.error_kind, Some(ErrorKind::UnexpectedStatus));
    assert!(update.message.contains("500"), "{}", update.message);
    assert_eq!(report.step("get_place").unwrap().outcome, StepOutcome::Skipped);
    assert_eq!(report.step("delete_place").unwrap().outcome, StepOutcome::Skipped);
    assert_eq!(server.hits("delete"), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn stale_address_fails_get_with_assertion_mismatch() {
    let server = TestServer::spawn(Behaviour {
        get_address: Some("29, side layout, cohen 09".to_string()),
        ..Default::default()
    })
    .await;
    let reports = tempfile::tempdir().unwrap();
    let config = suite_config(&server.base_url, reports.path());

    let report = run_suite(&config).await;

    let get = report.step("get_place").unwrap();
    assert_eq!(get.outcome, StepOutcome::Failed);
    assert_eq!(get.error_kind, Some(ErrorKind::AssertionMismatch));
    assert!(get.message.contains("Galaxy Apartments, Pune"), "{}", get.message);
    assert_eq!(report.step("delete_place").unwrap().outcome, StepOutcome::Skipped);

    server.shutdown().await;
}

async fn run_binary(base_url: &str, workdir: &Path) -> std::process::ExitStatus {
    let fixtures = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/payloads");
    tokio::process::Command::new(env!("CARGO_BIN_EXE_waypoint"))
        .current_dir(workdir)
        .env_remove("WAYPOINT_API_KEY")
        .env_remove("WAYPOINT_BASE_URL")
        .env("RUST_LOG", "warn")
        .args(["--base-url", base_url])
        .arg("--fixture-dir")
        .arg(&fixtures)
        .arg("--report-dir")
        .arg(workdir.join("reports"))
        .args(["--reporter", "dashboard"])
        .status()
        .await
        .expect("failed to run waypoint binary")
}

#[tokio::test]
async fn binary_exits_zero_only_when_every_step_passes() {
    let workdir = tempfile::tempdir().unwrap();

    let healthy = TestServer::spawn(Behaviour::default()).await;
    let status = run_binary(&healthy.base_url, workdir.path()).await;
    assert_eq!(status.code(), Some(0));
    healthy.shutdown().await;

    let failing = TestServer::spawn(Behaviour {
        update_status: Some(StatusCode::INTERNAL_SERVER_ERROR),
        ..Default::default()
    })
    .await;
    let status = run_binary(&failing.base_url, workdir.path()).await;
    assert_eq!(status.code(), Some(1));
    failing.shutdown().await;

    assert_eq!(entries_with_prefix(&workdir.path().join("reports"), "dashboard_").len(), 2);
}
