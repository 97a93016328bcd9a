use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use edaparts::EdaPartsError;
use edaparts::db::StorableStorage;
use edaparts::library::CadLibraryParser;
use edaparts::router::{EdaPartsState, edaparts_router};
use edaparts::service::{StorableService, StorageLayout, StoreQueue};
use edaparts::types::StoreTask;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "edaparts-test-boundary";
const MAX_UPLOAD_BYTES: usize = 64 * 1024;

const FOOTPRINT_R0805: &str = r#"(footprint "R0805" (version 20221018) (generator pcbnew)
  (layer "F.Cu")
  (descr "Resistor SMD 0805")
  (pad "1" smd rect (at -1 0) (size 1 1.4) (layers "F.Cu")))"#;

#[derive(Default)]
struct CapturingQueue(Mutex<Vec<StoreTask>>);

impl StoreQueue for CapturingQueue {
    fn enqueue(&self, task: StoreTask) -> Result<(), EdaPartsError> {
        self.0.lock().unwrap().push(task);
        Ok(())
    }
}

struct TestApp {
    _dir: TempDir,
    upload_dir: PathBuf,
    queue: Arc<CapturingQueue>,
    router: Router,
}

impl TestApp {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let database_url = format!("sqlite:{}", dir.path().join("edaparts.sqlite").display());
        let storage = StorableStorage::connect(&database_url).await.unwrap();
        let upload_dir = dir.path().join("uploads");
        let queue = Arc::new(CapturingQueue::default());
        let service = StorableService::new(
            storage,
            StorageLayout::new(dir.path().join("library")),
            Arc::new(CadLibraryParser),
            queue.clone(),
        );
        let router = edaparts_router(EdaPartsState::new(service, &upload_dir), MAX_UPLOAD_BYTES);
        Self {
            _dir: dir,
            upload_dir,
            queue,
            router,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let resp = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");
        let status = resp.status();
        let body = to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("failed to read response body");
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    fn spooled_uploads(&self) -> usize {
        std::fs::read_dir(&self.upload_dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

fn multipart(method: &str, uri: &str, fields: &[(&str, &str)], file: Option<&str>) -> Request<Body> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    if let Some(content) = file {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"library\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n{content}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Request::builder()
        .method(method)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("failed to build request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("failed to build request")
}

fn footprint_form(path: &str) -> Vec<(&str, &str)> {
    vec![("path", path), ("cad_type", "KICAD")]
}

#[tokio::test]
async fn create_returns_the_pending_record() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(multipart(
            "POST",
            "/footprints",
            &footprint_form("foo.pretty/R0805.kicad_mod"),
            Some(FOOTPRINT_R0805),
        ))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["reference"], "R0805");
    assert_eq!(body["alias"], "EDAPARTS_FOO");
    assert_eq!(body["cad_type"], "KICAD");
    assert_eq!(body["file_type"], "FOOTPRINT");
    assert_eq!(body["storage_status"], "NOT_STORED");

    // The spooled upload now belongs to the queued task.
    let tasks = app.queue.0.lock().unwrap().clone();
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].filename.exists());
    assert_eq!(
        std::fs::read_to_string(&tasks[0].filename).unwrap(),
        FOOTPRINT_R0805
    );
}

#[tokio::test]
async fn rejected_create_removes_the_spooled_upload() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(multipart(
            "POST",
            "/footprints",
            &footprint_form("/etc/x.kicad_mod"),
            Some(FOOTPRINT_R0805),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_PATH");
    assert_eq!(app.spooled_uploads(), 0);
}

#[tokio::test]
async fn unknown_kind_is_rejected() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(multipart(
            "POST",
            "/capacitors",
            &footprint_form("foo.pretty/R0805.kicad_mod"),
            Some(FOOTPRINT_R0805),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_STORABLE_TYPE");

    let (status, _) = app.send(get("/capacitors/1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_parts_are_bad_requests() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(multipart(
            "POST",
            "/footprints",
            &footprint_form("foo.pretty/R0805.kicad_mod"),
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");

    let (status, body) = app
        .send(multipart(
            "POST",
            "/footprints",
            &[("path", "foo.pretty/R0805.kicad_mod"), ("cad_type", "EAGLE")],
            Some(FOOTPRINT_R0805),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
    assert_eq!(app.spooled_uploads(), 0);
}

#[tokio::test]
async fn duplicate_create_is_a_conflict() {
    let app = TestApp::new().await;
    let form = footprint_form("foo.pretty/R0805.kicad_mod");

    let (_, first) = app
        .send(multipart("POST", "/footprints", &form, Some(FOOTPRINT_R0805)))
        .await;
    let (status, body) = app
        .send(multipart("POST", "/footprints", &form, Some(FOOTPRINT_R0805)))
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_EXISTS");
    assert_eq!(body["error"]["conflicting_id"], first["id"]);
}

#[tokio::test]
async fn read_and_list_records() {
    let app = TestApp::new().await;
    let (_, created) = app
        .send(multipart(
            "POST",
            "/footprints",
            &footprint_form("foo.pretty/R0805.kicad_mod"),
            Some(FOOTPRINT_R0805),
        ))
        .await;
    let id = created["id"].as_i64().unwrap();

    let (status, body) = app.send(get(&format!("/footprints/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, created);

    let (status, body) = app.send(get("/footprints/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["missing_id"], 999);

    let (status, body) = app.send(get("/footprints?page_number=1&page_size=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_elements"], 1);
    assert_eq!(body["page_size"], 10);
    assert_eq!(body["elements"][0]["id"], id);

    let (_, body) = app.send(get("/symbols")).await;
    assert_eq!(body["total_elements"], 0);
    assert_eq!(body["page_number"], 1);
}

#[tokio::test]
async fn update_data_of_a_missing_record_is_not_found() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(multipart(
            "PUT",
            "/footprints/7/data",
            &[],
            Some(FOOTPRINT_R0805),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["missing_id"], 7);
    assert_eq!(app.spooled_uploads(), 0);
}

#[tokio::test]
async fn update_data_queues_a_new_store() {
    let app = TestApp::new().await;
    let (_, created) = app
        .send(multipart(
            "POST",
            "/footprints",
            &footprint_form("foo.pretty/R0805.kicad_mod"),
            Some(FOOTPRINT_R0805),
        ))
        .await;
    let id = created["id"].as_i64().unwrap();

    let (status, body) = app
        .send(multipart(
            "PUT",
            &format!("/footprints/{id}/data"),
            &[],
            Some(FOOTPRINT_R0805),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);
    assert_eq!(body["storage_status"], "NOT_STORED");
    assert_eq!(app.queue.0.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn oversized_upload_is_rejected_with_413() {
    let app = TestApp::new().await;
    let oversized = format!(
        "(footprint \"R0805\" (descr \"{}\"))",
        "a".repeat(MAX_UPLOAD_BYTES + 1024)
    );

    let (status, body) = app
        .send(multipart(
            "POST",
            "/footprints",
            &footprint_form("foo.pretty/R0805.kicad_mod"),
            Some(&oversized),
        ))
        .await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
    assert_eq!(app.spooled_uploads(), 0);
}
