//! Integration tests for durable task records and the poll watcher.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use veo_studio::veo::{
    FileTaskStore, MediaSource, PollWatcher, StaticToken, TaskRecord, TaskStatus, TaskStore,
    TokenSource, VeoClient, WatchOptions, WatchOutcome,
};

const HANDLE: &str = "projects/proj/locations/us-central1/publishers/google/models/veo-3.0-generate-preview/operations/op-1";
const FETCH_PATH: &str = "/v1/projects/proj/locations/us-central1/publishers/google/models/veo-3.0-generate-preview:fetchPredictOperation";

fn client(server: &MockServer) -> VeoClient {
    let tokens: Arc<dyn TokenSource> = Arc::new(StaticToken::new("test-token").unwrap());
    VeoClient::new("proj".to_string(), tokens)
        .unwrap()
        .with_endpoint(Some(server.uri()))
}

fn fast() -> WatchOptions {
    WatchOptions {
        interval: Duration::from_millis(10),
        max_attempts: Some(20),
        max_elapsed: Some(Duration::from_secs(10)),
    }
}

#[test]
fn test_records_survive_new_store_instance() {
    let dir = TempDir::new().unwrap();

    {
        let store = FileTaskStore::new_initialized(dir.path().to_path_buf()).unwrap();
        store
            .put(&TaskRecord::new(
                HANDLE,
                Some("a lighthouse at dusk".to_string()),
                TaskStatus::processing(),
            ))
            .unwrap();
    }

    let reopened = FileTaskStore::new(dir.path().to_path_buf());
    let record = reopened.get(HANDLE).unwrap().unwrap();
    assert_eq!(record.prompt.as_deref(), Some("a lighthouse at dusk"));
    assert_eq!(record.status, TaskStatus::processing());
    assert_eq!(reopened.list().unwrap().len(), 1);
}

#[test]
fn test_update_status_across_instances_keeps_prompt() {
    let dir = TempDir::new().unwrap();

    FileTaskStore::new(dir.path().to_path_buf())
        .put(&TaskRecord::new(HANDLE, Some("waves".to_string()), TaskStatus::Pending))
        .unwrap();

    FileTaskStore::new(dir.path().to_path_buf())
        .update_status(HANDLE, &TaskStatus::error("quota exceeded"))
        .unwrap();

    let record = FileTaskStore::new(dir.path().to_path_buf())
        .get(HANDLE)
        .unwrap()
        .unwrap();
    assert_eq!(record.prompt.as_deref(), Some("waves"));
    assert_eq!(record.status, TaskStatus::error("quota exceeded"));
}

#[test]
fn test_record_json_shape() {
    let dir = TempDir::new().unwrap();
    let store = FileTaskStore::new_initialized(dir.path().to_path_buf()).unwrap();
    let mut record = TaskRecord::new(HANDLE, None, TaskStatus::processing());
    record.updated_at = 1_700_000_000;
    store.put(&record).unwrap();

    let file = dir
        .path()
        .join(format!("{}.json", FileTaskStore::hash_handle(HANDLE)));
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(file).unwrap()).unwrap();

    assert_eq!(
        value,
        json!({
            "handle": HANDLE,
            "status": {"status": "processing", "progress": 20},
            "updatedAt": 1_700_000_000u64
        })
    );
}

#[tokio::test]
async fn test_watch_against_mock_server_records_completion() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let store = FileTaskStore::new_initialized(dir.path().to_path_buf()).unwrap();

    Mock::given(method("POST"))
        .and(path(FETCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": false})))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(FETCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "done": true,
            "response": {"videos": [{"gcsUri": "gs://bucket/out/sample_0.mp4"}]}
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let watcher = PollWatcher::new(&client, fast()).with_store(&store);

    let mut labels = Vec::new();
    let outcome = watcher.watch(HANDLE, |s| labels.push(s.label())).await;

    let expected = TaskStatus::Completed {
        progress: 100,
        video_url: "https://storage.googleapis.com/bucket/out/sample_0.mp4".to_string(),
        raw_reference: Some("gs://bucket/out/sample_0.mp4".to_string()),
        source: MediaSource::Gcs,
    };
    assert_eq!(outcome, WatchOutcome::Finished(expected.clone()));
    assert_eq!(labels, vec!["processing", "processing", "completed"]);

    let record = FileTaskStore::new(dir.path().to_path_buf())
        .get(HANDLE)
        .unwrap()
        .unwrap();
    assert_eq!(record.status, expected);
}

#[tokio::test]
async fn test_watch_gives_up_with_timeout_status() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(FETCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"done": false})))
        .expect(3)
        .mount(&server)
        .await;

    let client = client(&server);
    let options = WatchOptions {
        max_attempts: Some(3),
        ..fast()
    };
    let outcome = PollWatcher::new(&client, options).watch(HANDLE, |_| {}).await;

    match outcome.into_status() {
        TaskStatus::Timeout { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("Expected timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_watch_stops_on_upstream_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(FETCH_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "quota exceeded"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let outcome = PollWatcher::new(&client, fast()).watch(HANDLE, |_| {}).await;

    assert_eq!(
        outcome,
        WatchOutcome::Finished(TaskStatus::error("quota exceeded"))
    );
}
