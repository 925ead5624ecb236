//! Drive backend against a mock HTTP server

use ::common::crypto::{self, DerivedKey};
use ::common::identity::AccessGrant;
use ::common::reconcile::{ReconcileError, ReconcileOutcome, Reconciler};
use ::common::remote::{
    DriveRemoteStore, RemoteLocation, RemoteObjectHandle, RemoteStore, RemoteStoreError,
};
use chrono::{Duration, Utc};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn grant() -> AccessGrant {
    AccessGrant::expiring_in("ya29.test", "scope", Utc::now(), Duration::hours(1))
}

fn store_for(server: &MockServer) -> DriveRemoteStore {
    let url = Url::parse(&server.uri()).unwrap();
    DriveRemoteStore::new(url.clone(), url).unwrap()
}

fn handle(id: &str) -> RemoteObjectHandle {
    RemoteObjectHandle {
        id: id.into(),
        name: "vault.json".into(),
    }
}

#[tokio::test]
async fn test_list_queries_name_in_app_folder() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("q", "name = 'vault.json' and trashed = false"))
        .and(query_param("spaces", "appDataFolder"))
        .and(header("authorization", "Bearer ya29.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [{"id": "f1", "name": "vault.json"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let found = store_for(&server)
        .list(&grant(), &RemoteLocation::default())
        .await
        .unwrap();
    assert_eq!(found, vec![handle("f1")]);
}

#[tokio::test]
async fn test_list_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let found = store_for(&server)
        .list(&grant(), &RemoteLocation::default())
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn test_create_uploads_multipart_into_container() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "multipart"))
        .and(header("authorization", "Bearer ya29.test"))
        .and(body_string_contains(r#""parents":["appDataFolder"]"#))
        .and(body_string_contains(r#"{"cipher":"abc","iv":"def"}"#))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "new-1", "name": "vault.json"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let created = store_for(&server)
        .create(
            &grant(),
            &RemoteLocation::default(),
            br#"{"cipher":"abc","iv":"def"}"#.to_vec(),
        )
        .await
        .unwrap();
    assert_eq!(created, handle("new-1"));
}

#[tokio::test]
async fn test_update_patches_by_id() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/f1"))
        .and(query_param("uploadType", "multipart"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "f1", "name": "vault.json"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let updated = store_for(&server)
        .update(&grant(), &handle("f1"), b"{}".to_vec())
        .await
        .unwrap();
    assert_eq!(updated, handle("f1"));

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(!body.contains("parents"));
}

#[tokio::test]
async fn test_update_missing_file() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(404).set_body_string("File not found"))
        .mount(&server)
        .await;

    let err = store_for(&server)
        .update(&grant(), &handle("gone"), b"{}".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteStoreError::NotFound(id) if id == "gone"));
}

#[tokio::test]
async fn test_unauthorized_maps_to_grant_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = store_for(&server)
        .list(&grant(), &RemoteLocation::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteStoreError::GrantRejected));
}

#[tokio::test]
async fn test_server_error_keeps_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
        .mount(&server)
        .await;

    let err = store_for(&server)
        .list(&grant(), &RemoteLocation::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteStoreError::HttpStatus(503, body) if body == "backend unavailable"));
}

#[tokio::test]
async fn test_reconciler_creates_through_drive() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"files": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "new-1", "name": "vault.json"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let envelope = crypto::encrypt(&json!({"note": "hello"}), &DerivedKey::from([3u8; 32])).unwrap();
    let reconciler = Reconciler::new(store_for(&server));
    let outcome = reconciler.reconcile(&envelope, Some(&grant())).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Created(handle("new-1")));
}

#[tokio::test]
async fn test_reconciler_surfaces_rejected_grant() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let envelope = crypto::encrypt(&json!({}), &DerivedKey::from([3u8; 32])).unwrap();
    let reconciler = Reconciler::new(store_for(&server));
    assert!(matches!(
        reconciler.reconcile(&envelope, Some(&grant())).await,
        Err(ReconcileError::Remote(RemoteStoreError::GrantRejected))
    ));
}

#[tokio::test]
async fn test_unreachable_store_surfaces_network_error() {
    // bind then drop, so nothing is listening on the port
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let url = Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap();
    let store = DriveRemoteStore::new(url.clone(), url).unwrap();

    let envelope = crypto::encrypt(&json!({}), &DerivedKey::from([3u8; 32])).unwrap();
    let reconciler = Reconciler::new(store);
    assert!(matches!(
        reconciler.reconcile(&envelope, Some(&grant())).await,
        Err(ReconcileError::Remote(RemoteStoreError::Network(_)))
    ));
}
