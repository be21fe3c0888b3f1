use cardwise_cloud::{CloudConfig, CloudError, RemoteStore, RestRemoteStore};
use cardwise_types::{DocPath, Filter, Payload};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup(server: &MockServer) -> RestRemoteStore {
    let config = CloudConfig {
        api_base_url: server.uri(),
        request_timeout_secs: 5,
    };
    RestRemoteStore::new(config).unwrap()
}

async fn signed_in(server: &MockServer) -> RestRemoteStore {
    let store = setup(server).await;
    store
        .set_tokens("at".into(), "rt".into(), "u1".into())
        .await;
    store
}

fn auth_response() -> serde_json::Value {
    json!({
        "access_token": "at-new",
        "refresh_token": "rt-new",
        "user": { "id": "u1", "email": "ana@example.com" }
    })
}

fn doc_path(raw: &str) -> DocPath {
    DocPath::parse(raw).unwrap()
}

fn payload(value: serde_json::Value) -> Payload {
    value.as_object().unwrap().clone()
}

// --- Auth State ---

#[tokio::test]
async fn new_store_has_no_session() {
    let server = MockServer::start().await;
    let store = setup(&server).await;
    assert!(!store.is_authenticated().await);
    assert_eq!(store.user_id().await, None);
}

#[tokio::test]
async fn restored_session_then_logout() {
    let server = MockServer::start().await;
    let store = signed_in(&server).await;
    assert_eq!(store.user_id().await.as_deref(), Some("u1"));
    store.logout().await;
    assert!(!store.is_authenticated().await);
}

#[tokio::test]
async fn login_stores_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_response()))
        .mount(&server)
        .await;

    let store = setup(&server).await;
    let tokens = store.authenticate("ana@example.com", "pw").await.unwrap();
    assert_eq!(tokens.user_id, "u1");
    assert_eq!(tokens.email, "ana@example.com");
    assert!(store.is_authenticated().await);
}

#[tokio::test]
async fn authenticate_accepts_numeric_user_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "a",
            "refresh_token": "r",
            "user": { "id": 42, "email": "x@example.com" }
        })))
        .mount(&server)
        .await;

    let store = setup(&server).await;
    let tokens = store.authenticate("x@example.com", "pw").await.unwrap();
    assert_eq!(tokens.user_id, "42");
}

#[tokio::test]
async fn authenticate_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let store = setup(&server).await;
    let err = store.authenticate("ana@example.com", "wrong").await.unwrap_err();
    assert!(matches!(err, CloudError::AuthFailed(_)));
    assert!(!store.is_authenticated().await);
}

#[tokio::test]
async fn requests_without_token_fail() {
    let server = MockServer::start().await;
    let store = setup(&server).await;
    let err = store.get_document(&doc_path("users/u1")).await.unwrap_err();
    assert!(matches!(err, CloudError::AuthRequired));
}

#[tokio::test]
async fn refresh_expired_session_logs_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let store = signed_in(&server).await;
    let err = store.refresh_access_token().await.unwrap_err();
    assert!(matches!(err, CloudError::AuthFailed(_)));
    assert!(!store.is_authenticated().await);
}

#[tokio::test]
async fn retries_once_after_refresh_on_401() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents/users/u1"))
        .and(header("authorization", "Bearer at"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .and(body_json(json!({"refresh_token": "rt"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_response()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/documents/users/u1"))
        .and(header("authorization", "Bearer at-new"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": "u1", "data": {"name": "Ana"}})),
        )
        .mount(&server)
        .await;

    let store = signed_in(&server).await;
    let doc = store.get_document(&doc_path("users/u1")).await.unwrap();
    assert_eq!(doc, Some(payload(json!({"name": "Ana"}))));
}

// --- Documents ---

#[tokio::test]
async fn get_document_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents/users/u1/cards/c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "c1",
            "data": {"name": "Gold", "modified": "2024-03-01T10:00:00.000Z"}
        })))
        .mount(&server)
        .await;

    let store = signed_in(&server).await;
    let doc = store
        .get_document(&doc_path("users/u1/cards/c1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc["name"], "Gold");
}

#[tokio::test]
async fn get_document_not_found_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents/users/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = signed_in(&server).await;
    assert_eq!(store.get_document(&doc_path("users/ghost")).await.unwrap(), None);
    assert!(!store.exists(&doc_path("users/ghost")).await.unwrap());
}

#[tokio::test]
async fn server_error_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents/users/u1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = signed_in(&server).await;
    let err = store.get_document(&doc_path("users/u1")).await.unwrap_err();
    assert!(matches!(err, CloudError::Api(_)));
}

#[tokio::test]
async fn query_posts_path_and_filters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/query"))
        .and(body_json(json!({
            "path": "users/u1/transactions",
            "filters": [{"field": "store", "op": "==", "value": "Cafe"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [
                {"id": "t1", "data": {"store": "Cafe", "amount": 4.5}},
                {"id": "t2", "data": {"store": "Cafe", "amount": 3.0}}
            ]
        })))
        .mount(&server)
        .await;

    let store = signed_in(&server).await;
    let docs = store
        .get_collection(
            &doc_path("users/u1/transactions"),
            &[Filter::equals("store", "Cafe")],
        )
        .await
        .unwrap();
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].id, "t1");
    assert_eq!(docs[1].data["amount"], 3.0);
}

#[tokio::test]
async fn set_sends_merge_flag() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/documents/users/u1"))
        .and(query_param("merge", "true"))
        .and(body_json(json!({"plan": "pro"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = signed_in(&server).await;
    store
        .set(&doc_path("users/u1"), &payload(json!({"plan": "pro"})), true)
        .await
        .unwrap();
}

#[tokio::test]
async fn add_returns_assigned_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/documents/users/u1/cards"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "R1"})))
        .mount(&server)
        .await;

    let store = signed_in(&server).await;
    let id = store
        .add(&doc_path("users/u1/cards"), &payload(json!({"cardId": "amex-gold"})))
        .await
        .unwrap();
    assert_eq!(id, "R1");
}

#[tokio::test]
async fn delete_tolerates_missing() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/documents/users/u1/cards/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = signed_in(&server).await;
    store
        .delete(&doc_path("users/u1/cards/gone"))
        .await
        .unwrap();
}
