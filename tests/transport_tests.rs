//! HTTP Transport Tests
//!
//! Behavior of the HTTP transport against an in-process mock server:
//! - URL construction with tenant/fabric segments and query strings
//! - Authentication modes and credential refresh on 401
//! - The 404-is-not-an-error convention
//! - Immediate surfacing of non-retryable statuses

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use fabricdb_client::protocol::codec;
use fabricdb_client::{
    DriverError, FabricClient, Protocol, Request, Verb, WireFormat,
};

#[derive(Default)]
struct ServerState {
    auth_calls: AtomicUsize,
    endpoint_calls: AtomicUsize,
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

async fn http_client(addr: SocketAddr, jwt_auth: bool) -> FabricClient {
    FabricClient::builder()
        .host("127.0.0.1", addr.port())
        .protocol(Protocol::HttpJson)
        .user("root")
        .password("secret")
        .jwt_auth(jwt_auth)
        .build()
        .await
        .unwrap()
}

fn auth_error_body() -> Json<Value> {
    Json(json!({
        "error": true,
        "code": 401,
        "errorNum": 11,
        "errorMessage": "not authorized"
    }))
}

async fn auth_handler(State(state): State<Arc<ServerState>>) -> Json<Value> {
    let n = state.auth_calls.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "jwt": format!("tok-{}", n) }))
}

// ============================================================================
// URL Construction
// ============================================================================

#[tokio::test]
async fn test_tenant_and_fabric_segments_precede_the_path() {
    let app = Router::new().route(
        "/_tenant/{tenant}/_fabric/{db}/_api/echo",
        get(
            |Path((tenant, db)): Path<(String, String)>, RawQuery(query): RawQuery| async move {
                Json(json!({
                    "tenant": tenant,
                    "db": db,
                    "query": query.unwrap_or_default()
                }))
            },
        ),
    );
    let addr = spawn(app).await;
    let client = http_client(addr, false).await;

    let request = Request::new("acme", "orders", Verb::Get, "/_api/echo")
        .query_param("limit", Some(25))
        .query_param("skip", None::<i32>);
    let echoed: Value = client.executor().execute(request).await.unwrap().unwrap();

    assert_eq!(echoed["tenant"], "acme");
    assert_eq!(echoed["db"], "orders");
    assert_eq!(echoed["query"], "limit=25");
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_basic_auth_header_is_attached() {
    let app = Router::new().route(
        "/_api/whoami",
        get(|headers: HeaderMap| async move {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            Json(json!({ "authorization": auth }))
        }),
    );
    let addr = spawn(app).await;
    let client = http_client(addr, false).await;

    let echoed: Value = client
        .executor()
        .execute(Request::new("", "", Verb::Get, "/_api/whoami"))
        .await
        .unwrap()
        .unwrap();
    // "root:secret" in Basic form.
    assert_eq!(echoed["authorization"], "Basic cm9vdDpzZWNyZXQ=");
}

#[tokio::test]
async fn test_401_triggers_exactly_one_reauthentication() {
    let state = Arc::new(ServerState::default());
    let app = Router::new()
        .route("/_open/auth", post(auth_handler))
        .route(
            "/_fabric/db/_api/guarded",
            get(
                |State(state): State<Arc<ServerState>>, headers: HeaderMap| async move {
                    state.endpoint_calls.fetch_add(1, Ordering::SeqCst);
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("");
                    if auth == "Bearer tok-1" {
                        (StatusCode::UNAUTHORIZED, auth_error_body()).into_response()
                    } else {
                        Json(json!({ "ok": true, "token": auth })).into_response()
                    }
                },
            ),
        )
        .with_state(state.clone());
    let addr = spawn(app).await;
    let client = http_client(addr, true).await;

    let result: Value = client
        .executor()
        .execute(Request::new("", "db", Verb::Get, "/_api/guarded"))
        .await
        .unwrap()
        .unwrap();

    // The retried request carried the refreshed token.
    assert_eq!(result["token"], "Bearer tok-2");
    // One initial credential exchange plus exactly one re-authentication.
    assert_eq!(state.auth_calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.endpoint_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_second_consecutive_401_is_fatal() {
    let state = Arc::new(ServerState::default());
    let app = Router::new()
        .route("/_open/auth", post(auth_handler))
        .route(
            "/_fabric/db/_api/locked",
            get(|State(state): State<Arc<ServerState>>| async move {
                state.endpoint_calls.fetch_add(1, Ordering::SeqCst);
                (StatusCode::UNAUTHORIZED, auth_error_body())
            }),
        )
        .with_state(state.clone());
    let addr = spawn(app).await;
    let client = http_client(addr, true).await;

    let err = client
        .executor()
        .execute_raw(Request::new("", "db", Verb::Get, "/_api/locked"))
        .await
        .unwrap_err();

    assert_eq!(err.response_code(), Some(401));
    // No third attempt after the re-authenticated retry failed.
    assert_eq!(state.endpoint_calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.auth_calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Status Handling
// ============================================================================

#[tokio::test]
async fn test_404_is_not_an_error_and_body_stays_decodable() {
    let app = Router::new().route(
        "/_fabric/db/_api/document/items/missing",
        get(|| async {
            (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": true,
                    "code": 404,
                    "errorNum": 1202,
                    "errorMessage": "document not found"
                })),
            )
        }),
    );
    let addr = spawn(app).await;
    let client = http_client(addr, false).await;

    let request = Request::new("", "db", Verb::Get, "/_api/document/items/missing");
    let absent: Option<Value> = client.executor().execute(request.clone()).await.unwrap();
    assert!(absent.is_none());

    let raw = client.executor().execute_raw(request).await.unwrap();
    assert_eq!(raw.code, 404);
    let entity: fabricdb_client::ErrorEntity =
        codec::decode(WireFormat::Json, raw.body.as_deref().unwrap()).unwrap();
    assert_eq!(entity.error_num, Some(1202));
}

#[tokio::test]
async fn test_other_non_success_statuses_surface_immediately() {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/_fabric/db/_api/conflict",
            get(|State(calls): State<Arc<AtomicUsize>>| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                (
                    StatusCode::CONFLICT,
                    Json(json!({
                        "error": true,
                        "code": 409,
                        "errorNum": 1210,
                        "errorMessage": "unique constraint violated"
                    })),
                )
            }),
        )
        .with_state(calls.clone());
    let addr = spawn(app).await;
    let client = http_client(addr, false).await;

    let err = client
        .executor()
        .execute_raw(Request::new("", "db", Verb::Get, "/_api/conflict"))
        .await
        .unwrap_err();

    match err {
        DriverError::Status {
            code,
            error_num,
            message,
        } => {
            assert_eq!(code, 409);
            assert_eq!(error_num, Some(1210));
            assert_eq!(message, "unique constraint violated");
        }
        other => panic!("expected a status error, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Content Negotiation
// ============================================================================

#[tokio::test]
async fn test_binary_wire_format_round_trip() {
    let app = Router::new().route(
        "/_api/bin",
        get(|headers: HeaderMap| async move {
            assert_eq!(
                headers.get("accept").and_then(|v| v.to_str().ok()),
                Some("application/x-msgpack")
            );
            let body =
                codec::encode(WireFormat::MessagePack, &json!({ "value": 42 })).unwrap();
            ([("content-type", "application/x-msgpack")], body)
        }),
    );
    let addr = spawn(app).await;

    let client = FabricClient::builder()
        .host("127.0.0.1", addr.port())
        .protocol(Protocol::HttpBinary)
        .user("root")
        .password("secret")
        .build()
        .await
        .unwrap();

    let decoded: Value = client
        .executor()
        .execute(Request::new("", "", Verb::Get, "/_api/bin"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(decoded["value"], 42);
}

// ============================================================================
// Thin API Surface
// ============================================================================

#[tokio::test]
async fn test_fabric_document_and_query_round_trip() {
    let app = Router::new()
        .route(
            "/_tenant/acme/_fabric/orders/_api/document/items",
            post(|body: String| async move {
                let doc: Value = serde_json::from_str(&body).unwrap();
                assert_eq!(doc["name"], "widget");
                Json(json!({ "_id": "items/k1", "_key": "k1", "_rev": "r1" }))
            }),
        )
        .route(
            "/_tenant/acme/_fabric/orders/_api/document/items/k1",
            get(|| async { Json(json!({ "_key": "k1", "name": "widget" })) }),
        )
        .route(
            "/_tenant/acme/_fabric/orders/_api/cursor",
            post(|body: String| async move {
                let cursor: Value = serde_json::from_str(&body).unwrap();
                assert_eq!(cursor["query"], "FOR i IN items RETURN i");
                assert_eq!(cursor["bindVars"]["min"], 1);
                Json(json!({
                    "result": [{"name": "widget"}, {"name": "gadget"}],
                    "hasMore": false,
                    "count": 2
                }))
            }),
        );
    let addr = spawn(app).await;
    let client = http_client(addr, false).await;
    let fabric = client.fabric("acme", "orders");

    let meta = fabric
        .create_document("items", &json!({ "name": "widget" }))
        .await
        .unwrap();
    assert_eq!(meta.key, "k1");

    #[derive(Debug, serde::Deserialize)]
    struct Item {
        name: String,
    }

    let item: Option<Item> = fabric.document("items", "k1").await.unwrap();
    assert_eq!(item.unwrap().name, "widget");

    let mut bind_vars = std::collections::HashMap::new();
    bind_vars.insert("min".to_string(), json!(1));
    let items: Vec<Item> = fabric
        .query("FOR i IN items RETURN i", Some(bind_vars))
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].name, "widget");
}
