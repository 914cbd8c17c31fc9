//! In-memory container-infra API used by the client's integration tests.
//!
//! Clusters live in a shared list and are served with the same status codes
//! and body shapes as the real service, including paginated `next` links and
//! the three error body formats. A handful of extra routes exist only to
//! exercise transport behaviour: redirects, binary bodies and an echo.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Largest page the mock returns, kept small so clients must follow `next`.
pub const PAGE_LIMIT: usize = 2;

/// Size of the generated `/v1/blob` payload; spans several client chunks.
pub const BLOB_LEN: usize = 200_000;

pub type Db = Arc<RwLock<Vec<Map<String, Value>>>>;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub marker: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PatchOp {
    pub op: String,
    pub path: String,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Resize {
    pub node_count: u64,
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Vec::new()));
    Router::new()
        .route("/v1/clusters", get(list_clusters).post(create_cluster))
        .route("/v1/clusters/detail", get(list_clusters))
        .route(
            "/v1/clusters/{id}",
            get(get_cluster).patch(update_cluster).delete(delete_cluster),
        )
        .route("/v1/clusters/{id}/actions/resize", post(resize_cluster))
        .route("/v1/certificates/{cluster}", get(get_ca).patch(rotate_ca))
        .route("/v1/stats", get(stats))
        .route("/v1/echo", any(echo))
        .route("/v1/moved", any(moved))
        .route("/v1/loop", any(redirect_loop))
        .route("/v1/choices", get(choices))
        .route("/v1/errors/{shape}", get(error_shape))
        .route("/v1/blob", any(blob))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// `errors` list body, as the API service emits for most failures.
pub fn api_errors(status: StatusCode, title: &str, detail: &str) -> Response {
    let body = json!({"errors": [{"status": status.as_u16(), "title": title, "detail": detail}]});
    (status, Json(body)).into_response()
}

/// Legacy body whose `error_message` is itself a JSON-encoded string.
pub fn legacy_error(status: StatusCode, fault: &str, debug: Option<&str>) -> Response {
    let inner = json!({"faultstring": fault, "debuginfo": debug}).to_string();
    (status, Json(json!({"error_message": inner}))).into_response()
}

fn authorize(headers: &HeaderMap) -> Result<(), Response> {
    match headers.get("x-auth-token") {
        Some(token) if !token.is_empty() => Ok(()),
        _ => Err(api_errors(
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            "The request you have made requires authentication.",
        )),
    }
}

fn not_found(id: &str) -> Response {
    api_errors(
        StatusCode::NOT_FOUND,
        "Not Found",
        &format!("Cluster {id} could not be found."),
    )
}

fn matches_id(cluster: &Map<String, Value>, id: &str) -> bool {
    cluster.get("uuid").and_then(Value::as_str) == Some(id)
        || cluster.get("name").and_then(Value::as_str) == Some(id)
}

async fn list_clusters(
    State(db): State<Db>,
    headers: HeaderMap,
    uri: Uri,
    Query(params): Query<ListParams>,
) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    let clusters = db.read().await;
    let start = match &params.marker {
        Some(marker) => match clusters.iter().position(|c| matches_id(c, marker)) {
            Some(pos) => pos + 1,
            None => return legacy_error(StatusCode::BAD_REQUEST, &format!("Invalid marker {marker}"), None),
        },
        None => 0,
    };
    let limit = params
        .limit
        .filter(|l| *l > 0)
        .unwrap_or(PAGE_LIMIT)
        .min(PAGE_LIMIT);
    let end = (start + limit).min(clusters.len());
    let page: Vec<Value> = clusters[start..end].iter().cloned().map(Value::Object).collect();

    let mut body = json!({"clusters": page});
    if end < clusters.len() {
        let host = headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("localhost");
        let marker = clusters[end - 1]
            .get("uuid")
            .and_then(Value::as_str)
            .unwrap_or_default();
        body["next"] = json!(format!("http://{host}{}?limit={limit}&marker={marker}", uri.path()));
    }
    Json(body).into_response()
}

async fn create_cluster(State(db): State<Db>, headers: HeaderMap, Json(input): Json<Value>) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    let Some(mut cluster) = input.as_object().cloned() else {
        return legacy_error(StatusCode::BAD_REQUEST, "Request body must be an object", None);
    };
    for required in ["name", "cluster_template_id"] {
        if !cluster.contains_key(required) {
            return legacy_error(
                StatusCode::BAD_REQUEST,
                &format!("Invalid input for field/attribute {required}."),
                Some("Mandatory field missing."),
            );
        }
    }
    let uuid = Uuid::new_v4().to_string();
    cluster.insert("uuid".to_string(), json!(uuid));
    cluster.insert("status".to_string(), json!("CREATE_IN_PROGRESS"));
    cluster.entry("node_count").or_insert(json!(1));
    cluster.entry("master_count").or_insert(json!(1));
    db.write().await.push(cluster);
    (StatusCode::ACCEPTED, Json(json!({"uuid": uuid}))).into_response()
}

async fn get_cluster(State(db): State<Db>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    let clusters = db.read().await;
    match clusters.iter().find(|c| matches_id(c, &id)) {
        Some(cluster) => Json(Value::Object(cluster.clone())).into_response(),
        None => not_found(&id),
    }
}

async fn update_cluster(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(ops): Json<Vec<PatchOp>>,
) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    let mut clusters = db.write().await;
    let Some(cluster) = clusters.iter_mut().find(|c| matches_id(c, &id)) else {
        return not_found(&id);
    };
    for op in ops {
        let key = op.path.trim_start_matches('/').to_string();
        match (op.op.as_str(), op.value) {
            ("add" | "replace", Some(value)) => {
                cluster.insert(key, value);
            }
            ("remove", _) => {
                cluster.remove(&key);
            }
            (other, _) => {
                return legacy_error(
                    StatusCode::BAD_REQUEST,
                    &format!("Invalid patch operation {other} on {}", op.path),
                    None,
                )
            }
        }
    }
    cluster.insert("status".to_string(), json!("UPDATE_IN_PROGRESS"));
    (StatusCode::ACCEPTED, Json(Value::Object(cluster.clone()))).into_response()
}

async fn delete_cluster(State(db): State<Db>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    let mut clusters = db.write().await;
    match clusters.iter().position(|c| matches_id(c, &id)) {
        Some(pos) => {
            clusters.remove(pos);
            StatusCode::NO_CONTENT.into_response()
        }
        None => not_found(&id),
    }
}

async fn resize_cluster(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(resize): Json<Resize>,
) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    let mut clusters = db.write().await;
    let Some(cluster) = clusters.iter_mut().find(|c| matches_id(c, &id)) else {
        return not_found(&id);
    };
    cluster.insert("node_count".to_string(), json!(resize.node_count));
    (StatusCode::ACCEPTED, Json(json!({"uuid": cluster.get("uuid")}))).into_response()
}

async fn get_ca(State(db): State<Db>, headers: HeaderMap, Path(cluster): Path<String>) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    let clusters = db.read().await;
    match clusters.iter().find(|c| matches_id(c, &cluster)) {
        Some(found) => Json(json!({
            "cluster_uuid": found.get("uuid"),
            "pem": "-----BEGIN CERTIFICATE-----\nMOCK\n-----END CERTIFICATE-----\n",
        }))
        .into_response(),
        None => not_found(&cluster),
    }
}

async fn rotate_ca(headers: HeaderMap) -> Response {
    if let Err(resp) = authorize(&headers) {
        return resp;
    }
    StatusCode::ACCEPTED.into_response()
}

async fn stats(State(db): State<Db>) -> Json<Value> {
    let clusters = db.read().await;
    let nodes: u64 = clusters
        .iter()
        .map(|c| {
            c.get("node_count").and_then(Value::as_u64).unwrap_or(0)
                + c.get("master_count").and_then(Value::as_u64).unwrap_or(0)
        })
        .sum();
    Json(json!({"clusters": clusters.len(), "nodes": nodes}))
}

/// Reflect the request back as JSON.
async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let headers: Map<String, Value> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                json!(String::from_utf8_lossy(value.as_bytes())),
            )
        })
        .collect();
    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or_else(|_| json!(String::from_utf8_lossy(&body)))
    };
    Json(json!({
        "method": method.as_str(),
        "path": uri.path_and_query().map(|p| p.as_str()).unwrap_or("/"),
        "headers": headers,
        "body": body,
    }))
}

async fn moved() -> Response {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, "/v1/echo")]).into_response()
}

async fn redirect_loop() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/v1/loop")]).into_response()
}

async fn choices() -> Response {
    (
        StatusCode::MULTIPLE_CHOICES,
        Json(json!({"versions": [{"id": "v1", "status": "CURRENT"}]})),
    )
        .into_response()
}

async fn error_shape(Path(shape): Path<String>) -> Response {
    match shape.as_str() {
        "legacy" => legacy_error(StatusCode::BAD_REQUEST, "Bad thing", Some("trace line")),
        "keystone" => (
            StatusCode::CONFLICT,
            Json(json!({"error": {"code": 409, "title": "Conflict", "message": "Cluster is busy"}})),
        )
            .into_response(),
        "api" => api_errors(StatusCode::FORBIDDEN, "Forbidden", "Policy doesn't allow this"),
        "garbage" => (StatusCode::SERVICE_UNAVAILABLE, "upstream down").into_response(),
        _ => api_errors(StatusCode::NOT_FOUND, "Not Found", "Unknown error shape"),
    }
}

/// Deterministic payload for `/v1/blob`.
pub fn blob_bytes() -> Vec<u8> {
    (0..BLOB_LEN).map(|i| (i % 251) as u8).collect()
}

/// Serves [`blob_bytes`], or echoes an uploaded body, as octet-stream.
async fn blob(body: Bytes) -> Response {
    let payload = if body.is_empty() { blob_bytes() } else { body.to_vec() };
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        payload,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_is_unauthorized() {
        let err = authorize(&HeaderMap::new()).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert("x-auth-token", "tok".parse().unwrap());
        assert!(authorize(&headers).is_ok());
    }

    #[test]
    fn marker_matches_uuid_or_name() {
        let cluster = json!({"uuid": "abc", "name": "k8s"}).as_object().cloned().unwrap();
        assert!(matches_id(&cluster, "abc"));
        assert!(matches_id(&cluster, "k8s"));
        assert!(!matches_id(&cluster, "other"));
    }

    #[test]
    fn blob_is_deterministic() {
        let blob = blob_bytes();
        assert_eq!(blob.len(), BLOB_LEN);
        assert_eq!(blob[251], 0);
        assert_eq!(blob[252], 1);
    }

    #[test]
    fn patch_op_value_is_optional() {
        let op: PatchOp = serde_json::from_str(r#"{"op": "remove", "path": "/labels"}"#).unwrap();
        assert_eq!(op.op, "remove");
        assert!(op.value.is_none());
    }
}
