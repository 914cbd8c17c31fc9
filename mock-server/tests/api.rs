use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, blob_bytes};
use serde_json::{json, Value};
use tower::ServiceExt;

const TOKEN: &str = "test-token";

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn request(method: &str, uri: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-auth-token", TOKEN)
        .body(String::new())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-auth-token", TOKEN)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body.to_string())
        .unwrap()
}

// --- auth ---

#[tokio::test]
async fn clusters_require_token() {
    let resp = app()
        .oneshot(Request::builder().uri("/v1/clusters").body(String::new()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(resp).await;
    assert_eq!(body["errors"][0]["title"], "Unauthorized");
}

// --- clusters ---

#[tokio::test]
async fn list_clusters_empty() {
    let resp = app().oneshot(request("GET", "/v1/clusters")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await, json!({"clusters": []}));
}

#[tokio::test]
async fn create_cluster_without_template_is_legacy_400() {
    let resp = app()
        .oneshot(json_request("POST", "/v1/clusters", r#"{"name":"k8s"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    let inner: Value = serde_json::from_str(body["error_message"].as_str().unwrap()).unwrap();
    assert_eq!(inner["faultstring"], "Invalid input for field/attribute cluster_template_id.");
}

#[tokio::test]
async fn get_missing_cluster_is_404() {
    let resp = app().oneshot(request("GET", "/v1/clusters/nope")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["errors"][0]["detail"], "Cluster nope could not be found.");
}

#[tokio::test]
async fn cluster_lifecycle_and_pagination() {
    use tower::Service;

    let mut app = app().into_service();

    let mut uuids = Vec::new();
    for name in ["a", "b", "c"] {
        let body = format!(r#"{{"name":"{name}","cluster_template_id":"tmpl"}}"#);
        let resp = ServiceExt::ready(&mut app)
            .await
            .unwrap()
            .call(json_request("POST", "/v1/clusters", &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        uuids.push(body_json(resp).await["uuid"].as_str().unwrap().to_string());
    }

    // first page carries a next link with the last uuid as marker
    let mut page = request("GET", "/v1/clusters?limit=2");
    page.headers_mut().insert(http::header::HOST, "magnum:9511".parse().unwrap());
    let resp = ServiceExt::ready(&mut app).await.unwrap().call(page).await.unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["clusters"].as_array().unwrap().len(), 2);
    assert_eq!(
        body["next"],
        format!("http://magnum:9511/v1/clusters?limit=2&marker={}", uuids[1])
    );

    // last page has no next link
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("GET", &format!("/v1/clusters?limit=2&marker={}", uuids[1])))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["clusters"][0]["name"], "c");
    assert!(body.get("next").is_none());

    // patch
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request(
            "PATCH",
            &format!("/v1/clusters/{}", uuids[0]),
            r#"[{"op":"replace","path":"/node_count","value":4}]"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(resp).await["node_count"], 4);

    // resize
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(json_request(
            "POST",
            &format!("/v1/clusters/{}/actions/resize", uuids[0]),
            r#"{"node_count":6}"#,
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    // stats count masters and workers
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("GET", "/v1/stats"))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await, json!({"clusters": 3, "nodes": 6 + 1 + 2 + 2}));

    // delete
    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("DELETE", &format!("/v1/clusters/{}", uuids[0])))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());

    let resp = ServiceExt::ready(&mut app)
        .await
        .unwrap()
        .call(request("GET", &format!("/v1/clusters/{}", uuids[0])))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- transport helpers ---

#[tokio::test]
async fn moved_points_at_echo() {
    let resp = app().oneshot(request("GET", "/v1/moved")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(resp.headers()[http::header::LOCATION], "/v1/echo");
}

#[tokio::test]
async fn echo_reflects_method_headers_and_body() {
    let resp = app()
        .oneshot(json_request("PUT", "/v1/echo?x=1", r#"{"k":[1,2]}"#))
        .await
        .unwrap();

    let body = body_json(resp).await;
    assert_eq!(body["method"], "PUT");
    assert_eq!(body["path"], "/v1/echo?x=1");
    assert_eq!(body["headers"]["x-auth-token"], TOKEN);
    assert_eq!(body["body"], json!({"k": [1, 2]}));
}

#[tokio::test]
async fn blob_is_octet_stream() {
    let resp = app().oneshot(request("GET", "/v1/blob")).await.unwrap();

    assert_eq!(resp.headers()[http::header::CONTENT_TYPE], "application/octet-stream");
    assert_eq!(body_bytes(resp).await.to_vec(), blob_bytes());
}

#[tokio::test]
async fn error_shapes() {
    let resp = app().oneshot(request("GET", "/v1/errors/keystone")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(resp).await["error"]["message"], "Cluster is busy");

    let resp = app().oneshot(request("GET", "/v1/errors/garbage")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_bytes(resp).await, "upstream down");

    let resp = app().oneshot(request("GET", "/v1/choices")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::MULTIPLE_CHOICES);
}
