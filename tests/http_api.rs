mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use image::{ImageBuffer, ImageFormat, Rgb};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;
use tower::ServiceExt;

use common::*;
use storage_gateway::middleware::api_key::issue_api_key;
use storage_gateway::entities::file_usage;
use storage_gateway::middleware::auth::{encode_user_token, AuthUser};
use storage_gateway::models::settings::StorageSettings;
use storage_gateway::routes::{create_routes, AppState};

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn access_token(user_id: i64, platform_id: Option<i32>) -> String {
    let user = AuthUser {
        user_id,
        platform_id,
    };
    encode_user_token(user, JWT_SECRET, chrono::Duration::minutes(5)).unwrap()
}

fn bearer(user_id: i64) -> String {
    format!("Bearer {}", access_token(user_id, None))
}

fn json_request(method: &str, uri: &str, api_key: &str, user_id: i64, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", api_key)
        .header(header::AUTHORIZATION, bearer(user_id))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Path and query of an absolute URL, for replaying it against the router.
fn local_uri(url: &str) -> String {
    let url = url::Url::parse(url).unwrap();
    format!("{}?{}", url.path(), url.query().unwrap_or_default())
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
    bytes
}

async fn local_app(root: &std::path::Path) -> (Router, String) {
    let (app, api_key, _) = local_app_with(root, |_| {}).await;
    (app, api_key)
}

async fn local_app_with(
    root: &std::path::Path,
    tweak: impl FnOnce(&mut StorageSettings),
) -> (Router, String, DatabaseConnection) {
    let mut storage = StorageSettings::default();
    for disk in [
        &mut storage.image,
        &mut storage.video,
        &mut storage.audio,
        &mut storage.document,
    ] {
        disk.local_root = root.to_string_lossy().into_owned();
    }
    tweak(&mut storage);

    let db = setup_db().await;
    let api_key = issue_api_key(&db, PLATFORM_ID, "tests", None).await.unwrap();
    let state = AppState::from_config(db.clone(), Arc::new(test_config(storage)))
        .await
        .unwrap();
    (create_routes(state), api_key, db)
}

/// Opens the browser upload page and returns its session cookie.
async fn open_upload_page(app: &Router, token: &str, extra_query: &str) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/upload?access_token={token}&upload_info=post,pAbc,image&post_message_key=k{extra_query}"
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    cookie.split(';').next().unwrap().to_string()
}

fn browser_request(method: &str, uri: &str, cookie: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(body).unwrap()
}

#[tokio::test]
async fn healthz_reports_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = local_app(dir.path()).await;

    let (status, body) = send_json(
        &app,
        Request::builder().uri("/healthz").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["database"], "up");
}

#[tokio::test]
async fn api_routes_require_an_api_key() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = local_app(dir.path()).await;

    let (status, body) = send_json(
        &app,
        Request::builder()
            .uri("/api/files/abc123")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 31501);
    assert!(body.get("data").is_none() || body["data"].is_null());

    let (status, _) = send_json(
        &app,
        Request::builder()
            .uri("/api/files/abc123")
            .header("x-api-key", "sgk_wrong")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn upload_routes_require_a_user() {
    let dir = tempfile::tempdir().unwrap();
    let (app, api_key) = local_app(dir.path()).await;

    let (status, body) = send_json(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/files/upload-token")
            .header("x-api-key", &api_key)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 31501);
}

#[tokio::test]
async fn local_upload_then_signed_download() {
    let dir = tempfile::tempdir().unwrap();
    let (app, api_key) = local_app(dir.path()).await;
    let bytes = png(900, 600);

    let (status, body) = send_json(
        &app,
        json_request(
            "POST",
            "/api/files/upload-token",
            &api_key,
            7,
            json!({
                "fileType": "image",
                "usageType": "post",
                "usageFsid": "pAbc",
                "name": "chart.png",
                "mime": "image/png",
                "extension": "png",
                "size": bytes.len(),
                "width": 900,
                "height": 600
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let fid = body["data"]["fid"].as_str().unwrap().to_string();
    assert_eq!(body["data"]["method"], "PUT");
    let upload_uri = local_uri(body["data"]["url"].as_str().unwrap());

    // Pending files are hidden from other users.
    let (status, body) = send_json(
        &app,
        json_request("GET", &format!("/api/files/{fid}"), &api_key, 8, Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 37600);

    let (status, body) = send_json(
        &app,
        Request::builder()
            .method("PUT")
            .uri(&upload_uri)
            .header(header::CONTENT_TYPE, "image/png")
            .body(Body::from(bytes.clone()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["size"], bytes.len());
    assert_eq!(body["data"]["md5"], format!("{:x}", md5::compute(&bytes)));

    let (status, body) = send_json(
        &app,
        json_request("PATCH", "/api/files/uploaded", &api_key, 7, json!({ "fid": fid })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["uploaded"], true);

    // A confirmed object cannot be overwritten through its old upload URL.
    let (status, body) = send_json(
        &app,
        Request::builder()
            .method("PUT")
            .uri(&upload_uri)
            .body(Body::from(png(10, 10)))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 30001);

    let (status, body) = send_json(
        &app,
        Request::builder()
            .uri(format!("/api/files/{fid}/original-url"))
            .header("x-api-key", &api_key)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let original = local_uri(body["data"]["originalUrl"].as_str().unwrap());
    assert!(original.contains("token="));

    let (status, downloaded) = send(
        &app,
        Request::builder().uri(&original).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(downloaded, bytes);

    let (status, body) = send_json(
        &app,
        json_request("GET", &format!("/api/files/{fid}"), &api_key, 8, Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let thumbnail = local_uri(body["data"]["imageSquareUrl"].as_str().unwrap());
    let (status, square) = send(
        &app,
        Request::builder().uri(&thumbnail).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let decoded = image::load_from_memory(&square).unwrap();
    assert!(decoded.width() <= 200 && decoded.height() <= 200);
}

#[tokio::test]
async fn tampered_download_tokens_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (app, api_key) = local_app(dir.path()).await;
    let bytes = png(40, 40);

    let (_, body) = send_json(
        &app,
        json_request(
            "POST",
            "/api/files/upload-token",
            &api_key,
            7,
            json!({
                "fileType": "image",
                "usageType": "userAvatar",
                "usageFsid": "7",
                "name": "me.png",
                "mime": "image/png",
                "extension": "png",
                "size": bytes.len()
            }),
        ),
    )
    .await;
    let fid = body["data"]["fid"].as_str().unwrap().to_string();
    let upload_uri = local_uri(body["data"]["url"].as_str().unwrap());
    send(
        &app,
        Request::builder()
            .method("PUT")
            .uri(&upload_uri)
            .body(Body::from(bytes))
            .unwrap(),
    )
    .await;
    send(
        &app,
        json_request("PATCH", "/api/files/uploaded", &api_key, 7, json!({ "fid": fid })),
    )
    .await;

    let (status, _) = send(
        &app,
        Request::builder()
            .uri(format!("/api/file-storage/file?fid={fid}&type=original&token=deadbeef&time=9999999999"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        Request::builder()
            .uri(format!("/api/file-storage/file?fid={fid}&type=original"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn batch_requests_are_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let (app, api_key) = local_app(dir.path()).await;

    let ids: Vec<String> = (1..=101).map(|i| i.to_string()).collect();
    let (status, body) = send_json(
        &app,
        json_request("POST", "/api/files/logical-deletion", &api_key, 7, json!({ "fidsOrIds": ids })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 30001);

    let (status, body) = send_json(
        &app,
        json_request("POST", "/api/files/info-list", &api_key, 7, json!({ "fidsOrIds": ["1", "2"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn malformed_requests_use_the_failure_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let (app, api_key) = local_app(dir.path()).await;

    let (status, body) = send_json(
        &app,
        json_request("POST", "/api/files/physical-deletion", &api_key, 7, json!({ "fids": ["x"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 30001);
    assert!(body["message"].is_string());

    let (status, body) = send_json(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/files/info-list")
            .header("x-api-key", &api_key)
            .header(header::AUTHORIZATION, bearer(7))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 30001);

    let (status, body) = send_json(
        &app,
        Request::builder()
            .uri("/api/file-storage/file?fid=abc")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 30001);
}

#[tokio::test]
async fn browser_upload_flow_runs_on_the_session_cookie() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _, db) = local_app_with(dir.path(), |_| {}).await;
    let bytes = png(64, 48);

    // The platform comes from the signed access token, never from the query.
    let token = access_token(21, Some(12));
    let cookie = open_upload_page(&app, &token, "&platform_id=999").await;

    let token_uri = format!(
        "/upload/api/upload-token?name=a.png&mime=image/png&extension=png&size={}",
        bytes.len()
    );
    let (status, body) = send_json(&app, browser_request("GET", &token_uri, None, Body::empty())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 31501);

    let (status, body) =
        send_json(&app, browser_request("GET", &token_uri, Some(&cookie), Body::empty())).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let fid = body["data"]["fid"].as_str().unwrap().to_string();
    let upload_uri = local_uri(body["data"]["url"].as_str().unwrap());

    let (status, _) = send(
        &app,
        Request::builder()
            .method("PUT")
            .uri(&upload_uri)
            .body(Body::from(bytes.clone()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let confirm = json!({ "fid": fid }).to_string();
    let (status, body) = send_json(
        &app,
        browser_request("PATCH", "/upload/api/uploaded", None, Body::from(confirm.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 31501);

    let (status, body) = send_json(
        &app,
        browser_request("PATCH", "/upload/api/uploaded", Some(&cookie), Body::from(confirm)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["uploaded"], true);

    let usage = file_usage::Entity::find().one(&db).await.unwrap().unwrap();
    assert_eq!(usage.platform_id, 12);
    assert_eq!(usage.user_id, Some(21));
}

#[tokio::test]
async fn browser_sessions_are_capped_at_the_upload_number() {
    let dir = tempfile::tempdir().unwrap();
    let (app, _, _) = local_app_with(dir.path(), |storage| storage.upload.max_upload_number = 1).await;

    let cookie = open_upload_page(&app, &access_token(21, None), "").await;
    let token_uri = "/upload/api/upload-token?name=a.png&mime=image/png&extension=png&size=100";

    let (status, body) =
        send_json(&app, browser_request("GET", token_uri, Some(&cookie), Body::empty())).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) =
        send_json(&app, browser_request("GET", token_uri, Some(&cookie), Body::empty())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 30001);
}
