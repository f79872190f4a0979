use super::*;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde_json::json;
use shared::error::ErrorCode;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct HostState {
    hits: Arc<AtomicUsize>,
    fields: Arc<Mutex<Vec<(String, String)>>>,
}

async fn spawn_host(router: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    Url::parse(&format!("http://{addr}/1/upload")).expect("url")
}

async fn accept_upload(
    State(state): State<HostState>,
    mut multipart: Multipart,
) -> Json<serde_json::Value> {
    state.hits.fetch_add(1, Ordering::SeqCst);
    while let Some(field) = multipart.next_field().await.expect("field") {
        let name = field.name().unwrap_or_default().to_string();
        let value = field.text().await.expect("text");
        state.fields.lock().await.push((name, value));
    }
    Json(json!({
        "success": true,
        "status": 200,
        "data": {
            "id": "abc123",
            "url": "https://i.ibb.co/abc123/team.png",
            "display_url": "https://i.ibb.co/abc123/team-display.png",
            "width": "640",
            "height": 480,
            "size": "9",
            "delete_url": "https://ibb.co/abc123/delete",
            "thumb": { "url": "https://i.ibb.co/abc123/team-thumb.png" },
            "medium": { "url": "https://i.ibb.co/abc123/team-medium.png" }
        }
    }))
}

async fn counting_host() -> (HostState, Url) {
    let state = HostState::default();
    let router = Router::new()
        .route("/1/upload", post(accept_upload))
        .with_state(state.clone());
    let url = spawn_host(router).await;
    (state, url)
}

fn png(bytes: &[u8]) -> ImageUpload {
    ImageUpload::new("team.png", "image/png", bytes.to_vec())
}

#[tokio::test]
async fn uploads_base64_payload_and_returns_hosted_image() {
    let (state, url) = counting_host().await;
    let client = ImgBbClient::new("test-key", url);

    let hosted = client.upload(&png(b"png-bytes")).await.expect("upload");
    assert_eq!(hosted.url, "https://i.ibb.co/abc123/team.png");
    assert_eq!(
        hosted.thumb_url.as_deref(),
        Some("https://i.ibb.co/abc123/team-thumb.png")
    );
    assert_eq!(hosted.width, Some(640));
    assert_eq!(hosted.height, Some(480));
    assert_eq!(hosted.size_bytes, Some(9));

    assert_eq!(state.hits.load(Ordering::SeqCst), 1);
    let fields = state.fields.lock().await.clone();
    assert!(fields.contains(&("key".to_string(), "test-key".to_string())));
    assert!(fields.contains(&("name".to_string(), "team.png".to_string())));
    assert!(fields.contains(&("image".to_string(), STANDARD.encode(b"png-bytes"))));
}

#[tokio::test]
async fn non_image_type_fails_without_network_call() {
    let (state, url) = counting_host().await;
    let client = ImgBbClient::new("test-key", url);

    let err = client
        .upload(&ImageUpload::new("notes.pdf", "application/pdf", b"%PDF".to_vec()))
        .await
        .expect_err("should fail");
    assert!(matches!(err, ImageHostError::Validation(INVALID_IMAGE_TYPE)));
    assert_eq!(state.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oversized_image_fails_without_network_call() {
    let (state, url) = counting_host().await;
    let client = ImgBbClient::new("test-key", url);

    let err = client
        .upload(&ImageUpload::new(
            "huge.jpg",
            "image/jpeg",
            vec![0_u8; MAX_IMAGE_BYTES + 1],
        ))
        .await
        .expect_err("should fail");
    assert!(matches!(err, ImageHostError::Validation(IMAGE_TOO_LARGE)));
    assert_eq!(state.hits.load(Ordering::SeqCst), 0);
}

#[test]
fn validation_accepts_the_exact_ceiling_and_rejects_empty_files() {
    let at_limit = ImageUpload::new("max.png", "image/png", vec![1_u8; MAX_IMAGE_BYTES]);
    validate_image(&at_limit).expect("exactly 32 MiB is allowed");

    let empty = ImageUpload::new("empty.png", "image/png", Vec::new());
    assert!(matches!(
        validate_image(&empty),
        Err(ImageHostError::Validation(IMAGE_EMPTY))
    ));

    let upper_case = ImageUpload::new("photo.JPG", "IMAGE/JPEG", vec![1]);
    validate_image(&upper_case).expect("content type match is case-insensitive");
}

#[tokio::test]
async fn http_error_surfaces_host_message() {
    let router = Router::new().route(
        "/1/upload",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "status_code": 400,
                    "error": { "message": "Invalid API v1 key.", "code": 100 },
                    "status_txt": "Bad Request"
                })),
            )
        }),
    );
    let client = ImgBbClient::new("bad-key", spawn_host(router).await);

    let err = client.upload(&png(b"png")).await.expect_err("rejected");
    assert_eq!(err.code(), ErrorCode::Transport);
    match err {
        ImageHostError::Rejected { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "Invalid API v1 key.");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unsuccessful_envelope_is_reported() {
    let router = Router::new().route(
        "/1/upload",
        post(|| async { Json(json!({ "success": false, "status": 200 })) }),
    );
    let client = ImgBbClient::new("test-key", spawn_host(router).await);

    let err = client.upload(&png(b"png")).await.expect_err("unsuccessful");
    assert!(matches!(err, ImageHostError::Unsuccessful));
    assert_eq!(err.code(), ErrorCode::Transport);
    assert_eq!(err.to_string(), "Failed to upload image to ImgBB");
}

#[tokio::test]
async fn unreachable_host_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let url = Url::parse(&format!("http://{addr}/1/upload")).expect("url");
    let client = ImgBbClient::new("test-key", url);
    let err = client.upload(&png(b"png")).await.expect_err("transport");
    assert!(matches!(err, ImageHostError::Transport(_)));
}

#[tokio::test]
async fn missing_host_still_validates_first() {
    let host = MissingImageHost;
    let err = host
        .upload(&ImageUpload::new("a.txt", "text/plain", b"a".to_vec()))
        .await
        .expect_err("validation");
    assert!(matches!(err, ImageHostError::Validation(_)));

    let err = host.upload(&png(b"png")).await.expect_err("not configured");
    assert!(matches!(err, ImageHostError::NotConfigured));
}

#[test]
fn formats_file_sizes_like_the_upload_form() {
    assert_eq!(format_file_size(0), "0 Bytes");
    assert_eq!(format_file_size(512), "512 Bytes");
    assert_eq!(format_file_size(1536), "1.5 KB");
    assert_eq!(format_file_size(MAX_IMAGE_BYTES as u64), "32 MB");
    assert_eq!(format_file_size(5 * 1024 * 1024 * 1024), "5 GB");
}
