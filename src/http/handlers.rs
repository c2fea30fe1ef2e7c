//! HTTP request handlers
//!
//! Implements handlers for all gateway endpoints.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use mp3_gateway_lib::{TranscodeOptions, Transcoder};

use crate::error::{ApiError, Result};
use crate::state::{AppState, StagedUpload, TranscodedOutput};

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

/// Version information endpoint
pub async fn version_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "online",
        "version": env!("CARGO_PKG_VERSION"),
        "ffmpeg": mp3_gateway_lib::ffmpeg_version_info()
    }))
}

/// Upload intake endpoint
///
/// Accepts a multipart form with a `file` field, checks the filename
/// against the extension allow list, and stages the bytes on disk under
/// a fresh id.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut file_field = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let original_filename = field
                .file_name()
                .map(|name| name.to_string())
                .ok_or_else(|| ApiError::BadRequest("file field needs a filename".to_string()))?;
            let content_type = field
                .content_type()
                .map(|ct| ct.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
            file_field = Some((original_filename, content_type, bytes));
            break;
        }
    }

    let (original_filename, content_type, bytes) =
        file_field.ok_or_else(|| ApiError::BadRequest("missing file field".to_string()))?;

    let staging = &state.config.staging;
    let lowered = original_filename.to_lowercase();
    let extension = staging
        .allowed_extensions
        .iter()
        .find(|ext| lowered.ends_with(ext.as_str()))
        .cloned()
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Only {} files are supported",
                staging.allowed_extensions.join(", ")
            ))
        })?;

    let file_id = uuid::Uuid::new_v4().simple().to_string();
    let staged_path = std::path::Path::new(&staging.dir).join(format!("{file_id}{extension}"));

    tokio::fs::create_dir_all(&staging.dir).await?;
    tokio::fs::write(&staged_path, &bytes).await?;

    let size_bytes = bytes.len() as u64;
    tracing::info!(
        file_id = %file_id,
        filename = %original_filename,
        size_bytes,
        "Upload staged"
    );

    state.register_upload(StagedUpload {
        file_id: file_id.clone(),
        original_filename: original_filename.clone(),
        content_type: content_type.clone(),
        size_bytes,
        staged_path,
        received_at: chrono::Utc::now(),
        output: None,
    });

    Ok(Json(json!({
        "file_id": file_id,
        "original_filename": original_filename,
        "content_type": content_type,
        "size_bytes": size_bytes,
        "status": "received",
    })))
}

/// Upload metadata endpoint
pub async fn upload_info(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse> {
    let upload = state
        .get_upload(&file_id)
        .ok_or_else(|| ApiError::NotFound(format!("No upload with id {file_id}")))?;

    let status = if upload.output.is_some() {
        "transcoded"
    } else {
        "received"
    };
    let mut body = json!({
        "file_id": upload.file_id,
        "original_filename": upload.original_filename,
        "content_type": upload.content_type,
        "size_bytes": upload.size_bytes,
        "received_at": upload.received_at.to_rfc3339(),
        "status": status,
    });
    if let Some(output) = upload.output {
        body["output"] = json!({
            "path": output.path.display().to_string(),
            "bytes_out": output.bytes_out,
            "duration_secs": output.duration_secs,
        });
    }
    Ok(Json(body))
}

/// Transcode endpoint
///
/// Runs the blocking pipeline on a worker thread. If the configured
/// deadline passes first the run is cancelled through its flag and the
/// partial output removed.
pub async fn transcode_upload(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse> {
    let upload = state
        .get_upload(&file_id)
        .ok_or_else(|| ApiError::NotFound(format!("No upload with id {file_id}")))?;

    let transcode = &state.config.transcode;
    let codec = mp3_gateway_lib::codec_id_from_name(&transcode.codec)
        .ok_or_else(|| ApiError::Internal(format!("unknown codec {}", transcode.codec)))?;

    let destination = std::path::Path::new(&state.config.staging.dir)
        .join(format!("{file_id}.{}", transcode.container_format));

    let mut options = TranscodeOptions::new(&upload.staged_path, &destination);
    options.container_format = transcode.container_format.clone();
    options.codec = codec;
    options.bit_rate = transcode.bit_rate;

    let deadline = std::time::Duration::from_secs(transcode.deadline_secs);
    let mut transcoder = Transcoder::new(options);
    let cancel = transcoder.cancel_flag();

    let mut task = tokio::task::spawn_blocking(move || transcoder.run());
    let report = match tokio::time::timeout(deadline, &mut task).await {
        // A failed run cleans up its own output before returning.
        Ok(Ok(Ok(report))) => report,
        Ok(Ok(Err(e))) => return Err(ApiError::Pipeline(e)),
        Ok(Err(e)) => {
            // The worker died without running its cleanup.
            let _ = tokio::fs::remove_file(&destination).await;
            return Err(ApiError::Internal(format!("transcode task failed: {e}")));
        }
        Err(_) => {
            // The worker observes the flag at the next packet and bails
            // out; wait for it before touching its output file. A run
            // that finished just as the deadline fired still counts as
            // late, so its output goes too.
            cancel.store(true, Ordering::Relaxed);
            let _ = (&mut task).await;
            let _ = tokio::fs::remove_file(&destination).await;
            return Err(ApiError::DeadlineExceeded);
        }
    };

    state.set_output(
        &file_id,
        TranscodedOutput {
            path: destination.clone(),
            bytes_out: report.bytes_out,
            duration_secs: report.output_duration_secs(),
        },
    );

    let output_filename = destination
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(Json(json!({
        "file_id": file_id,
        "status": "transcoded",
        "output_filename": output_filename,
        "report": report,
    })))
}

/// Forward endpoint
///
/// Sends the transcoded file to the upstream storage service.
pub async fn forward_upload(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<impl IntoResponse> {
    let upload = state
        .get_upload(&file_id)
        .ok_or_else(|| ApiError::NotFound(format!("No upload with id {file_id}")))?;
    let output = upload
        .output
        .ok_or_else(|| ApiError::BadRequest(format!("Upload {file_id} has not been transcoded")))?;

    let bytes = tokio::fs::read(&output.path).await?;
    let file_name = output
        .path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| format!("{file_id}.mp3"));

    let upload_url = state
        .upstream
        .forward(&file_name, "audio/mpeg", bytes.into())
        .await?;

    Ok(Json(json!({
        "file_id": file_id,
        "status": "forwarded",
        "upload_url": upload_url,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::http::create_router;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use tower::util::ServiceExt;

    fn test_state(dir: &tempfile::TempDir) -> Arc<AppState> {
        let mut config = GatewayConfig::default();
        config.staging.dir = dir.path().join("uploads").to_string_lossy().to_string();
        Arc::new(AppState::new(config))
    }

    fn multipart_request(uri: &str, filename: &str, body: &[u8]) -> Request<Body> {
        let boundary = "testboundary";
        let mut payload = Vec::new();
        payload.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        payload.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n")
                .as_bytes(),
        );
        payload.extend_from_slice(b"Content-Type: video/mp4\r\n\r\n");
        payload.extend_from_slice(body);
        payload.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(payload))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_upload_rejects_wrong_extension() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let app = create_router(state);

        let response = app
            .oneshot(multipart_request("/upload", "notes.txt", b"hello"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["detail"], "Only .mp4 files are supported");
    }

    #[tokio::test]
    async fn test_upload_stages_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let app = create_router(state.clone());

        let response = app
            .oneshot(multipart_request("/upload", "Clip.MP4", b"not really mp4"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "received");
        assert_eq!(body["original_filename"], "Clip.MP4");
        assert_eq!(body["size_bytes"], 14);

        let file_id = body["file_id"].as_str().unwrap();
        let upload = state.get_upload(file_id).unwrap();
        assert_eq!(upload.size_bytes, 14);
        assert!(upload.staged_path.exists());
        assert_eq!(std::fs::read(&upload.staged_path).unwrap(), b"not really mp4");
    }

    #[tokio::test]
    async fn test_upload_info_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let request = Request::builder()
            .uri("/uploads/deadbeef")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_info_reports_received_upload() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let app = create_router(state.clone());
        let response = app
            .oneshot(multipart_request("/upload", "clip.mp4", b"data"))
            .await
            .unwrap();
        let body = body_json(response).await;
        let file_id = body["file_id"].as_str().unwrap().to_string();

        let app = create_router(state);
        let request = Request::builder()
            .uri(format!("/uploads/{file_id}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let info = body_json(response).await;
        assert_eq!(info["status"], "received");
        assert_eq!(info["original_filename"], "clip.mp4");
        assert!(info.get("output").is_none());
    }

    #[tokio::test]
    async fn test_transcode_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/transcode/deadbeef")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_transcode_garbage_upload_is_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let app = create_router(state.clone());
        let response = app
            .oneshot(multipart_request("/upload", "garbage.mp4", b"not really mp4"))
            .await
            .unwrap();
        let body = body_json(response).await;
        let file_id = body["file_id"].as_str().unwrap().to_string();

        let app = create_router(state);
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/transcode/{file_id}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_forward_unknown_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/forward/deadbeef")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_forward_before_transcode_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let app = create_router(state.clone());
        let response = app
            .oneshot(multipart_request("/upload", "clip.mp4", b"data"))
            .await
            .unwrap();
        let body = body_json(response).await;
        let file_id = body["file_id"].as_str().unwrap().to_string();

        let app = create_router(state);
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/forward/{file_id}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
