//! Axum router configuration

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::handlers::{
    forward_upload, health_check, transcode_upload, upload_file, upload_info, version_check,
};

/// Create the Axum router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    // Build CORS layer
    // Browser clients upload from other origins during development.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::HEAD])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE, header::ORIGIN])
        .max_age(Duration::from_secs(3600));

    let cors_enabled = state.config.server.cors_enabled;
    let max_upload_bytes = state.config.staging.max_upload_bytes();

    // Build router
    let mut router = Router::new()
        // Health and version endpoints
        .route("/health", get(health_check))
        .route("/version", get(version_check))
        // Upload intake and inspection
        .route("/upload", post(upload_file))
        .route("/uploads/{file_id}", get(upload_info))
        // Pipeline operations
        .route("/transcode/{file_id}", post(transcode_upload))
        .route("/forward/{file_id}", post(forward_upload))
        // Middleware
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http());

    if cors_enabled {
        router = router.layer(cors);
    }

    // State
    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    #[test]
    fn test_create_router() {
        let state = Arc::new(AppState::default());
        let _router = create_router(state);
        // Router creation successful
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = Arc::new(AppState::default());
        let app = create_router(state);

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], br#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let state = Arc::new(AppState::default());
        let app = create_router(state);

        // Pre-flight OPTIONS request
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/upload")
            .header(header::ORIGIN, "http://localhost:8080")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_METHODS)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("POST"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let state = Arc::new(AppState::default());
        let app = create_router(state);

        let request = Request::builder()
            .uri("/streams")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
