//! HTTP router.
//!
//! All `/api` routes require bearer token authentication; stored images
//! are served statically under `/scans`, `/conjunctivas`, and `/profiles`.
//!
//! Middleware uses `Extension<ApiContext>` (injected as the outermost
//! layer). Endpoint handlers use `State<ApiContext>` via `with_state`.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;

/// Uploads are capped at 10 MB.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/auth/verify", post(endpoints::auth::verify))
        .route(
            "/users/:uid",
            get(endpoints::users::get_profile)
                .put(endpoints::users::update_profile)
                .delete(endpoints::users::delete_account),
        )
        .route("/users/:uid/photo", post(endpoints::users::upload_photo))
        .route(
            "/users/:uid/password",
            post(endpoints::users::link_password)
                .put(endpoints::users::reset_password),
        )
        .route(
            "/scans",
            post(endpoints::scans::upload).get(endpoints::scans::list),
        )
        .route("/scans/:id", get(endpoints::scans::detail))
        .route(
            "/chats",
            post(endpoints::chats::start).get(endpoints::chats::list),
        )
        .route("/chats/from-scan", post(endpoints::chats::start_from_scan))
        .route(
            "/chats/:session_id",
            get(endpoints::chats::history).delete(endpoints::chats::delete),
        )
        .route(
            "/chats/:session_id/messages",
            post(endpoints::chats::send),
        )
        .with_state(ctx.clone())
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    // Stored images, served without auth (URLs are unguessable tokens).
    let statics = Router::new()
        .nest_service("/scans", ServeDir::new(ctx.store.scans_dir()))
        .nest_service(
            "/conjunctivas",
            ServeDir::new(ctx.store.conjunctivas_dir()),
        )
        .nest_service("/profiles", ServeDir::new(ctx.store.profiles_dir()));

    Router::new()
        .nest("/api", protected)
        .merge(statics)
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::assistant::gemini::ModelTurn;
    use crate::assistant::{AssistantError, ChatModel};
    use crate::config::Config;
    use crate::identity::{IdentityError, IdentityVerifier, VerifiedIdentity};
    use crate::inference::{Classification, InferenceError, InferenceGateway};

    const GOOD_TOKEN: &str = "good-token";

    struct FakeIdentity;

    impl IdentityVerifier for FakeIdentity {
        fn verify_token(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
            if token == GOOD_TOKEN {
                Ok(VerifiedIdentity {
                    uid: "test-uid".into(),
                    email: "tester@example.com".into(),
                    name: Some("Tester".into()),
                })
            } else {
                Err(IdentityError::InvalidToken("unknown token".into()))
            }
        }

        fn set_password(&self, _uid: &str, _new_password: &str) -> Result<(), IdentityError> {
            Ok(())
        }

        fn delete_account(&self, _uid: &str) -> Result<(), IdentityError> {
            Ok(())
        }
    }

    struct FakeGateway;

    impl InferenceGateway for FakeGateway {
        fn crop(&self, _image: &[u8], _filename: &str) -> Result<Vec<u8>, InferenceError> {
            Ok(b"cropped".to_vec())
        }

        fn classify(
            &self,
            _image: &[u8],
            _filename: &str,
        ) -> Result<Classification, InferenceError> {
            Ok(Classification {
                anemic: true,
                confidence: 0.82,
            })
        }
    }

    struct FakeModel;

    impl ChatModel for FakeModel {
        fn generate(
            &self,
            _system: &str,
            _history: &[ModelTurn],
        ) -> Result<String, AssistantError> {
            Ok("Eat more iron-rich foods.".into())
        }
    }

    fn test_ctx(tmp: &tempfile::TempDir) -> ApiContext {
        ApiContext::new(
            Config::with_data_dir(tmp.path()),
            Arc::new(FakeIdentity),
            Arc::new(FakeGateway),
            Arc::new(FakeModel),
        )
    }

    fn authed_request(method: &str, uri: &str, body: Body) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {GOOD_TOKEN}"));
        if matches!(method, "POST" | "PUT") {
            builder = builder.header("Content-Type", "application/json");
        }
        builder.body(body).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn verify_caller(router: &Router) -> serde_json::Value {
        let response = router
            .clone()
            .oneshot(authed_request("POST", "/api/auth/verify", Body::empty()))
            .await
            .unwrap();
        assert!(response.status().is_success());
        json_body(response).await
    }

    fn multipart_image(field: &str, filename: &str, bytes: &[u8]) -> (String, Vec<u8>) {
        let boundary = "test-boundary-7MA4YWxkTrZu0gW";
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={boundary}"), body)
    }

    async fn upload_scan(router: &Router) -> serde_json::Value {
        let (content_type, body) = multipart_image("image", "eye.jpg", b"fake-jpeg");
        let request = Request::builder()
            .method("POST")
            .uri("/api/scans")
            .header("Authorization", format!("Bearer {GOOD_TOKEN}"))
            .header("Content-Type", content_type)
            .body(Body::from(body))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let router = build_router(test_ctx(&tmp));

        let request = Request::builder()
            .method("GET")
            .uri("/api/scans")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn bad_token_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let router = build_router(test_ctx(&tmp));

        let request = Request::builder()
            .method("GET")
            .uri("/api/scans")
            .header("Authorization", "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn verify_creates_account_once() {
        let tmp = tempfile::tempdir().unwrap();
        let router = build_router(test_ctx(&tmp));

        let response = router
            .clone()
            .oneshot(authed_request("POST", "/api/auth/verify", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let first = json_body(response).await;
        assert_eq!(first["created"], true);
        assert_eq!(first["user"]["username"], "Tester");
        assert_eq!(first["user"]["photoUrl"], "/profiles/default-profile.jpg");

        let response = router
            .clone()
            .oneshot(authed_request("POST", "/api/auth/verify", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let second = json_body(response).await;
        assert_eq!(second["created"], false);
        assert_eq!(second["user"]["uid"], "test-uid");
    }

    #[tokio::test]
    async fn scan_upload_returns_persisted_verdict() {
        let tmp = tempfile::tempdir().unwrap();
        let router = build_router(test_ctx(&tmp));
        verify_caller(&router).await;

        let uploaded = upload_scan(&router).await;
        assert_eq!(uploaded["scanResult"], true);
        assert_eq!(uploaded["confidence"], 0.82);
        assert_eq!(uploaded["resultSource"], "model");
        assert_eq!(uploaded["degradedCrop"], false);

        let scan_id = uploaded["scanId"].as_str().unwrap().to_string();
        assert_eq!(scan_id.len(), 8);

        // Scan is retrievable by id and through the listing.
        let response = router
            .clone()
            .oneshot(authed_request(
                "GET",
                &format!("/api/scans/{scan_id}"),
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(authed_request("GET", "/api/scans", Body::empty()))
            .await
            .unwrap();
        let listing = json_body(response).await;
        assert_eq!(listing.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_scan_is_404() {
        let tmp = tempfile::tempdir().unwrap();
        let router = build_router(test_ctx(&tmp));

        let response = router
            .oneshot(authed_request("GET", "/api/scans/deadbeef", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_lifecycle_over_http() {
        let tmp = tempfile::tempdir().unwrap();
        let router = build_router(test_ctx(&tmp));
        verify_caller(&router).await;
        let uploaded = upload_scan(&router).await;
        let scan_id = uploaded["scanId"].as_str().unwrap();

        // Start from the uploaded scan: seeded opening prompt plus reply.
        let body = serde_json::json!({ "scanId": scan_id }).to_string();
        let response = router
            .clone()
            .oneshot(authed_request("POST", "/api/chats/from-scan", Body::from(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let started = json_body(response).await;
        let messages = started["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["sender"], "user");
        assert!(messages[0]["message"]
            .as_str()
            .unwrap()
            .contains(scan_id));
        assert_eq!(messages[1]["sender"], "ai");
        assert_eq!(messages[1]["message"], "Eat more iron-rich foods.");
        let session_id = started["session"]["sessionId"].as_str().unwrap().to_string();

        // Send one message.
        let body = serde_json::json!({ "message": "what should I eat?" }).to_string();
        let response = router
            .clone()
            .oneshot(authed_request(
                "POST",
                &format!("/api/chats/{session_id}/messages"),
                Body::from(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let exchange = json_body(response).await;
        assert_eq!(exchange["userMessage"]["sender"], "user");
        assert_eq!(exchange["aiMessage"]["sender"], "ai");

        // History now holds 4 messages.
        let response = router
            .clone()
            .oneshot(authed_request(
                "GET",
                &format!("/api/chats/{session_id}"),
                Body::empty(),
            ))
            .await
            .unwrap();
        let history = json_body(response).await;
        assert_eq!(history.as_array().unwrap().len(), 4);

        // Delete the session; history is gone.
        let response = router
            .clone()
            .oneshot(authed_request(
                "DELETE",
                &format!("/api/chats/{session_id}"),
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(authed_request(
                "GET",
                &format!("/api/chats/{session_id}"),
                Body::empty(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn generic_chat_start_uses_latest_scan() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&tmp);
        let router = build_router(ctx.clone());
        verify_caller(&router).await;

        // No scan yet: generic start has nothing to anchor on.
        let response = router
            .clone()
            .oneshot(authed_request("POST", "/api/chats", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Seed a scan whose photo URL carries the caller's uid marker.
        {
            let conn = ctx.open_db().unwrap();
            let url = ctx
                .store
                .save_scan("test-uid", ".jpg", b"eye-bytes")
                .unwrap();
            crate::db::repository::insert_scan(
                &conn,
                &crate::models::Scan {
                    scan_id: "ab12cd34".into(),
                    photo_url: url,
                    scan_result: false,
                    confidence: 0.97,
                    result_source: crate::models::ResultSource::Model,
                    scan_date: chrono::Utc::now().naive_utc(),
                },
            )
            .unwrap();
        }

        let response = router
            .oneshot(authed_request("POST", "/api/chats", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let started = json_body(response).await;
        assert_eq!(
            started["messages"][0]["photoUrl"],
            "/scans/scan-test-uid.jpg"
        );
    }

    #[tokio::test]
    async fn foreign_profile_is_forbidden() {
        let tmp = tempfile::tempdir().unwrap();
        let router = build_router(test_ctx(&tmp));
        verify_caller(&router).await;

        let response = router
            .oneshot(authed_request("GET", "/api/users/someone-else", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn profile_update_and_fetch() {
        let tmp = tempfile::tempdir().unwrap();
        let router = build_router(test_ctx(&tmp));
        verify_caller(&router).await;

        let body = serde_json::json!({
            "username": "rani_baru",
            "birthdate": "2000-06-15"
        })
        .to_string();
        let response = router
            .clone()
            .oneshot(authed_request("PUT", "/api/users/test-uid", Body::from(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let updated = json_body(response).await;
        assert_eq!(updated["username"], "rani_baru");
        assert_eq!(updated["birthdate"], "2000-06-15");

        let response = router
            .oneshot(authed_request("GET", "/api/users/test-uid", Body::empty()))
            .await
            .unwrap();
        let fetched = json_body(response).await;
        assert_eq!(fetched["username"], "rani_baru");
        // The stored credential never leaves the server.
        assert!(fetched.get("password").is_none());
    }

    #[tokio::test]
    async fn profile_photo_upload_replaces_default() {
        let tmp = tempfile::tempdir().unwrap();
        let router = build_router(test_ctx(&tmp));
        verify_caller(&router).await;

        let (content_type, body) = multipart_image("image", "me.png", b"fake-png");
        let request = Request::builder()
            .method("POST")
            .uri("/api/users/test-uid/photo")
            .header("Authorization", format!("Bearer {GOOD_TOKEN}"))
            .header("Content-Type", content_type)
            .body(Body::from(body))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let updated = json_body(response).await;
        assert_eq!(updated["photoUrl"], "/profiles/photo-test-uid.png");
    }

    #[tokio::test]
    async fn password_link_then_reset() {
        let tmp = tempfile::tempdir().unwrap();
        let router = build_router(test_ctx(&tmp));
        verify_caller(&router).await;

        // Reset before any password credential exists is rejected.
        let body = serde_json::json!({ "newPassword": "secret123" }).to_string();
        let response = router
            .clone()
            .oneshot(authed_request(
                "PUT",
                "/api/users/test-uid/password",
                Body::from(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Too-short password is rejected up front.
        let body = serde_json::json!({ "password": "abc" }).to_string();
        let response = router
            .clone()
            .oneshot(authed_request(
                "POST",
                "/api/users/test-uid/password",
                Body::from(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = serde_json::json!({ "password": "secret123" }).to_string();
        let response = router
            .clone()
            .oneshot(authed_request(
                "POST",
                "/api/users/test-uid/password",
                Body::from(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Linking twice is rejected; resetting now succeeds.
        let body = serde_json::json!({ "password": "secret456" }).to_string();
        let response = router
            .clone()
            .oneshot(authed_request(
                "POST",
                "/api/users/test-uid/password",
                Body::from(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = serde_json::json!({ "newPassword": "secret456" }).to_string();
        let response = router
            .oneshot(authed_request(
                "PUT",
                "/api/users/test-uid/password",
                Body::from(body),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn account_deletion_removes_local_row() {
        let tmp = tempfile::tempdir().unwrap();
        let router = build_router(test_ctx(&tmp));
        verify_caller(&router).await;

        let response = router
            .clone()
            .oneshot(authed_request("DELETE", "/api/users/test-uid", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(authed_request("GET", "/api/users/test-uid", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn uploaded_scan_is_served_statically() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = test_ctx(&tmp);
        let router = build_router(ctx.clone());
        verify_caller(&router).await;
        let uploaded = upload_scan(&router).await;

        let photo_url = uploaded["photoUrl"].as_str().unwrap();
        let request = Request::builder()
            .method("GET")
            .uri(photo_url)
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"fake-jpeg");
    }
}
