//! Lockbox HTTP server library.
//!
//! Exposes the router builder so integration tests can drive the full
//! stack in-process. The binary entry point lives in `main.rs`.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use axum::http::HeaderValue;
use axum::middleware as axum_mw;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the Axum router with all routes and middleware.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    // Authenticated routes go through the auth middleware layer.
    let authenticated = Router::new()
        .merge(routes::secrets::router())
        .merge(routes::favorites::router())
        .merge(routes::folders::router())
        .merge(routes::audit::router())
        .merge(routes::orgs::router())
        .route_layer(axum_mw::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    // Share-link redemption is the one anonymous API surface.
    // Concurrency-limit it to blunt brute-force and resource exhaustion.
    let api = authenticated.merge(
        routes::shared::router().layer(tower::limit::ConcurrencyLimitLayer::new(32)),
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ]);

    Router::new()
        .route("/health", get(health))
        .nest("/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use lockbox_core::Vault;
    use lockbox_core::crypto::EncryptionKey;
    use lockbox_core::notify::LogNotifier;
    use lockbox_storage::MemoryStore;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::auth::mint_session_token;

    const AUTH_SECRET: &[u8] = b"test-auth-secret";

    fn app() -> Router {
        let vault = Vault::new(
            Arc::new(MemoryStore::new()),
            EncryptionKey::generate(),
            b"test-link-key".to_vec(),
            "http://localhost:8200".to_owned(),
            Arc::new(LogNotifier),
        );
        build_router(AppState {
            vault,
            auth_secret: Arc::new(AUTH_SECRET.to_vec()),
        })
    }

    fn bearer(user: Uuid) -> String {
        format!("Bearer {}", mint_session_token(AUTH_SECRET, user, u64::MAX))
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post(path: &str, user: Uuid, body: &Value) -> Request<Body> {
        Request::post(path)
            .header(header::AUTHORIZATION, bearer(user))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    fn get_req(path: &str, user: Uuid) -> Request<Body> {
        Request::get(path)
            .header(header::AUTHORIZATION, bearer(user))
            .body(Body::empty())
            .unwrap()
    }

    fn password_body() -> Value {
        json!({
            "payload": {
                "name": "GitHub",
                "website": "github.com",
                "username": "octocat",
                "password": "hunter2",
            }
        })
    }

    #[tokio::test]
    async fn requests_without_bearer_are_unauthorized() {
        let app = app();
        let (status, body) = send(
            &app,
            Request::get("/v1/secrets/password")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = app();
        let (status, body) = send(
            &app,
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn create_then_get_roundtrip() {
        let app = app();
        let user = Uuid::new_v4();

        let (status, created) =
            send(&app, post("/v1/secrets/password", user, &password_body())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["payload"]["password"], "hunter2");
        let id = created["id"].as_str().unwrap().to_owned();

        let (status, fetched) =
            send(&app, get_req(&format!("/v1/secrets/password/{id}"), user)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["payload"]["username"], "octocat");
        // The share-link state is never serialized.
        assert!(fetched.get("share_token").is_none());
    }

    #[tokio::test]
    async fn invalid_payload_is_rejected_wholesale() {
        let app = app();
        let user = Uuid::new_v4();
        let (status, body) = send(
            &app,
            post(
                "/v1/secrets/card",
                user,
                &json!({ "payload": {
                    "cardNumber": "4111111111111111",
                    "cardHolderName": "A B",
                    "expiryDate": "12/29",
                    "CVV": "123",
                    "nickname": "oops",
                }}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
    }

    #[tokio::test]
    async fn strangers_get_404_not_403() {
        let app = app();
        let owner = Uuid::new_v4();
        let (_, created) =
            send(&app, post("/v1/secrets/password", owner, &password_body())).await;
        let id = created["id"].as_str().unwrap().to_owned();

        let stranger = Uuid::new_v4();
        let (status, _) =
            send(&app, get_req(&format!("/v1/secrets/password/{id}"), stranger)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn share_link_redeems_without_auth() {
        let app = app();
        let owner = Uuid::new_v4();
        let (_, created) =
            send(&app, post("/v1/secrets/password", owner, &password_body())).await;
        let id = created["id"].as_str().unwrap().to_owned();

        let (status, link) = send(
            &app,
            post(
                &format!("/v1/secrets/password/{id}/share-link"),
                owner,
                &json!({}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = link["token"].as_str().unwrap();

        let (status, revealed) = send(
            &app,
            Request::get(format!("/v1/secrets/password/{id}/share-link/{token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(revealed["field"], "password");
        assert_eq!(revealed["value"], "hunter2");
    }

    #[tokio::test]
    async fn bad_link_token_is_a_uniform_400() {
        let app = app();
        let owner = Uuid::new_v4();
        let (_, created) =
            send(&app, post("/v1/secrets/password", owner, &password_body())).await;
        let id = created["id"].as_str().unwrap().to_owned();

        let (status, body) = send(
            &app,
            Request::get(format!("/v1/secrets/password/{id}/share-link/forged.token"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_link");
    }

    #[tokio::test]
    async fn favorites_toggle_accepts_comma_separated_ids() {
        let app = app();
        let user = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let (status, results) = send(
            &app,
            post(
                &format!("/v1/secrets/password/{a},{b}/favorite"),
                user,
                &json!({}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(results.as_array().unwrap().len(), 2);
        assert_eq!(results[0]["favorite"], true);

        let (_, results) = send(
            &app,
            post(&format!("/v1/secrets/password/{a}/favorite"), user, &json!({})),
        )
        .await;
        assert_eq!(results[0]["favorite"], false);
    }

    #[tokio::test]
    async fn list_supports_filter_and_pagination() {
        let app = app();
        let user = Uuid::new_v4();
        for i in 0..3 {
            let (status, _) = send(
                &app,
                post(
                    "/v1/secrets/note",
                    user,
                    &json!({ "payload": { "title": format!("note {i}"), "content": "x" } }),
                ),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = send(
            &app,
            get_req("/v1/secrets/note?filter=created_by_me&page=1&limit=2", user),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_count"], 3);
        assert_eq!(body["total_pages"], 2);
        assert_eq!(body["items"].as_array().unwrap().len(), 2);
    }
}
