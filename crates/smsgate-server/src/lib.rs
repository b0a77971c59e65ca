//! The HTTP surface of the sms gateway.
//!
//! [`router`] wires the admit endpoint, the read/admin endpoints, and the
//! optional rate-limit middleware over a [`SharedState`]; the
//! `smsgate-server` and `smsgate-worker` binaries share that state wiring
//! through [`AppState`].

mod config;
mod error;
pub mod middleware;
mod routes;
mod state;

pub use config::Config;
pub use error::ApiError;
pub use state::{AppState, BootstrapError, SharedState};

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Build the application router.
pub fn router(state: SharedState) -> Router {
    let api = Router::new()
        .route("/api/sms/send", post(routes::send_sms))
        .route("/api/sms/rate-limits", get(routes::rate_limits))
        .route("/api/sms/health", get(routes::all_provider_health))
        .route("/api/sms/health/{provider_id}", get(routes::provider_health))
        .route(
            "/api/sms/health/{provider_id}/reset",
            post(routes::reset_provider_health),
        )
        .route("/api/sms/requests", get(routes::list_requests))
        .route("/api/sms/requests/{id}", get(routes::get_request))
        .route("/api/sms/stats", get(routes::stats))
        .route(
            "/api/sms/distribution-stats",
            get(routes::distribution_stats),
        )
        .route(
            "/api/sms/distribution-stats/reset",
            post(routes::reset_distribution_stats),
        )
        .route("/api/sms/queue-status", get(routes::queue_status))
        .route("/health", get(routes::liveness));

    let api = if state.config.rate_limit_middleware {
        api.layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
    } else {
        api
    };

    api.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Initialize the tracing subscriber for a binary.
pub fn init_tracing(debug: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use smsgate_kv::{KvStore, MemoryStore};
    use smsgate_queue::{MemoryQueue, TaskQueue};
    use smsgate_storage::Database;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct TestApp {
        state: SharedState,
        kv: Arc<MemoryStore>,
        queue: Arc<MemoryQueue>,
    }

    async fn test_app(middleware: bool) -> TestApp {
        let kv_store = Arc::new(MemoryStore::new());
        let kv: Arc<dyn KvStore> = kv_store.clone();
        let queue_impl = Arc::new(MemoryQueue::new());
        let queue: Arc<dyn TaskQueue> = queue_impl.clone();
        let db = Database::in_memory().await.unwrap();
        let config = Config {
            rate_limit_middleware: middleware,
            ..Config::default()
        };
        db.migrate().await.unwrap();
        db.seed_providers(&config.providers()).await.unwrap();
        let state = AppState::assemble(config, kv, db, queue);
        TestApp {
            state,
            kv: kv_store,
            queue: queue_impl,
        }
    }

    fn send_request(payload: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/sms/send")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_admit_happy_path() {
        let app = test_app(false).await;
        let response = router(app.state.clone())
            .oneshot(send_request(r#"{"phone":"01921317475","text":"Hello"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["queued"], true);
        assert!(body["message_id"].as_str().unwrap().starts_with("msg_"));

        // One dispatch task with a fresh attempt counter.
        let task = app.queue.dequeue(Duration::ZERO).await.unwrap().unwrap();
        match task {
            smsgate_queue::Task::Dispatch {
                attempt, excluded, ..
            } => {
                assert_eq!(attempt, 0);
                assert!(excluded.is_empty());
            }
            other => panic!("expected dispatch task, got {other:?}"),
        }

        // The row was admitted and handed off.
        let requests = app
            .state
            .db
            .list_requests(&Default::default())
            .await
            .unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].status,
            smsgate_storage::RequestStatus::Processing
        );
    }

    #[tokio::test]
    async fn test_admit_rejects_bad_phone() {
        let app = test_app(false).await;
        for payload in [
            r#"{"phone":"123","text":"Hello"}"#,
            r#"{"phone":"0192131747512345","text":"Hello"}"#,
            r#"{"phone":"01921abc475","text":"Hello"}"#,
        ] {
            let response = router(app.state.clone())
                .oneshot(send_request(payload))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        }
        assert_eq!(app.queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_admit_rejects_bad_text() {
        let app = test_app(false).await;
        let long_text = "x".repeat(161);
        for payload in [
            r#"{"phone":"01921317475","text":""}"#.to_string(),
            format!(r#"{{"phone":"01921317475","text":"{long_text}"}}"#),
        ] {
            let response = router(app.state.clone())
                .oneshot(send_request(&payload))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        }
    }

    #[tokio::test]
    async fn test_admit_global_rate_limited() {
        let app = test_app(false).await;
        let limit = app.state.config.total_rate_limit;
        for _ in 0..limit {
            app.kv.incr("global_rate_limit").await.unwrap();
        }

        let response = router(app.state.clone())
            .oneshot(send_request(r#"{"phone":"01921317475","text":"Hello"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get("x-ratelimit-global-limit")
                .and_then(|v| v.to_str().ok()),
            Some("200")
        );
        let body = body_json(response).await;
        assert_eq!(body["error"], "Global rate limit exceeded");
        assert!(body["current_count"].as_i64().unwrap() >= i64::from(limit));
        assert_eq!(body["limit"], 200);

        // No row written, nothing queued.
        let requests = app
            .state
            .db
            .list_requests(&Default::default())
            .await
            .unwrap();
        assert!(requests.is_empty());
        assert_eq!(app.queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_middleware_sheds_at_global_limit() {
        let app = test_app(true).await;
        for _ in 0..app.state.config.total_rate_limit {
            app.kv.incr("global_rate_limit").await.unwrap();
        }

        let response = router(app.state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/sms/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["type"], "global");
    }

    #[tokio::test]
    async fn test_liveness_is_exempt_from_rate_limiting() {
        let app = test_app(true).await;
        for _ in 0..app.state.config.total_rate_limit {
            app.kv.incr("global_rate_limit").await.unwrap();
        }

        let response = router(app.state.clone())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_provider_health_endpoint() {
        let app = test_app(false).await;

        let response = router(app.state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/sms/health/provider1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["sliding_window"]["is_healthy"], true);

        let response = router(app.state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/sms/health/provider9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_queue_status_reports_dead_letters() {
        let app = test_app(false).await;
        app.kv
            .lpush(
                "dead_letter_queue",
                r#"{"request_id":7,"reason":"Max retries exceeded"}"#,
            )
            .await
            .unwrap();

        let response = router(app.state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/sms/queue-status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["dead_letter_queue"]["length"], 1);
        assert_eq!(
            body["dead_letter_queue"]["recent"][0]["request_id"],
            7
        );
    }

    #[tokio::test]
    async fn test_requests_listing_rejects_bad_status() {
        let app = test_app(false).await;
        let response = router(app.state.clone())
            .oneshot(
                Request::builder()
                    .uri("/api/sms/requests?status=bogus")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
