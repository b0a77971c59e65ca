//! Admission behavior: duplication and global throttling.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use smsgate_kv::KvStore;
use smsgate_queue::TaskQueue;
use smsgate_server::router;

use crate::harness::gateway;

fn send(payload: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/sms/send")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn duplicate_admissions_are_independent_requests() {
    let harness = gateway("http://localhost:9", 5).await;
    let payload = r#"{"phone":"+8801912345678","text":"Hello"}"#;

    let mut message_ids = Vec::new();
    for _ in 0..2 {
        let response = router(harness.state.clone())
            .oneshot(send(payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        message_ids.push(body["message_id"].as_str().unwrap().to_string());
    }

    assert_ne!(message_ids[0], message_ids[1], "no dedup on admit");
    let requests = harness
        .state
        .db
        .list_requests(&Default::default())
        .await
        .unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(harness.queue.depth().await.unwrap(), 2);
}

#[tokio::test]
async fn admit_returns_429_with_structured_body_at_global_limit() {
    let harness = gateway("http://localhost:9", 5).await;
    for _ in 0..harness.state.config.total_rate_limit {
        harness.kv.incr("global_rate_limit").await.unwrap();
    }

    let response = router(harness.state.clone())
        .oneshot(send(r#"{"phone":"01921317475","text":"Hello"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Global rate limit exceeded");
    assert!(body["current_count"].as_i64().unwrap() >= 200);
    assert_eq!(body["limit"], 200);
    assert_eq!(body["reset_in_seconds"], 1);

    // Throttled admissions leave no trace.
    assert!(harness
        .state
        .db
        .list_requests(&Default::default())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(harness.queue.depth().await.unwrap(), 0);
}
