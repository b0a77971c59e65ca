//! Full request lifecycles against stubbed providers.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use smsgate_core::ProviderId;
use smsgate_engine::{DeadLetterEntry, DEAD_LETTER_LIST};
use smsgate_kv::KvStore;
use smsgate_server::router;
use smsgate_storage::RequestStatus;

use crate::harness::{drain, gateway, Harness};

async fn admit(harness: &Harness, phone: &str, text: &str) -> (String, i64) {
    let payload = format!(r#"{{"phone":"{phone}","text":"{text}"}}"#);
    let response = router(harness.state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/sms/send")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["queued"], true);

    let requests = harness
        .state
        .db
        .list_requests(&Default::default())
        .await
        .unwrap();
    let request_id = requests
        .iter()
        .map(|r| r.id)
        .max()
        .expect("request row exists");
    (
        body["message_id"].as_str().unwrap().to_string(),
        request_id,
    )
}

#[tokio::test]
async fn happy_path_completes_on_first_attempt() {
    let mut server = mockito::Server::new_async().await;
    for path in ["/provider1", "/provider2", "/provider3"] {
        server
            .mock("POST", path)
            .with_status(200)
            .with_body(r#"{"status":"sent"}"#)
            .create_async()
            .await;
    }

    let harness = gateway(&server.url(), 5).await;
    let (_, request_id) = admit(&harness, "01921317475", "Hello").await;
    drain(&harness).await;

    let row = harness
        .state
        .db
        .get_request(request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, RequestStatus::Completed);
    let provider = row.provider_used.clone().unwrap();
    assert!(["provider1", "provider2", "provider3"].contains(&provider.as_str()));
    assert_eq!(row.retry_count, 0);

    let responses = harness.state.db.responses_for(request_id).await.unwrap();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status_code, 200);

    assert!(harness
        .state
        .db
        .retries_for(request_id)
        .await
        .unwrap()
        .is_empty());

    let health = harness
        .state
        .health
        .get_health_status(&ProviderId::from(provider.as_str()))
        .await
        .unwrap();
    assert_eq!(health.success_count, 1);
    assert_eq!(health.failure_count, 0);
}

#[tokio::test]
async fn failed_provider_is_retried_on_an_alternate() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/provider1")
        .with_status(500)
        .with_body("upstream exploded")
        .create_async()
        .await;
    for path in ["/provider2", "/provider3"] {
        server
            .mock("POST", path)
            .with_status(200)
            .with_body(r#"{"status":"sent"}"#)
            .create_async()
            .await;
    }

    let harness = gateway(&server.url(), 5).await;
    let (_, request_id) = admit(&harness, "01921317475", "Hello").await;
    drain(&harness).await;

    let row = harness
        .state
        .db
        .get_request(request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, RequestStatus::Completed);
    assert_eq!(row.retry_count, 1);
    assert_eq!(
        row.failed_provider_ids(),
        vec![ProviderId::from("provider1")]
    );
    assert_ne!(row.provider_used.as_deref(), Some("provider1"));

    let responses = harness.state.db.responses_for(request_id).await.unwrap();
    let codes: Vec<i64> = responses.iter().map(|r| r.status_code).collect();
    assert_eq!(codes, vec![500, 200]);

    let retries = harness.state.db.retries_for(request_id).await.unwrap();
    assert_eq!(retries.len(), 1);
    assert_eq!(retries[0].attempt_number, 1);
    assert_eq!(retries[0].provider_used, "provider1");

    let p1 = harness
        .state
        .health
        .get_health_status(&ProviderId::from("provider1"))
        .await
        .unwrap();
    assert_eq!(p1.failure_count, 1);
    let winner = harness
        .state
        .health
        .get_health_status(&ProviderId::from(row.provider_used.clone().unwrap().as_str()))
        .await
        .unwrap();
    assert_eq!(winner.success_count, 1);
}

#[tokio::test]
async fn exhausted_retries_dead_letter_the_request() {
    let mut server = mockito::Server::new_async().await;
    for path in ["/provider1", "/provider2", "/provider3"] {
        server
            .mock("POST", path)
            .with_status(500)
            .with_body("no luck")
            .expect_at_least(1)
            .create_async()
            .await;
    }

    let harness = gateway(&server.url(), 2).await;
    let (_, request_id) = admit(&harness, "01921317475", "Hello").await;
    drain(&harness).await;

    let row = harness
        .state
        .db
        .get_request(request_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, RequestStatus::PermanentlyFailed);
    assert!(row.is_permanently_failed);
    assert_eq!(row.retry_count, 2);
    // The two providers whose failures triggered retries; the final one is
    // only visible in the response log.
    assert_eq!(row.failed_provider_ids().len(), 2);

    let responses = harness.state.db.responses_for(request_id).await.unwrap();
    assert_eq!(responses.len(), 3);
    assert!(responses.iter().all(|r| r.status_code == 500));

    let retries = harness.state.db.retries_for(request_id).await.unwrap();
    assert_eq!(retries.len(), 2);
    assert_eq!(row.retry_count as usize, retries.len());

    let entries = harness.kv.lrange(DEAD_LETTER_LIST, 0, -1).await.unwrap();
    assert_eq!(entries.len(), 1);
    let entry: DeadLetterEntry = serde_json::from_str(&entries[0]).unwrap();
    assert_eq!(entry.request_id, request_id);
    assert_eq!(entry.reason, "Max retries exceeded");
}
