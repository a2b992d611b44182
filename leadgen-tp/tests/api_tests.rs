//! HTTP API integration tests
//!
//! Drive the router with `oneshot` over an in-memory database.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use leadgen_common::events::EventBus;
use leadgen_common::{Partition, Tier};
use leadgen_tp::campaign::{CampaignTrigger, CampaignTriggerRequest, TriggerError, TriggerReceipt};
use leadgen_tp::store::{Lead, SqliteStore};
use leadgen_tp::{build_router, AppState};
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

#[derive(Default)]
struct RecordingTrigger {
    requests: Mutex<Vec<CampaignTriggerRequest>>,
}

#[async_trait]
impl CampaignTrigger for RecordingTrigger {
    async fn trigger(&self, request: &CampaignTriggerRequest) -> Result<TriggerReceipt, TriggerError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(TriggerReceipt {
            delivered: true,
            backend: "recording",
        })
    }
}

struct TestApp {
    router: Router,
    store: SqliteStore,
    trigger: Arc<RecordingTrigger>,
}

fn lead(email: &str, partition: Partition, tier: Tier) -> Lead {
    Lead {
        email: email.to_string(),
        partition,
        name: Some("Meera Iyer".to_string()),
        title: Some("Portfolio Manager".to_string()),
        company: Some("Coastal Wealth".to_string()),
        industry: Some("Finance".to_string()),
        city: Some("Chennai".to_string()),
        icp_score: 64.0,
        tier,
        tier_updated_at: None,
    }
}

async fn test_app(leads: &[Lead]) -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    leadgen_common::db::init_schema(&pool).await.unwrap();

    let store = SqliteStore::new(pool);
    for l in leads {
        store.insert_lead(l).await.unwrap();
    }

    let trigger = Arc::new(RecordingTrigger::default());
    let state = AppState::new(store.clone(), trigger.clone(), EventBus::new(32));

    TestApp {
        router: build_router(state),
        store,
        trigger,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn post_webhook(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/moengage/webhook")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = test_app(&[]).await;

    let (status, json) = send(&app.router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "leadgen-tp");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_webhook_batch_summary() {
    let app = test_app(&[
        lead("a@example.com", Partition::Hni, Tier::Cold),
        lead("b@example.com", Partition::Uhni, Tier::Warm),
    ])
    .await;

    let body = r#"[
        {"event_name": "Email Opened", "email": "a@example.com", "campaign_id": "cmp-7"},
        {"event_name": "Reply Received", "email": "b@example.com"},
        {"event_name": "Email Clicked"},
        {"event_name": "Email Opened", "email": "nobody@example.com"},
        {"event_name": "Page Viewed", "email": "a@example.com"},
        42
    ]"#;
    let (status, json) = send(&app.router, post_webhook(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["events_received"], 6);
    assert_eq!(json["events_processed"], 2);
    assert_eq!(json["events_skipped"], 3);
    assert_eq!(json["events_ignored"], 1);
    assert_eq!(json["events_failed"], 0);
    assert_eq!(json["progressions"], 2);

    let details = json["progression_details"].as_array().unwrap();
    assert_eq!(details[0]["email"], "a@example.com");
    assert_eq!(details[0]["previous_tier"], "cold");
    assert_eq!(details[0]["new_tier"], "warm");
    assert_eq!(details[0]["event_type"], "email_opened");
    assert_eq!(details[0]["campaign_id"], "cmp-7");
    assert_eq!(details[1]["new_tier"], "hot");

    let skipped = json["skipped"].as_array().unwrap();
    assert_eq!(skipped.len(), 3);
    assert_eq!(skipped[0]["index"], 2);
    assert_eq!(skipped[0]["reason"], "missing_email");
    assert!(skipped[0]["email"].is_null());
    assert_eq!(skipped[1]["index"], 3);
    assert_eq!(skipped[1]["reason"], "lead_not_found");
    assert_eq!(skipped[1]["email"], "nobody@example.com");
    assert_eq!(skipped[2]["index"], 5);
    assert_eq!(skipped[2]["reason"], "malformed_event");

    assert_eq!(app.trigger.requests.lock().unwrap().len(), 2);
    let hot = app.store.get_lead(Partition::Uhni, "b@example.com").await.unwrap().unwrap();
    assert_eq!(hot.tier, Tier::Hot);
}

#[tokio::test]
async fn test_webhook_single_object() {
    let app = test_app(&[lead("a@example.com", Partition::Partners, Tier::Cold)]).await;

    let (status, json) = send(
        &app.router,
        post_webhook(r#"{"event_name": "Call Booked", "email": "a@example.com"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["events_received"], 1);
    assert_eq!(json["progressions"], 1);
    assert_eq!(json["progression_details"][0]["new_tier"], "hot");
}

#[tokio::test]
async fn test_webhook_rejects_unparseable_body() {
    let app = test_app(&[]).await;

    for body in ["{not json", "\"just a string\""] {
        let (status, json) = send(&app.router, post_webhook(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }
}

#[tokio::test]
async fn test_query_newest_first_with_filter() {
    let app = test_app(&[
        lead("a@example.com", Partition::Hni, Tier::Cold),
        lead("b@example.com", Partition::Hni, Tier::Cold),
        lead("c@example.com", Partition::Hni, Tier::Cold),
    ])
    .await;

    let body = r#"[
        {"event_name": "Email Opened", "email": "a@example.com"},
        {"event_name": "Call Booked", "email": "b@example.com"},
        {"event_name": "Email Clicked", "email": "c@example.com"}
    ]"#;
    send(&app.router, post_webhook(body)).await;

    let (status, json) = send(&app.router, get("/api/moengage/webhook")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["total"], 3);
    let emails: Vec<&str> = json["progressions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["email"].as_str().unwrap())
        .collect();
    assert_eq!(emails, ["c@example.com", "b@example.com", "a@example.com"]);

    let (_, json) = send(&app.router, get("/api/moengage/webhook?tier=warm&limit=1")).await;
    assert_eq!(json["total"], 2);
    let records = json["progressions"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["email"], "c@example.com");

    let (_, json) = send(&app.router, get("/api/moengage/webhook?limit=0")).await;
    assert_eq!(json["total"], 3);
    assert!(json["progressions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_query_rejects_bad_parameters() {
    let app = test_app(&[]).await;

    let (status, json) = send(&app.router, get("/api/moengage/webhook?tier=boiling")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);

    let (status, _) = send(&app.router, get("/api/moengage/webhook?limit=lots")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_event_stream_announces_connection() {
    let app = test_app(&[]).await;

    let response = app
        .router
        .clone()
        .oneshot(get("/api/progressions/events"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));

    let mut body = response.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(text.contains("event: ConnectionStatus"));
    assert!(text.contains("data: connected"));
}
