/*!
 * Integration Tests: Delivery Pipeline
 *
 * Drives `DeliveryService` across repository, signer, and HTTP client
 * together against a `wiremock` endpoint, the way
 * `event-ingestor/tests/integration_test.rs` exercises its pipeline
 * against a real Redis rather than stubbing each collaborator alone.
 */

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use webhookd_domain::{Webhook, WebhookEvent, WebhookEventMessage, WebhookEventStatus, WebhookStatus};
use webhookd_worker::delivery::DeliveryService;
use webhookd_worker::http_client::DeliveryHttpClient;
use webhookd_worker::repository::{RepoError, WebhookEventPatch, WebhookRepository, WebhookTx};

#[derive(Clone)]
struct FakeRepo {
    webhooks: Arc<Mutex<HashMap<i64, Webhook>>>,
    events: Arc<Mutex<HashMap<String, WebhookEvent>>>,
}

impl FakeRepo {
    fn new(webhook: Webhook, event: WebhookEvent) -> Self {
        let mut webhooks = HashMap::new();
        webhooks.insert(webhook.id, webhook);
        let mut events = HashMap::new();
        events.insert(event.id.clone(), event);
        Self {
            webhooks: Arc::new(Mutex::new(webhooks)),
            events: Arc::new(Mutex::new(events)),
        }
    }

    fn current_event(&self, id: &str) -> WebhookEvent {
        self.events.lock().unwrap().get(id).unwrap().clone()
    }
}

struct FakeTx {
    events: Arc<Mutex<HashMap<String, WebhookEvent>>>,
}

#[async_trait]
impl WebhookTx for FakeTx {
    async fn bump_tries(&mut self, event_id: &str) -> Result<i32, RepoError> {
        let mut events = self.events.lock().unwrap();
        let event = events.get_mut(event_id).ok_or(RepoError::NotFound)?;
        event.tries += 1;
        Ok(event.tries)
    }

    async fn commit(self: Box<Self>) -> Result<(), RepoError> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RepoError> {
        Ok(())
    }
}

#[async_trait]
impl WebhookRepository for FakeRepo {
    async fn get_webhook(&self, id: i64) -> Result<Webhook, RepoError> {
        self.webhooks.lock().unwrap().get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn get_webhook_event(&self, id: &str) -> Result<WebhookEvent, RepoError> {
        self.events.lock().unwrap().get(id).cloned().ok_or(RepoError::NotFound)
    }

    async fn update_webhook_event(&self, id: &str, patch: WebhookEventPatch) -> Result<(), RepoError> {
        let mut events = self.events.lock().unwrap();
        let event = events.get_mut(id).ok_or(RepoError::NotFound)?;
        if let Some(tries) = patch.tries {
            event.tries = tries;
        }
        if let Some(status) = patch.status {
            event.status = status;
        }
        if let Some(code) = patch.response_code {
            event.response_code = code;
        }
        if patch.response_body.is_some() {
            event.response_body = patch.response_body;
        }
        if patch.last_error.is_some() {
            event.last_error = patch.last_error;
        }
        if patch.delivered_at.is_some() {
            event.delivered_at = patch.delivered_at;
        }
        if patch.failed_at.is_some() {
            event.failed_at = patch.failed_at;
        }
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn WebhookTx>, RepoError> {
        Ok(Box::new(FakeTx { events: self.events.clone() }))
    }
}

fn webhook(url: String) -> Webhook {
    Webhook {
        id: 1,
        callback_url: url,
        secret: "integration-secret".to_string(),
        status: WebhookStatus::Active,
        subscribed_events: vec!["order.created".to_string()],
        failure_count: 0,
        last_failure_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn pending_event() -> WebhookEvent {
    WebhookEvent {
        id: "evt_pipeline".to_string(),
        webhook_id: 1,
        event_type: "order.created".to_string(),
        payload: json!({"order_id": 7, "total_cents": 4599}),
        last_error: None,
        response_body: None,
        response_code: 0,
        tries: 0,
        status: WebhookEventStatus::Pending,
        failed_at: None,
        delivered_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn service(repo: FakeRepo) -> DeliveryService<FakeRepo> {
    DeliveryService::new(
        Arc::new(repo),
        Arc::new(DeliveryHttpClient::new(Duration::from_secs(2)).unwrap()),
        5,
    )
}

/// First attempt fails with a retryable code, leaving the row pending;
/// the next `send_webhook` call for the same event (as the consumer would
/// issue after the broker's delay elapses) then succeeds.
#[tokio::test]
async fn retries_then_succeeds_across_two_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let repo = FakeRepo::new(webhook(format!("{}/hook", server.uri())), pending_event());
    let msg = WebhookEventMessage { id: "evt_pipeline".to_string() };
    let delivery = service(repo.clone());

    let first = delivery.send_webhook(&msg).await.unwrap_err();
    assert!(first.retryable);
    assert_eq!(repo.current_event("evt_pipeline").tries, 1);

    let second = delivery.send_webhook(&msg).await.unwrap();
    assert_eq!(second.status, WebhookEventStatus::Delivered);
    assert_eq!(second.tries, 2);
}

/// The subscriber receives exactly the signature produced from the exact
/// bytes sent as the body, not a signature over some other
/// serialization of the same logical payload.
#[tokio::test]
async fn subscriber_receives_a_signature_matching_the_transmitted_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header_exists("x-signature"))
        .respond_with(|req: &Request| {
            let signature = req.headers.get("x-signature").unwrap().to_str().unwrap();
            let mut mac = hmac::Hmac::<sha2::Sha256>::new_from_slice(b"integration-secret").unwrap();
            hmac::Mac::update(&mut mac, &req.body);
            let expected = format!("sha256={}", hex::encode(hmac::Mac::finalize(mac).into_bytes()));
            if signature == expected {
                ResponseTemplate::new(200).set_body_json(json!({"ok": true}))
            } else {
                ResponseTemplate::new(401)
            }
        })
        .mount(&server)
        .await;

    let repo = FakeRepo::new(webhook(format!("{}/hook", server.uri())), pending_event());
    let msg = WebhookEventMessage { id: "evt_pipeline".to_string() };

    let event = service(repo).send_webhook(&msg).await.unwrap();
    assert_eq!(event.status, WebhookEventStatus::Delivered);
}
