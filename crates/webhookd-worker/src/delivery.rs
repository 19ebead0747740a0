/*!
 * Delivery Service
 *
 * The core of the worker: one attempt at delivering one `WebhookEvent`.
 * The eight-step sequence below (precondition load, transactional tries
 * bump, serialize, sign-and-POST, classify, apply the state machine,
 * persist, return) is deliberately kept as one straight-line function
 * rather than split into a pipeline of combinators; every step either
 * commits state or returns, and the ordering between the tries bump and
 * the network call is the one invariant a reader must not be able to
 * miss by skimming.
 */

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{info, warn};

use webhookd_domain::{WebhookEvent, WebhookEventMessage, WebhookEventStatus};

use crate::error::WebhookError;
use crate::http_client::{DeliveryHttpClient, HttpError};
use crate::metrics::DELIVERY_DURATION;
use crate::repository::{RepoError, WebhookEventPatch, WebhookRepository};
use crate::retry::is_retryable_code;
use crate::signer;

pub struct DeliveryService<R: WebhookRepository> {
    repo: Arc<R>,
    http: Arc<DeliveryHttpClient>,
    max_attempts: i32,
}

impl<R: WebhookRepository> DeliveryService<R> {
    pub fn new(repo: Arc<R>, http: Arc<DeliveryHttpClient>, max_attempts: i32) -> Self {
        Self {
            repo,
            http,
            max_attempts,
        }
    }

    pub async fn send_webhook(
        &self,
        msg: &WebhookEventMessage,
    ) -> Result<WebhookEvent, WebhookError> {
        // 1. Load & validate preconditions, outside any transaction.
        let mut event = self
            .repo
            .get_webhook_event(&msg.id)
            .await
            .map_err(Self::map_load_error)?;

        let webhook = self
            .repo
            .get_webhook(event.webhook_id)
            .await
            .map_err(Self::map_load_error)?;

        if !event.is_pending() {
            return Err(WebhookError::not_pending(&format!("{:?}", event.status)));
        }
        if event.reached_max_attempts(self.max_attempts) {
            return Err(WebhookError::reached_max_attempts(event.tries));
        }
        if !webhook.is_active() {
            return Err(WebhookError::disabled());
        }

        // 2. Transactional attempt-counter bump. Must land before the
        // network call: a crash mid-POST then resumes as attempt N+1,
        // never a silent unbounded retry of the same attempt number.
        let mut tx = self
            .repo
            .begin()
            .await
            .map_err(|e| WebhookError::delivery_failed(e))?;
        let tries = tx
            .bump_tries(&event.id)
            .await
            .map_err(|e| WebhookError::delivery_failed(e))?;
        tx.commit()
            .await
            .map_err(|e| WebhookError::delivery_failed(e))?;
        event.tries = tries;

        // 3. Serialize payload and sign. A serialization failure is
        // terminal: dead-letter the row rather than retry a payload that
        // will never become serializable.
        let (signature, body) = match signer::sign(&event.payload, webhook.secret.as_bytes()) {
            Ok(pair) => pair,
            Err(e) => {
                event.mark_dead_letter();
                if let Err(storage_err) = self.persist(&event).await {
                    return Err(WebhookError::delivery_failed(storage_err));
                }
                return Err(WebhookError::serialization_failed(e));
            }
        };

        // 4. Sign & POST. 5. Classify the outcome.
        let started = Instant::now();
        let (response_code, response_body) = match self
            .http
            .post(&webhook.callback_url, "application/json", body, &signature)
            .await
        {
            Ok(response) => {
                let parsed = serde_json::from_str::<Value>(&response.body)
                    .unwrap_or_else(|_| json!({ "raw_response": response.body }));
                (response.status_code as i32, parsed)
            }
            Err(HttpError::Timeout(cause)) => {
                (408, json!({ "error": "timeout", "cause": cause }))
            }
            Err(HttpError::Network(cause)) => {
                (503, json!({ "error": "network error", "cause": cause }))
            }
        };

        // 6. Apply the state machine in memory.
        let sent = WebhookEvent::is_success_code(response_code);
        event.response_code = response_code;
        event.response_body = Some(response_body.clone());

        if sent {
            event.mark_delivered();
        } else if !is_retryable_code(response_code) || event.reached_max_attempts(self.max_attempts) {
            event.mark_failed(response_body);
        }
        // else: leave status = pending, to be retried by the consumer.

        // 7. Persist final state.
        self.persist(&event)
            .await
            .map_err(|e| WebhookError::delivery_failed(e))?;

        // 8. Return outcome.
        if sent {
            DELIVERY_DURATION
                .with_label_values(&["delivered"])
                .observe(started.elapsed().as_secs_f64());
            info!(event_id = %event.id, "webhook delivered");
            Ok(event)
        } else if event.is_terminal() {
            DELIVERY_DURATION
                .with_label_values(&["terminal"])
                .observe(started.elapsed().as_secs_f64());
            warn!(event_id = %event.id, response_code, "webhook delivery failed terminally");
            Err(WebhookError::fails())
        } else {
            DELIVERY_DURATION
                .with_label_values(&["retrying"])
                .observe(started.elapsed().as_secs_f64());
            Err(WebhookError::will_retry(response_code, event.tries))
        }
    }

    async fn persist(&self, event: &WebhookEvent) -> Result<(), RepoError> {
        let patch = WebhookEventPatch {
            status: Some(event.status),
            response_code: Some(event.response_code),
            response_body: event.response_body.clone(),
            last_error: event.last_error.clone(),
            delivered_at: event.delivered_at,
            failed_at: event.failed_at,
            tries: None,
        };
        self.repo.update_webhook_event(&event.id, patch).await
    }

    fn map_load_error(e: RepoError) -> WebhookError {
        match e {
            RepoError::NotFound => WebhookError::not_found("event_id", Value::Null),
            RepoError::Storage(cause) => WebhookError::delivery_failed(cause),
        }
    }
}
