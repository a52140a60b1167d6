// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Default event handler: buffers event payloads in memory and ships them as one JSON batch
//! to the category's intake endpoint.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::client::HttpClient;
use crate::errors::HandlerError;
use crate::event::{AnalyticsEvent, EventCategory};
use crate::handler::EventHandler;

/// Buffer limits of an intake handler. Reaching either one triggers a background flush.
#[derive(Debug, Clone, Copy)]
pub struct IntakeLimits {
    pub max_events: usize,
    pub max_bytes: usize,
}

#[derive(Debug, Default)]
struct IntakeState {
    enabled: bool,
    endpoint: Option<String>,
    scope_id: String,
    events: Vec<Value>,
    buffered_bytes: usize,
    // Set while a background flush is scheduled and has not taken the buffer yet.
    flush_pending: bool,
}

impl IntakeState {
    fn take_batch(&mut self) -> Option<Batch> {
        self.flush_pending = false;
        if self.events.is_empty() {
            return None;
        }
        let events = std::mem::take(&mut self.events);
        self.buffered_bytes = 0;
        match &self.endpoint {
            Some(endpoint) => Some(Batch {
                endpoint: endpoint.clone(),
                scope_id: self.scope_id.clone(),
                events,
            }),
            None => {
                warn!("Dropping {} events: no intake endpoint configured", events.len());
                None
            }
        }
    }
}

struct Batch {
    endpoint: String,
    scope_id: String,
    events: Vec<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IntakePayload<'a> {
    scope_id: &'a str,
    events: &'a [Value],
}

#[derive(Clone)]
pub struct IntakeEventHandler {
    category: EventCategory,
    client: HttpClient,
    timeout: Duration,
    limits: IntakeLimits,
    state: Arc<Mutex<IntakeState>>,
}

impl IntakeEventHandler {
    /// Creates a disabled handler. It starts accepting events once reconfigured as enabled.
    pub fn new(
        category: EventCategory,
        client: HttpClient,
        timeout: Duration,
        limits: IntakeLimits,
    ) -> Self {
        IntakeEventHandler {
            category,
            client,
            timeout,
            limits,
            state: Arc::new(Mutex::new(IntakeState::default())),
        }
    }

    pub fn buffered_events(&self) -> usize {
        self.lock_state().events.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.lock_state().enabled
    }

    fn lock_state(&self) -> MutexGuard<'_, IntakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn send(&self, batch: Batch) -> Result<(), HandlerError> {
        let n_events = batch.events.len();
        debug!(
            "Flushing {n_events} {} events to {}",
            self.category, batch.endpoint
        );

        let body = serde_json::to_vec(&IntakePayload {
            scope_id: &batch.scope_id,
            events: &batch.events,
        })?;

        let time = std::time::Instant::now();
        let response = self
            .client
            .post(&batch.endpoint)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .body(body)
            .send()
            .await?;
        let elapsed = time.elapsed();

        let status = response.status();
        if status.is_success() {
            debug!(
                "Successfully sent {n_events} {} events in {} ms",
                self.category,
                elapsed.as_millis()
            );
            Ok(())
        } else {
            Err(HandlerError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

#[async_trait]
impl EventHandler for IntakeEventHandler {
    fn ingest(&self, event: AnalyticsEvent) {
        let payload = event.into_payload();
        let size = payload.to_string().len();

        let schedule_flush = {
            let mut state = self.lock_state();
            if !state.enabled {
                return;
            }
            state.events.push(payload);
            state.buffered_bytes += size;
            let full = state.events.len() >= self.limits.max_events
                || state.buffered_bytes >= self.limits.max_bytes;
            if full && !state.flush_pending {
                state.flush_pending = true;
                true
            } else {
                false
            }
        };

        if schedule_flush {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let handler = self.clone();
                    runtime.spawn(async move {
                        if let Err(e) = handler.flush().await {
                            error!("Failed to flush {} events: {e}", handler.category);
                        }
                    });
                }
                Err(_) => {
                    self.lock_state().flush_pending = false;
                    debug!(
                        "No runtime available, {} events stay buffered until the next flush",
                        self.category
                    );
                }
            }
        }
    }

    async fn flush(&self) -> Result<(), HandlerError> {
        let batch = self.lock_state().take_batch();
        match batch {
            Some(batch) => self.send(batch).await,
            None => Ok(()),
        }
    }

    async fn reconfigure(
        &self,
        enabled: bool,
        endpoint: String,
        scope_id: String,
    ) -> Result<(), HandlerError> {
        let mut state = self.lock_state();
        state.enabled = enabled;
        state.endpoint = Some(endpoint);
        state.scope_id = scope_id;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handler(max_events: usize) -> IntakeEventHandler {
        IntakeEventHandler::new(
            EventCategory::Auction,
            reqwest::Client::new(),
            Duration::from_secs(1),
            IntakeLimits {
                max_events,
                max_bytes: 1_000_000,
            },
        )
    }

    #[test]
    fn test_disabled_handler_drops_events() {
        let handler = handler(10);

        handler.ingest(AnalyticsEvent::Auction(json!({"id": 1})));

        assert!(!handler.is_enabled());
        assert_eq!(handler.buffered_events(), 0);
    }

    #[tokio::test]
    async fn test_enabled_handler_buffers_events() {
        let handler = handler(10);
        handler
            .reconfigure(true, "http://127.0.0.1:1/intake/auction".to_string(), "s1".to_string())
            .await
            .expect("reconfigure failed");

        handler.ingest(AnalyticsEvent::Auction(json!({"id": 1})));
        handler.ingest(AnalyticsEvent::Auction(json!({"id": 2})));

        assert_eq!(handler.buffered_events(), 2);
    }

    #[tokio::test]
    async fn test_flush_empty_buffer_succeeds() {
        let handler = handler(10);
        handler.flush().await.expect("flush of empty buffer failed");
    }

    #[tokio::test]
    async fn test_flush_without_endpoint_drops_batch() {
        let handler = handler(10);
        handler.lock_state().enabled = true;
        handler.ingest(AnalyticsEvent::Amp(json!({})));
        assert_eq!(handler.buffered_events(), 1);

        handler.flush().await.expect("flush failed");

        assert_eq!(handler.buffered_events(), 0);
    }

    #[tokio::test]
    async fn test_full_buffer_schedules_single_flush() {
        let handler = handler(1);
        handler.lock_state().enabled = true;

        handler.ingest(AnalyticsEvent::Auction(json!({"id": 1})));
        assert!(handler.lock_state().flush_pending);

        // further ingests wait for the scheduled flush instead of spawning their own
        handler.ingest(AnalyticsEvent::Auction(json!({"id": 2})));
        handler.ingest(AnalyticsEvent::Auction(json!({"id": 3})));
        assert!(handler.lock_state().flush_pending);
        assert_eq!(handler.buffered_events(), 3);

        handler.flush().await.expect("flush failed");
        assert!(!handler.lock_state().flush_pending);
        assert_eq!(handler.buffered_events(), 0);

        handler.ingest(AnalyticsEvent::Auction(json!({"id": 4})));
        assert!(handler.lock_state().flush_pending);
    }

    #[test]
    fn test_full_buffer_without_runtime_keeps_events() {
        let handler = handler(1);
        handler.lock_state().enabled = true;

        handler.ingest(AnalyticsEvent::Auction(json!({"id": 1})));

        assert!(!handler.lock_state().flush_pending);
        assert_eq!(handler.buffered_events(), 1);
    }

    #[tokio::test]
    async fn test_reconfigure_disable_keeps_buffer_for_flush() {
        let handler = handler(10);
        handler
            .reconfigure(true, "http://127.0.0.1:1/intake/auction".to_string(), "s1".to_string())
            .await
            .expect("reconfigure failed");
        handler.ingest(AnalyticsEvent::Auction(json!({"id": 1})));

        handler
            .reconfigure(false, "http://127.0.0.1:1/intake/auction".to_string(), "s1".to_string())
            .await
            .expect("reconfigure failed");
        handler.ingest(AnalyticsEvent::Auction(json!({"id": 2})));

        assert!(!handler.is_enabled());
        assert_eq!(handler.buffered_events(), 1);
    }
}
