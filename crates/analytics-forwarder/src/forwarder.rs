// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::client::ConfigClient;
use crate::errors::ForwarderError;
use crate::event::EventTypeRegistry;
use crate::handler::EventHandlers;
use crate::refresher_service::{RefresherHandle, RefresherService};
use crate::remote_config::RemoteConfig;
use crate::router::EventRouter;

pub struct ForwarderOptions {
    pub scope_id: String,
    pub endpoint: String,
    pub configuration_refresh_delay: Duration,
    pub timeout: Duration,
}

/// Owns the refresh schedule of the remote configuration and the shutdown of the handlers.
pub struct AnalyticsForwarder {
    router: EventRouter,
    handlers: Arc<EventHandlers>,
    refresh_delay: Duration,
    service: Option<RefresherService>,
    refresher: RefresherHandle,
    cancel_token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl AnalyticsForwarder {
    pub fn new(
        options: ForwarderOptions,
        handlers: EventHandlers,
        client: Arc<dyn ConfigClient>,
    ) -> Self {
        Self::with_registry(options, EventTypeRegistry::default(), handlers, client)
    }

    pub fn with_registry(
        options: ForwarderOptions,
        registry: EventTypeRegistry,
        handlers: EventHandlers,
        client: Arc<dyn ConfigClient>,
    ) -> Self {
        let handlers = Arc::new(handlers);
        let (service, refresher) = RefresherService::new(
            RemoteConfig::new(options.scope_id, options.endpoint),
            Arc::clone(&handlers),
            client,
            options.timeout,
        );
        AnalyticsForwarder {
            router: EventRouter::new(Arc::new(registry), Arc::clone(&handlers)),
            handlers,
            refresh_delay: options.configuration_refresh_delay,
            service: Some(service),
            refresher,
            cancel_token: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Router producers hand their events to.
    pub fn router(&self) -> EventRouter {
        self.router.clone()
    }

    pub fn refresher(&self) -> &RefresherHandle {
        &self.refresher
    }

    /// Fetches the remote configuration right away, then once per refresh delay. The first
    /// periodic fetch happens one full delay after start.
    pub fn start(&mut self) -> Result<(), ForwarderError> {
        if self.cancel_token.is_cancelled() {
            return Err(ForwarderError::Stopped);
        }
        let service = self.service.take().ok_or(ForwarderError::AlreadyStarted)?;
        self.tasks.push(tokio::spawn(service.run()));

        self.refresher.refresh()?;

        let refresher = self.refresher.clone();
        let cancel_token = self.cancel_token.clone();
        let period = self.refresh_delay;
        self.tasks.push(tokio::spawn(async move {
            let mut refresh_interval = interval_at(Instant::now() + period, period);
            refresh_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = refresh_interval.tick() => {
                        if refresher.refresh().is_err() {
                            error!("Refresher service stopped, no more config refreshes");
                            break;
                        }
                    }
                }
            }
            debug!("Config refresh schedule stopped");
        }));

        Ok(())
    }

    /// Stops the refresh schedule and flushes every handler. Safe to call before `start` and
    /// more than once. A stopped forwarder cannot be started again.
    pub async fn stop(&mut self) {
        self.cancel_token.cancel();

        let never_started = self.service.take().is_some();
        if never_started || self.refresher.shutdown().await.is_err() {
            self.handlers.flush_all().await;
        }

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                error!("Forwarder task failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventCategory;
    use crate::handler::test_support::*;
    use crate::refresher_service::test_support::*;

    const PERIOD: Duration = Duration::from_secs(10);

    fn forwarder(client: Arc<ScriptedClient>) -> (AnalyticsForwarder, CallLog) {
        let (handlers, log) = recording_handlers(&EventCategory::ALL);
        let forwarder = AnalyticsForwarder::new(
            ForwarderOptions {
                scope_id: "s1".to_string(),
                endpoint: "https://cfg".to_string(),
                configuration_refresh_delay: PERIOD,
                timeout: Duration::from_secs(1),
            },
            handlers,
            client,
        );
        (forwarder, log)
    }

    async fn wait_for_fetches(client: &ScriptedClient, count: usize) {
        while client.urls().len() < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_fetches_immediately_then_every_period() {
        let client = Arc::new(ScriptedClient::default());
        let (mut forwarder, _log) = forwarder(Arc::clone(&client));

        forwarder.start().expect("failed to start");
        wait_for_fetches(&client, 1).await;

        tokio::time::sleep(PERIOD - Duration::from_secs(1)).await;
        assert_eq!(client.urls().len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        wait_for_fetches(&client, 2).await;

        tokio::time::sleep(PERIOD).await;
        wait_for_fetches(&client, 3).await;

        forwarder.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_applies_remote_config_on_start() {
        let client = Arc::new(ScriptedClient::new([ok(
            r#"{"scopeId":"s1","endpoint":"https://cfg","features":{"auction":true}}"#,
        )]));
        let (mut forwarder, log) = forwarder(Arc::clone(&client));

        forwarder.start().expect("failed to start");
        while calls(&log).len() < 10 {
            tokio::task::yield_now().await;
        }

        let calls = calls(&log);
        let (flushes, reconfigures) = calls.split_at(5);
        assert!(flushes.iter().all(|(_, call)| *call == Call::Flush));
        assert!(reconfigures.contains(&(
            EventCategory::Auction,
            Call::Reconfigure {
                enabled: true,
                endpoint: "https://cfg/intake/auction".to_string(),
                scope_id: "s1".to_string(),
            }
        )));
        assert!(reconfigures.contains(&(
            EventCategory::Setuid,
            Call::Reconfigure {
                enabled: false,
                endpoint: "https://cfg/intake/setuid".to_string(),
                scope_id: "s1".to_string(),
            }
        )));

        forwarder.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_flushes_handlers_and_ends_refreshes() {
        let client = Arc::new(ScriptedClient::new([status(500)]));
        let (mut forwarder, log) = forwarder(Arc::clone(&client));

        forwarder.start().expect("failed to start");
        wait_for_fetches(&client, 1).await;
        forwarder.stop().await;

        let calls = calls(&log);
        assert_eq!(calls.len(), EventCategory::ALL.len());
        assert!(calls.iter().all(|(_, call)| *call == Call::Flush));

        tokio::time::sleep(PERIOD * 3).await;
        assert_eq!(client.urls().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_before_start_still_flushes() {
        let (mut forwarder, log) = forwarder(Arc::new(ScriptedClient::default()));

        forwarder.stop().await;
        forwarder.stop().await;

        assert_eq!(calls(&log).len(), 2 * EventCategory::ALL.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_after_stop_is_rejected() {
        let client = Arc::new(ScriptedClient::default());
        let (mut forwarder, _log) = forwarder(Arc::clone(&client));

        forwarder.stop().await;

        assert!(matches!(forwarder.start(), Err(ForwarderError::Stopped)));
        tokio::time::sleep(PERIOD * 2).await;
        assert!(client.urls().is_empty());
        assert!(matches!(
            forwarder.refresher().refresh(),
            Err(ForwarderError::ServiceStopped)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_running_stop_is_rejected() {
        let client = Arc::new(ScriptedClient::default());
        let (mut forwarder, _log) = forwarder(Arc::clone(&client));

        forwarder.start().expect("failed to start");
        wait_for_fetches(&client, 1).await;
        forwarder.stop().await;

        assert!(matches!(forwarder.start(), Err(ForwarderError::Stopped)));
        tokio::time::sleep(PERIOD * 2).await;
        assert_eq!(client.urls().len(), 1);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (mut forwarder, _log) = forwarder(Arc::new(ScriptedClient::default()));

        forwarder.start().expect("failed to start");
        assert!(matches!(
            forwarder.start(),
            Err(ForwarderError::AlreadyStarted)
        ));

        forwarder.stop().await;
    }

    #[tokio::test]
    async fn test_router_reaches_registered_handlers() {
        let (forwarder, log) = forwarder(Arc::new(ScriptedClient::default()));

        forwarder
            .router()
            .route(crate::event::AnalyticsEvent::Amp(serde_json::json!({})));

        assert_eq!(calls(&log).len(), 1);
    }
}
