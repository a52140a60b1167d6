// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Keeps the event handlers in sync with the remote analytics configuration.
//!
//! The service task is the only owner of the current configuration and the only caller of
//! handler `flush`/`reconfigure`. Fetches run on their own tasks and report back through the
//! service channel, so overlapping fetches never race on the configuration.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::client::ConfigClient;
use crate::errors::{ForwarderError, RefreshError};
use crate::handler::EventHandlers;
use crate::remote_config::{decode_response, RemoteConfig};

/// Result of one refresh cycle.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The fetched configuration equals the current one.
    Unchanged,
    /// Handlers were flushed and reconfigured with the fetched configuration.
    Applied,
    /// A newer fetch already settled, the result was discarded.
    Stale,
    Failed(RefreshError),
}

#[derive(Debug)]
pub(crate) enum RefresherCommand {
    Refresh(Option<oneshot::Sender<RefreshOutcome>>),
    Fetched {
        generation: u64,
        result: Result<RemoteConfig, RefreshError>,
        response_tx: Option<oneshot::Sender<RefreshOutcome>>,
    },
    GetConfig(oneshot::Sender<RemoteConfig>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Clone, Debug)]
pub struct RefresherHandle {
    tx: mpsc::UnboundedSender<RefresherCommand>,
}

impl RefresherHandle {
    /// Starts a refresh cycle without waiting for it.
    pub fn refresh(&self) -> Result<(), ForwarderError> {
        self.tx
            .send(RefresherCommand::Refresh(None))
            .map_err(|_| ForwarderError::ServiceStopped)
    }

    /// Starts a refresh cycle and waits until its fetch has been handled.
    pub async fn refresh_and_wait(&self) -> Result<RefreshOutcome, ForwarderError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(RefresherCommand::Refresh(Some(response_tx)))
            .map_err(|_| ForwarderError::ServiceStopped)?;
        response_rx.await.map_err(|_| ForwarderError::ServiceStopped)
    }

    pub async fn current_config(&self) -> Result<RemoteConfig, ForwarderError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(RefresherCommand::GetConfig(response_tx))
            .map_err(|_| ForwarderError::ServiceStopped)?;
        response_rx.await.map_err(|_| ForwarderError::ServiceStopped)
    }

    /// Flushes every handler, then stops the service. Fetches still in flight are dropped
    /// when they complete.
    pub async fn shutdown(&self) -> Result<(), ForwarderError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(RefresherCommand::Shutdown(response_tx))
            .map_err(|_| ForwarderError::ServiceStopped)?;
        response_rx.await.map_err(|_| ForwarderError::ServiceStopped)
    }
}

pub struct RefresherService {
    current_config: RemoteConfig,
    handlers: Arc<EventHandlers>,
    client: Arc<dyn ConfigClient>,
    timeout: Duration,
    // Weak so that the service ends once every handle is gone.
    fetch_tx: mpsc::WeakUnboundedSender<RefresherCommand>,
    rx: mpsc::UnboundedReceiver<RefresherCommand>,
    next_generation: u64,
    settled_generation: u64,
}

impl RefresherService {
    pub fn new(
        initial_config: RemoteConfig,
        handlers: Arc<EventHandlers>,
        client: Arc<dyn ConfigClient>,
        timeout: Duration,
    ) -> (Self, RefresherHandle) {
        let (tx, rx) = mpsc::unbounded_channel();

        let service = Self {
            current_config: initial_config,
            handlers,
            client,
            timeout,
            fetch_tx: tx.downgrade(),
            rx,
            next_generation: 0,
            settled_generation: 0,
        };

        let handle = RefresherHandle { tx };

        (service, handle)
    }

    pub async fn run(mut self) {
        debug!("Refresher service started");

        while let Some(command) = self.rx.recv().await {
            match command {
                RefresherCommand::Refresh(response_tx) => self.start_fetch(response_tx),

                RefresherCommand::Fetched {
                    generation,
                    result,
                    response_tx,
                } => {
                    let outcome = self.on_fetched(generation, result).await;
                    if let Some(response_tx) = response_tx {
                        if response_tx.send(outcome).is_err() {
                            debug!("Refresh outcome receiver dropped");
                        }
                    }
                }

                RefresherCommand::GetConfig(response_tx) => {
                    if response_tx.send(self.current_config.clone()).is_err() {
                        error!("Failed to send current config - receiver dropped");
                    }
                }

                RefresherCommand::Shutdown(response_tx) => {
                    debug!("Refresher service shutting down");
                    self.handlers.flush_all().await;
                    if response_tx.send(()).is_err() {
                        debug!("Shutdown response receiver dropped");
                    }
                    break;
                }
            }
        }

        debug!("Refresher service stopped");
    }

    fn start_fetch(&mut self, response_tx: Option<oneshot::Sender<RefreshOutcome>>) {
        info!(
            "analytics-config: Updating config: {:?}",
            self.current_config
        );

        let url = match self.current_config.config_url() {
            Ok(url) => url,
            Err(e) => {
                error!("analytics-config: {e}");
                if let Some(response_tx) = response_tx {
                    if response_tx.send(RefreshOutcome::Failed(e)).is_err() {
                        debug!("Refresh outcome receiver dropped");
                    }
                }
                return;
            }
        };

        self.next_generation += 1;
        let generation = self.next_generation;
        let client = Arc::clone(&self.client);
        let timeout = self.timeout;
        let fetch_tx = self.fetch_tx.clone();

        tokio::spawn(async move {
            let result = match client.get(&url, timeout).await {
                Ok(response) => decode_response(response),
                Err(e) => Err(RefreshError::Transport(e.to_string())),
            };
            let delivered = fetch_tx.upgrade().is_some_and(|tx| {
                tx.send(RefresherCommand::Fetched {
                    generation,
                    result,
                    response_tx,
                })
                .is_ok()
            });
            if !delivered {
                debug!("analytics-config: Refresher stopped before fetch {generation} completed");
            }
        });
    }

    async fn on_fetched(
        &mut self,
        generation: u64,
        result: Result<RemoteConfig, RefreshError>,
    ) -> RefreshOutcome {
        let config = match result {
            Ok(config) => config,
            Err(e) => {
                error!("analytics-config: Fail to fetch remote configuration: {e}");
                return RefreshOutcome::Failed(e);
            }
        };

        if generation < self.settled_generation {
            debug!(
                "analytics-config: Discarding fetch {generation}, fetch {} already settled",
                self.settled_generation
            );
            return RefreshOutcome::Stale;
        }

        if config == self.current_config {
            self.settled_generation = generation;
            debug!("analytics-config: Remote configuration unchanged");
            return RefreshOutcome::Unchanged;
        }

        // Every report url is built up front so a bad endpoint aborts before any handler call.
        let mut updates = Vec::with_capacity(self.handlers.len());
        for (category, handler) in self.handlers.iter() {
            match config.event_report_url(category) {
                Ok(endpoint) => updates.push((
                    category,
                    Arc::clone(handler),
                    config.is_enabled(category),
                    endpoint,
                )),
                Err(e) => {
                    error!("analytics-config: {e}");
                    return RefreshOutcome::Failed(e);
                }
            }
        }
        self.settled_generation = generation;

        self.handlers.flush_all().await;
        for (category, handler, enabled, endpoint) in updates {
            debug!("analytics-config: Reconfiguring {category} handler, enabled: {enabled}, endpoint: {endpoint}");
            if let Err(e) = handler
                .reconfigure(enabled, endpoint, config.scope_id.clone())
                .await
            {
                warn!("Failed to reconfigure {category} event handler: {e}");
            }
        }

        info!("analytics-config: Applied remote configuration: {:?}", config);
        self.current_config = config;
        RefreshOutcome::Applied
    }
}
