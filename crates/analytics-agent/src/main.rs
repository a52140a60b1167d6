// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use analytics_forwarder::{
    client::{build_client, HttpClient, ReqwestConfigClient},
    config::ForwarderConfig,
    event::EventCategory,
    forwarder::{AnalyticsForwarder, ForwarderOptions},
    handler::{EventHandler, EventHandlers},
    intake::IntakeEventHandler,
    listener::{EventListener, EventListenerConfig},
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
pub async fn main() {
    let config = match ForwarderConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error creating config on analytics agent startup: {e}");
            return;
        }
    };

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", config.log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let http_client = build_client(config.https_proxy.as_deref()).unwrap_or_else(|e| {
        error!(
            "Unable to parse proxy configuration: {}, no proxy will be used",
            e
        );
        HttpClient::new()
    });

    let handlers: EventHandlers = EventCategory::ALL
        .into_iter()
        .map(|category| {
            let handler: Arc<dyn EventHandler> = Arc::new(IntakeEventHandler::new(
                category,
                http_client.clone(),
                config.timeout,
                config.intake_limits(),
            ));
            (category, handler)
        })
        .collect();

    let mut forwarder = AnalyticsForwarder::new(
        ForwarderOptions {
            scope_id: config.scope_id.clone(),
            endpoint: config.endpoint.clone(),
            configuration_refresh_delay: config.configuration_refresh_delay,
            timeout: config.timeout,
        },
        handlers,
        Arc::new(ReqwestConfigClient::from_client(http_client)),
    );

    if let Err(e) = forwarder.start() {
        error!("Error when starting analytics forwarder: {e}");
        return;
    }

    let listener_cancel_token = CancellationToken::new();
    let listener = match EventListener::new(
        &EventListenerConfig {
            host: config.listener_host.clone(),
            port: config.listener_port,
        },
        forwarder.router(),
        listener_cancel_token.clone(),
    )
    .await
    {
        Ok(listener) => listener,
        Err(e) => {
            error!(
                "Unable to bind event listener to {}:{}: {e}",
                config.listener_host, config.listener_port
            );
            forwarder.stop().await;
            return;
        }
    };
    info!(
        "analytics-udp: starting to listen on port {}",
        config.listener_port
    );
    let listener_task = tokio::spawn(listener.spin());

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal: {e}");
    }

    info!("Shutting down analytics agent");
    listener_cancel_token.cancel();
    if let Err(e) = listener_task.await {
        error!("Event listener task failed: {e}");
    }
    forwarder.stop().await;
}
