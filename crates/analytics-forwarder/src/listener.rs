// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Local UDP intake for analytics events.
//!
//! Producers send newline separated JSON objects such as
//! `{"type":"auction","payload":{...}}`. Every valid line is decoded into an
//! [`AnalyticsEvent`] and handed to the router.

use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::event::AnalyticsEvent;
use crate::router::EventRouter;

// Max size of a single datagram we accept
const BUFFER_SIZE: usize = 65_507;

/// Configuration for the event listener
pub struct EventListenerConfig {
    /// Host to bind UDP socket to (e.g., "127.0.0.1")
    pub host: String,
    /// Port to bind UDP socket to (e.g., 8126)
    pub port: u16,
}

enum BufferReader {
    UdpSocket(tokio::net::UdpSocket),

    /// Mirror reader for testing - replays a fixed buffer
    #[allow(dead_code)]
    MirrorTest(Vec<u8>, SocketAddr),
}

impl BufferReader {
    async fn read(&self) -> std::io::Result<(Vec<u8>, SocketAddr)> {
        match self {
            BufferReader::UdpSocket(socket) => {
                let mut buf = vec![0; BUFFER_SIZE];
                let (amt, src) = socket.recv_from(&mut buf).await?;
                buf.truncate(amt);
                Ok((buf, src))
            }
            BufferReader::MirrorTest(data, src) => Ok((data.clone(), *src)),
        }
    }
}

/// Receives events over UDP and routes them until cancelled.
pub struct EventListener {
    cancel_token: CancellationToken,
    router: EventRouter,
    buffer_reader: BufferReader,
}

impl EventListener {
    pub async fn new(
        config: &EventListenerConfig,
        router: EventRouter,
        cancel_token: CancellationToken,
    ) -> std::io::Result<EventListener> {
        let addr = format!("{}:{}", config.host, config.port);
        let socket = tokio::net::UdpSocket::bind(addr).await?;
        Ok(EventListener {
            cancel_token,
            router,
            buffer_reader: BufferReader::UdpSocket(socket),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.buffer_reader {
            BufferReader::UdpSocket(socket) => socket.local_addr().ok(),
            BufferReader::MirrorTest(_, _) => None,
        }
    }

    /// Main loop, returns once the cancel token fires.
    pub async fn spin(self) {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!("Event listener cancelled");
                    break;
                }
                _ = self.consume_events() => {}
            }
        }
    }

    async fn consume_events(&self) {
        let (buf, src) = match self.buffer_reader.read().await {
            Ok(read) => read,
            Err(e) => {
                error!("Failed to receive events: {e}");
                return;
            }
        };
        let msgs = match std::str::from_utf8(&buf) {
            Ok(msgs) => msgs,
            Err(e) => {
                error!("Dropping non UTF-8 datagram from {src}: {e}");
                return;
            }
        };
        trace!("Received message: {} from {}", msgs, src);
        self.route_events(msgs);
    }

    fn route_events(&self, msgs: &str) {
        let mut routed = 0;
        for line in msgs.lines().map(str::trim).filter(|line| !line.is_empty()) {
            match serde_json::from_str::<AnalyticsEvent>(line) {
                Ok(event) => {
                    self.router.route(event);
                    routed += 1;
                }
                Err(e) => error!("Failed to parse event {}: {}", line, e),
            }
        }
        if routed > 0 {
            debug!("Routed {routed} events");
        }
    }
}
