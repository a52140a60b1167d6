// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the analytics forwarder.

/// Reasons a configuration refresh cycle can fail. None of them stop the refresh loop.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("Failed to fetch config, reason: {0}")]
    Transport(String),

    #[error("Failed to fetch config, reason: HTTP status code {0}")]
    Status(u16),

    #[error("Failed to fetch config, reason: failed to parse response: {body}")]
    Decode {
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to create {kind} url for endpoint: {endpoint}")]
    InvalidUrl {
        kind: &'static str,
        endpoint: String,
        #[source]
        source: url::ParseError,
    },
}

/// Errors surfaced by an event handler while flushing or applying a new configuration.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Failed to send events: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Event intake responded with HTTP status code {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to serialize events: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors returned when the forwarder lifecycle is misused.
#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("Forwarder already started")]
    AlreadyStarted,

    #[error("Forwarder already stopped")]
    Stopped,

    #[error("Refresher service is not running")]
    ServiceStopped,
}

/// Errors raised while reading the forwarder configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
