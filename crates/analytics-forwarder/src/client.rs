// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::time::Duration;
use tracing::error;

/// HTTP client shared by the config client and the intake handlers.
pub type HttpClient = reqwest::Client;

/// Raw response of a remote configuration fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigResponse {
    pub status: u16,
    pub body: String,
}

/// Connection level failure (timeout, refused connection, broken body stream...).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Fetches the remote configuration. Implementations enforce the timeout.
#[async_trait]
pub trait ConfigClient: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<ConfigResponse, TransportError>;
}

/// `ConfigClient` backed by a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestConfigClient {
    client: HttpClient,
}

impl ReqwestConfigClient {
    pub fn new(https_proxy: Option<&str>) -> Self {
        let client = build_client(https_proxy).unwrap_or_else(|e| {
            error!(
                "Unable to parse proxy configuration: {}, no proxy will be used",
                e
            );
            HttpClient::new()
        });
        ReqwestConfigClient { client }
    }

    pub fn from_client(client: HttpClient) -> Self {
        ReqwestConfigClient { client }
    }
}

#[async_trait]
impl ConfigClient for ReqwestConfigClient {
    async fn get(&self, url: &str, timeout: Duration) -> Result<ConfigResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(ConfigResponse { status, body })
    }
}

pub fn build_client(https_proxy: Option<&str>) -> Result<HttpClient, reqwest::Error> {
    let mut builder = HttpClient::builder();
    if let Some(proxy) = https_proxy {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    builder.build()
}
