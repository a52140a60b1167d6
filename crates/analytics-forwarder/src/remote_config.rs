// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Remote analytics configuration and the urls derived from it.

use crate::client::ConfigResponse;
use crate::constants::{CONFIG_URL_SUFFIX, EVENT_REPORT_ENDPOINT_PATH};
use crate::errors::RefreshError;
use crate::event::EventCategory;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::trace;
use url::Url;

/// Snapshot of the remote configuration. Two snapshots are considered the same configuration
/// iff they compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    pub scope_id: String,
    pub endpoint: String,
    #[serde(default, deserialize_with = "deserialize_features")]
    pub features: BTreeMap<EventCategory, bool>,
}

impl RemoteConfig {
    pub fn new(scope_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
            endpoint: endpoint.into(),
            features: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_feature(mut self, category: EventCategory, enabled: bool) -> Self {
        self.features.insert(category, enabled);
        self
    }

    /// Categories missing from `features` are disabled.
    pub fn is_enabled(&self, category: EventCategory) -> bool {
        self.features.get(&category).copied().unwrap_or(false)
    }

    /// Url the remote configuration is fetched from.
    pub fn config_url(&self) -> Result<String, RefreshError> {
        validate_url(
            format!("{}{}{}", self.endpoint, CONFIG_URL_SUFFIX, self.scope_id),
            "remote config server",
            &self.endpoint,
        )
    }

    /// Url events of `category` are reported to.
    pub fn event_report_url(&self, category: EventCategory) -> Result<String, RefreshError> {
        validate_url(
            format!(
                "{}{}/{}",
                self.endpoint,
                EVENT_REPORT_ENDPOINT_PATH,
                category.name()
            ),
            "event report",
            &self.endpoint,
        )
    }
}

fn validate_url(url: String, kind: &'static str, endpoint: &str) -> Result<String, RefreshError> {
    match Url::parse(&url) {
        Ok(_) => Ok(url),
        Err(source) => Err(RefreshError::InvalidUrl {
            kind,
            endpoint: endpoint.to_string(),
            source,
        }),
    }
}

/// A missing or null `features` object and null values decode as disabled. Keys naming
/// categories this build does not know are skipped.
fn deserialize_features<'de, D>(deserializer: D) -> Result<BTreeMap<EventCategory, bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<HashMap<String, Option<bool>>> = Option::deserialize(deserializer)?;
    let mut features = BTreeMap::new();
    for (key, value) in raw.unwrap_or_default() {
        match (key.parse::<EventCategory>(), value) {
            (Ok(category), Some(enabled)) => {
                features.insert(category, enabled);
            }
            (Ok(_), None) => {}
            (Err(_), _) => trace!("Ignoring unknown analytics feature: {key}"),
        }
    }
    Ok(features)
}

/// Turns a raw fetch response into a configuration. Only status 200 is accepted.
pub fn decode_response(response: ConfigResponse) -> Result<RemoteConfig, RefreshError> {
    if response.status != 200 {
        return Err(RefreshError::Status(response.status));
    }
    serde_json::from_str(&response.body).map_err(|source| RefreshError::Decode {
        body: response.body,
        source,
    })
}
