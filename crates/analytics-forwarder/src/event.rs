// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Analytics events and their classification into handler categories.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Logical category of an analytics event. Each category is served by one event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Auction,
    Amp,
    Video,
    Setuid,
    CookieSync,
}

impl EventCategory {
    pub const ALL: [EventCategory; 5] = [
        EventCategory::Auction,
        EventCategory::Amp,
        EventCategory::Video,
        EventCategory::Setuid,
        EventCategory::CookieSync,
    ];

    /// Name used as feature key in the remote config and as path segment of the report url.
    pub fn name(self) -> &'static str {
        match self {
            EventCategory::Auction => "auction",
            EventCategory::Amp => "amp",
            EventCategory::Video => "video",
            EventCategory::Setuid => "setuid",
            EventCategory::CookieSync => "cookiesync",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EventCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventCategory::ALL
            .into_iter()
            .find(|category| category.name() == s)
            .ok_or_else(|| format!("unknown event category: {s}"))
    }
}

/// Runtime kind of an event, independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Auction,
    Amp,
    Video,
    Setuid,
    CookieSync,
    Notification,
}

/// An event produced by the server. The payload shape is owned by the producer and is
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum AnalyticsEvent {
    Auction(Value),
    Amp(Value),
    Video(Value),
    Setuid(Value),
    CookieSync(Value),
    Notification(Value),
}

impl AnalyticsEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AnalyticsEvent::Auction(_) => EventKind::Auction,
            AnalyticsEvent::Amp(_) => EventKind::Amp,
            AnalyticsEvent::Video(_) => EventKind::Video,
            AnalyticsEvent::Setuid(_) => EventKind::Setuid,
            AnalyticsEvent::CookieSync(_) => EventKind::CookieSync,
            AnalyticsEvent::Notification(_) => EventKind::Notification,
        }
    }

    pub fn payload(&self) -> &Value {
        match self {
            AnalyticsEvent::Auction(payload)
            | AnalyticsEvent::Amp(payload)
            | AnalyticsEvent::Video(payload)
            | AnalyticsEvent::Setuid(payload)
            | AnalyticsEvent::CookieSync(payload)
            | AnalyticsEvent::Notification(payload) => payload,
        }
    }

    pub fn into_payload(self) -> Value {
        match self {
            AnalyticsEvent::Auction(payload)
            | AnalyticsEvent::Amp(payload)
            | AnalyticsEvent::Video(payload)
            | AnalyticsEvent::Setuid(payload)
            | AnalyticsEvent::CookieSync(payload)
            | AnalyticsEvent::Notification(payload) => payload,
        }
    }
}

/// Immutable mapping from event kind to category.
///
/// Kinds missing from the table classify to `None`, which lets producers emit event kinds
/// that analytics does not report on yet.
#[derive(Debug, Clone)]
pub struct EventTypeRegistry {
    categories: HashMap<EventKind, EventCategory>,
}

impl Default for EventTypeRegistry {
    fn default() -> Self {
        Self::from_entries([
            (EventKind::Auction, EventCategory::Auction),
            (EventKind::Amp, EventCategory::Amp),
            (EventKind::Video, EventCategory::Video),
            (EventKind::Setuid, EventCategory::Setuid),
            (EventKind::CookieSync, EventCategory::CookieSync),
        ])
    }
}

impl EventTypeRegistry {
    pub fn from_entries(entries: impl IntoIterator<Item = (EventKind, EventCategory)>) -> Self {
        Self {
            categories: entries.into_iter().collect(),
        }
    }

    pub fn classify(&self, event: &AnalyticsEvent) -> Option<EventCategory> {
        self.categories.get(&event.kind()).copied()
    }
}
