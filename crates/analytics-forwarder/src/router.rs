// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use tracing::trace;

use crate::event::{AnalyticsEvent, EventTypeRegistry};
use crate::handler::EventHandlers;

/// Forwards each event to the handler of its category. Cheap to clone and safe to share
/// between producers.
#[derive(Clone, Debug)]
pub struct EventRouter {
    registry: Arc<EventTypeRegistry>,
    handlers: Arc<EventHandlers>,
}

impl EventRouter {
    pub fn new(registry: Arc<EventTypeRegistry>, handlers: Arc<EventHandlers>) -> Self {
        Self { registry, handlers }
    }

    /// Events without a category, or whose category has no handler, are dropped.
    pub fn route(&self, event: AnalyticsEvent) {
        let Some(category) = self.registry.classify(&event) else {
            trace!("Dropping {:?} event: no analytics category", event.kind());
            return;
        };
        match self.handlers.get(category) {
            Some(handler) => handler.ingest(event),
            None => trace!("Dropping {category} event: no handler registered"),
        }
    }
}
