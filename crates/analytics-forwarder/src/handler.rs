// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::errors::HandlerError;
use crate::event::{AnalyticsEvent, EventCategory};

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Accepts one event of the category the handler is registered for. Called concurrently
    /// by every producer.
    fn ingest(&self, event: AnalyticsEvent);

    /// Pushes out anything buffered. Flushing an empty buffer succeeds.
    async fn flush(&self) -> Result<(), HandlerError>;

    /// Atomically replaces the enabled flag, report endpoint and scope id. Must apply to every
    /// ingest and flush that happens after it returns.
    async fn reconfigure(
        &self,
        enabled: bool,
        endpoint: String,
        scope_id: String,
    ) -> Result<(), HandlerError>;
}

/// The handler of each category, fixed for the lifetime of the process.
#[derive(Clone, Default)]
pub struct EventHandlers {
    handlers: HashMap<EventCategory, Arc<dyn EventHandler>>,
}

impl EventHandlers {
    pub fn new(handlers: HashMap<EventCategory, Arc<dyn EventHandler>>) -> Self {
        Self { handlers }
    }

    pub fn get(&self, category: EventCategory) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(&category)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventCategory, &Arc<dyn EventHandler>)> {
        self.handlers
            .iter()
            .map(|(category, handler)| (*category, handler))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Flushes every handler. A failing handler is logged and does not prevent the others from
    /// being flushed.
    pub async fn flush_all(&self) {
        for (category, handler) in &self.handlers {
            if let Err(e) = handler.flush().await {
                warn!("Failed to flush {category} event handler: {e}");
            }
        }
    }
}

impl FromIterator<(EventCategory, Arc<dyn EventHandler>)> for EventHandlers {
    fn from_iter<T: IntoIterator<Item = (EventCategory, Arc<dyn EventHandler>)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut categories: Vec<_> = self.handlers.keys().collect();
        categories.sort();
        f.debug_struct("EventHandlers")
            .field("categories", &categories)
            .finish()
    }
}

/// Recording handler shared by the unit tests of this crate.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Ingest(AnalyticsEvent),
        Flush,
        Reconfigure {
            enabled: bool,
            endpoint: String,
            scope_id: String,
        },
    }

    /// Log of calls made on every handler, in global order, tagged with the handler's category.
    pub type CallLog = Arc<Mutex<Vec<(EventCategory, Call)>>>;

    pub struct RecordingHandler {
        category: EventCategory,
        log: CallLog,
        fail: bool,
    }

    impl RecordingHandler {
        pub fn new(category: EventCategory, log: CallLog) -> Self {
            Self {
                category,
                log,
                fail: false,
            }
        }

        pub fn failing(category: EventCategory, log: CallLog) -> Self {
            Self {
                category,
                log,
                fail: true,
            }
        }

        fn record(&self, call: Call) {
            self.log.lock().unwrap().push((self.category, call));
        }
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        fn ingest(&self, event: AnalyticsEvent) {
            self.record(Call::Ingest(event));
        }

        async fn flush(&self) -> Result<(), HandlerError> {
            self.record(Call::Flush);
            if self.fail {
                return Err(HandlerError::Status {
                    status: 500,
                    body: "flush failed".to_string(),
                });
            }
            Ok(())
        }

        async fn reconfigure(
            &self,
            enabled: bool,
            endpoint: String,
            scope_id: String,
        ) -> Result<(), HandlerError> {
            self.record(Call::Reconfigure {
                enabled,
                endpoint,
                scope_id,
            });
            if self.fail {
                return Err(HandlerError::Status {
                    status: 500,
                    body: "reconfigure failed".to_string(),
                });
            }
            Ok(())
        }
    }

    /// One recording handler per category, all writing into the returned log.
    pub fn recording_handlers(categories: &[EventCategory]) -> (EventHandlers, CallLog) {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let handlers = categories
            .iter()
            .map(|category| {
                let handler: Arc<dyn EventHandler> =
                    Arc::new(RecordingHandler::new(*category, Arc::clone(&log)));
                (*category, handler)
            })
            .collect();
        (handlers, log)
    }

    pub fn calls(log: &CallLog) -> Vec<(EventCategory, Call)> {
        log.lock().unwrap().clone()
    }
}
