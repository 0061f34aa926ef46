//! Records mutation and query lifecycle events so the optimistic flow can be inspected.

#[cfg(feature = "telemetry")]
use std::collections::VecDeque;

#[cfg(feature = "telemetry")]
use parking_lot::Mutex;

use crate::cache::{MutationId, QueryKey};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    MutationApplied { id: MutationId, action: &'static str },
    MutationCommitted { id: MutationId, action: &'static str },
    MutationRolledBack { id: MutationId, action: &'static str, error: String },
    MutationRejected { action: &'static str, error: String },
    QueryFetched { key: QueryKey },
    QueryFailed { key: QueryKey, error: String },
    /// A fetched value arrived after a newer write and was dropped.
    QueryDiscarded { key: QueryKey },
}

/// Recent events kept by a [`Handle`]; older ones are dropped first.
pub const MAX_EVENTS: usize = 1024;

#[derive(Debug, Default)]
pub struct Handle {
    #[cfg(feature = "telemetry")]
    events: Mutex<VecDeque<Event>>,
}

impl Handle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: Event) {
        #[cfg(feature = "telemetry")]
        {
            match &event {
                Event::MutationApplied { id, action } => {
                    tracing::debug!(mutation = %id, action = *action, "telemetry mutation applied")
                }
                Event::MutationCommitted { id, action } => {
                    tracing::debug!(mutation = %id, action = *action, "telemetry mutation committed")
                }
                Event::MutationRolledBack { id, action, error } => tracing::debug!(
                    mutation = %id,
                    action = *action,
                    error = error.as_str(),
                    "telemetry mutation rolled back"
                ),
                Event::MutationRejected { action, error } => tracing::debug!(
                    action = *action,
                    error = error.as_str(),
                    "telemetry mutation rejected"
                ),
                Event::QueryFetched { key } => {
                    tracing::debug!(descriptor = %key, "telemetry query fetched")
                }
                Event::QueryFailed { key, error } => tracing::debug!(
                    descriptor = %key,
                    error = error.as_str(),
                    "telemetry query failed"
                ),
                Event::QueryDiscarded { key } => {
                    tracing::debug!(descriptor = %key, "telemetry query discarded")
                }
            }
            let mut events = self.events.lock();
            if events.len() == MAX_EVENTS {
                events.pop_front();
            }
            events.push_back(event);
        }
        #[cfg(not(feature = "telemetry"))]
        {
            let _ = event;
        }
    }

    pub fn is_enabled(&self) -> bool {
        cfg!(feature = "telemetry")
    }

    /// The last [`MAX_EVENTS`] events in order; always empty without the `telemetry` feature.
    pub fn events(&self) -> Vec<Event> {
        #[cfg(feature = "telemetry")]
        {
            self.events.lock().iter().cloned().collect()
        }
        #[cfg(not(feature = "telemetry"))]
        {
            Vec::new()
        }
    }
}
