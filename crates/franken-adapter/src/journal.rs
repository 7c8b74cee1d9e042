//! Interaction journal: the structured record of every observable side
//! effect an adapter produces.
//!
//! Events are sequence-numbered and carry the adapter's trace id, the
//! emitting component, the event name, an outcome and an error code, in the
//! same shape as the engine's other event streams. The journal is a cheap
//! cloneable handle so protocol handlers that outlive a dispatcher borrow
//! still record into their owning adapter.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{AdapterError, NO_ERROR};

pub const EVENT_FALLBACK_READ: &str = "fallback_read";
pub const EVENT_ATTRIBUTE_WRITE: &str = "attribute_write";
pub const EVENT_INVOKE: &str = "invoke";
pub const EVENT_PROTOCOL_DISPATCH: &str = "protocol_dispatch";
pub const EVENT_DEFERRED_RESOLVE: &str = "deferred_resolve";
pub const EVENT_DEFERRED_CATCH: &str = "deferred_catch";
pub const EVENT_DEFERRED_FINALLY: &str = "deferred_finally";
pub const EVENT_ITERATE_SYNC: &str = "iterate_sync";
pub const EVENT_ITERATE_ASYNC: &str = "iterate_async";
pub const EVENT_COERCE_TO_PRIMITIVE: &str = "coerce_to_primitive";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub seq: u64,
    pub trace_id: String,
    pub component: String,
    pub event: String,
    pub outcome: String,
    pub error_code: String,
    pub key: String,
    pub detail: String,
}

/// Events retained by default before the oldest are dropped.
pub const DEFAULT_MAX_EVENTS: usize = 10_000;

#[derive(Debug)]
struct JournalState {
    events: VecDeque<InteractionEvent>,
    max_events: usize,
    next_seq: u64,
    /// Per-event totals since creation, trimmed events included.
    totals: BTreeMap<String, u64>,
}

impl Default for JournalState {
    fn default() -> Self {
        Self {
            events: VecDeque::new(),
            max_events: DEFAULT_MAX_EVENTS,
            next_seq: 0,
            totals: BTreeMap::new(),
        }
    }
}

/// Bounded event log. Only the newest `max_events` events are retained;
/// [`InteractionJournal::count`] and [`InteractionJournal::total_recorded`]
/// stay exact across trimming.
#[derive(Debug, Clone)]
pub struct InteractionJournal {
    trace_id: Arc<str>,
    state: Arc<Mutex<JournalState>>,
}

impl InteractionJournal {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: Arc::from(trace_id.into()),
            state: Arc::new(Mutex::new(JournalState::default())),
        }
    }

    /// Cap the retained events. `0` keeps the counters only.
    pub fn with_max_events(self, max_events: usize) -> Self {
        {
            let mut state = self.lock();
            state.max_events = max_events;
            trim(&mut state);
        }
        self
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn max_events(&self) -> usize {
        self.lock().max_events
    }

    // Every mutation is a push, a pop or a counter bump, so a panic while
    // the lock was held cannot leave the state half-written.
    fn lock(&self) -> MutexGuard<'_, JournalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(
        &self,
        component: &str,
        event: &str,
        outcome: &str,
        key: impl Into<String>,
        detail: impl Into<String>,
    ) -> u64 {
        let mut guard = self.lock();
        let state = &mut *guard;
        let seq = state.next_seq;
        state.events.push_back(InteractionEvent {
            seq,
            trace_id: self.trace_id.to_string(),
            component: component.to_string(),
            event: event.to_string(),
            outcome: outcome.to_string(),
            error_code: NO_ERROR.to_string(),
            key: key.into(),
            detail: detail.into(),
        });
        state.next_seq = state.next_seq.saturating_add(1);
        match state.totals.get_mut(event) {
            Some(total) => *total = total.saturating_add(1),
            None => {
                state.totals.insert(event.to_string(), 1);
            }
        }
        trim(state);
        seq
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> Vec<InteractionEvent> {
        self.lock().events.iter().cloned().collect()
    }

    pub fn events_for(&self, event: &str) -> Vec<InteractionEvent> {
        self.lock()
            .events
            .iter()
            .filter(|e| e.event == event)
            .cloned()
            .collect()
    }

    /// How many `event`s were ever recorded, retained or not.
    pub fn count(&self, event: &str) -> usize {
        let total = self.lock().totals.get(event).copied().unwrap_or(0);
        usize::try_from(total).unwrap_or(usize::MAX)
    }

    pub fn totals(&self) -> BTreeMap<String, u64> {
        self.lock().totals.clone()
    }

    pub fn total_recorded(&self) -> u64 {
        self.lock().next_seq
    }

    /// Events trimmed from the front of the log.
    pub fn dropped(&self) -> u64 {
        let state = self.lock();
        state.next_seq - state.events.len() as u64
    }

    /// Retained events.
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// One JSON object per line, in sequence order.
    pub fn to_json_lines(&self) -> Result<String, AdapterError> {
        let state = self.lock();
        let mut out = String::new();
        for event in &state.events {
            let line = serde_json::to_string(event)
                .map_err(|error| AdapterError::JournalEncode(error.to_string()))?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }
}

fn trim(state: &mut JournalState) {
    while state.events.len() > state.max_events {
        state.events.pop_front();
    }
}
