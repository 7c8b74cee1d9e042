//! Iteration producers.
//!
//! Each request for the iteration protocol returns a fresh cursor holding
//! only a bounded counter. Cursors share nothing with each other or with
//! the adapter, so concurrent iterations cannot disturb one another and an
//! abandoned cursor needs no release.

use std::iter::FusedIterator;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use futures::stream::FusedStream;

use crate::journal::{EVENT_ITERATE_ASYNC, EVENT_ITERATE_SYNC, InteractionJournal};
use crate::protocol::ProtocolId;
use crate::value::AdapterValue;

pub const ITERATION_COMPONENT: &str = "adapter_iteration";

/// Number of elements every cursor yields.
pub const ITERATION_LENGTH: u8 = 3;

/// Element at 1-based position `index`.
fn element(index: u8) -> AdapterValue {
    AdapterValue::Str(format!("✨ {index}"))
}

fn remaining(produced: u8) -> usize {
    usize::from(ITERATION_LENGTH.saturating_sub(produced))
}

// ---------------------------------------------------------------------------
// Synchronous
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct IterationProducer {
    journal: InteractionJournal,
}

impl IterationProducer {
    pub(crate) fn new(journal: InteractionJournal) -> Self {
        Self { journal }
    }

    pub fn produce(&self) -> IterationCursor {
        self.journal.record(
            ITERATION_COMPONENT,
            EVENT_ITERATE_SYNC,
            "started",
            ProtocolId::SyncIterate.name(),
            "",
        );
        IterationCursor::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationCursor {
    produced: u8,
}

impl IterationCursor {
    pub fn produced(&self) -> u8 {
        self.produced
    }

    pub fn is_exhausted(&self) -> bool {
        self.produced >= ITERATION_LENGTH
    }
}

impl Iterator for IterationCursor {
    type Item = AdapterValue;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_exhausted() {
            return None;
        }
        self.produced += 1;
        Some(element(self.produced))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = remaining(self.produced);
        (n, Some(n))
    }
}

impl ExactSizeIterator for IterationCursor {}

impl FusedIterator for IterationCursor {}

// ---------------------------------------------------------------------------
// Asynchronous
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AsyncIterationProducer {
    journal: InteractionJournal,
}

impl AsyncIterationProducer {
    pub(crate) fn new(journal: InteractionJournal) -> Self {
        Self { journal }
    }

    pub fn produce(&self) -> AsyncIterationCursor {
        self.journal.record(
            ITERATION_COMPONENT,
            EVENT_ITERATE_ASYNC,
            "started",
            ProtocolId::AsyncIterate.name(),
            "",
        );
        AsyncIterationCursor::default()
    }
}

/// Stream of the same elements as [`IterationCursor`], where every element
/// is preceded by exactly one `Pending` poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsyncIterationCursor {
    produced: u8,
    suspended: bool,
    suspensions: u32,
}

impl AsyncIterationCursor {
    pub fn produced(&self) -> u8 {
        self.produced
    }

    /// How many times the cursor has yielded `Pending` so far.
    pub fn suspensions(&self) -> u32 {
        self.suspensions
    }
}

impl Stream for AsyncIterationCursor {
    type Item = AdapterValue;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.produced >= ITERATION_LENGTH {
            return Poll::Ready(None);
        }
        if !self.suspended {
            self.suspended = true;
            self.suspensions += 1;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        self.suspended = false;
        self.produced += 1;
        Poll::Ready(Some(element(self.produced)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = remaining(self.produced);
        (n, Some(n))
    }
}

impl FusedStream for AsyncIterationCursor {
    fn is_terminated(&self) -> bool {
        self.produced >= ITERATION_LENGTH
    }
}
