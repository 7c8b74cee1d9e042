//! Synchronous and asynchronous iteration over an adapter.
#![forbid(unsafe_code)]

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::executor::block_on;
use futures::stream::FusedStream;
use futures::task::noop_waker;
use futures::{Stream, StreamExt};

use frankenengine_adapter::iteration::ITERATION_LENGTH;
use frankenengine_adapter::journal::{EVENT_ITERATE_ASYNC, EVENT_ITERATE_SYNC};
use frankenengine_adapter::{
    AdapterConfig, AdapterValue, AsyncIterable, Iterable, ProtocolHandler, ProtocolId,
    UniversalAdapter, create_adapter,
};

fn expected() -> Vec<AdapterValue> {
    (1..=ITERATION_LENGTH)
        .map(|i| AdapterValue::str(format!("✨ {i}")))
        .collect()
}

fn async_enabled() -> UniversalAdapter {
    create_adapter(AdapterConfig::default().with_async_iteration(true))
}

// ---------------------------------------------------------------------------
// Synchronous
// ---------------------------------------------------------------------------

#[test]
fn sync_iteration_yields_three_in_order() {
    let adapter = create_adapter(AdapterConfig::default());
    let items: Vec<_> = adapter.iterate().collect();
    assert_eq!(items, expected());
}

#[test]
fn sync_iteration_restarts_per_request() {
    let adapter = create_adapter(AdapterConfig::default());
    let first: Vec<_> = adapter.iter().collect();
    let second: Vec<_> = (&adapter).into_iter().collect();
    assert_eq!(first, second);
    assert_eq!(adapter.journal().count(EVENT_ITERATE_SYNC), 2);
}

#[test]
fn interleaved_sync_cursors_do_not_interfere() {
    let adapter = create_adapter(AdapterConfig::default());
    let mut a = adapter.iter();
    let mut b = adapter.iter();
    assert_eq!(a.next(), Some(expected()[0].clone()));
    assert_eq!(a.next(), Some(expected()[1].clone()));
    assert_eq!(b.next(), Some(expected()[0].clone()));
    assert_eq!(a.next(), Some(expected()[2].clone()));
    assert_eq!(a.next(), None);
    assert_eq!(b.next(), Some(expected()[1].clone()));
}

#[test]
fn abandoned_cursor_needs_no_release() {
    let adapter = create_adapter(AdapterConfig::default());
    for _ in 0..5 {
        let mut cursor = adapter.iter();
        let _ = cursor.next();
    }
    assert_eq!(adapter.iter().collect::<Vec<_>>(), expected());
}

#[test]
fn producer_from_read_makes_fresh_cursors() {
    let mut adapter = create_adapter(AdapterConfig::default());
    let resolution = adapter.read(ProtocolId::SyncIterate);
    let producer = resolution
        .handler()
        .and_then(ProtocolHandler::as_sync_iterate)
        .unwrap();
    assert_eq!(producer.produce().len(), 3);
    assert_eq!(producer.produce().collect::<Vec<_>>(), expected());
}

#[test]
fn sync_cursors_are_usable_from_threads() {
    let adapter = create_adapter(AdapterConfig::default());
    let cursors: Vec<_> = (0..4).map(|_| adapter.iter()).collect();
    let handles: Vec<_> = cursors
        .into_iter()
        .map(|cursor| std::thread::spawn(move || cursor.collect::<Vec<_>>()))
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected());
    }
}

// ---------------------------------------------------------------------------
// Asynchronous
// ---------------------------------------------------------------------------

#[test]
fn async_disabled_reports_absent() {
    let mut adapter = create_adapter(AdapterConfig::default());
    assert!(adapter.iterate_async().is_none());
    assert!(adapter.read(ProtocolId::AsyncIterate).is_absent());
    assert_eq!(adapter.journal().count(EVENT_ITERATE_ASYNC), 0);
}

#[test]
fn async_iteration_suspends_before_every_element() {
    let adapter = async_enabled();
    let mut cursor = adapter.iter_async().unwrap();
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);

    let mut produced = Vec::new();
    let mut pending = 0;
    loop {
        match Pin::new(&mut cursor).poll_next(&mut cx) {
            Poll::Pending => pending += 1,
            Poll::Ready(Some(item)) => produced.push(item),
            Poll::Ready(None) => break,
        }
    }
    assert_eq!(produced, expected());
    assert_eq!(pending, 3);
    assert!(cursor.is_terminated());
}

#[test]
fn async_iteration_restarts_per_request() {
    let adapter = async_enabled();
    let first: Vec<_> = block_on(adapter.iter_async().unwrap().collect());
    let second: Vec<_> = block_on(adapter.iter_async().unwrap().collect());
    assert_eq!(first, expected());
    assert_eq!(second, expected());
    assert_eq!(adapter.journal().count(EVENT_ITERATE_ASYNC), 2);
}

#[test]
fn async_iteration_can_stop_early() {
    let adapter = async_enabled();
    let head: Vec<_> = block_on(adapter.iter_async().unwrap().take(2).collect());
    assert_eq!(head, expected()[..2].to_vec());
    let full: Vec<_> = block_on(adapter.iter_async().unwrap().collect());
    assert_eq!(full, expected());
}

#[test]
fn async_producer_from_read() {
    let mut adapter = async_enabled();
    let resolution = adapter.read(ProtocolId::AsyncIterate);
    let producer = resolution
        .handler()
        .and_then(ProtocolHandler::as_async_iterate)
        .unwrap();
    let items: Vec<_> = block_on(producer.produce().collect());
    assert_eq!(items, expected());
    assert_eq!(adapter.fallback_access_count(), 0);
}

#[test]
fn async_cursors_interleave_independently() {
    let adapter = async_enabled();
    let a = adapter.iter_async().unwrap();
    let b = adapter.iter_async().unwrap();
    let zipped: Vec<_> = block_on(a.zip(b).collect());
    assert_eq!(zipped.len(), 3);
    for ((left, right), want) in zipped.into_iter().zip(expected()) {
        assert_eq!(left, want);
        assert_eq!(right, want);
    }
}
