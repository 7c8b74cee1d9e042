//! The adapter handle and its dispatcher.
//!
//! Every interaction enters through one of three operations:
//!
//! - **Read**: reserved protocol identifiers are answered by the registry
//!   without touching the cache; anything else is served from the property
//!   cache, or resolved once against the target storage and memoized.
//! - **Write**: goes to the target storage and upserts the cache.
//! - **Invoke**: applies the target.
//!
//! The typed conveniences (`resolve`, `iter`, `to_primitive`, the
//! capability traits, `IntoIterator`, `IntoFuture`, `Display`) are thin
//! wrappers over the same reserved-identifier dispatch.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::Stream;
use futures::future::{Ready, ready};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::AdapterConfig;
use crate::error::AdapterError;
use crate::iteration::{
    AsyncIterationCursor, AsyncIterationProducer, IterationCursor, IterationProducer,
};
use crate::journal::{
    EVENT_ATTRIBUTE_WRITE, EVENT_FALLBACK_READ, EVENT_INVOKE, EVENT_PROTOCOL_DISPATCH,
    InteractionJournal,
};
use crate::property_cache::{CacheStats, PropertyCache};
use crate::protocol::{
    CatchHandler, Deferred, FinallyHandler, HandlerContext, ProtocolHandler, ProtocolId,
    ProtocolRegistry, TYPE_TAG, ThenHandler,
};
use crate::target::{CallRecord, InvocationTarget};
use crate::value::{AdapterValue, AttributeKey, PropertyKey, SymbolId, SymbolTable, entries_as_seq};

pub const DISPATCHER_COMPONENT: &str = "adapter_dispatcher";

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Outcome of a Read.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A reserved protocol identifier resolved to its handler.
    Handler(ProtocolHandler),
    /// An ordinary attribute; `Undefined` when unset.
    Value(AdapterValue),
}

impl Resolution {
    pub fn handler(&self) -> Option<&ProtocolHandler> {
        match self {
            Self::Handler(handler) => Some(handler),
            Self::Value(_) => None,
        }
    }

    pub fn value(&self) -> Option<&AdapterValue> {
        match self {
            Self::Handler(_) => None,
            Self::Value(value) => Some(value),
        }
    }

    pub fn into_value(self) -> Option<AdapterValue> {
        match self {
            Self::Handler(_) => None,
            Self::Value(value) => Some(value),
        }
    }

    /// An unset attribute: the value `Undefined`.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Value(AdapterValue::Undefined))
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

pub trait Callable {
    fn invoke(&mut self, args: Vec<AdapterValue>) -> AdapterValue;
}

pub trait Deferrable {
    fn then_handler(&self) -> ThenHandler;

    /// Resolve as `await` does.
    fn resolve(&self) -> Deferred {
        self.then_handler().resolve()
    }
}

pub trait Iterable {
    type Cursor: Iterator<Item = AdapterValue>;

    fn iterate(&self) -> Self::Cursor;
}

pub trait AsyncIterable {
    type Cursor: Stream<Item = AdapterValue>;

    /// `None` when the protocol is absent.
    fn iterate_async(&self) -> Option<Self::Cursor>;
}

pub trait Coercible {
    fn to_primitive(&self) -> AdapterValue;

    fn type_tag(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterSnapshot {
    pub config: AdapterConfig,
    pub protocols: Vec<ProtocolId>,
    #[serde(with = "entries_as_seq")]
    pub storage: BTreeMap<PropertyKey, AdapterValue>,
    #[serde(with = "entries_as_seq")]
    pub cached: BTreeMap<AttributeKey, AdapterValue>,
    pub call_count: u64,
    pub has_been_resolved: bool,
    pub cache_stats: CacheStats,
    /// Hex SHA-256 over the canonical JSON of every other field.
    pub state_hash: String,
}

// ---------------------------------------------------------------------------
// UniversalAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct UniversalAdapter {
    config: AdapterConfig,
    registry: ProtocolRegistry,
    target: InvocationTarget,
    cache: PropertyCache,
    symbols: SymbolTable,
    ctx: HandlerContext,
}

impl UniversalAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        let registry = ProtocolRegistry::new(config.enable_async_iteration);
        let target = InvocationTarget::new(config.target_name.clone())
            .with_max_calls(config.max_call_records);
        let ctx = HandlerContext {
            journal: InteractionJournal::new(config.trace_id.clone())
                .with_max_events(config.max_journal_events),
            resolved: Arc::new(AtomicBool::new(false)),
        };
        Self {
            config,
            registry,
            target,
            cache: PropertyCache::new(),
            symbols: SymbolTable::new(),
            ctx,
        }
    }

    /// Like [`UniversalAdapter::new`], rejecting an invalid config.
    pub fn try_new(config: AdapterConfig) -> Result<Self, AdapterError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Replace the target's default call behavior.
    pub fn with_behavior<F>(mut self, behavior: F) -> Self
    where
        F: Fn(&[AdapterValue]) -> AdapterValue + Send + Sync + 'static,
    {
        self.target = self.target.with_behavior(behavior);
        self
    }

    // -- dispatcher ---------------------------------------------------------

    pub fn read(&mut self, key: impl Into<AttributeKey>) -> Resolution {
        let key = key.into();
        if let Some(handler) = key.protocol().and_then(|id| self.dispatch(id)) {
            return Resolution::Handler(handler);
        }
        if let Some(value) = self.cache.get(&key) {
            return Resolution::Value(value.clone());
        }
        let value = match &key {
            AttributeKey::Property(property) => self.target.get(property),
            // A protocol missing from the registry is an ordinary unset
            // attribute; storage never holds protocol keys.
            AttributeKey::Protocol(_) => AdapterValue::Undefined,
        };
        self.ctx.journal.record(
            DISPATCHER_COMPONENT,
            EVENT_FALLBACK_READ,
            "resolved",
            key.to_string(),
            value.to_string(),
        );
        self.cache.set(key, value.clone());
        Resolution::Value(value)
    }

    /// Always succeeds; the return value mirrors `Reflect.set`.
    pub fn write(&mut self, key: impl Into<PropertyKey>, value: impl Into<AdapterValue>) -> bool {
        let key = key.into();
        let value = value.into();
        self.ctx.journal.record(
            DISPATCHER_COMPONENT,
            EVENT_ATTRIBUTE_WRITE,
            "stored",
            key.to_string(),
            value.to_string(),
        );
        self.target.set(key.clone(), value.clone());
        self.cache.set(AttributeKey::Property(key), value);
        true
    }

    pub fn invoke(&mut self, args: Vec<AdapterValue>) -> AdapterValue {
        self.ctx.journal.record(
            DISPATCHER_COMPONENT,
            EVENT_INVOKE,
            "called",
            "",
            AdapterValue::List(args.clone()).to_string(),
        );
        self.target.call(args)
    }

    /// Reserved-identifier lookup. Never consults the cache, so it needs
    /// only a shared borrow.
    pub fn protocol(&self, id: ProtocolId) -> Option<ProtocolHandler> {
        self.dispatch(id)
    }

    fn dispatch(&self, id: ProtocolId) -> Option<ProtocolHandler> {
        let handler = self.registry.lookup(id, &self.ctx)?;
        self.record_dispatch(id);
        Some(handler)
    }

    fn record_dispatch(&self, id: ProtocolId) {
        self.ctx.journal.record(
            DISPATCHER_COMPONENT,
            EVENT_PROTOCOL_DISPATCH,
            "handler",
            id.name(),
            "",
        );
    }

    // -- protocol conveniences ----------------------------------------------

    pub fn then<F, R>(&self, resolve: F, reject: R) -> Deferred
    where
        F: FnOnce(AdapterValue) -> AdapterValue,
        R: FnOnce(AdapterValue) -> AdapterValue,
    {
        self.then_handler().call(resolve, reject)
    }

    pub fn catch<F>(&self, on_rejected: Option<F>) -> Deferred
    where
        F: FnOnce(AdapterValue) -> AdapterValue,
    {
        self.catch_handler().call(on_rejected)
    }

    pub fn finally<F>(&self, on_settled: F) -> Deferred
    where
        F: FnOnce(),
    {
        self.finally_handler().call(on_settled)
    }

    pub fn catch_handler(&self) -> CatchHandler {
        self.record_dispatch(ProtocolId::Catch);
        self.registry.catch_handler(&self.ctx)
    }

    pub fn finally_handler(&self) -> FinallyHandler {
        self.record_dispatch(ProtocolId::Finally);
        self.registry.finally_handler(&self.ctx)
    }

    pub fn iter(&self) -> IterationCursor {
        self.iterate()
    }

    pub fn iter_async(&self) -> Option<AsyncIterationCursor> {
        self.iterate_async()
    }

    /// `Object.prototype.toString` style rendering of the type tag.
    pub fn describe(&self) -> String {
        format!("[object {}]", self.type_tag())
    }

    // -- state --------------------------------------------------------------

    /// Sticky: once true, stays true.
    pub fn has_been_resolved(&self) -> bool {
        self.ctx.resolved.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProtocolRegistry {
        &self.registry
    }

    pub fn journal(&self) -> &InteractionJournal {
        &self.ctx.journal
    }

    pub fn fallback_access_count(&self) -> usize {
        self.ctx.journal.count(EVENT_FALLBACK_READ)
    }

    pub fn write_count(&self) -> usize {
        self.ctx.journal.count(EVENT_ATTRIBUTE_WRITE)
    }

    /// Retained call records; see [`UniversalAdapter::call_count`] for the total.
    pub fn calls(&self) -> &VecDeque<CallRecord> {
        self.target.calls()
    }

    pub fn call_count(&self) -> u64 {
        self.target.call_count()
    }

    pub fn cache(&self) -> &PropertyCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn new_symbol(&mut self, description: impl Into<String>) -> SymbolId {
        self.symbols.create(description)
    }

    pub fn symbol_for(&mut self, description: &str) -> SymbolId {
        self.symbols.symbol_for(description)
    }

    pub fn symbol_description(&self, id: SymbolId) -> Option<&str> {
        self.symbols.description(id)
    }

    pub fn snapshot(&self) -> Result<AdapterSnapshot, AdapterError> {
        let mut snapshot = AdapterSnapshot {
            config: self.config.clone(),
            protocols: self.registry.ids(),
            storage: self.target.storage().clone(),
            cached: self.cache.entries().clone(),
            call_count: self.target.call_count(),
            has_been_resolved: self.has_been_resolved(),
            cache_stats: self.cache.stats(),
            state_hash: String::new(),
        };
        let canonical = serde_json::to_vec(&snapshot)
            .map_err(|error| AdapterError::SnapshotEncode(error.to_string()))?;
        snapshot.state_hash = hex_digest(&canonical);
        Ok(snapshot)
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

impl Default for UniversalAdapter {
    fn default() -> Self {
        Self::new(AdapterConfig::default())
    }
}

impl Callable for UniversalAdapter {
    fn invoke(&mut self, args: Vec<AdapterValue>) -> AdapterValue {
        UniversalAdapter::invoke(self, args)
    }
}

impl Deferrable for UniversalAdapter {
    fn then_handler(&self) -> ThenHandler {
        self.record_dispatch(ProtocolId::Then);
        self.registry.then_handler(&self.ctx)
    }
}

impl Iterable for UniversalAdapter {
    type Cursor = IterationCursor;

    fn iterate(&self) -> IterationCursor {
        self.record_dispatch(ProtocolId::SyncIterate);
        IterationProducer::new(self.ctx.journal.clone()).produce()
    }
}

impl AsyncIterable for UniversalAdapter {
    type Cursor = AsyncIterationCursor;

    fn iterate_async(&self) -> Option<AsyncIterationCursor> {
        self.dispatch(ProtocolId::AsyncIterate)
            .as_ref()
            .and_then(ProtocolHandler::as_async_iterate)
            .map(AsyncIterationProducer::produce)
    }
}

impl Coercible for UniversalAdapter {
    fn to_primitive(&self) -> AdapterValue {
        self.record_dispatch(ProtocolId::CoerceToPrimitive);
        self.registry.primitive_coercer(&self.ctx).call()
    }

    fn type_tag(&self) -> &'static str {
        self.record_dispatch(ProtocolId::TypeTag);
        TYPE_TAG
    }
}

impl<'a> IntoIterator for &'a UniversalAdapter {
    type Item = AdapterValue;
    type IntoIter = IterationCursor;

    fn into_iter(self) -> Self::IntoIter {
        self.iterate()
    }
}

impl<'a> IntoFuture for &'a UniversalAdapter {
    type Output = AdapterValue;
    type IntoFuture = Ready<AdapterValue>;

    fn into_future(self) -> Self::IntoFuture {
        ready(self.resolve().into_settlement().value().clone())
    }
}

impl fmt::Display for UniversalAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_primitive())
    }
}
