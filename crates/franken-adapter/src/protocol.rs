//! Reserved protocol identifiers and their handlers.
//!
//! The identifier set is closed: [`ProtocolId`] enumerates every protocol
//! the adapter intercepts before any generic attribute lookup. The
//! [`ProtocolRegistry`] decides which of them exist for a given adapter
//! (the asynchronous-iteration entry is present only when enabled) and
//! builds the handler for a lookup.
//!
//! Deferred-value handlers never leave work pending. Every handle they
//! return is a [`Deferred`] that is already settled, so awaiting or
//! chaining it always completes.

use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::{Ready, ready};
use serde::{Deserialize, Serialize};

use crate::iteration::{AsyncIterationProducer, IterationProducer};
use crate::journal::{
    EVENT_COERCE_TO_PRIMITIVE, EVENT_DEFERRED_CATCH, EVENT_DEFERRED_FINALLY,
    EVENT_DEFERRED_RESOLVE, InteractionJournal,
};
use crate::value::AdapterValue;

pub const PROTOCOL_COMPONENT: &str = "adapter_protocol";

pub const AWAIT_COMPLETE_PAYLOAD: &str = "Await complete";
pub const CATCH_FALLBACK_PAYLOAD: &str = "but everything's fine";
pub const PRIMITIVE_DESCRIPTION: &str = "Wizard Entity";
pub const TYPE_TAG: &str = "UniversalAdapter";

// ---------------------------------------------------------------------------
// ProtocolId
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolId {
    Then,
    Catch,
    Finally,
    SyncIterate,
    AsyncIterate,
    CoerceToPrimitive,
    TypeTag,
}

impl ProtocolId {
    pub const ALL: [ProtocolId; 7] = [
        Self::Then,
        Self::Catch,
        Self::Finally,
        Self::SyncIterate,
        Self::AsyncIterate,
        Self::CoerceToPrimitive,
        Self::TypeTag,
    ];

    /// Display name (e.g. `@@iterator`).
    pub fn name(self) -> &'static str {
        match self {
            Self::Then => "@@then",
            Self::Catch => "@@catch",
            Self::Finally => "@@finally",
            Self::SyncIterate => "@@iterator",
            Self::AsyncIterate => "@@asyncIterator",
            Self::CoerceToPrimitive => "@@toPrimitive",
            Self::TypeTag => "@@toStringTag",
        }
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Deferred
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Settlement {
    Fulfilled(AdapterValue),
    Rejected(AdapterValue),
}

impl Settlement {
    pub fn value(&self) -> &AdapterValue {
        match self {
            Self::Fulfilled(value) | Self::Rejected(value) => value,
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }
}

/// A deferred value that has already settled.
///
/// Chaining follows promise semantics: `then` maps fulfilled values and
/// `catch` maps rejected ones, each passing the other kind through
/// untouched. Awaiting completes on the first poll.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Deferred {
    settlement: Settlement,
}

impl Deferred {
    pub fn fulfilled(value: impl Into<AdapterValue>) -> Self {
        Self {
            settlement: Settlement::Fulfilled(value.into()),
        }
    }

    pub fn rejected(reason: impl Into<AdapterValue>) -> Self {
        Self {
            settlement: Settlement::Rejected(reason.into()),
        }
    }

    pub fn settlement(&self) -> &Settlement {
        &self.settlement
    }

    pub fn into_settlement(self) -> Settlement {
        self.settlement
    }

    pub fn value(&self) -> &AdapterValue {
        self.settlement.value()
    }

    pub fn is_fulfilled(&self) -> bool {
        self.settlement.is_fulfilled()
    }

    pub fn then<F, R>(self, on_fulfilled: F, on_rejected: R) -> Deferred
    where
        F: FnOnce(AdapterValue) -> AdapterValue,
        R: FnOnce(AdapterValue) -> AdapterValue,
    {
        match self.settlement {
            Settlement::Fulfilled(value) => Deferred::fulfilled(on_fulfilled(value)),
            Settlement::Rejected(reason) => Deferred::fulfilled(on_rejected(reason)),
        }
    }

    /// `then` with only a fulfillment callback.
    pub fn map<F>(self, on_fulfilled: F) -> Deferred
    where
        F: FnOnce(AdapterValue) -> AdapterValue,
    {
        match self.settlement {
            Settlement::Fulfilled(value) => Deferred::fulfilled(on_fulfilled(value)),
            rejected @ Settlement::Rejected(_) => Deferred {
                settlement: rejected,
            },
        }
    }

    pub fn catch<F>(self, on_rejected: F) -> Deferred
    where
        F: FnOnce(AdapterValue) -> AdapterValue,
    {
        match self.settlement {
            fulfilled @ Settlement::Fulfilled(_) => Deferred {
                settlement: fulfilled,
            },
            Settlement::Rejected(reason) => Deferred::fulfilled(on_rejected(reason)),
        }
    }

    pub fn finally<F>(self, on_settled: F) -> Deferred
    where
        F: FnOnce(),
    {
        on_settled();
        self
    }
}

impl IntoFuture for Deferred {
    type Output = Settlement;
    type IntoFuture = Ready<Settlement>;

    fn into_future(self) -> Self::IntoFuture {
        ready(self.settlement)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// State shared between an adapter and the handlers it hands out.
#[derive(Debug, Clone)]
pub(crate) struct HandlerContext {
    pub(crate) journal: InteractionJournal,
    pub(crate) resolved: Arc<AtomicBool>,
}

/// Two-argument deferred-resolution initiator.
#[derive(Debug, Clone)]
pub struct ThenHandler {
    ctx: HandlerContext,
}

impl ThenHandler {
    /// Resolve immediately with [`AWAIT_COMPLETE_PAYLOAD`].
    ///
    /// `resolve` runs synchronously; `reject` is never called because the
    /// adapter has nothing to reject with. The returned handle is settled
    /// with whatever `resolve` returned.
    pub fn call<F, R>(&self, resolve: F, _reject: R) -> Deferred
    where
        F: FnOnce(AdapterValue) -> AdapterValue,
        R: FnOnce(AdapterValue) -> AdapterValue,
    {
        self.ctx.resolved.store(true, Ordering::SeqCst);
        self.ctx.journal.record(
            PROTOCOL_COMPONENT,
            EVENT_DEFERRED_RESOLVE,
            "fulfilled",
            ProtocolId::Then.name(),
            AWAIT_COMPLETE_PAYLOAD,
        );
        Deferred::fulfilled(resolve(AdapterValue::str(AWAIT_COMPLETE_PAYLOAD)))
    }

    /// Resolution with identity callbacks, as `await` performs it.
    pub fn resolve(&self) -> Deferred {
        self.call(|value| value, |reason| reason)
    }
}

/// One-argument rejection handler.
#[derive(Debug, Clone)]
pub struct CatchHandler {
    ctx: HandlerContext,
}

impl CatchHandler {
    /// With a handler, invoke it with an empty (`Null`) error payload and
    /// settle with its result; without one, settle with
    /// [`CATCH_FALLBACK_PAYLOAD`].
    pub fn call<F>(&self, on_rejected: Option<F>) -> Deferred
    where
        F: FnOnce(AdapterValue) -> AdapterValue,
    {
        match on_rejected {
            Some(handler) => {
                self.record("handled");
                Deferred::fulfilled(handler(AdapterValue::Null))
            }
            None => self.without_handler(),
        }
    }

    pub fn without_handler(&self) -> Deferred {
        self.record("fallback");
        Deferred::fulfilled(CATCH_FALLBACK_PAYLOAD)
    }

    /// Fallible variant; the handler's error is returned untouched.
    pub fn try_call<F, E>(&self, on_rejected: F) -> Result<Deferred, E>
    where
        F: FnOnce(AdapterValue) -> Result<AdapterValue, E>,
    {
        self.record("handled");
        on_rejected(AdapterValue::Null).map(Deferred::fulfilled)
    }

    fn record(&self, outcome: &str) {
        self.ctx.journal.record(
            PROTOCOL_COMPONENT,
            EVENT_DEFERRED_CATCH,
            outcome,
            ProtocolId::Catch.name(),
            "",
        );
    }
}

/// One-argument finalization handler.
#[derive(Debug, Clone)]
pub struct FinallyHandler {
    ctx: HandlerContext,
}

impl FinallyHandler {
    /// Run `on_settled` synchronously, then settle with `Undefined`.
    pub fn call<F>(&self, on_settled: F) -> Deferred
    where
        F: FnOnce(),
    {
        self.record();
        on_settled();
        Deferred::fulfilled(AdapterValue::Undefined)
    }

    /// Fallible variant; the callback's error is returned untouched.
    pub fn try_call<F, E>(&self, on_settled: F) -> Result<Deferred, E>
    where
        F: FnOnce() -> Result<(), E>,
    {
        self.record();
        on_settled()?;
        Ok(Deferred::fulfilled(AdapterValue::Undefined))
    }

    fn record(&self) {
        self.ctx.journal.record(
            PROTOCOL_COMPONENT,
            EVENT_DEFERRED_FINALLY,
            "invoked",
            ProtocolId::Finally.name(),
            "",
        );
    }
}

/// Zero-argument primitive conversion.
#[derive(Debug, Clone)]
pub struct PrimitiveCoercer {
    ctx: HandlerContext,
}

impl PrimitiveCoercer {
    pub fn call(&self) -> AdapterValue {
        self.ctx.journal.record(
            PROTOCOL_COMPONENT,
            EVENT_COERCE_TO_PRIMITIVE,
            "converted",
            ProtocolId::CoerceToPrimitive.name(),
            PRIMITIVE_DESCRIPTION,
        );
        AdapterValue::str(PRIMITIVE_DESCRIPTION)
    }
}

/// The result of reading a reserved protocol identifier.
#[derive(Debug, Clone)]
pub enum ProtocolHandler {
    Then(ThenHandler),
    Catch(CatchHandler),
    Finally(FinallyHandler),
    SyncIterate(IterationProducer),
    AsyncIterate(AsyncIterationProducer),
    CoerceToPrimitive(PrimitiveCoercer),
    /// A descriptor value rather than a function.
    TypeTag(&'static str),
}

impl ProtocolHandler {
    pub fn id(&self) -> ProtocolId {
        match self {
            Self::Then(_) => ProtocolId::Then,
            Self::Catch(_) => ProtocolId::Catch,
            Self::Finally(_) => ProtocolId::Finally,
            Self::SyncIterate(_) => ProtocolId::SyncIterate,
            Self::AsyncIterate(_) => ProtocolId::AsyncIterate,
            Self::CoerceToPrimitive(_) => ProtocolId::CoerceToPrimitive,
            Self::TypeTag(_) => ProtocolId::TypeTag,
        }
    }

    pub fn as_then(&self) -> Option<&ThenHandler> {
        match self {
            Self::Then(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn as_catch(&self) -> Option<&CatchHandler> {
        match self {
            Self::Catch(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn as_finally(&self) -> Option<&FinallyHandler> {
        match self {
            Self::Finally(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn as_sync_iterate(&self) -> Option<&IterationProducer> {
        match self {
            Self::SyncIterate(producer) => Some(producer),
            _ => None,
        }
    }

    pub fn as_async_iterate(&self) -> Option<&AsyncIterationProducer> {
        match self {
            Self::AsyncIterate(producer) => Some(producer),
            _ => None,
        }
    }

    pub fn as_coerce_to_primitive(&self) -> Option<&PrimitiveCoercer> {
        match self {
            Self::CoerceToPrimitive(coercer) => Some(coercer),
            _ => None,
        }
    }

    pub fn as_type_tag(&self) -> Option<&'static str> {
        match self {
            Self::TypeTag(tag) => Some(tag),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ProtocolRegistry
// ---------------------------------------------------------------------------

/// The fixed table of reserved identifiers for one adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolRegistry {
    async_iteration: bool,
}

impl ProtocolRegistry {
    pub fn new(async_iteration: bool) -> Self {
        Self { async_iteration }
    }

    pub fn contains(&self, id: ProtocolId) -> bool {
        match id {
            ProtocolId::AsyncIterate => self.async_iteration,
            ProtocolId::Then
            | ProtocolId::Catch
            | ProtocolId::Finally
            | ProtocolId::SyncIterate
            | ProtocolId::CoerceToPrimitive
            | ProtocolId::TypeTag => true,
        }
    }

    /// Identifiers present in this registry, in declaration order.
    pub fn ids(&self) -> Vec<ProtocolId> {
        ProtocolId::ALL
            .into_iter()
            .filter(|id| self.contains(*id))
            .collect()
    }

    pub(crate) fn lookup(&self, id: ProtocolId, ctx: &HandlerContext) -> Option<ProtocolHandler> {
        if !self.contains(id) {
            return None;
        }
        let handler = match id {
            ProtocolId::Then => ProtocolHandler::Then(self.then_handler(ctx)),
            ProtocolId::Catch => ProtocolHandler::Catch(self.catch_handler(ctx)),
            ProtocolId::Finally => ProtocolHandler::Finally(self.finally_handler(ctx)),
            ProtocolId::SyncIterate => {
                ProtocolHandler::SyncIterate(IterationProducer::new(ctx.journal.clone()))
            }
            ProtocolId::AsyncIterate => {
                ProtocolHandler::AsyncIterate(AsyncIterationProducer::new(ctx.journal.clone()))
            }
            ProtocolId::CoerceToPrimitive => {
                ProtocolHandler::CoerceToPrimitive(self.primitive_coercer(ctx))
            }
            ProtocolId::TypeTag => ProtocolHandler::TypeTag(TYPE_TAG),
        };
        Some(handler)
    }

    // Entries that are present in every registry.

    pub(crate) fn then_handler(&self, ctx: &HandlerContext) -> ThenHandler {
        ThenHandler { ctx: ctx.clone() }
    }

    pub(crate) fn catch_handler(&self, ctx: &HandlerContext) -> CatchHandler {
        CatchHandler { ctx: ctx.clone() }
    }

    pub(crate) fn finally_handler(&self, ctx: &HandlerContext) -> FinallyHandler {
        FinallyHandler { ctx: ctx.clone() }
    }

    pub(crate) fn primitive_coercer(&self, ctx: &HandlerContext) -> PrimitiveCoercer {
        PrimitiveCoercer { ctx: ctx.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn ctx() -> HandlerContext {
        HandlerContext {
            journal: InteractionJournal::new("protocol-test"),
            resolved: Arc::new(AtomicBool::new(false)),
        }
    }

    fn registry_handler(id: ProtocolId, ctx: &HandlerContext) -> ProtocolHandler {
        ProtocolRegistry::new(true).lookup(id, ctx).unwrap()
    }

    #[test]
    fn protocol_names_are_distinct() {
        let mut names: Vec<_> = ProtocolId::ALL.iter().map(|id| id.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ProtocolId::ALL.len());
    }

    #[test]
    fn registry_without_async_omits_async_iterate() {
        let registry = ProtocolRegistry::new(false);
        assert!(!registry.contains(ProtocolId::AsyncIterate));
        assert_eq!(registry.ids().len(), 6);
        assert!(registry.lookup(ProtocolId::AsyncIterate, &ctx()).is_none());
    }

    #[test]
    fn registry_with_async_has_all_ids() {
        let registry = ProtocolRegistry::new(true);
        assert_eq!(registry.ids(), ProtocolId::ALL.to_vec());
    }

    #[test]
    fn lookup_returns_matching_handler() {
        let ctx = ctx();
        for id in ProtocolId::ALL {
            assert_eq!(registry_handler(id, &ctx).id(), id);
        }
    }

    #[test]
    fn then_sets_sticky_flag_and_settles() {
        let ctx = ctx();
        let handler = registry_handler(ProtocolId::Then, &ctx);
        let then = handler.as_then().unwrap();
        let deferred = then.resolve();
        assert!(ctx.resolved.load(Ordering::SeqCst));
        assert_eq!(deferred.value(), &AdapterValue::str(AWAIT_COMPLETE_PAYLOAD));
        assert_eq!(
            block_on(deferred.into_future()),
            Settlement::Fulfilled(AdapterValue::str(AWAIT_COMPLETE_PAYLOAD))
        );
    }

    #[test]
    fn then_settles_with_resolve_callback_result() {
        let ctx = ctx();
        let then = ThenHandler { ctx: ctx.clone() };
        let deferred = then.call(
            |value| AdapterValue::str(format!("got {value}")),
            |_| AdapterValue::Null,
        );
        assert_eq!(deferred.value(), &AdapterValue::str("got Await complete"));
        assert_eq!(ctx.journal.count(EVENT_DEFERRED_RESOLVE), 1);
    }

    #[test]
    fn catch_without_handler_uses_fallback() {
        let catch = CatchHandler { ctx: ctx() };
        let deferred = catch.call(None::<fn(AdapterValue) -> AdapterValue>);
        assert_eq!(deferred.value(), &AdapterValue::str(CATCH_FALLBACK_PAYLOAD));
        assert!(deferred.is_fulfilled());
    }

    #[test]
    fn catch_with_handler_passes_null_payload() {
        let catch = CatchHandler { ctx: ctx() };
        let deferred = catch.call(Some(|error: AdapterValue| {
            assert_eq!(error, AdapterValue::Null);
            AdapterValue::str("recovered")
        }));
        assert_eq!(deferred.value(), &AdapterValue::str("recovered"));
    }

    #[test]
    fn catch_try_call_propagates_handler_error() {
        let catch = CatchHandler { ctx: ctx() };
        let result: Result<Deferred, &str> = catch.try_call(|_| Err("handler failed"));
        assert_eq!(result.unwrap_err(), "handler failed");
    }

    #[test]
    fn finally_runs_callback_and_settles_undefined() {
        let finally = FinallyHandler { ctx: ctx() };
        let mut ran = false;
        let deferred = finally.call(|| ran = true);
        assert!(ran);
        assert_eq!(deferred.value(), &AdapterValue::Undefined);
    }

    #[test]
    fn finally_try_call_propagates_callback_error() {
        let finally = FinallyHandler { ctx: ctx() };
        let result: Result<Deferred, String> = finally.try_call(|| Err("boom".to_string()));
        assert_eq!(result.unwrap_err(), "boom");
    }

    #[test]
    fn coercer_returns_fixed_description() {
        let ctx = ctx();
        let coercer = PrimitiveCoercer { ctx: ctx.clone() };
        assert_eq!(coercer.call(), AdapterValue::str(PRIMITIVE_DESCRIPTION));
        assert_eq!(ctx.journal.count(EVENT_COERCE_TO_PRIMITIVE), 1);
    }

    #[test]
    fn type_tag_is_a_descriptor() {
        let handler = registry_handler(ProtocolId::TypeTag, &ctx());
        assert_eq!(handler.as_type_tag(), Some(TYPE_TAG));
        assert!(handler.as_then().is_none());
    }

    #[test]
    fn deferred_chaining_follows_promise_rules() {
        let chained = Deferred::fulfilled(1_i64)
            .map(|v| match v {
                AdapterValue::Int(n) => AdapterValue::Int(n + 1),
                other => other,
            })
            .catch(|_| AdapterValue::str("unreachable"));
        assert_eq!(chained.value(), &AdapterValue::Int(2));

        let recovered = Deferred::rejected("bad")
            .map(|_| AdapterValue::str("unreachable"))
            .catch(|reason| AdapterValue::str(format!("caught {reason}")));
        assert_eq!(recovered.value(), &AdapterValue::str("caught bad"));
        assert!(recovered.is_fulfilled());
    }

    #[test]
    fn deferred_then_routes_rejections() {
        let out = Deferred::rejected("no").then(|_| AdapterValue::Int(1), |_| AdapterValue::Int(2));
        assert_eq!(out.value(), &AdapterValue::Int(2));
    }

    #[test]
    fn deferred_finally_preserves_settlement() {
        let mut count = 0;
        let out = Deferred::rejected("kept").finally(|| count += 1);
        assert_eq!(count, 1);
        assert_eq!(out.settlement(), &Settlement::Rejected(AdapterValue::str("kept")));
    }
}
