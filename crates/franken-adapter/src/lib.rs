#![forbid(unsafe_code)]

//! A single handle that is at once callable, awaitable, iterable,
//! coercible to a primitive and a free-form attribute bag.
//!
//! Reads of reserved protocol identifiers are answered by built-in
//! handlers; every other attribute is resolved against the wrapped
//! target once and memoized.

pub mod adapter;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod iteration;
pub mod journal;
pub mod property_cache;
pub mod protocol;
pub mod target;
pub mod value;

pub use adapter::{
    AsyncIterable, Callable, Coercible, Deferrable, Iterable, Resolution, UniversalAdapter,
};
pub use config::AdapterConfig;
pub use error::AdapterError;
pub use protocol::{Deferred, ProtocolHandler, ProtocolId, Settlement};
pub use value::{AdapterValue, AttributeKey, PropertyKey, SymbolId};

/// Build a fresh adapter with empty cache, no custom attributes and the
/// resolved flag cleared.
pub fn create_adapter(config: AdapterConfig) -> UniversalAdapter {
    UniversalAdapter::new(config)
}
