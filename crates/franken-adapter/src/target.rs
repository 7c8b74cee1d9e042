//! The wrapped callable and its own attribute storage.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::value::{AdapterValue, PropertyKey};

/// Replacement for the target's default call behavior.
pub type TargetBehavior = Arc<dyn Fn(&[AdapterValue]) -> AdapterValue + Send + Sync>;

/// Call records retained by default before the oldest are dropped.
pub const DEFAULT_MAX_CALL_RECORDS: usize = 100_000;

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub seq: u64,
    pub args: Vec<AdapterValue>,
    pub result: AdapterValue,
}

/// The invocation target.
///
/// Starts with the intrinsic attributes a native function carries: `name`
/// and `length` (`0`, the target takes a rest parameter list). The call log
/// keeps the newest `max_calls` records; `call_count` counts every call.
#[derive(Clone)]
pub struct InvocationTarget {
    storage: BTreeMap<PropertyKey, AdapterValue>,
    calls: VecDeque<CallRecord>,
    max_calls: usize,
    call_count: u64,
    behavior: Option<TargetBehavior>,
}

impl InvocationTarget {
    pub fn new(name: impl Into<String>) -> Self {
        let mut storage = BTreeMap::new();
        storage.insert(PropertyKey::from("name"), AdapterValue::Str(name.into()));
        storage.insert(PropertyKey::from("length"), AdapterValue::Int(0));
        Self {
            storage,
            calls: VecDeque::new(),
            max_calls: DEFAULT_MAX_CALL_RECORDS,
            call_count: 0,
            behavior: None,
        }
    }

    pub fn with_max_calls(mut self, max_calls: usize) -> Self {
        self.max_calls = max_calls;
        self.trim_calls();
        self
    }

    pub fn with_behavior<F>(mut self, behavior: F) -> Self
    where
        F: Fn(&[AdapterValue]) -> AdapterValue + Send + Sync + 'static,
    {
        self.behavior = Some(Arc::new(behavior));
        self
    }

    /// Apply the target. Without a behavior the result is `Undefined`.
    pub fn call(&mut self, args: Vec<AdapterValue>) -> AdapterValue {
        let result = match &self.behavior {
            Some(behavior) => behavior(&args),
            None => AdapterValue::Undefined,
        };
        let seq = self.call_count;
        self.call_count = self.call_count.saturating_add(1);
        self.calls.push_back(CallRecord {
            seq,
            args,
            result: result.clone(),
        });
        self.trim_calls();
        result
    }

    /// Own-attribute lookup. Absent attributes are `Undefined`.
    pub fn get(&self, key: &PropertyKey) -> AdapterValue {
        self.storage.get(key).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, key: PropertyKey, value: AdapterValue) {
        self.storage.insert(key, value);
    }

    pub fn has_own(&self, key: &PropertyKey) -> bool {
        self.storage.contains_key(key)
    }

    pub fn storage(&self) -> &BTreeMap<PropertyKey, AdapterValue> {
        &self.storage
    }

    /// Retained call records, oldest first.
    pub fn calls(&self) -> &VecDeque<CallRecord> {
        &self.calls
    }

    /// Every call since creation, including trimmed records.
    pub fn call_count(&self) -> u64 {
        self.call_count
    }

    fn trim_calls(&mut self) {
        while self.calls.len() > self.max_calls {
            self.calls.pop_front();
        }
    }
}

impl fmt::Debug for InvocationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationTarget")
            .field("storage", &self.storage)
            .field("calls", &self.call_count)
            .field("retained_calls", &self.calls.len())
            .field("custom_behavior", &self.behavior.is_some())
            .finish()
    }
}
