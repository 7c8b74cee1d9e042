//! Values and keys that flow through the adapter.
//!
//! - [`AdapterValue`]: payload of attributes, call arguments and protocol
//!   results.
//! - [`PropertyKey`]: an ordinary attribute key, string or symbol.
//! - [`AttributeKey`]: what a Read may ask for, either a reserved protocol
//!   identifier or an ordinary key. Reserved identifiers are never spelled as
//!   strings, so `"then"` the string and the thenable protocol cannot collide.
//! - [`SymbolTable`]: allocation and descriptions of user symbols.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::protocol::ProtocolId;

/// Serialize/deserialize a `BTreeMap` with non-string keys as a sorted
/// sequence of `[key, value]` pairs. serde_json only accepts string map keys.
pub(crate) mod entries_as_seq {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S, K, V>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        K: Serialize,
        V: Serialize,
    {
        let pairs: Vec<(&K, &V)> = map.iter().collect();
        pairs.serialize(serializer)
    }

    pub fn deserialize<'de, D, K, V>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        D: Deserializer<'de>,
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
    {
        let pairs: Vec<(K, V)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

// ---------------------------------------------------------------------------
// AdapterValue
// ---------------------------------------------------------------------------

/// Runtime value carried by attributes, arguments and protocol payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AdapterValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<AdapterValue>),
}

impl AdapterValue {
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Borrow the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "number",
            Self::Str(_) => "string",
            Self::List(_) => "array",
        }
    }

    /// Convert a plain JSON value (as found in interaction scripts).
    ///
    /// Numbers must be integral; objects have no adapter representation.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, AdapterError> {
        match value {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(b) => Ok(Self::Bool(*b)),
            serde_json::Value::Number(n) => n.as_i64().map(Self::Int).ok_or_else(|| {
                AdapterError::ScriptParse(format!("number {n} is not a 64-bit integer"))
            }),
            serde_json::Value::String(s) => Ok(Self::Str(s.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            serde_json::Value::Object(_) => Err(AdapterError::ScriptParse(
                "objects cannot be used as adapter values".to_string(),
            )),
        }
    }

    /// Plain JSON rendering. `Undefined` has no JSON form and maps to `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Undefined | Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(n) => serde_json::Value::from(*n),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
        }
    }
}

impl fmt::Display for AdapterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for AdapterValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for AdapterValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for AdapterValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for AdapterValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<AdapterValue>> for AdapterValue {
    fn from(items: Vec<AdapterValue>) -> Self {
        Self::List(items)
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Unique symbol identifier, allocated by a [`SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

/// An ordinary attribute key: either a string or a symbol.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PropertyKey {
    String(String),
    Symbol(SymbolId),
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Symbol(id) => write!(f, "Symbol({})", id.0),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<SymbolId> for PropertyKey {
    fn from(id: SymbolId) -> Self {
        Self::Symbol(id)
    }
}

/// Identifier accepted by the dispatcher's Read operation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AttributeKey {
    /// A reserved protocol identifier.
    Protocol(ProtocolId),
    /// An ordinary attribute.
    Property(PropertyKey),
}

impl AttributeKey {
    pub fn protocol(&self) -> Option<ProtocolId> {
        match self {
            Self::Protocol(id) => Some(*id),
            Self::Property(_) => None,
        }
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(id) => f.write_str(id.name()),
            Self::Property(key) => write!(f, "{key}"),
        }
    }
}

impl From<ProtocolId> for AttributeKey {
    fn from(id: ProtocolId) -> Self {
        Self::Protocol(id)
    }
}

impl From<PropertyKey> for AttributeKey {
    fn from(key: PropertyKey) -> Self {
        Self::Property(key)
    }
}

impl From<&str> for AttributeKey {
    fn from(s: &str) -> Self {
        Self::Property(PropertyKey::from(s))
    }
}

impl From<String> for AttributeKey {
    fn from(s: String) -> Self {
        Self::Property(PropertyKey::from(s))
    }
}

impl From<SymbolId> for AttributeKey {
    fn from(id: SymbolId) -> Self {
        Self::Property(PropertyKey::Symbol(id))
    }
}

// ---------------------------------------------------------------------------
// SymbolTable
// ---------------------------------------------------------------------------

/// Per-adapter symbol allocation.
///
/// `create` always mints a fresh symbol; `symbol_for` interns by description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTable {
    next_id: u32,
    /// Description → SymbolId for interned symbols.
    by_description: BTreeMap<String, SymbolId>,
    /// SymbolId → description for every allocated symbol.
    by_id: BTreeMap<SymbolId, String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new, unique symbol.
    pub fn create(&mut self, description: impl Into<String>) -> SymbolId {
        let id = SymbolId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.by_id.insert(id, description.into());
        id
    }

    /// Get or create the interned symbol for `description`.
    pub fn symbol_for(&mut self, description: &str) -> SymbolId {
        if let Some(&id) = self.by_description.get(description) {
            return id;
        }
        let id = self.create(description);
        self.by_description.insert(description.to_string(), id);
        id
    }

    pub fn description(&self, id: SymbolId) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
