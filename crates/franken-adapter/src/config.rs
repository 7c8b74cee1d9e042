//! Construction-time configuration. Fixed for the lifetime of an adapter.

use serde::{Deserialize, Serialize};

use crate::error::AdapterError;
use crate::journal::DEFAULT_MAX_EVENTS;
use crate::target::DEFAULT_MAX_CALL_RECORDS;

pub const DEFAULT_TRACE_ID: &str = "universal-adapter";
pub const DEFAULT_TARGET_NAME: &str = "trap";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct AdapterConfig {
    /// Whether the asynchronous-iteration protocol exists in the registry.
    pub enable_async_iteration: bool,
    /// Label stamped on every journal event.
    pub trace_id: String,
    /// Intrinsic `name` attribute of the invocation target.
    pub target_name: String,
    /// Journal events retained; older ones are dropped, counts stay exact.
    pub max_journal_events: usize,
    /// Call records retained on the target.
    pub max_call_records: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            enable_async_iteration: false,
            trace_id: DEFAULT_TRACE_ID.to_string(),
            target_name: DEFAULT_TARGET_NAME.to_string(),
            max_journal_events: DEFAULT_MAX_EVENTS,
            max_call_records: DEFAULT_MAX_CALL_RECORDS,
        }
    }
}

impl AdapterConfig {
    pub fn with_async_iteration(mut self, enabled: bool) -> Self {
        self.enable_async_iteration = enabled;
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_target_name(mut self, target_name: impl Into<String>) -> Self {
        self.target_name = target_name.into();
        self
    }

    pub fn with_max_journal_events(mut self, max_journal_events: usize) -> Self {
        self.max_journal_events = max_journal_events;
        self
    }

    pub fn with_max_call_records(mut self, max_call_records: usize) -> Self {
        self.max_call_records = max_call_records;
        self
    }

    /// Parse and validate a JSON options object. `{}` yields the defaults.
    pub fn from_json(input: &str) -> Result<Self, AdapterError> {
        let config: Self = serde_json::from_str(input)
            .map_err(|error| AdapterError::ConfigParse(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AdapterError> {
        if self.trace_id.trim().is_empty() {
            return Err(AdapterError::InvalidConfig {
                field: "traceId".to_string(),
            });
        }
        if self.target_name.trim().is_empty() {
            return Err(AdapterError::InvalidConfig {
                field: "targetName".to_string(),
            });
        }
        Ok(())
    }
}
