//! Scripted replay of interactions against a fresh adapter.
//!
//! An [`InteractionScript`] is a JSON list of steps tagged by `op`. Replaying
//! it produces a [`DiagnosticsReport`] bundling each step's outcome, the
//! full interaction journal and the final snapshot. The
//! `adapter_diagnostics` binary is a thin file-reading wrapper around
//! [`replay_script`].

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use futures::executor::block_on;
use serde::{Deserialize, Serialize};

use crate::adapter::{
    AdapterSnapshot, AsyncIterable, Coercible, Deferrable, Resolution, UniversalAdapter,
};
use crate::config::AdapterConfig;
use crate::error::AdapterError;
use crate::journal::{EVENT_FALLBACK_READ, InteractionEvent};
use crate::protocol::ProtocolId;
use crate::value::AdapterValue;

pub const DIAGNOSTICS_SCHEMA_VERSION: &str = "franken-adapter.diagnostics-report.v1";
pub const CATCH_HANDLER_RESULT: &str = "handled";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InteractionStep {
    Invoke {
        #[serde(default)]
        args: Vec<serde_json::Value>,
    },
    Write {
        key: String,
        value: serde_json::Value,
    },
    Read {
        key: String,
    },
    ReadProtocol {
        protocol: ProtocolId,
    },
    Await,
    Catch {
        #[serde(default)]
        with_handler: bool,
    },
    Finally,
    Iterate {
        /// Stop early after this many elements.
        #[serde(default)]
        take: Option<usize>,
    },
    IterateAsync,
    Coerce,
    Describe,
}

impl InteractionStep {
    pub fn op(&self) -> &'static str {
        match self {
            Self::Invoke { .. } => "invoke",
            Self::Write { .. } => "write",
            Self::Read { .. } => "read",
            Self::ReadProtocol { .. } => "read_protocol",
            Self::Await => "await",
            Self::Catch { .. } => "catch",
            Self::Finally => "finally",
            Self::Iterate { .. } => "iterate",
            Self::IterateAsync => "iterate_async",
            Self::Coerce => "coerce",
            Self::Describe => "describe",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionScript {
    pub steps: Vec<InteractionStep>,
}

impl InteractionScript {
    pub fn from_json(input: &str) -> Result<Self, AdapterError> {
        serde_json::from_str(input).map_err(|error| AdapterError::ScriptParse(error.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub index: usize,
    pub op: String,
    pub result: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    pub schema_version: String,
    pub generated_at_utc: String,
    pub trace_id: String,
    pub outcomes: Vec<StepOutcome>,
    /// Retained journal events; older ones may have been trimmed.
    pub journal: Vec<InteractionEvent>,
    /// Exact per-event totals, trimmed events included.
    pub event_totals: BTreeMap<String, u64>,
    pub snapshot: AdapterSnapshot,
}

/// Replay `script` against a new adapter built from `config`.
///
/// Values are converted before any step runs, so a malformed script leaves
/// no partial journal behind.
pub fn replay_script(
    config: AdapterConfig,
    script: &InteractionScript,
) -> Result<DiagnosticsReport, AdapterError> {
    let steps = script
        .steps
        .iter()
        .map(PreparedStep::prepare)
        .collect::<Result<Vec<_>, _>>()?;

    let mut adapter = UniversalAdapter::try_new(config)?;
    let outcomes = steps
        .into_iter()
        .enumerate()
        .map(|(index, step)| StepOutcome {
            index,
            op: step.op.to_string(),
            result: step.run(&mut adapter),
        })
        .collect();

    Ok(DiagnosticsReport {
        schema_version: DIAGNOSTICS_SCHEMA_VERSION.to_string(),
        generated_at_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        trace_id: adapter.config().trace_id.clone(),
        outcomes,
        journal: adapter.journal().events(),
        event_totals: adapter.journal().totals(),
        snapshot: adapter.snapshot()?,
    })
}

pub fn render_summary(report: &DiagnosticsReport) -> String {
    let fallback_reads = report
        .event_totals
        .get(EVENT_FALLBACK_READ)
        .copied()
        .unwrap_or(0);
    format!(
        "trace={} steps={} events={} fallback_reads={} calls={} resolved={} state_hash={}",
        report.trace_id,
        report.outcomes.len(),
        report.event_totals.values().sum::<u64>(),
        fallback_reads,
        report.snapshot.call_count,
        report.snapshot.has_been_resolved,
        report.snapshot.state_hash,
    )
}

/// A step whose JSON payloads have been converted to adapter values.
struct PreparedStep {
    op: &'static str,
    action: Action,
}

enum Action {
    Invoke(Vec<AdapterValue>),
    Write(String, AdapterValue),
    Read(String),
    ReadProtocol(ProtocolId),
    Await,
    Catch(bool),
    Finally,
    Iterate(Option<usize>),
    IterateAsync,
    Coerce,
    Describe,
}

impl PreparedStep {
    fn prepare(step: &InteractionStep) -> Result<Self, AdapterError> {
        let action = match step {
            InteractionStep::Invoke { args } => Action::Invoke(
                args.iter()
                    .map(AdapterValue::from_json)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            InteractionStep::Write { key, value } => {
                Action::Write(key.clone(), AdapterValue::from_json(value)?)
            }
            InteractionStep::Read { key } => Action::Read(key.clone()),
            InteractionStep::ReadProtocol { protocol } => Action::ReadProtocol(*protocol),
            InteractionStep::Await => Action::Await,
            InteractionStep::Catch { with_handler } => Action::Catch(*with_handler),
            InteractionStep::Finally => Action::Finally,
            InteractionStep::Iterate { take } => Action::Iterate(*take),
            InteractionStep::IterateAsync => Action::IterateAsync,
            InteractionStep::Coerce => Action::Coerce,
            InteractionStep::Describe => Action::Describe,
        };
        Ok(Self {
            op: step.op(),
            action,
        })
    }

    fn run(self, adapter: &mut UniversalAdapter) -> serde_json::Value {
        match self.action {
            Action::Invoke(args) => adapter.invoke(args).to_json(),
            Action::Write(key, value) => serde_json::Value::Bool(adapter.write(key, value)),
            Action::Read(key) => resolution_json(adapter.read(key)),
            Action::ReadProtocol(id) => resolution_json(adapter.read(id)),
            Action::Await => adapter.resolve().value().to_json(),
            Action::Catch(with_handler) => {
                let handler =
                    with_handler.then_some(|_: AdapterValue| AdapterValue::str(CATCH_HANDLER_RESULT));
                adapter.catch(handler).value().to_json()
            }
            Action::Finally => adapter.finally(|| {}).value().to_json(),
            Action::Iterate(take) => {
                let cursor = adapter.iter();
                let items: Vec<_> = match take {
                    Some(n) => cursor.take(n).collect(),
                    None => cursor.collect(),
                };
                AdapterValue::List(items).to_json()
            }
            Action::IterateAsync => match adapter.iterate_async() {
                Some(cursor) => AdapterValue::List(block_on(cursor.collect())).to_json(),
                None => serde_json::Value::Null,
            },
            Action::Coerce => adapter.to_primitive().to_json(),
            Action::Describe => serde_json::Value::String(adapter.describe()),
        }
    }
}

fn resolution_json(resolution: Resolution) -> serde_json::Value {
    match resolution {
        Resolution::Handler(handler) => serde_json::json!({ "handler": handler.id().name() }),
        Resolution::Value(value) => value.to_json(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(json: &str) -> InteractionScript {
        InteractionScript::from_json(json).unwrap()
    }

    #[test]
    fn parses_every_op() {
        let parsed = script(
            r#"{"steps": [
                {"op": "invoke", "args": ["a", 1]},
                {"op": "write", "key": "x", "value": 42},
                {"op": "read", "key": "x"},
                {"op": "read_protocol", "protocol": "then"},
                {"op": "await"},
                {"op": "catch", "with_handler": true},
                {"op": "finally"},
                {"op": "iterate", "take": 2},
                {"op": "iterate_async"},
                {"op": "coerce"},
                {"op": "describe"}
            ]}"#,
        );
        let ops: Vec<_> = parsed.steps.iter().map(InteractionStep::op).collect();
        assert_eq!(
            ops,
            vec![
                "invoke",
                "write",
                "read",
                "read_protocol",
                "await",
                "catch",
                "finally",
                "iterate",
                "iterate_async",
                "coerce",
                "describe"
            ]
        );
    }

    #[test]
    fn unknown_op_is_a_script_error() {
        let err = InteractionScript::from_json(r#"{"steps": [{"op": "explode"}]}"#).unwrap_err();
        assert_eq!(err.stable_code(), "FE-ADAPTER-0004");
    }

    #[test]
    fn object_argument_fails_before_any_step_runs() {
        let parsed = script(r#"{"steps": [{"op": "invoke", "args": [{"nested": true}]}]}"#);
        let err = replay_script(AdapterConfig::default(), &parsed).unwrap_err();
        assert!(matches!(err, AdapterError::ScriptParse(_)));
    }

    #[test]
    fn replay_records_outcomes() {
        let parsed = script(
            r#"{"steps": [
                {"op": "write", "key": "x", "value": 42},
                {"op": "read", "key": "x"},
                {"op": "read", "key": "x"},
                {"op": "await"},
                {"op": "iterate", "take": 1}
            ]}"#,
        );
        let report = replay_script(AdapterConfig::default(), &parsed).unwrap();
        assert_eq!(report.outcomes[0].result, serde_json::json!(true));
        assert_eq!(report.outcomes[1].result, serde_json::json!(42));
        assert_eq!(report.outcomes[3].result, serde_json::json!("Await complete"));
        assert_eq!(report.outcomes[4].result, serde_json::json!(["✨ 1"]));
        assert!(report.snapshot.has_been_resolved);
        assert_eq!(report.schema_version, DIAGNOSTICS_SCHEMA_VERSION);
    }

    #[test]
    fn read_protocol_reports_handler_name() {
        let parsed = script(r#"{"steps": [{"op": "read_protocol", "protocol": "sync_iterate"}]}"#);
        let report = replay_script(AdapterConfig::default(), &parsed).unwrap();
        assert_eq!(
            report.outcomes[0].result,
            serde_json::json!({"handler": "@@iterator"})
        );
    }

    #[test]
    fn async_iteration_outcome_depends_on_config() {
        let parsed = script(r#"{"steps": [{"op": "iterate_async"}]}"#);
        let disabled = replay_script(AdapterConfig::default(), &parsed).unwrap();
        assert_eq!(disabled.outcomes[0].result, serde_json::Value::Null);

        let enabled =
            replay_script(AdapterConfig::default().with_async_iteration(true), &parsed).unwrap();
        assert_eq!(
            enabled.outcomes[0].result,
            serde_json::json!(["✨ 1", "✨ 2", "✨ 3"])
        );
    }

    #[test]
    fn catch_outcome_with_and_without_handler() {
        let parsed = script(
            r#"{"steps": [{"op": "catch"}, {"op": "catch", "with_handler": true}]}"#,
        );
        let report = replay_script(AdapterConfig::default(), &parsed).unwrap();
        assert_eq!(
            report.outcomes[0].result,
            serde_json::json!("but everything's fine")
        );
        assert_eq!(report.outcomes[1].result, serde_json::json!("handled"));
    }

    #[test]
    fn summary_mentions_trace_and_counts() {
        let parsed = script(r#"{"steps": [{"op": "read", "key": "a"}, {"op": "invoke"}]}"#);
        let report =
            replay_script(AdapterConfig::default().with_trace_id("trace-9"), &parsed).unwrap();
        let summary = render_summary(&report);
        assert!(summary.starts_with("trace=trace-9 steps=2"));
        assert!(summary.contains("fallback_reads=1"));
        assert!(summary.contains("calls=1"));
    }

    #[test]
    fn summary_counts_survive_journal_trimming() {
        let parsed = script(
            r#"{"steps": [
                {"op": "read", "key": "a"},
                {"op": "read", "key": "b"},
                {"op": "read", "key": "c"},
                {"op": "invoke"}
            ]}"#,
        );
        let report =
            replay_script(AdapterConfig::default().with_max_journal_events(1), &parsed).unwrap();
        assert_eq!(report.journal.len(), 1);
        assert_eq!(report.event_totals.get(EVENT_FALLBACK_READ), Some(&3));
        assert!(render_summary(&report).contains("fallback_reads=3"));
    }

    #[test]
    fn report_serializes_to_json() {
        let parsed = script(r#"{"steps": [{"op": "coerce"}, {"op": "describe"}]}"#);
        let report = replay_script(AdapterConfig::default(), &parsed).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        let back: DiagnosticsReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
        assert_eq!(back.outcomes[0].result, serde_json::json!("Wizard Entity"));
        assert_eq!(
            back.outcomes[1].result,
            serde_json::json!("[object UniversalAdapter]")
        );
    }
}
