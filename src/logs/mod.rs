//! Pluggable loggers for observations, agent state and metrics
//!
//! A [`Logger`] receives values tagged with a [`Source`]. The
//! [`LogsObserver`] owns one instance per [`LoggerKind`] and routes each
//! registered source to the loggers interested in it.

pub mod csv;
pub mod json;
pub mod observer;
pub mod stdout;

pub use self::csv::CsvLogger;
pub use self::json::JsonLogger;
pub use observer::LogsObserver;
pub use stdout::StdoutLogger;

use crate::error::{Result, RlibError};
use crate::spaces::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Where a logged value comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Observation,
    State,
    Metric,
}

impl SourceType {
    pub const ALL: [SourceType; 3] = [
        SourceType::Observation,
        SourceType::State,
        SourceType::Metric,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SourceType::Observation => "observation",
            SourceType::State => "state",
            SourceType::Metric => "metric",
        }
    }

    fn index(&self) -> usize {
        match self {
            SourceType::Observation => 0,
            SourceType::State => 1,
            SourceType::Metric => 2,
        }
    }
}

/// A value to log: a name, optionally restricted to one [`SourceType`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Only values of `name` coming from the given source type
    Named(String, SourceType),
    /// Values of `name` from any source type
    Any(String),
}

impl Source {
    pub fn named(name: impl Into<String>, source_type: SourceType) -> Self {
        Source::Named(name.into(), source_type)
    }

    pub fn any(name: impl Into<String>) -> Self {
        Source::Any(name.into())
    }

    /// The bare value name used for lookups
    pub fn base_name(&self) -> &str {
        match self {
            Source::Named(name, _) | Source::Any(name) => name,
        }
    }

    /// Display name: `name` or `name-<sourcetype>` (e.g. `action-metric`)
    pub fn to_name(&self) -> String {
        match self {
            Source::Named(name, source_type) => format!("{}-{}", name, source_type.name()),
            Source::Any(name) => name.clone(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_name())
    }
}

/// A value handed to a logger
#[derive(Debug, Clone, PartialEq)]
pub enum LogValue {
    Scalar(f64),
    Array(Vec<f64>),
    Dict(serde_json::Map<String, serde_json::Value>),
    Other(serde_json::Value),
}

impl LogValue {
    pub fn kind(&self) -> &'static str {
        match self {
            LogValue::Scalar(_) => "scalar",
            LogValue::Array(_) => "array",
            LogValue::Dict(_) => "dict",
            LogValue::Other(_) => "other",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            LogValue::Scalar(x) => serde_json::json!(x),
            LogValue::Array(xs) => serde_json::json!(xs),
            LogValue::Dict(map) => serde_json::Value::Object(map.clone()),
            LogValue::Other(v) => v.clone(),
        }
    }
}

impl From<&Value> for LogValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Array(xs) => LogValue::Array(xs.clone()),
            other => LogValue::Scalar(other.as_f64().unwrap_or(f64::NAN)),
        }
    }
}

impl From<f64> for LogValue {
    fn from(x: f64) -> Self {
        LogValue::Scalar(x)
    }
}

impl From<Vec<f64>> for LogValue {
    fn from(xs: Vec<f64>) -> Self {
        LogValue::Array(xs)
    }
}

impl From<BTreeMap<String, f64>> for LogValue {
    fn from(map: BTreeMap<String, f64>) -> Self {
        LogValue::Dict(
            map.into_iter()
                .map(|(k, v)| (k, serde_json::json!(v)))
                .collect(),
        )
    }
}

/// Interface of a logging sink
///
/// Every `log_*` method defaults to [`RlibError::UnsupportedLogType`], so a
/// logger implements only the value kinds it can record.
pub trait Logger {
    /// Type name used in error messages
    fn name(&self) -> &'static str;

    /// Called once, before the first value, with every registered source
    fn init(&mut self, _sources: &[Source]) -> Result<()> {
        Ok(())
    }

    /// Called once at the end, e.g. to flush files
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn log_scalar(&mut self, _source: &Source, _value: f64, _custom: bool) -> Result<()> {
        Err(unsupported(self.name(), "scalar"))
    }

    fn log_array(&mut self, _source: &Source, _value: &[f64], _custom: bool) -> Result<()> {
        Err(unsupported(self.name(), "array"))
    }

    fn log_dict(
        &mut self,
        _source: &Source,
        _value: &serde_json::Map<String, serde_json::Value>,
        _custom: bool,
    ) -> Result<()> {
        Err(unsupported(self.name(), "dict"))
    }

    fn log_other(
        &mut self,
        _source: &Source,
        _value: &serde_json::Value,
        _custom: bool,
    ) -> Result<()> {
        Err(unsupported(self.name(), "other"))
    }

    /// Dispatch a [`LogValue`] to the matching `log_*` method
    fn log(&mut self, source: &Source, value: &LogValue, custom: bool) -> Result<()> {
        match value {
            LogValue::Scalar(x) => self.log_scalar(source, *x, custom),
            LogValue::Array(xs) => self.log_array(source, xs, custom),
            LogValue::Dict(map) => self.log_dict(source, map, custom),
            LogValue::Other(v) => self.log_other(source, v, custom),
        }
    }
}

fn unsupported(logger: &str, log_type: &str) -> RlibError {
    RlibError::UnsupportedLogType {
        logger: logger.to_string(),
        log_type: log_type.to_string(),
    }
}

/// Available logger implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerKind {
    Stdout,
    Csv,
    Json,
}

/// Settings used when a logger is first created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Output file of the CSV logger
    pub csv_path: PathBuf,

    /// Output file of the JSON-lines logger
    pub json_path: PathBuf,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("rlib-logs.csv"),
            json_path: PathBuf::from("rlib-logs.jsonl"),
        }
    }
}

impl LoggerKind {
    /// Create a fresh logger of this kind
    pub fn build(&self, config: &LoggerConfig) -> Box<dyn Logger> {
        match self {
            LoggerKind::Stdout => Box::new(StdoutLogger::new()),
            LoggerKind::Csv => Box::new(CsvLogger::new(config.csv_path.clone())),
            LoggerKind::Json => Box::new(JsonLogger::new(config.json_path.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScalarOnly(Vec<f64>);

    impl Logger for ScalarOnly {
        fn name(&self) -> &'static str {
            "ScalarOnly"
        }

        fn log_scalar(&mut self, _source: &Source, value: f64, _custom: bool) -> Result<()> {
            self.0.push(value);
            Ok(())
        }
    }

    #[test]
    fn test_source_to_name() {
        assert_eq!(Source::named("action", SourceType::Metric).to_name(), "action-metric");
        assert_eq!(Source::named("power", SourceType::Observation).to_name(), "power-observation");
        assert_eq!(Source::any("reward").to_name(), "reward");
        assert_eq!(Source::named("epsilon", SourceType::State).base_name(), "epsilon");
    }

    #[test]
    fn test_default_methods_reject_values() {
        let mut logger = ScalarOnly(Vec::new());
        let source = Source::any("x");

        logger.log(&source, &LogValue::Scalar(1.5), false).unwrap();
        assert_eq!(logger.0, vec![1.5]);

        let err = logger.log(&source, &LogValue::Array(vec![1.0]), false).unwrap_err();
        assert_eq!(err.to_string(), "Logger ScalarOnly does not support logging array.");
    }

    #[test]
    fn test_log_value_from_value() {
        assert_eq!(LogValue::from(&Value::Int(3)), LogValue::Scalar(3.0));
        assert_eq!(LogValue::from(&Value::Bool(true)), LogValue::Scalar(1.0));
        assert_eq!(
            LogValue::from(&Value::Array(vec![1.0, 2.0])),
            LogValue::Array(vec![1.0, 2.0])
        );
    }

    #[test]
    fn test_logger_config_from_toml() {
        let config: LoggerConfig = toml::from_str("csv_path = \"out/metrics.csv\"").unwrap();
        assert_eq!(config.csv_path, PathBuf::from("out/metrics.csv"));
        assert_eq!(config.json_path, PathBuf::from("rlib-logs.jsonl"));
    }
}
