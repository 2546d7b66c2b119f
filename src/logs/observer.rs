//! Routing of logged values to logger instances

use super::{LogValue, Logger, LoggerConfig, LoggerKind, Source, SourceType};
use crate::error::Result;
use crate::spaces::Observation;
use std::collections::BTreeMap;

struct LoggerEntry {
    kind: LoggerKind,
    logger: Box<dyn Logger>,
    sources: Vec<Source>,
    /// Registered sources per source type, indexed by `SourceType::index`
    routes: [Vec<Source>; 3],
}

/// Owns the logger instances of one [`crate::RLib`] and forwards values to them
///
/// Each logger kind is instantiated once. A [`Source::Named`] is routed only
/// to values of its source type, a [`Source::Any`] to all of them.
#[derive(Default)]
pub struct LogsObserver {
    entries: Vec<LoggerEntry>,
}

impl LogsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source` with the logger of `kind`, creating it with `config` if needed
    pub fn add_logger(&mut self, source: Source, kind: LoggerKind, config: &LoggerConfig) {
        let index = match self.entries.iter().position(|e| e.kind == kind) {
            Some(index) => index,
            None => {
                tracing::debug!(?kind, "Creating logger");
                self.entries.push(LoggerEntry {
                    kind,
                    logger: kind.build(config),
                    sources: Vec::new(),
                    routes: Default::default(),
                });
                self.entries.len() - 1
            }
        };

        let entry = &mut self.entries[index];
        match &source {
            Source::Named(_, source_type) => entry.routes[source_type.index()].push(source.clone()),
            Source::Any(_) => {
                for route in entry.routes.iter_mut() {
                    route.push(source.clone());
                }
            }
        }
        entry.sources.push(source);
    }

    /// Add an already constructed logger, replacing any previous one of the same kind
    #[cfg(test)]
    pub(crate) fn add_logger_instance(&mut self, kind: LoggerKind, logger: Box<dyn Logger>) {
        self.entries.retain(|e| e.kind != kind);
        self.entries.push(LoggerEntry {
            kind,
            logger,
            sources: Vec::new(),
            routes: Default::default(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn kinds(&self) -> Vec<LoggerKind> {
        self.entries.iter().map(|e| e.kind).collect()
    }

    pub fn update_observations(&mut self, observations: &Observation) -> Result<()> {
        self.update(SourceType::Observation, |name| {
            observations.get(name).map(LogValue::from)
        })
    }

    pub fn update_agent_state<F>(&mut self, state_value: F) -> Result<()>
    where
        F: Fn(&str) -> Option<LogValue>,
    {
        self.update(SourceType::State, state_value)
    }

    pub fn update_metrics(&mut self, metrics: &BTreeMap<String, LogValue>) -> Result<()> {
        self.update(SourceType::Metric, |name| metrics.get(name).cloned())
    }

    /// Log a user-provided value to every logger with a source of that name
    pub fn log_custom(&mut self, name: &str, value: &LogValue) -> Result<()> {
        for entry in &mut self.entries {
            if let Some(source) = entry.sources.iter().find(|s| s.base_name() == name) {
                entry.logger.log(source, value, true)?;
            }
        }
        Ok(())
    }

    fn update<F>(&mut self, source_type: SourceType, get_value: F) -> Result<()>
    where
        F: Fn(&str) -> Option<LogValue>,
    {
        for entry in &mut self.entries {
            for source in &entry.routes[source_type.index()] {
                if let Some(value) = get_value(source.base_name()) {
                    entry.logger.log(source, &value, false)?;
                }
            }
        }
        Ok(())
    }

    pub fn init_loggers(&mut self) -> Result<()> {
        for entry in &mut self.entries {
            entry.logger.init(&entry.sources)?;
        }
        Ok(())
    }

    pub fn finish_loggers(&mut self) -> Result<()> {
        for entry in &mut self.entries {
            entry.logger.finish()?;
        }
        Ok(())
    }
}
