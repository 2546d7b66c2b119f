//! Logger collecting values and writing them as CSV on finish
//!
//! Output format (one row per logged value):
//!
//! ```text
//! source,step,value
//! reward-metric,0,1
//! rates-observation,0,"[7.3,14.6]"
//! ```

use super::{Logger, Source};
use crate::error::Result;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Buffers `(source, step, value)` rows and writes them in [`Logger::finish`]
///
/// Scalars, arrays and arbitrary JSON values are supported. Dictionaries are
/// rejected because they do not map to a single column.
#[derive(Debug)]
pub struct CsvLogger {
    path: PathBuf,
    rows: Vec<(String, u64, String)>,
    steps: HashMap<String, u64>,
}

impl CsvLogger {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            rows: Vec::new(),
            steps: HashMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows collected so far
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn push(&mut self, source: &Source, value: String) {
        let name = source.to_name();
        let step = self.steps.entry(name.clone()).or_insert(0);
        self.rows.push((name, *step, value));
        *step += 1;
    }

    fn quote(field: &str) -> String {
        if field.contains([',', '"', '\n']) {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }
}

impl Logger for CsvLogger {
    fn name(&self) -> &'static str {
        "CsvLogger"
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer = BufWriter::new(File::create(&self.path)?);
        writeln!(writer, "source,step,value")?;
        for (source, step, value) in &self.rows {
            writeln!(writer, "{},{},{}", Self::quote(source), step, Self::quote(value))?;
        }
        writer.flush()?;

        tracing::debug!(path = ?self.path, rows = self.rows.len(), "CSV log written");
        Ok(())
    }

    fn log_scalar(&mut self, source: &Source, value: f64, _custom: bool) -> Result<()> {
        self.push(source, value.to_string());
        Ok(())
    }

    fn log_array(&mut self, source: &Source, value: &[f64], _custom: bool) -> Result<()> {
        self.push(source, serde_json::to_string(value)?);
        Ok(())
    }

    fn log_other(
        &mut self,
        source: &Source,
        value: &serde_json::Value,
        _custom: bool,
    ) -> Result<()> {
        self.push(source, value.to_string());
        Ok(())
    }
}
