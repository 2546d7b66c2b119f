//! JSON-lines logger
//!
//! Each value is written as a single JSON object on its own line, with a
//! per-source step counter:
//!
//! ```text
//! {"source":"reward-metric","step":0,"value":1.0,"custom":false}
//! ```

use super::{LogValue, Logger, Source};
use crate::error::Result;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

pub struct JsonLogger {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    steps: HashMap<String, u64>,
}

impl JsonLogger {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            writer: None,
            steps: HashMap::new(),
        }
    }

    fn open(&self) -> Result<BufWriter<File>> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(BufWriter::new(File::create(&self.path)?))
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        let writer = match self.writer.take() {
            Some(writer) => writer,
            None => self.open()?,
        };
        Ok(self.writer.insert(writer))
    }

    fn write(&mut self, source: &Source, value: serde_json::Value, custom: bool) -> Result<()> {
        let name = source.to_name();
        let step = {
            let counter = self.steps.entry(name.clone()).or_insert(0);
            let step = *counter;
            *counter += 1;
            step
        };

        let line = serde_json::json!({
            "source": name,
            "step": step,
            "value": value,
            "custom": custom,
        });
        let writer = self.writer()?;
        writeln!(writer, "{}", line)?;
        Ok(())
    }
}

impl Logger for JsonLogger {
    fn name(&self) -> &'static str {
        "JsonLogger"
    }

    fn init(&mut self, _sources: &[Source]) -> Result<()> {
        self.writer()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn log_scalar(&mut self, source: &Source, value: f64, custom: bool) -> Result<()> {
        self.write(source, LogValue::Scalar(value).to_json(), custom)
    }

    fn log_array(&mut self, source: &Source, value: &[f64], custom: bool) -> Result<()> {
        self.write(source, serde_json::json!(value), custom)
    }

    fn log_dict(
        &mut self,
        source: &Source,
        value: &serde_json::Map<String, serde_json::Value>,
        custom: bool,
    ) -> Result<()> {
        self.write(source, serde_json::Value::Object(value.clone()), custom)
    }

    fn log_other(
        &mut self,
        source: &Source,
        value: &serde_json::Value,
        custom: bool,
    ) -> Result<()> {
        self.write(source, value.clone(), custom)
    }
}
