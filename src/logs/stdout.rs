//! Logger printing every value to standard output

use super::{Logger, Source};
use crate::error::Result;

/// Prints `name: value` lines as values arrive
#[derive(Debug, Default)]
pub struct StdoutLogger {
    lines_written: usize,
}

impl StdoutLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lines printed so far
    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    fn print(&mut self, source: &Source, value: String) {
        println!("{}: {}", source.to_name(), value);
        self.lines_written += 1;
    }
}

impl Logger for StdoutLogger {
    fn name(&self) -> &'static str {
        "StdoutLogger"
    }

    fn log_scalar(&mut self, source: &Source, value: f64, _custom: bool) -> Result<()> {
        self.print(source, format!("{}", value));
        Ok(())
    }

    fn log_array(&mut self, source: &Source, value: &[f64], _custom: bool) -> Result<()> {
        self.print(source, format!("{:?}", value));
        Ok(())
    }

    fn log_dict(
        &mut self,
        source: &Source,
        value: &serde_json::Map<String, serde_json::Value>,
        _custom: bool,
    ) -> Result<()> {
        self.print(source, serde_json::Value::Object(value.clone()).to_string());
        Ok(())
    }

    fn log_other(
        &mut self,
        source: &Source,
        value: &serde_json::Value,
        _custom: bool,
    ) -> Result<()> {
        self.print(source, value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::LogValue;

    #[test]
    fn test_accepts_every_kind() {
        let mut logger = StdoutLogger::new();
        let source = Source::any("x");

        logger.log(&source, &LogValue::Scalar(1.0), false).unwrap();
        logger.log(&source, &LogValue::Array(vec![1.0, 2.0]), false).unwrap();
        logger
            .log(&source, &LogValue::Dict(serde_json::Map::new()), true)
            .unwrap();
        logger
            .log(&source, &LogValue::Other(serde_json::json!("text")), true)
            .unwrap();

        assert_eq!(logger.lines_written(), 4);
    }
}
