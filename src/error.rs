//! Error types for the library
//!
//! Application code (the `rlib` binary and its modes) wraps these in
//! `anyhow` with context; library code returns [`RlibError`] directly.

use thiserror::Error;

/// General library error type
#[derive(Debug, Error)]
pub enum RlibError {
    #[error("No extension is specified.")]
    NoExtension,

    #[error("Cannot set extension type when 'no_ext_mode' is enabled.")]
    ForbiddenExtensionSet,

    #[error("Cannot add new loggers after the first step has been made.")]
    ForbiddenLoggerSet,

    #[error("{provided} is not a valid extension type, expected {expected}.")]
    IncorrectExtensionType { provided: String, expected: String },

    #[error("{provided} is not a valid agent type, expected {expected}.")]
    IncorrectAgentType { provided: String, expected: String },

    #[error(
        "Agent {agent_id} has been already defined with different parameters. \
         Agent load failed."
    )]
    IncorrectAgentParameters { agent_id: usize },

    #[error(
        "Agents space of type {agent_space} is not compatible with \
         extension space of type {ext_space}."
    )]
    IncompatibleSpaces {
        ext_space: String,
        agent_space: String,
    },

    #[error("Extension {extension} does not provide parameter {name} of type {space}.")]
    NoDefaultParameter {
        extension: String,
        name: String,
        space: String,
    },

    #[error("Logger {logger} does not support logging {log_type}.")]
    UnsupportedLogType { logger: String, log_type: String },

    #[error("Observation '{0}' is missing.")]
    MissingObservation(String),

    #[error("Observation '{name}' is invalid: {reason}")]
    InvalidObservation { name: String, reason: String },

    #[error("Parameter '{name}' is invalid: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Agent {0} is not initialized.")]
    UnknownAgent(usize),

    #[error("Malformed record: {0}")]
    Record(String),

    #[error("Tensor error: {0}")]
    Tensor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Checkpoint error: {0}")]
    Recorder(#[from] burn::record::RecorderError),
}

pub type Result<T> = std::result::Result<T, RlibError>;

impl RlibError {
    pub(crate) fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_observation(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidObservation {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(RlibError::NoExtension.to_string(), "No extension is specified.");
        assert_eq!(
            RlibError::IncorrectAgentParameters { agent_id: 3 }.to_string(),
            "Agent 3 has been already defined with different parameters. Agent load failed."
        );
        assert_eq!(
            RlibError::UnsupportedLogType {
                logger: "CsvLogger".into(),
                log_type: "dict".into()
            }
            .to_string(),
            "Logger CsvLogger does not support logging dict."
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: RlibError = io.into();
        assert!(matches!(err, RlibError::Io(_)));
    }
}
