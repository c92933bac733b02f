use std::io;

use thiserror::Error;

/// Failures surfaced by the execution engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown framework, relative base directory, unusable runtime.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The contained command ran and exited non-zero.
    #[error("command `{command}` in image {image} exited with {}: {stderr}", exit_label(.exit_code))]
    ContainedProcess {
        image: String,
        command: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    /// Object-storage synchronization failed.
    #[error("failed to stage {source_uri} -> {destination}: {detail}")]
    Staging {
        source_uri: String,
        destination: String,
        detail: String,
    },

    #[error("failed to launch `{program}`: {source}")]
    RuntimeSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}

/// Non-fatal failure to hand new output files back to the invoking user.
#[derive(Debug, Error)]
#[error("ownership repair skipped for {}: {reason}", describe_paths(.paths))]
pub struct OwnershipRepairWarning {
    pub paths: Vec<String>,
    pub reason: String,
}

fn describe_paths(paths: &[String]) -> String {
    if paths.is_empty() {
        "outputs".to_string()
    } else {
        paths.join(", ")
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
