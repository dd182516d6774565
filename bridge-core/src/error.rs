//! Error types for bridge-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading or saving the bridge configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// An external tool could not be run or reported failure.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} {} exited with {}: {diagnostic}", .args.join(" "), describe_status(.status))]
    Failed {
        program: String,
        /// Arguments with secrets masked.
        args: Vec<String>,
        status: Option<i32>,
        /// The tool's own stdout/stderr, trimmed.
        diagnostic: String,
    },
}

impl ToolError {
    /// Verbatim tool output for failures, the spawn error otherwise.
    pub fn diagnostic(&self) -> String {
        match self {
            ToolError::Spawn { source, .. } => source.to_string(),
            ToolError::Failed { diagnostic, .. } => diagnostic.clone(),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ToolError::Spawn { .. } => None,
            ToolError::Failed { status, .. } => *status,
        }
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("status {code}"),
        None => "signal".to_string(),
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
