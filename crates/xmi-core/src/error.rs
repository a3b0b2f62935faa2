//! Caller errors and the umbrella pipeline error.
//!
//! Each component owns its own `thiserror` enum; [`PipelineError`] wraps them
//! and decides how a failure is framed for the caller.

use thiserror::Error;

use crate::acquire::AcquisitionError;
use crate::sandbox::SandboxError;
use crate::stage::{DownstreamFailure, StageError};
use crate::tool::ToolError;

/// The request itself is malformed or unsupported.  Never retried.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Provide inputZip, repoUrl or irFile")]
    MissingSource,

    #[error("Provide only one of inputZip, repoUrl or irFile")]
    ConflictingSources,

    #[error("Invalid value for {field}: {value:?}")]
    InvalidOption { field: &'static str, value: String },

    #[error("Invalid repoUrl (only https URLs are accepted): {0}")]
    InvalidRepoUrl(String),

    #[error("{0}")]
    UnsupportedCombination(&'static str),
}

/// How a [`PipelineError`] is presented to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 400; the message is safe to show.
    Caller,
    /// The downstream stage's own status and body, forwarded verbatim.
    Downstream,
    /// 500; detail stays in the logs.
    Internal,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("IR stage responded with status {}", .0.status)]
    Downstream(DownstreamFailure),

    #[error("IR stage returned an empty body")]
    EmptyStageOutput,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::Request(_) => ErrorClass::Caller,
            PipelineError::Acquisition(e) if e.is_caller_fault() => ErrorClass::Caller,
            PipelineError::Tool(ToolError::UnsupportedLanguage(_)) => ErrorClass::Caller,
            PipelineError::Downstream(_) => ErrorClass::Downstream,
            _ => ErrorClass::Internal,
        }
    }

    /// HTTP status for this failure.  Downstream failures keep the stage's
    /// own status.
    pub fn status(&self) -> u16 {
        match self.class() {
            ErrorClass::Caller => 400,
            ErrorClass::Internal => 500,
            ErrorClass::Downstream => match self {
                PipelineError::Downstream(f) => f.status,
                _ => 502,
            },
        }
    }

    /// Message returned to the caller for non-downstream failures.
    ///
    /// Internal failures get a fixed description per kind so that paths and
    /// raw tool output do not leak.
    pub fn client_message(&self) -> String {
        match self {
            PipelineError::Request(e) => e.to_string(),
            PipelineError::Acquisition(e) if e.is_caller_fault() => e.to_string(),
            PipelineError::Tool(ToolError::UnsupportedLanguage(_)) => self.to_string(),
            PipelineError::Tool(ToolError::Timeout(limit)) => {
                format!("model generation timed out after {}s", limit.as_secs())
            }
            PipelineError::Tool(ToolError::Execution { exit_code, .. }) => {
                format!("model generation failed (exit code {exit_code})")
            }
            PipelineError::Tool(ToolError::MissingOutput) => {
                "model generation produced no output".to_owned()
            }
            PipelineError::Tool(ToolError::Unavailable(_)) => {
                "model generation tool is not available".to_owned()
            }
            PipelineError::Stage(_) => "IR stage is unreachable".to_owned(),
            PipelineError::EmptyStageOutput => "IR stage returned no output".to_owned(),
            PipelineError::Downstream(f) => String::from_utf8_lossy(&f.body).into_owned(),
            _ => "internal server error".to_owned(),
        }
    }

    /// Redacted tool diagnostics, when the tool ran and failed.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            PipelineError::Tool(ToolError::Execution { diagnostics, .. }) if !diagnostics.is_empty() => {
                Some(diagnostics)
            }
            _ => None,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
