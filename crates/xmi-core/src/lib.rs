//! Conversion pipeline for turning project source into UML/XMI.
//!
//! The HTTP layer collects a [`RawForm`] and hands it to
//! [`Pipeline::handle`]; everything from validation to cleanup happens here.

pub mod acquire;
pub mod error;
pub mod options;
pub mod pipeline;
pub mod request;
pub mod sandbox;
pub mod stage;
pub mod tool;

pub use acquire::{AcquireLimits, AcquisitionError, SourceAcquirer};
pub use error::{ErrorClass, PipelineError, RequestError};
pub use options::{AssociationMode, ConversionOptions, normalize_legacy};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutput, Route};
pub use request::{ConversionRequest, Language, RawForm, ResultFormat, SourceOrigin, Upload};
pub use sandbox::{SandboxManager, WorkingDirectory};
pub use stage::{DownstreamFailure, StageClient, StageEndpoint, StageResult};
pub use tool::{ToolError, ToolInvoker, ToolSettings};
