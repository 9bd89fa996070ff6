//! Error types for uniform storage and pipeline construction.

use thiserror::Error;

use crate::uniforms::UniformKind;

/// Errors raised by [`UniformSet`](crate::uniforms::UniformSet) and
/// [`SharedUniforms`](crate::shared_uniforms::SharedUniforms).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UniformError {
    #[error("unknown uniform '{key}'")]
    UnknownKey { key: String },

    #[error("uniform '{key}' is declared as {expected:?}, got {found:?}")]
    TypeMismatch {
        key: String,
        expected: UniformKind,
        found: UniformKind,
    },

    #[error("uniform '{key}' is already declared")]
    DuplicateKey { key: String },

    #[error("uniform '{key}': cannot read {expected:?} from JSON value {value}")]
    InvalidJson {
        key: String,
        expected: UniformKind,
        value: String,
    },
}

/// Errors raised while building or driving the render pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A program references a parameter the owning uniform set does not declare,
    /// or declares it with an incompatible type.
    #[error("program '{program}' failed to link uniform '{key}': {reason}")]
    ProgramLink {
        program: String,
        key: String,
        reason: String,
    },

    #[error("program '{program}' failed to parse:\n{message}")]
    ShaderParse { program: String, message: String },

    #[error(transparent)]
    Uniform(#[from] UniformError),

    #[error("no suitable GPU adapter found")]
    NoAdapter,

    /// The adapter lacks a format capability the passes render with.
    #[error("adapter '{adapter}' is not supported: {reason}")]
    UnsupportedAdapter { adapter: String, reason: String },

    /// wgpu rejected a GPU object while the pipeline was being built.
    #[error("GPU validation failed for '{label}': {message}")]
    Gpu { label: String, message: String },

    #[error("failed to open GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("failed to load asset '{path}': {message}")]
    Asset { path: String, message: String },

    #[error("invalid configuration '{path}': {message}")]
    Config { path: String, message: String },

    #[error("frame readback failed: {0}")]
    Readback(String),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
