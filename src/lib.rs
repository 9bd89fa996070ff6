pub mod camera;
pub mod clouds_uniforms;
pub mod config;
pub mod error;
pub mod gpu;
pub mod noise;
pub mod program;
pub mod quality;
pub mod shared_uniforms;
pub mod uniforms;
pub mod wind;

pub mod cli;

pub use error::{PipelineError, Result, UniformError};
