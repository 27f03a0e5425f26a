//! Core utilities shared by every trirender crate.
//!
//! - [`Error`] and [`Result`] for window, configuration and I/O failures
//! - [`init_logging`] to install the tracing subscriber
//! - [`AppConfig`] loaded from TOML
//! - [`FrameTimer`] for frame-rate reporting

mod config;
mod error;
mod logging;
mod timer;

pub use config::{AppConfig, RendererConfig, SceneConfig, ShaderConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::FrameTimer;
