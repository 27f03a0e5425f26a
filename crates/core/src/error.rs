//! Errors from windowing and configuration.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The event loop or window could not be created or driven.
    #[error("window system: {0}")]
    Window(String),

    /// The window system could not provide a Vulkan surface or its extensions.
    #[error("presentation surface: {0}")]
    Surface(String),

    #[error("cannot read {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML or values the renderer cannot start with.
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
