//! Application configuration loaded from TOML.
//!
//! Every field has a default, so an absent file or a partial file both
//! produce a usable configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub shaders: ShaderConfig,
    pub renderer: RendererConfig,
    pub scene: SceneConfig,
    /// File that receives the fatal error message, if any.
    pub error_report: Option<PathBuf>,
}

/// Initial window parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub resizable: bool,
}

/// Paths to the compiled SPIR-V shader pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

/// Renderer switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Enable the Khronos validation layer.
    pub validation: bool,
    /// Use MAILBOX presentation when the surface offers it.
    pub prefer_mailbox: bool,
}

/// What geometry to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Subdivision depth of the Sierpinski triangle. Zero draws a single triangle.
    pub sierpinski_depth: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            shaders: ShaderConfig::default(),
            renderer: RendererConfig::default(),
            scene: SceneConfig::default(),
            error_report: Some(PathBuf::from("error.txt")),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Vulkan".to_string(),
            resizable: true,
        }
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/spirv/simple_shader.vert.spv"),
            fragment: PathBuf::from("shaders/spirv/simple_shader.frag.spv"),
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            prefer_mailbox: true,
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self { sierpinski_depth: 0 }
    }
}

/// Deepest accepted Sierpinski subdivision.
const MAX_SIERPINSKI_DEPTH: u32 = 8;

impl AppConfig {
    /// Load the configuration at `path`.
    ///
    /// A missing file yields [`AppConfig::default`]; an unreadable or
    /// malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the renderer cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.shaders.vertex.as_os_str().is_empty() || self.shaders.fragment.as_os_str().is_empty()
        {
            return Err(Error::Config("shader paths must not be empty".to_string()));
        }
        if self.scene.sierpinski_depth > MAX_SIERPINSKI_DEPTH {
            return Err(Error::Config(format!(
                "sierpinski_depth {} exceeds maximum {}",
                self.scene.sierpinski_depth, MAX_SIERPINSKI_DEPTH
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.window.title, "Vulkan");
        assert!(config.window.resizable);
        assert_eq!(config.scene.sierpinski_depth, 0);
        assert_eq!(config.error_report, Some(PathBuf::from("error.txt")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [window]
            width = 1280
            title = "Triangle"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 600);
        assert_eq!(config.window.title, "Triangle");
        assert_eq!(config.shaders, ShaderConfig::default());
    }

    #[test]
    fn test_full_document() {
        let config = AppConfig::from_toml_str(
            r#"
            error_report = "crash.log"

            [shaders]
            vertex = "a.vert.spv"
            fragment = "a.frag.spv"

            [renderer]
            validation = false
            prefer_mailbox = false

            [scene]
            sierpinski_depth = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.shaders.vertex, PathBuf::from("a.vert.spv"));
        assert!(!config.renderer.validation);
        assert!(!config.renderer.prefer_mailbox);
        assert_eq!(config.scene.sierpinski_depth, 3);
        assert_eq!(config.error_report, Some(PathBuf::from("crash.log")));
    }

    #[test]
    fn test_zero_window_rejected() {
        let err = AppConfig::from_toml_str("[window]\nheight = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_empty_shader_path_rejected() {
        let err = AppConfig::from_toml_str("[shaders]\nvertex = \"\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_excessive_depth_rejected() {
        let err = AppConfig::from_toml_str("[scene]\nsierpinski_depth = 20\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = AppConfig::from_toml_str("[window\nwidth = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = AppConfig::load("definitely/not/here/trirender.toml").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_unreadable_path_is_config_read() {
        let dir = std::env::temp_dir();
        let err = AppConfig::load(&dir).unwrap_err();
        match err {
            Error::ConfigRead { path, .. } => assert_eq!(path, dir),
            other => panic!("unexpected error: {other}"),
        }
    }
}
