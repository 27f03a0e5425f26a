//! trirender - draws a colored triangle and keeps presenting it across
//! resizes and minimization until the window is closed.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use trirender_core::AppConfig;
use trirender_platform::Window;
use trirender_renderer::{FrameOrchestrator, FrameStats, VulkanBackend};

/// Environment variable naming the configuration file.
const CONFIG_ENV: &str = "TRIRENDER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "trirender.toml";

fn main() -> ExitCode {
    trirender_core::init_logging();

    let config_path = std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = match AppConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))
    {
        Ok(config) => config,
        Err(e) => {
            report_fatal(&e, AppConfig::default().error_report.as_deref());
            return ExitCode::FAILURE;
        }
    };

    match run(&config) {
        Ok(stats) => {
            info!(
                "Exiting after {} frames and {} swap chain recreations",
                stats.frames, stats.recreations
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_fatal(&e, config.error_report.as_deref());
            ExitCode::FAILURE
        }
    }
}

fn run(config: &AppConfig) -> Result<FrameStats> {
    config.validate().context("invalid configuration")?;

    info!(
        "Starting trirender ({}x{}, validation: {})",
        config.window.width, config.window.height, config.renderer.validation
    );

    let window = Window::new(&config.window).context("failed to create window")?;
    let backend = VulkanBackend::new(&window, config).context("failed to initialize Vulkan")?;
    let mut orchestrator =
        FrameOrchestrator::new(backend, window).context("failed to build frame resources")?;

    orchestrator.run().context("frame loop failed")
}

/// Reports a fatal error once to the log and stderr, and to `report_path` if set.
fn report_fatal(err: &anyhow::Error, report_path: Option<&Path>) {
    error!("{:#}", err);
    eprintln!("Error: {:?}", err);

    if let Some(path) = report_path
        && let Err(write_err) = std::fs::write(path, format!("{:?}\n", err))
    {
        warn!("Could not write error report to {}: {}", path.display(), write_err);
    }
}
