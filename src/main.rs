use anyhow::{Context, Result};
use cube_renderer::app::{App, FrameStats};
use cube_renderer::config::{Config, CONFIG_PATH};
use log::LevelFilter;
use std::process::ExitCode;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> ExitCode {
    // Config is read first so it can set the log level
    let (config, config_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    init_logging(&config);

    if let Some(e) = config_error {
        log::warn!("Failed to load {}: {:#}. Using defaults.", CONFIG_PATH, e);
    }
    log::info!("Starting cube renderer");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        config.window.title
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    match run(&config) {
        Ok(stats) => {
            log::info!(
                "Shutdown complete: {} frames rendered, {} skipped, {} swapchain recreations",
                stats.frames_rendered,
                stats.frames_skipped,
                stats.swapchain_recreations
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config) -> Result<FrameStats> {
    let mut app = App::new(config).context("Failed to initialize renderer")?;
    app.run().context("Render loop failed")
}

/// Default level comes from the config, `RUST_LOG` overrides it
fn init_logging(config: &Config) {
    let level = config
        .debug
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}
