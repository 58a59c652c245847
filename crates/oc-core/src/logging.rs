//! Logging setup
//!
//! Installs the global `tracing` subscriber and provides the startup dumps
//! the session writes whenever a program is booted.

use tracing_subscriber::EnvFilter;

use crate::config::{Config, DebugConfig};

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Calling this more
/// than once is harmless; later calls keep the first subscriber.
pub fn init(debug: &DebugConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(debug.log_level.as_filter()));

    let result = if debug.log_to_file {
        match std::fs::File::create(&debug.log_path) {
            Ok(file) => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init(),
            Err(e) => {
                eprintln!("Failed to create log file {}: {}", debug.log_path.display(), e);
                tracing_subscriber::fmt().with_env_filter(filter).try_init()
            }
        }
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    if result.is_ok() {
        tracing::info!("Logging backend initialised");
    }
}

/// Dump the effective configuration
pub fn log_settings(config: &Config) {
    tracing::info!("Settings:");
    tracing::info!("  core.quantum_us: {}", config.core.quantum_us);
    tracing::info!(
        "  core.turbo: {} ({}%)",
        config.core.turbo_enabled,
        config.core.turbo_speed
    );
    tracing::info!("  graphics.api: {:?}", config.graphics.api);
    tracing::info!("  graphics.use_disk_shader_cache: {}", config.graphics.use_disk_shader_cache);
    tracing::info!("  audio.enable: {}", config.audio.enable);
    tracing::info!("  audio.volume: {}", config.audio.volume);
    tracing::info!("  layout.swap_screen: {}", config.layout.swap_screen);
    tracing::info!("  layout.portrait: {}", config.layout.portrait);
    tracing::info!("  paths.states: {}", config.paths.states.display());
    tracing::info!("  paths.shader_cache: {}", config.paths.shader_cache.display());
}

/// Log build and host information
pub fn log_host_info() {
    tracing::info!(
        "oxidized-session version: {}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("Host CPU: {}", std::env::consts::ARCH);
    tracing::info!("Host OS: {} ({})", std::env::consts::OS, std::env::consts::FAMILY);
}
