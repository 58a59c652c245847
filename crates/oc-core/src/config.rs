//! Configuration system for the oxidized-cell session layer

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{EmulatorError, Result};

/// Configuration shared between the host and the execution thread
pub type SharedConfig = Arc<RwLock<Config>>;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub general: GeneralConfig,
    pub core: CoreConfig,
    pub graphics: GraphicsConfig,
    pub audio: AudioConfig,
    pub layout: LayoutConfig,
    pub paths: PathConfig,
    pub debug: DebugConfig,
}

/// General emulator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub start_paused: bool,
}

/// Execution core settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Wall-clock length of one quantum at 100% speed, in microseconds
    pub quantum_us: u64,
    /// Speed limit used while turbo is held, in percent
    pub turbo_speed: u32,
    pub turbo_enabled: bool,
}

/// Graphics API used to build the graphics context
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum GraphicsApi {
    OpenGl,
    #[default]
    Vulkan,
    Null,
}

/// Graphics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub api: GraphicsApi,
    /// Warm the disk shader cache before the first quantum
    pub use_disk_shader_cache: bool,
}

/// Audio settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enable: bool,
    /// Output volume in `[0.0, 1.0]`
    pub volume: f32,
}

/// Screen layout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct LayoutConfig {
    pub swap_screen: bool,
    pub portrait: bool,
    /// Host screen rotation in degrees
    pub rotation: i32,
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub states: PathBuf,
    pub shader_cache: PathBuf,
}

/// Debug settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
    pub log_to_file: bool,
    pub log_path: PathBuf,
}

/// Logging level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

// Default implementations

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            start_paused: false,
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            quantum_us: 16_667,
            turbo_speed: 200,
            turbo_enabled: false,
        }
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            api: GraphicsApi::default(),
            use_disk_shader_cache: true,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enable: true,
            volume: 1.0,
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oxidized-session");

        Self::with_base(base)
    }
}

impl PathConfig {
    /// Lay out every directory under `base`
    pub fn with_base(base: PathBuf) -> Self {
        Self {
            states: base.join("states"),
            shader_cache: base.join("cache/shaders"),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_to_file: false,
            log_path: PathBuf::from("oxidized-session.log"),
        }
    }
}

impl Config {
    /// Load configuration from the default location, or create it if it doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Self::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| EmulatorError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| EmulatorError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oxidized-session")
            .join("config.toml")
    }

    /// Wrap into the shared handle used across threads
    pub fn into_shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.general.start_paused);
        assert_eq!(config.graphics.api, GraphicsApi::Vulkan);
        assert_eq!(config.core.quantum_us, 16_667);
        assert_eq!(config.audio.volume, 1.0);
        assert!(config.paths.states.ends_with("states"));
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.graphics.api = GraphicsApi::Null;
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.graphics.api, GraphicsApi::Null);
        assert_eq!(parsed.core.turbo_speed, config.core.turbo_speed);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str("[audio]\nvolume = 0.5\n").unwrap();
        assert_eq!(parsed.audio.volume, 0.5);
        assert!(parsed.audio.enable);
        assert!(parsed.graphics.use_disk_shader_cache);
    }

    #[test]
    fn test_retired_keys_are_ignored() {
        let legacy = "[general]\nconfirm_exit = false\n\n[graphics]\nresolution_factor = 3\nuse_disk_shader_cache = false\n\n[paths]\nsdmc = \"/tmp/sdmc\"\n";
        let parsed: Config = toml::from_str(legacy).unwrap();
        assert!(!parsed.graphics.use_disk_shader_cache);

        let written = toml::to_string_pretty(&Config::default()).unwrap();
        for key in ["confirm_exit", "resolution_factor", "enable_realtime_audio", "sdmc", "nand"] {
            assert!(!written.contains(&format!("{} =", key)), "{} is still written", key);
        }
    }

    #[test]
    fn test_save_and_load_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = Config::default();
        config.layout.swap_screen = true;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert!(loaded.layout.swap_screen);
    }

    #[test]
    fn test_load_from_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "graphics = 12").unwrap();

        assert!(matches!(Config::load_from(&path), Err(EmulatorError::Config(_))));
    }
}
