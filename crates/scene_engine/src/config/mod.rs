//! Configuration system
//!
//! Settings are plain serde structs. Any type implementing [`Config`] can be
//! read from or written to `.toml` and `.ron` files, picked by extension.

pub use serde::{Deserialize, Serialize};

use log::LevelFilter;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match Format::of(path)? {
            Format::Toml => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Format::Ron => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Load configuration from file, falling back to defaults if it is missing
    fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            log::info!("No configuration at {path:?}, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match Format::of(path)? {
            Format::Toml => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?,
            Format::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        std::fs::write(path, contents)?;
        Ok(())
    }
}

enum Format {
    Toml,
    Ron,
}

impl Format {
    fn of(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Values that parse but cannot be used
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `log` level filter name (`off`, `error`, `warn`, `info`, `debug`, `trace`)
    pub log_level: String,

    /// Frame pacing target per context
    ///
    /// A file that omits the key is unpaced, since TOML cannot write `None`.
    /// [`EngineConfig::default`] paces at 16 ms.
    #[serde(default)]
    pub target_frame_time_ms: Option<u64>,

    /// Root directory for asset paths
    pub asset_root: String,

    /// Windows to open at startup
    pub windows: Vec<WindowConfig>,
}

impl EngineConfig {
    /// Parsed log level
    pub fn log_level(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.log_level)
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.log_level)))
    }

    /// Frame pacing target
    pub fn target_frame_time(&self) -> Option<Duration> {
        self.target_frame_time_ms.map(Duration::from_millis)
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log_level()?;
        for window in &self.windows {
            window.validate()?;
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            target_frame_time_ms: Some(16),
            asset_root: "resources".to_string(),
            windows: vec![WindowConfig::default()],
        }
    }
}

impl Config for EngineConfig {}

/// Settings of one rendering context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,

    /// Framebuffer width
    pub width: u32,

    /// Framebuffer height
    pub height: u32,

    /// RGBA clear color
    pub clear_color: [f32; 4],

    /// Whether this context's thread runs the scene's logic update
    ///
    /// With several windows exactly one should drive updates, otherwise the
    /// scene advances once per window per frame.
    pub drive_updates: bool,

    /// Stop the context after this many frames
    pub max_frames: Option<u64>,
}

impl WindowConfig {
    /// Width over height
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window '{}' has zero size {}x{}",
                self.title, self.width, self.height
            )));
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Scene Engine".to_string(),
            width: 1280,
            height: 720,
            clear_color: [0.1, 0.1, 0.12, 1.0],
            drive_updates: true,
            max_frames: None,
        }
    }
}

impl Config for WindowConfig {}
