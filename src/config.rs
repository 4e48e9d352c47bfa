//! Configuration file support.
//!
//! Settings live in a versioned JSON file under the user's config directory.
//! Every section falls back to defaults for missing fields, so older files
//! keep loading as settings are added.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::PollConfig;
use crate::constants::{DEFAULT_API_URL, DEFAULT_FPS, KEYPOINT_HIT_RADIUS, REFERENCE_HEIGHT, REFERENCE_WIDTH};
use crate::coords::{Scaler, Size};
use crate::render::{ConfidenceBands, OverlayRenderer};

/// Environment variable overriding [`ApiSettings::base_url`].
pub const API_URL_ENV: &str = "ROBOLABEL_API_URL";

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }

    /// Level `steps` notches more verbose, saturating at trace.
    pub fn raised(self, steps: u8) -> Self {
        const ORDER: [LogLevel; 5] = [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ];
        let current = ORDER.iter().position(|l| *l == self).unwrap_or(2);
        ORDER[(current + steps as usize).min(ORDER.len() - 1)]
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version of the configuration file format
    pub version: u32,

    /// Backend connection
    #[serde(default)]
    pub api: ApiSettings,

    /// Clip timing and coordinate reference
    #[serde(default)]
    pub video: VideoSettings,

    /// Overlay and hit testing
    #[serde(default)]
    pub editor: EditorSettings,

    /// Processing status polling
    #[serde(default)]
    pub polling: PollConfig,

    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Backend connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Base URL, without the `/api` suffix
    pub base_url: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ApiSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Timing and coordinate settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    /// Frames per second of every clip
    pub fps: f64,
    /// Resolution pixel coordinates are expressed in
    pub reference_width: f32,
    pub reference_height: f32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            reference_width: REFERENCE_WIDTH,
            reference_height: REFERENCE_HEIGHT,
        }
    }
}

impl VideoSettings {
    pub fn reference(&self) -> Size {
        Size::new(self.reference_width, self.reference_height)
    }

    /// Scaler from the configured reference onto `canvas`.
    pub fn scaler(&self, canvas: Size) -> Scaler {
        Scaler::new(self.reference(), canvas)
    }
}

/// Overlay settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    /// Pointer-to-keypoint hit radius in source pixels
    pub hit_radius: f32,
    /// Bounding box outline colouring thresholds
    pub confidence_bands: ConfidenceBands,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            hit_radius: KEYPOINT_HIT_RADIUS,
            confidence_bands: ConfidenceBands::default(),
        }
    }
}

impl EditorSettings {
    pub fn renderer(&self) -> OverlayRenderer {
        OverlayRenderer::new(self.hit_radius, self.confidence_bands)
    }
}

impl AppConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            api: ApiSettings::default(),
            video: VideoSettings::default(),
            editor: EditorSettings::default(),
            polling: PollConfig::default(),
            log_level: LogLevel::default(),
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        Ok(config)
    }

    /// Get the default config file name.
    pub fn default_filename() -> &'static str {
        "robolabel-config.json"
    }

    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("robolabel").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home_dir| {
                home_dir
                    .join(".config")
                    .join("robolabel")
                    .join(Self::default_filename())
            })
        }
    }

    /// Load configuration from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load from `path`, or from the default path when `None`.
    ///
    /// A missing default file yields the defaults. An explicitly given file
    /// must exist. The API URL environment override is applied either way.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load(&path)?,
                other => {
                    log::debug!("No config file found at {:?}", other);
                    Self::new()
                }
            },
        };
        config.apply_env(std::env::var(API_URL_ENV).ok());
        Ok(config)
    }

    /// Apply the API URL override read from the environment.
    fn apply_env(&mut self, api_url: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            log::debug!("{} overrides API URL with {}", API_URL_ENV, url);
            self.api.base_url = url;
        }
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = self.to_json()?;
        std::fs::write(path, json)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Save configuration to the default path.
    pub fn save_to_default_path(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or_else(|| {
            ConfigError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            ))
        })?;
        self.save(&path)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// I/O error when reading/writing config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
