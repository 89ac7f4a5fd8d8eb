use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{parse_extensions, Args};

pub const DEFAULT_MODEL_DIR: &str = "models/face-emotion-detection";
pub const DEFAULT_DATABASE_PATH: &str = "mood_records.db";
pub const DEFAULT_EXTENSIONS: &str = "jpg,jpeg,png,webp";
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 30;

/// On-disk config file format
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    pub name: Option<String>,
    #[serde(default)]
    pub config: MoodConfigJson,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodConfigJson {
    pub model_dir: Option<String>,
    pub database_path: Option<String>,
    pub camera_index: Option<u32>,
    pub frame_interval_ms: Option<u64>,
    pub min_confidence: Option<f32>,
    pub extensions: Option<String>,
}

/// Fully resolved settings: CLI flags over config file over defaults
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub model_dir: PathBuf,
    pub database_path: PathBuf,
    pub camera_index: u32,
    pub frame_interval_ms: u64,
    pub min_confidence: f32,
    pub extensions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            camera_index: 0,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            min_confidence: 0.0,
            extensions: parse_extensions(DEFAULT_EXTENSIONS),
        }
    }
}

/// Values given on the command line; `None` means "not specified"
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub model_dir: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub camera_index: Option<u32>,
    pub min_confidence: Option<f32>,
    pub extensions: Option<String>,
}

impl From<&Args> for CliOverrides {
    fn from(args: &Args) -> Self {
        Self {
            model_dir: args.model_dir.clone(),
            database_path: args.database_path.clone(),
            min_confidence: args.min_confidence,
            ..Self::default()
        }
    }
}

/// `<config dir>/moodvision/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("moodvision").join("config.json"))
}

/// Read a config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {:?}", path))
}

impl Settings {
    /// Resolve settings. An explicit `config_path` must exist; the default
    /// location is used only when present.
    pub fn load(config_path: Option<&Path>, overrides: &CliOverrides, verbose: bool) -> Result<Self> {
        let file = match config_path {
            Some(path) => Some(load_config_file(path)?),
            None => match default_config_path() {
                Some(path) if path.is_file() => Some(load_config_file(&path)?),
                _ => None,
            },
        };

        let mut settings = Settings::default();
        if let Some(file) = file {
            if verbose {
                eprintln!(
                    "Loaded configuration '{}'",
                    file.name.as_deref().unwrap_or("default")
                );
            }
            settings.merge_from_config(&file.config);
        }
        settings.merge_from_cli(overrides);
        settings.validate()?;
        Ok(settings)
    }

    fn merge_from_config(&mut self, config: &MoodConfigJson) {
        if let Some(model_dir) = &config.model_dir {
            self.model_dir = PathBuf::from(model_dir);
        }
        if let Some(database_path) = &config.database_path {
            self.database_path = PathBuf::from(database_path);
        }
        if let Some(index) = config.camera_index {
            self.camera_index = index;
        }
        if let Some(interval) = config.frame_interval_ms {
            self.frame_interval_ms = interval;
        }
        if let Some(min_confidence) = config.min_confidence {
            self.min_confidence = min_confidence;
        }
        if let Some(extensions) = &config.extensions {
            self.extensions = parse_extensions(extensions);
        }
    }

    fn merge_from_cli(&mut self, overrides: &CliOverrides) {
        if let Some(model_dir) = &overrides.model_dir {
            self.model_dir = model_dir.clone();
        }
        if let Some(database_path) = &overrides.database_path {
            self.database_path = database_path.clone();
        }
        if let Some(index) = overrides.camera_index {
            self.camera_index = index;
        }
        if let Some(min_confidence) = overrides.min_confidence {
            self.min_confidence = min_confidence;
        }
        if let Some(extensions) = &overrides.extensions {
            self.extensions = parse_extensions(extensions);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            bail!(
                "minConfidence must be between 0.0 and 1.0, got {}",
                self.min_confidence
            );
        }
        if !(1..=1000).contains(&self.frame_interval_ms) {
            bail!(
                "frameIntervalMs must be between 1 and 1000, got {}",
                self.frame_interval_ms
            );
        }
        if self.extensions.is_empty() {
            bail!("At least one image extension must be configured");
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn to_config_file(&self, name: &str) -> ConfigFile {
        ConfigFile {
            name: Some(name.to_string()),
            config: MoodConfigJson {
                model_dir: Some(self.model_dir.display().to_string()),
                database_path: Some(self.database_path.display().to_string()),
                camera_index: Some(self.camera_index),
                frame_interval_ms: Some(self.frame_interval_ms),
                min_confidence: Some(self.min_confidence),
                extensions: Some(self.extensions.join(",")),
            },
        }
    }

    /// Write these settings as a config file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory {}", parent.display())
                })?;
            }
        }
        let json = serde_json::to_string_pretty(&self.to_config_file("default"))?;
        fs::write(path, json).with_context(|| format!("Failed to write config file: {:?}", path))?;
        log::info!("Saved settings to {}", path.display());
        Ok(())
    }
}
