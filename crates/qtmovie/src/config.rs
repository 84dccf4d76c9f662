use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::plugin::SourceKind;
use crate::session::OpenOptions;

/// Persisted movie driver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieConfig {
    #[serde(default)]
    pub source: SourceKind,
    #[serde(default)]
    pub folder: String,
    #[serde(default = "default_filename")]
    pub filename: String,
    #[serde(default)]
    pub looping: bool,
    #[serde(default = "default_true")]
    pub allow_color_conversion: bool,
    #[serde(default = "default_true")]
    pub use_extended_color_range: bool,
    #[serde(default = "default_true")]
    pub load_on_start: bool,
    #[serde(default = "default_true")]
    pub play_on_start: bool,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

fn default_filename() -> String {
    "movie.mov".to_string()
}

fn default_true() -> bool {
    true
}

fn default_volume() -> f32 {
    1.0
}

impl Default for MovieConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            folder: String::new(),
            filename: default_filename(),
            looping: false,
            allow_color_conversion: true,
            use_extended_color_range: true,
            load_on_start: true,
            play_on_start: true,
            volume: default_volume(),
        }
    }
}

impl MovieConfig {
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("qtmovie").join("movie.json")
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("Loaded movie config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse movie config: {e}");
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("No movie config found, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self) {
        self.save_to(&Self::config_path());
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create config dir: {e}");
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::error!("Failed to write movie config: {e}");
                } else {
                    log::debug!("Saved movie config to {}", path.display());
                }
            }
            Err(e) => log::error!("Failed to serialize movie config: {e}"),
        }
    }

    pub fn open_options(&self) -> OpenOptions {
        OpenOptions {
            looping: self.looping,
            allow_color_conversion: self.allow_color_conversion,
            use_extended_color_range: self.use_extended_color_range,
        }
    }

    /// Folder and filename joined the way the source kind expects.
    pub fn location(&self) -> String {
        let folder = self.folder.trim();
        let filename = self.filename.trim();
        if folder.is_empty() {
            return filename.to_string();
        }
        match self.source {
            SourceKind::Url => format!("{}/{}", folder.trim_end_matches('/'), filename),
            SourceKind::LocalFile | SourceKind::Memory => {
                Path::new(folder).join(filename).to_string_lossy().into_owned()
            }
        }
    }
}
