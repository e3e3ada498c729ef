/// Editor configuration: load, save and sanitize.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::color::HexColor;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "PIXTILE_CONFIG";

/// Top-level editor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Fill color of the layer every new document starts with.
    pub default_layer_fill: HexColor,
    /// Max undo entries kept before the oldest are evicted.
    pub max_history_depth: usize,
    /// Resident byte budget for history entries before older ones are offloaded.
    pub max_resident_history_bytes: usize,
    /// Number of most recent undo entries that always stay in memory.
    pub keep_resident_entries: usize,
    /// Whether heavy history entries may be offloaded to a temp directory.
    pub offload_enabled: bool,
    /// Parent directory for the per-session offload directory. Empty = system temp dir.
    pub offload_dir: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            canvas_width: 64,
            canvas_height: 64,
            tile_width: 8,
            tile_height: 8,
            default_layer_fill: HexColor::TRANSPARENT,
            max_history_depth: 500,
            max_resident_history_bytes: 64 * 1024 * 1024,
            keep_resident_entries: 8,
            offload_enabled: true,
            offload_dir: String::new(),
        }
    }
}

impl EditorConfig {
    /// Returns the config file path.
    ///
    /// Resolution order:
    /// 1. `PIXTILE_CONFIG` environment variable
    /// 2. `<config dir>/pixtile/pixtile.json`
    /// 3. `pixtile.json` in the working directory
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .map(|d| d.join("pixtile").join("pixtile.json"))
            .unwrap_or_else(|| PathBuf::from("pixtile.json"))
    }

    /// Loads config from `path`, creating a default file if it doesn't exist.
    /// Returns defaults on any error (missing file, parse error, etc.).
    pub fn load_or_create(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match serde_json::from_str::<EditorConfig>(&contents) {
                    Ok(mut config) => {
                        config.sanitize();
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {}: {e}", path.display());
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {}: {e}", path.display());
                }
            }
            // Return defaults on error (don't overwrite broken file)
            Self::default()
        } else {
            let config = Self::default();
            if let Err(e) = config.save(path) {
                tracing::warn!("Failed to create default config at {}: {e:#}", path.display());
            }
            config
        }
    }

    /// Saves config to `path` as pretty-printed JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write config: {}", path.display()))
    }

    /// Parent directory for offload blobs, if one was configured.
    pub fn offload_root(&self) -> Option<PathBuf> {
        if self.offload_dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.offload_dir))
        }
    }

    /// Clamps values to valid ranges.
    pub fn sanitize(&mut self) {
        self.canvas_width = self.canvas_width.clamp(1, 16_384);
        self.canvas_height = self.canvas_height.clamp(1, 16_384);
        self.tile_width = self.tile_width.clamp(1, 512);
        self.tile_height = self.tile_height.clamp(1, 512);
        self.max_history_depth = self.max_history_depth.max(1);
        self.keep_resident_entries = self.keep_resident_entries.min(self.max_history_depth);
    }
}
