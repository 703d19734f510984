use std::path::PathBuf;
use std::time::Duration;

use eyre::Result;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::orchestrator::ExtractConfig;

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Preferred caption languages, most preferred first
    pub languages: Option<Vec<String>>,
    pub default_format: Option<String>,
    /// Gemini model for `--analyze`
    pub model: Option<String>,
    /// Gemini API keys, used in rotation
    pub api_keys: Vec<String>,
    pub innertube: Option<bool>,
    pub render_timeout_ms: Option<u64>,
    pub max_scroll_passes: Option<u32>,
    pub estimated_cue_seconds: Option<f64>,
}

impl Config {
    /// Load config from ~/.config/ytscribe/config.toml if it exists
    pub fn load() -> Result<Self> {
        let path = config_path();
        if path.exists() {
            debug!("Loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            debug!("No config file found at {}", path.display());
            Ok(Config::default())
        }
    }

    /// Extraction settings with the file's values laid over the defaults
    pub fn extract_config(&self) -> ExtractConfig {
        let mut cfg = ExtractConfig::default();
        if let Some(ref languages) = self.languages {
            if !languages.is_empty() {
                cfg.languages = languages.clone();
            }
        }
        if let Some(innertube) = self.innertube {
            cfg.innertube = innertube;
        }
        if let Some(ms) = self.render_timeout_ms {
            cfg.panel.render_timeout = Duration::from_millis(ms);
        }
        if let Some(passes) = self.max_scroll_passes {
            cfg.panel.max_passes = passes;
        }
        if let Some(secs) = self.estimated_cue_seconds.filter(|s| *s > 0.0) {
            cfg.estimated_cue_seconds = secs;
        }
        cfg
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join("ytscribe")
        .join("config.toml")
}
