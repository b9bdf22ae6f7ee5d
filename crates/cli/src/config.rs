use anyhow::{Context, Result};
use rally_analysis::AnalysisConfig;
use rally_annotations::CanvasSize;
use rally_storage::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "RALLY_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "rally.toml";

/// Settings read from `rally.toml`; every table is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RallyConfig {
    /// Live canvas resolution used to rescale ball points
    pub canvas: CanvasSize,
    pub retry: RetryPolicy,
    pub analysis: AnalysisConfig,
}

impl RallyConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).context("Invalid rally config")?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    /// Load from `explicit`, else `$RALLY_CONFIG`, else `./rally.toml` when present
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => env::var_os(CONFIG_ENV)
                .map(PathBuf::from)
                .or_else(|| {
                    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                    local.is_file().then_some(local)
                }),
        };

        let Some(path) = path else {
            log::debug!("No config file, using defaults");
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config =
            Self::from_toml(&text).with_context(|| format!("In config {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.canvas.width > 0.0 && self.canvas.height > 0.0) {
            return Err(format!(
                "canvas must have a positive size (got {}x{})",
                self.canvas.width, self.canvas.height
            ));
        }
        self.retry.validate()?;
        self.analysis.validate()
    }

    /// Canvas with per-command flag overrides applied
    pub fn canvas_with(&self, width: Option<f64>, height: Option<f64>) -> Result<CanvasSize> {
        let canvas = CanvasSize::new(
            width.unwrap_or(self.canvas.width),
            height.unwrap_or(self.canvas.height),
        );
        if !(canvas.width > 0.0 && canvas.height > 0.0) {
            anyhow::bail!(
                "canvas must have a positive size (got {}x{})",
                canvas.width,
                canvas.height
            );
        }
        Ok(canvas)
    }
}
