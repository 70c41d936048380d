use std::path::Path;
use std::time::Duration;

use anyhow::{Result, ensure};
use serde::Deserialize;

/// Product tuning for the render pipeline. Every knob has a default matching
/// shipped behavior; a YAML file only needs to name what it overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub progressive: ProgressiveOptions,
    pub viewport: ViewportOptions,
    pub persist: PersistOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProgressiveOptions {
    /// When off, every request goes straight to the full-quality decode.
    pub enabled: bool,
    /// How long to hold after the super-low tier for a newer request before
    /// committing to the low tier.
    pub super_low_settle_ms: u64,
    /// Same, between the low and full tiers.
    pub low_settle_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ViewportOptions {
    /// Scales at or below this never get a region render.
    pub zoom_threshold: f32,
    /// Scale at which the region resolution ramp tops out.
    pub zoom_max_scale: f32,
    pub min_dimension: u32,
    pub max_dimension: u32,
    pub dimension_step: u32,
    /// Quiet period after the last pan/zoom change before one region
    /// request is issued.
    pub debounce_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PersistOptions {
    pub adjustments_debounce_ms: u64,
    /// Longest edge of the persisted preview thumbnail.
    pub thumbnail_edge: u32,
    pub thumbnail_jpeg_quality: u8,
}

impl Default for ProgressiveOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            super_low_settle_ms: 60,
            low_settle_ms: 180,
        }
    }
}

impl Default for ViewportOptions {
    fn default() -> Self {
        Self {
            zoom_threshold: 1.1,
            zoom_max_scale: 5.0,
            min_dimension: 1280,
            max_dimension: 2304,
            dimension_step: 128,
            debounce_ms: 1000,
        }
    }
}

impl Default for PersistOptions {
    fn default() -> Self {
        Self {
            adjustments_debounce_ms: 350,
            thumbnail_edge: 1024,
            thumbnail_jpeg_quality: 95,
        }
    }
}

impl ProgressiveOptions {
    pub fn super_low_settle(&self) -> Duration {
        Duration::from_millis(self.super_low_settle_ms)
    }

    pub fn low_settle(&self) -> Duration {
        Duration::from_millis(self.low_settle_ms)
    }
}

impl ViewportOptions {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl PersistOptions {
    pub fn adjustments_debounce(&self) -> Duration {
        Duration::from_millis(self.adjustments_debounce_ms)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&s)?;
        config.validated()
    }

    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.viewport.zoom_threshold > 0.0,
            "viewport zoom-threshold must be positive"
        );
        ensure!(
            self.viewport.zoom_max_scale > self.viewport.zoom_threshold,
            "viewport zoom-max-scale must exceed zoom-threshold"
        );
        ensure!(
            self.viewport.min_dimension > 0 && self.viewport.dimension_step > 0,
            "viewport dimensions must be positive"
        );
        ensure!(
            self.viewport.max_dimension >= self.viewport.min_dimension,
            "viewport max-dimension must be at least min-dimension"
        );
        ensure!(
            self.persist.thumbnail_edge > 0,
            "persist thumbnail-edge must be positive"
        );
        ensure!(
            self.persist.thumbnail_jpeg_quality >= 1 && self.persist.thumbnail_jpeg_quality <= 100,
            "persist thumbnail-jpeg-quality must be in 1..=100"
        );
        Ok(self)
    }
}
