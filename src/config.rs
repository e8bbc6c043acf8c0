//! Atlas configuration
//!
//! Loaded from TOML or built in code, then validated before a coordinator is
//! created.

use crate::constants::{DEFAULT_MAX_ATLAS_SIZE, DEFAULT_MIN_TEXTURE_SIZE, REDUCE_ENTRY_POINT};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which backend runs the per-texture LOD reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReduceBackend {
    Cpu,
    Gpu,
}

/// Main atlas configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Largest width or height a packed atlas may reach
    pub max_atlas_size: u32,
    /// Floor used when shrinking textures from their visible LOD
    pub min_texture_size: u32,
    /// Resolution of the tagged visibility render
    pub render_width: u32,
    pub render_height: u32,
    pub reduce_backend: ReduceBackend,
    pub reduce_entry_point: String,
    /// Run the resolution estimator when a pack does not fit
    pub lod_refinement: bool,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            max_atlas_size: DEFAULT_MAX_ATLAS_SIZE,
            min_texture_size: DEFAULT_MIN_TEXTURE_SIZE,
            render_width: 1280,
            render_height: 720,
            reduce_backend: ReduceBackend::Cpu,
            reduce_entry_point: REDUCE_ENTRY_POINT.to_string(),
            lod_refinement: true,
        }
    }
}

impl AtlasConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.max_atlas_size == 0 {
            return Err(anyhow::anyhow!("AtlasConfig: max_atlas_size cannot be 0"));
        }

        if !self.max_atlas_size.is_power_of_two() {
            return Err(anyhow::anyhow!(
                "AtlasConfig: max_atlas_size {} must be a power of two",
                self.max_atlas_size
            ));
        }

        if self.min_texture_size == 0 {
            return Err(anyhow::anyhow!("AtlasConfig: min_texture_size cannot be 0"));
        }

        if self.min_texture_size > self.max_atlas_size {
            return Err(anyhow::anyhow!(
                "AtlasConfig: min_texture_size {} exceeds max_atlas_size {}",
                self.min_texture_size,
                self.max_atlas_size
            ));
        }

        if self.render_width == 0 || self.render_height == 0 {
            return Err(anyhow::anyhow!(
                "AtlasConfig: render size {}x{} must be non-zero",
                self.render_width,
                self.render_height
            ));
        }

        if self.render_width > 16384 || self.render_height > 16384 {
            return Err(anyhow::anyhow!(
                "AtlasConfig: render size too large (max 16384x16384)"
            ));
        }

        if self.reduce_entry_point.trim().is_empty() {
            return Err(anyhow::anyhow!("AtlasConfig: reduce_entry_point cannot be empty"));
        }

        log::debug!(
            "[AtlasConfig] Validated: max_atlas_size={}, min_texture_size={}, render={}x{}, backend={:?}",
            self.max_atlas_size,
            self.min_texture_size,
            self.render_width,
            self.render_height,
            self.reduce_backend
        );
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: AtlasConfig =
            toml::from_str(source).context("AtlasConfig: failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("AtlasConfig: cannot read {}", path.display()))?;
        Self::from_toml_str(&source)
    }

    /// Keep the atlas within what the device can allocate
    pub fn clamp_to_device_limit(&mut self, max_dimension: u32) {
        if max_dimension == 0 || self.max_atlas_size <= max_dimension {
            return;
        }

        // Device limits are powers of two on every backend we target
        let clamped = if max_dimension.is_power_of_two() {
            max_dimension
        } else {
            max_dimension.next_power_of_two() / 2
        };

        log::warn!(
            "[AtlasConfig::clamp_to_device_limit] Atlas size clamped from {} to {} due to GPU limits (max: {})",
            self.max_atlas_size,
            clamped,
            max_dimension
        );
        self.max_atlas_size = clamped;
        self.min_texture_size = self.min_texture_size.min(clamped);
    }
}
