//! Atlas coordinator
//!
//! Owns one packer per texture category and keeps them in sync with the
//! scene. A category's first parse builds its packer from every texture found;
//! later parses only insert textures the packer has not seen.

use crate::config::AtlasConfig;
use crate::error::{AtlasError, AtlasResult};
use crate::lod::resolution_estimator::ResolutionEstimator;
use crate::packer::packer_data::{NormalizedRect, PackItem, RectanglePackerData, SizeRefiner};
use crate::packer::packer_operations::{
    add_with_refinement, assigned_count, create_packer, get_normalized_rect, get_texture,
    native_item,
};
use crate::scene::scene_data::{SceneData, TextureCategory, TextureKey, ALL_CATEGORIES};
use crate::scene::scene_operations::collect_materials_by_texture;
use anyhow::{Context, Result};
use image::RgbaImage;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Receives "Could not fit textures in atlas <CATEGORY>"
pub type PackerErrorCallback = Box<dyn FnMut(&str)>;

/// Outcome of one `parse_and_pack`
#[derive(Debug, Default)]
pub struct ParseReport {
    pub packed: Vec<TextureCategory>,
    /// Categories without any texture in the scene
    pub skipped: Vec<TextureCategory>,
    pub failures: Vec<AtlasError>,
}

impl ParseReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct AtlasCoordinator {
    config: AtlasConfig,
    estimator: Option<ResolutionEstimator>,
    atlases: BTreeMap<TextureCategory, RectanglePackerData>,
    on_packer_error: Option<PackerErrorCallback>,
}

impl AtlasCoordinator {
    /// Coordinator with the estimator described by `config`.
    ///
    /// An estimator that cannot run on this machine is dropped with a warning;
    /// textures are then packed at native size only.
    pub fn new(config: AtlasConfig) -> Result<Self> {
        config.validate()?;

        let estimator = if config.lod_refinement {
            match ResolutionEstimator::from_config(&config) {
                Ok(estimator) => Some(estimator),
                Err(e) if e.is_recoverable() => {
                    log::warn!(
                        "[AtlasCoordinator::new] LOD refinement disabled, using native sizes: {}",
                        e
                    );
                    None
                }
                Err(e) => {
                    return Err(e).context("AtlasCoordinator: cannot create resolution estimator")
                }
            }
        } else {
            None
        };

        Self::with_estimator(config, estimator)
    }

    /// Coordinator with an explicit estimator, or none to skip LOD refinement
    pub fn with_estimator(mut config: AtlasConfig, estimator: Option<ResolutionEstimator>) -> Result<Self> {
        config.validate()?;

        if let Some(limit) = estimator.as_ref().and_then(|e| e.device_texture_limit()) {
            config.clamp_to_device_limit(limit);
        }

        log::info!(
            "[AtlasCoordinator::with_estimator] max atlas {}, LOD refinement {}",
            config.max_atlas_size,
            estimator
                .as_ref()
                .map_or("off", |e| e.reducer_name())
        );

        Ok(Self {
            config,
            estimator,
            atlases: BTreeMap::new(),
            on_packer_error: None,
        })
    }

    pub fn set_packer_error_callback(&mut self, callback: impl FnMut(&str) + 'static) {
        self.on_packer_error = Some(Box::new(callback));
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    pub fn has_estimator(&self) -> bool {
        self.estimator.is_some()
    }

    /// Bring every category's atlas up to date with the scene.
    ///
    /// A category that cannot be packed fires the error callback and is
    /// reported; the remaining categories are still processed.
    pub fn parse_and_pack(&mut self, scene: &mut SceneData) -> ParseReport {
        let Self {
            config,
            estimator,
            atlases,
            on_packer_error,
        } = self;
        let mut report = ParseReport::default();

        for category in ALL_CATEGORIES {
            let bindings = collect_materials_by_texture(scene, category, false);
            if bindings.is_empty() {
                log::debug!(
                    "[AtlasCoordinator::parse_and_pack] No texture found for texture type {}",
                    category
                );
                report.skipped.push(category);
                continue;
            }

            let items: Vec<PackItem> = bindings
                .iter()
                .map(|binding| native_item(&binding.texture))
                .collect();
            let total = items.len();

            let result = match estimator.as_mut() {
                Some(estimator) => {
                    let mut refine = || estimator.calculate_textures_lod(category, scene);
                    let refiner: &mut SizeRefiner<'_> = &mut refine;
                    pack_category(atlases, config.max_atlas_size, category, items, Some(refiner))
                }
                None => pack_category(atlases, config.max_atlas_size, category, items, None),
            };

            let failure = match result {
                Ok(true) => None,
                Ok(false) => {
                    let unfit = atlases.get(&category).map_or(total, |packer| packer.unfit_count);
                    Some(AtlasError::PackingOverflow {
                        category: category.to_string(),
                        unfit,
                        total,
                        max_size: config.max_atlas_size,
                    })
                }
                Err(e) => Some(e),
            };

            match failure {
                None => report.packed.push(category),
                Some(e) => {
                    log::error!("[AtlasCoordinator::parse_and_pack] {}", e);
                    if let Some(callback) = on_packer_error.as_mut() {
                        callback(&format!("Could not fit textures in atlas {}", category));
                    }
                    report.failures.push(e);
                }
            }
        }

        log::info!(
            "[AtlasCoordinator::parse_and_pack] packed {:?}, skipped {:?}, {} failures",
            report.packed,
            report.skipped,
            report.failures.len()
        );

        report
    }

    pub fn packer(&self, category: TextureCategory) -> Option<&RectanglePackerData> {
        self.atlases.get(&category)
    }

    /// Composited atlas image of a category
    pub fn atlas_texture(&mut self, category: TextureCategory) -> Option<&RgbaImage> {
        self.atlases.get_mut(&category).map(get_texture)
    }

    /// UV rect of a texture inside its category's atlas
    pub fn normalized_rect(&self, category: TextureCategory, key: TextureKey) -> Option<NormalizedRect> {
        self.atlases
            .get(&category)
            .and_then(|packer| get_normalized_rect(packer, key))
    }

    /// Drop every atlas and the estimator
    pub fn teardown(&mut self) {
        let textures: usize = self.atlases.values().map(assigned_count).sum();
        log::info!(
            "[AtlasCoordinator::teardown] Releasing {} atlases holding {} textures",
            self.atlases.len(),
            textures
        );
        self.atlases.clear();
        self.estimator = None;
        self.on_packer_error = None;
    }
}

/// Build the category's packer, or insert into the existing one stopping at
/// the first texture that does not fit. Returns the packer's success state.
fn pack_category(
    atlases: &mut BTreeMap<TextureCategory, RectanglePackerData>,
    max_size: u32,
    category: TextureCategory,
    items: Vec<PackItem>,
    mut refiner: Option<&mut SizeRefiner<'_>>,
) -> AtlasResult<bool> {
    match atlases.entry(category) {
        Entry::Vacant(entry) => {
            log::info!(
                "[AtlasCoordinator::pack_category] Try creating an atlas with {} textures of type {}",
                items.len(),
                category
            );
            let packer = create_packer(items, max_size, &category.to_string(), refiner)?;
            Ok(entry.insert(packer).successfully_packed)
        }
        Entry::Occupied(entry) => {
            let packer = entry.into_mut();
            for item in items {
                if !add_with_refinement(packer, item, refiner.as_deref_mut())? {
                    break;
                }
            }
            Ok(packer.successfully_packed)
        }
    }
}
