//! Resolution estimator
//!
//! Tags every material bound to a texture of one category, renders the scene
//! once, reduces the frame to the finest mip each texture is seen at and turns
//! that into the pixel size the atlas has to reserve.

use super::cpu_reducer::CpuVisibilityReducer;
use super::lod_tagging::{
    create_lod_tagging, is_rendered_with_lod, restore_all_replaced_shaders, setup_lod_shader,
    setup_lod_shader_with_discard, LodTaggingData,
};
use super::tagged_renderer::{SoftwareTaggedRenderer, TaggedSceneRenderer};
use super::visibility_reducer::{convert_texture_id, VisibilityReducer};
use crate::config::{AtlasConfig, ReduceBackend};
use crate::constants::OCCLUDED_TEX_LOD;
use crate::error::{AtlasError, AtlasResult};
use crate::scene::scene_data::{SceneData, TextureBinding, TextureCategory, TextureKey};
use crate::scene::scene_operations::{collect_materials_by_texture, texture_native_size};
use crate::texture_utils::size_from_lod;
use cgmath::Vector2;
use rustc_hash::FxHashMap;
use std::time::Instant;

/// Required size per texture of a category
pub type RequiredSizes = FxHashMap<TextureKey, Vector2<u32>>;

pub struct ResolutionEstimator {
    renderer: Box<dyn TaggedSceneRenderer>,
    reducer: Box<dyn VisibilityReducer>,
    min_texture_size: u32,
}

impl ResolutionEstimator {
    pub fn new(
        renderer: Box<dyn TaggedSceneRenderer>,
        reducer: Box<dyn VisibilityReducer>,
        min_texture_size: u32,
    ) -> Self {
        Self {
            renderer,
            reducer,
            min_texture_size,
        }
    }

    /// Software renderer plus the configured reduction backend.
    /// Fails with `ComputeUnsupported` when the GPU backend cannot be created.
    /// The render size is clamped to the reducer's device texture limit.
    pub fn from_config(config: &AtlasConfig) -> AtlasResult<Self> {
        let reducer = create_reducer(config)?;
        let (width, height) = clamp_render_size(
            config.render_width,
            config.render_height,
            reducer.device_texture_limit(),
        );
        let renderer = SoftwareTaggedRenderer::new(width, height)?;

        log::info!(
            "[ResolutionEstimator::from_config] {}x{} tagged render, '{}' reduction",
            width,
            height,
            reducer.name()
        );

        Ok(Self::new(
            Box::new(renderer),
            reducer,
            config.min_texture_size,
        ))
    }

    pub fn reducer_name(&self) -> &'static str {
        self.reducer.name()
    }

    pub fn min_texture_size(&self) -> u32 {
        self.min_texture_size
    }

    pub fn device_texture_limit(&self) -> Option<u32> {
        self.reducer.device_texture_limit()
    }

    /// Required size of every opaque texture of `category` seen by the camera.
    ///
    /// Textures never reaching the frame get 1x1. Material states are
    /// restored before returning, whether the estimation succeeded or not.
    pub fn calculate_textures_lod(
        &mut self,
        category: TextureCategory,
        scene: &mut SceneData,
    ) -> AtlasResult<RequiredSizes> {
        let bindings = collect_materials_by_texture(scene, category, true);
        if bindings.is_empty() {
            log::warn!(
                "[ResolutionEstimator::calculate_textures_lod] No suitable objects found for {} LOD calculation",
                category
            );
            return Err(AtlasError::NoSuitableTextures {
                category: category.to_string(),
            });
        }

        let start = Instant::now();
        let mut tagging = create_lod_tagging();
        let result = self.tag_render_reduce(&bindings, scene, &mut tagging);
        let restored = restore_all_replaced_shaders(&mut tagging, scene);

        let lods = result?;
        let sizes = lods_to_sizes(&bindings, &lods, self.min_texture_size);

        log::info!(
            "[ResolutionEstimator::calculate_textures_lod] {}: {} textures, {} occluded, {} materials restored in {:.2}ms",
            category,
            bindings.len(),
            lods.iter().filter(|lod| **lod == OCCLUDED_TEX_LOD).count(),
            restored,
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(sizes)
    }

    fn tag_render_reduce(
        &mut self,
        bindings: &[TextureBinding],
        scene: &mut SceneData,
        tagging: &mut LodTaggingData,
    ) -> AtlasResult<Vec<i32>> {
        let count = bindings.len();
        for (id, binding) in bindings.iter().enumerate() {
            let tag = convert_texture_id(id as i32, count as i32)?;
            for material in &binding.materials {
                setup_lod_shader(tagging, scene, *material, &binding.texture, tag)?;
            }
        }

        // Everything else drawn by an enabled renderer stays out of the frame
        let others: Vec<_> = scene
            .renderers
            .iter()
            .filter(|renderer| renderer.enabled)
            .flat_map(|renderer| renderer.materials.iter().copied())
            .collect();
        for material in others {
            if !is_rendered_with_lod(tagging, material) {
                setup_lod_shader_with_discard(tagging, scene, material)?;
            }
        }

        let (width, height) = self.renderer.resolution();
        log::debug!(
            "[ResolutionEstimator::tag_render_reduce] Rendering {}x{} frame for {} textures",
            width,
            height,
            count
        );
        let frame = self.renderer.render_tagged(scene)?;
        let lods = self.reducer.reduce(&frame, count)?;
        if lods.len() != count {
            return Err(AtlasError::GpuOperationFailed {
                operation: format!("{} reduction", self.reducer.name()),
                error: format!("expected {} results, got {}", count, lods.len()),
            });
        }
        Ok(lods)
    }
}

fn create_reducer(config: &AtlasConfig) -> AtlasResult<Box<dyn VisibilityReducer>> {
    match config.reduce_backend {
        ReduceBackend::Cpu => Ok(Box::new(CpuVisibilityReducer::new())),
        #[cfg(feature = "gpu")]
        ReduceBackend::Gpu => Ok(Box::new(super::gpu_reducer::GpuVisibilityReducer::new(
            &config.reduce_entry_point,
        )?)),
        #[cfg(not(feature = "gpu"))]
        ReduceBackend::Gpu => Err(AtlasError::ComputeUnsupported(
            "built without the gpu feature".to_string(),
        )),
    }
}

/// Shrink the render to fit `limit` on both sides, keeping its aspect ratio
pub fn clamp_render_size(width: u32, height: u32, limit: Option<u32>) -> (u32, u32) {
    let limit = match limit {
        Some(limit) if limit > 0 && (width > limit || height > limit) => limit,
        _ => return (width, height),
    };

    let scale = limit as f64 / width.max(height) as f64;
    let clamped = (
        ((width as f64 * scale).floor() as u32).clamp(1, limit),
        ((height as f64 * scale).floor() as u32).clamp(1, limit),
    );

    log::warn!(
        "[ResolutionEstimator::clamp_render_size] Tagged render clamped from {}x{} to {}x{} (device limit {})",
        width,
        height,
        clamped.0,
        clamped.1,
        limit
    );
    clamped
}

/// `OCCLUDED_TEX_LOD` maps to 1x1, anything else to the halved native size
pub fn lods_to_sizes(bindings: &[TextureBinding], lods: &[i32], min_texture_size: u32) -> RequiredSizes {
    bindings
        .iter()
        .zip(lods)
        .map(|(binding, lod)| {
            let size = if *lod == OCCLUDED_TEX_LOD {
                Vector2::new(1, 1)
            } else {
                size_from_lod(texture_native_size(&binding.texture), *lod, min_texture_size)
            };
            (binding.texture.key, size)
        })
        .collect()
}
