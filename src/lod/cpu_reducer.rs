//! CPU visibility reducer
//!
//! Parallel minimum over all pixels with rayon. Each texture id owns one
//! atomic slot, so the result does not depend on how rayon splits the image.

use super::visibility_reducer::{decode_tagged_pixel, validate_texture_count, VisibilityReducer};
use crate::constants::OCCLUDED_TEX_LOD;
use crate::error::AtlasResult;
use image::Rgba32FImage;
use rayon::prelude::*;
use std::sync::atomic::{AtomicI32, Ordering};

#[derive(Debug, Default, Clone, Copy)]
pub struct CpuVisibilityReducer;

impl CpuVisibilityReducer {
    pub fn new() -> Self {
        Self
    }
}

impl VisibilityReducer for CpuVisibilityReducer {
    fn reduce(&mut self, tagged: &Rgba32FImage, texture_count: usize) -> AtlasResult<Vec<i32>> {
        validate_texture_count(texture_count)?;

        let slots: Vec<AtomicI32> = (0..texture_count)
            .map(|_| AtomicI32::new(OCCLUDED_TEX_LOD))
            .collect();
        let pixels: &[[f32; 4]] = bytemuck::cast_slice(tagged.as_raw().as_slice());

        pixels.par_iter().for_each(|pixel| {
            if let Some((id, lod)) = decode_tagged_pixel(pixel, texture_count) {
                slots[id].fetch_min(lod, Ordering::Relaxed);
            }
        });

        let lods: Vec<i32> = slots.into_iter().map(AtomicI32::into_inner).collect();

        log::debug!(
            "[CpuVisibilityReducer::reduce] {}x{} pixels, {} textures, {} visible",
            tagged.width(),
            tagged.height(),
            texture_count,
            lods.iter().filter(|lod| **lod != OCCLUDED_TEX_LOD).count()
        );

        Ok(lods)
    }

    fn name(&self) -> &'static str {
        "cpu"
    }
}
