//! Visibility reduction contract
//!
//! "Max" LOD here means the highest level of detail, which is the lowest
//! number: 0 asks for the full resolution texture.
//!
//! A tagged render stores, per covered pixel, `r = lod * scale`,
//! `g = texture tag`, `b = scale` and `a = 1`. Background pixels have `a = 0`.

use crate::constants::{LOD_SCALE, OCCLUDED_TEX_LOD};
use crate::error::{AtlasError, AtlasResult};
use image::{Rgba, Rgba32FImage};

/// Backend able to reduce a tagged render to one LOD per texture id
pub trait VisibilityReducer {
    /// Minimum LOD per texture id. Every slot starts at `OCCLUDED_TEX_LOD`.
    fn reduce(&mut self, tagged: &Rgba32FImage, texture_count: usize) -> AtlasResult<Vec<i32>>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Largest texture edge of the device running the reduction, if any
    fn device_texture_limit(&self) -> Option<u32> {
        None
    }
}

/// Normalized tag of a texture, `zero_based_id / total_count`, in `[0, 1)`
pub fn convert_texture_id(zero_based_id: i32, total_count: i32) -> AtlasResult<f32> {
    if total_count <= 0 {
        return Err(AtlasError::invalid_argument(
            "total_count",
            format!("must be greater than 0, got {}", total_count),
        ));
    }

    if zero_based_id < 0 {
        return Err(AtlasError::invalid_argument(
            "zero_based_id",
            format!("must be greater or equal to 0, got {}", zero_based_id),
        ));
    }

    if zero_based_id >= total_count {
        return Err(AtlasError::invalid_argument(
            "zero_based_id",
            "the id of the texture must be smaller than the total number of textures",
        ));
    }

    Ok(zero_based_id as f32 / total_count as f32)
}

pub fn validate_texture_count(texture_count: usize) -> AtlasResult<()> {
    if texture_count == 0 {
        return Err(AtlasError::invalid_argument(
            "texture_count",
            "must be greater than 0",
        ));
    }
    if texture_count > i32::MAX as usize {
        return Err(AtlasError::invalid_argument(
            "texture_count",
            format!("{} exceeds the id range", texture_count),
        ));
    }
    Ok(())
}

/// Output buffer before reduction
pub fn occluded_lods(texture_count: usize) -> Vec<i32> {
    vec![OCCLUDED_TEX_LOD; texture_count]
}

/// Pixel written by a tagged material sampling mip `lod`
pub fn encode_tagged_pixel(lod: i32, texture_tag: f32) -> Rgba<f32> {
    Rgba([lod as f32 * LOD_SCALE, texture_tag, LOD_SCALE, 1.0])
}

/// Texture id and LOD carried by a pixel, `None` for background or foreign ids
pub fn decode_tagged_pixel(pixel: &[f32; 4], texture_count: usize) -> Option<(usize, i32)> {
    let [r, g, b, a] = *pixel;
    if a <= 0.0 || b <= 0.0 {
        return None;
    }

    let id = (g * texture_count as f32).round();
    if id < 0.0 || id >= texture_count as f32 {
        return None;
    }

    let lod = (r / b).round() as i32;
    Some((id as usize, lod))
}
