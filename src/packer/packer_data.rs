//! Rectangle Packer Data - Pure DOP
//!
//! Just data. All transformations happen in packer_operations.rs

use crate::lod::resolution_estimator::RequiredSizes;
use crate::error::AtlasResult;
use crate::scene::scene_data::{TextureHandle, TextureKey};
use cgmath::Vector2;
use image::RgbaImage;
use std::collections::BTreeMap;

/// Pixel rectangle inside the atlas, origin top-left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// UV coordinates within the atlas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtlasUV {
    pub min: Vector2<f32>,
    pub max: Vector2<f32>,
}

/// UV rectangle inset by half a texel, origin bottom-left
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A texture and the size it has to occupy in the atlas
#[derive(Debug, Clone)]
pub struct PackItem {
    pub texture: TextureHandle,
    pub required: Vector2<u32>,
}

#[derive(Debug, Clone)]
pub struct AssignedSlot {
    pub item: PackItem,
    pub rect: PackedRect,
}

/// Called when a pack does not fit, returns smaller sizes to retry with
pub type SizeRefiner<'a> = dyn FnMut() -> AtlasResult<RequiredSizes> + 'a;

pub struct RectanglePackerData {
    /// Name used in logs, usually the texture category
    pub label: String,
    pub max_size: u32,
    pub total_width: u32,
    pub total_height: u32,

    /// Unused space, pairwise disjoint
    pub free_zones: Vec<PackedRect>,
    pub assigned: BTreeMap<TextureKey, AssignedSlot>,

    pub last_action_was_remove: bool,
    pub successfully_packed: bool,
    /// Textures left out by the last failed pack
    pub unfit_count: usize,

    /// Composited atlas, dropped on every structural change
    pub packed: Option<RgbaImage>,
}
