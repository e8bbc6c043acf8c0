//! Scene Data - Pure DOP
//!
//! Just data: textures, materials, renderers and the camera that the LOD
//! pass renders from. All transformations happen in scene_operations.rs

use cgmath::{Deg, Vector2};
use image::RgbaImage;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::sync::Arc;

/// Stable identity of an underlying image. Two handles are the same texture
/// iff their keys match, whatever material references them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureKey(pub u64);

/// Texture asset owned by the scene/asset system
#[derive(Debug)]
pub struct TextureAsset {
    pub key: TextureKey,
    pub name: String,
    pub image: RgbaImage,
}

impl PartialEq for TextureAsset {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for TextureAsset {}

/// Shared reference to a texture; packers hold these, never the image itself
pub type TextureHandle = Arc<TextureAsset>;

/// Texture slot a material can bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureCategory {
    Color,
    GlossMap,
    Ao,
    Normal,
}

pub const ALL_CATEGORIES: [TextureCategory; 4] = [
    TextureCategory::Color,
    TextureCategory::GlossMap,
    TextureCategory::Ao,
    TextureCategory::Normal,
];

impl fmt::Display for TextureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextureCategory::Color => "COLOR",
            TextureCategory::GlossMap => "GLOSS_MAP",
            TextureCategory::Ao => "AO",
            TextureCategory::Normal => "NORMAL",
        };
        f.write_str(name)
    }
}

/// Index of a material inside `SceneData::materials`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

/// How a material is drawn by the tagged visibility render
#[derive(Debug, Clone)]
pub enum LodShaderState {
    /// Regular shading, no tag
    Standard,
    /// Writes `texture_tag` and the mip level of `target` it samples
    Tagged {
        target: TextureHandle,
        texture_tag: f32,
    },
    /// Produces no fragments at all
    Discard,
}

#[derive(Debug, Clone)]
pub struct Material {
    pub id: MaterialId,
    pub name: String,
    pub shader_name: String,
    pub keywords: FxHashSet<String>,
    /// Property name -> bound texture. A property may exist with nothing bound.
    pub properties: FxHashMap<String, Option<TextureHandle>>,
    pub lod_state: LodShaderState,
}

/// Camera-facing quad in view space
#[derive(Debug, Clone, Copy)]
pub struct WorldQuad {
    pub center: Vector2<f32>,
    pub size: Vector2<f32>,
    /// Distance from the camera along the view axis
    pub depth: f32,
    /// Texture repeats across the quad
    pub uv_repeat: f32,
}

/// A drawable with one material per submesh.
/// Submeshes split the quad into equal horizontal bands.
#[derive(Debug, Clone)]
pub struct SceneRenderer {
    pub name: String,
    pub enabled: bool,
    pub visible: bool,
    pub materials: Vec<MaterialId>,
    pub quad: WorldQuad,
}

/// Pinhole camera looking down +depth
#[derive(Debug, Clone, Copy)]
pub struct TaggingCamera {
    pub fov_y: Deg<f32>,
    pub near: f32,
}

pub struct SceneData {
    pub materials: Vec<Material>,
    pub renderers: Vec<SceneRenderer>,
    pub camera: TaggingCamera,
}

/// Textures of one category and every material that binds them
#[derive(Debug, Clone)]
pub struct TextureBinding {
    pub texture: TextureHandle,
    pub materials: Vec<MaterialId>,
}
