//! Scene Module
//!
//! In-memory scene model the atlas pipeline reads textures from and the
//! tagged visibility render draws.

pub mod scene_data;
pub mod scene_operations;

pub use scene_data::{
    LodShaderState, Material, MaterialId, SceneData, SceneRenderer, TaggingCamera, TextureAsset,
    TextureBinding, TextureCategory, TextureHandle, TextureKey, WorldQuad, ALL_CATEGORIES,
};
pub use scene_operations::{
    add_material, add_renderer, category_property_names, collect_materials_by_texture,
    create_scene, create_texture, enable_keyword, material, material_has_transparency,
    material_mut, set_material_texture, texture_native_size,
};
