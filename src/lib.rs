// LOD Atlas - visibility-driven texture atlas packing
//
// Textures are packed at the resolution they are actually seen at:
// - lod::ResolutionEstimator renders the scene with every material tagged by
//   texture id and reduces the frame to the finest visible mip per texture
// - packer_operations keeps a shelf-packed atlas up to date with incremental
//   add/remove, defragmentation and growing repacks
// - atlas::AtlasCoordinator owns one packer per texture category
//
// Data lives in *_data modules, transformations in *_operations modules.

// Constants module
pub mod constants;

// Core modules
pub mod config;
pub mod error;
pub mod logging;
pub mod texture_utils;

// Pipeline
pub mod atlas;
pub mod lod;
pub mod packer;
pub mod scene;

pub use atlas::{AtlasCoordinator, PackerErrorCallback, ParseReport};
pub use config::{AtlasConfig, ReduceBackend};
pub use error::{AtlasError, AtlasResult, OptionExt};
pub use lod::{
    convert_texture_id, CpuVisibilityReducer, RequiredSizes, ResolutionEstimator,
    SoftwareTaggedRenderer, TaggedSceneRenderer, VisibilityReducer,
};
#[cfg(feature = "gpu")]
pub use lod::GpuVisibilityReducer;
pub use packer::{AtlasUV, NormalizedRect, PackItem, PackedRect, RectanglePackerData};
pub use scene::{
    MaterialId, SceneData, TextureAsset, TextureCategory, TextureHandle, TextureKey, WorldQuad,
    ALL_CATEGORIES,
};

#[cfg(feature = "gpu")]
pub use wgpu;
