//! LOD Module
//!
//! Visibility-driven resolution estimation: tag materials, render the scene
//! once, reduce the frame per texture id and size each texture from the
//! finest mip level it is seen at.

pub mod cpu_reducer;
#[cfg(feature = "gpu")]
pub mod gpu_reducer;
pub mod lod_tagging;
pub mod resolution_estimator;
pub mod tagged_renderer;
pub mod visibility_reducer;

pub use cpu_reducer::CpuVisibilityReducer;
#[cfg(feature = "gpu")]
pub use gpu_reducer::GpuVisibilityReducer;
pub use lod_tagging::{
    create_lod_tagging, is_rendered_with_lod, restore_all_replaced_shaders, setup_lod_shader,
    setup_lod_shader_with_discard, LodTaggingData,
};
pub use resolution_estimator::{RequiredSizes, ResolutionEstimator};
pub use tagged_renderer::{SoftwareTaggedRenderer, TaggedSceneRenderer};
pub use visibility_reducer::{convert_texture_id, VisibilityReducer};
