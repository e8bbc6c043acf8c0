//! Shared constants for LOD estimation and atlas packing

/// LOD written for every texture before reduction. Any visible pixel
/// produces a smaller value, so it survives only for textures never rendered.
pub const OCCLUDED_TEX_LOD: i32 = 100;

/// Scale applied to the LOD stored in the red channel of a tagged pixel.
/// The blue channel carries the scale itself so the reducer can divide it back.
pub const LOD_SCALE: f32 = 0.1;

/// Textures are never shrunk below this size while both sides exceed it
pub const DEFAULT_MIN_TEXTURE_SIZE: u32 = 128;

/// Typical `max_texture_dimension_2d` of desktop GPUs
pub const DEFAULT_MAX_ATLAS_SIZE: u32 = 8192;

/// Compute workgroup edge used by the reduction kernel (8x8 threads)
pub const REDUCE_WORKGROUP_SIZE: u32 = 8;

/// Kernel entry point of the GPU reduction
pub const REDUCE_ENTRY_POINT: &str = "reduce_max_lod";

/// Clear colour of a composited atlas (transparent white)
pub const ATLAS_CLEAR_COLOR: [u8; 4] = [255, 255, 255, 0];
