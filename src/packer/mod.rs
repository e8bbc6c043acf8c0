//! Packer Module
//!
//! Dynamic shelf rectangle packer: incremental insertion and removal over a
//! free-zone list, defragmentation, and full repacks that grow the atlas.

pub mod packer_data;
pub mod packer_operations;

pub use packer_data::{
    AssignedSlot, AtlasUV, NormalizedRect, PackItem, PackedRect, RectanglePackerData, SizeRefiner,
};
pub use packer_operations::{
    add, add_with_refinement, apply_required_sizes, assigned_count, clear, create_empty_packer,
    create_packer, defragment, dimensions, estimate_needed_size, find_slot, get_atlas_uv,
    get_normalized_rect, get_rect, get_texture, is_assigned, native_item, pack_item, remove,
    sort_and_pack, transform_uv, try_packing_textures, utilization,
};
