//! LOD tagging state
//!
//! Switches materials to the tagged or discard visibility shading and keeps
//! their previous state so the scene can be put back exactly as it was.

use crate::error::AtlasResult;
use crate::scene::scene_data::{LodShaderState, MaterialId, SceneData, TextureHandle};
use crate::scene::scene_operations::material_mut;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Materials currently drawn with visibility shading and the state they had before
#[derive(Debug, Default)]
pub struct LodTaggingData {
    pub replaced: FxHashMap<MaterialId, LodShaderState>,
}

pub fn create_lod_tagging() -> LodTaggingData {
    LodTaggingData::default()
}

fn replace_state(
    tagging: &mut LodTaggingData,
    scene: &mut SceneData,
    id: MaterialId,
    state: LodShaderState,
) -> AtlasResult<()> {
    let material = material_mut(scene, id)?;
    let previous = std::mem::replace(&mut material.lod_state, state);
    // A material tagged twice keeps the state it had before the first tagging
    tagging.replaced.entry(id).or_insert(previous);
    Ok(())
}

/// Draw `id` with the tagged shading sampling `target`
pub fn setup_lod_shader(
    tagging: &mut LodTaggingData,
    scene: &mut SceneData,
    id: MaterialId,
    target: &TextureHandle,
    texture_tag: f32,
) -> AtlasResult<()> {
    replace_state(
        tagging,
        scene,
        id,
        LodShaderState::Tagged {
            target: Arc::clone(target),
            texture_tag,
        },
    )
}

/// Exclude `id` from the tagged render
pub fn setup_lod_shader_with_discard(
    tagging: &mut LodTaggingData,
    scene: &mut SceneData,
    id: MaterialId,
) -> AtlasResult<()> {
    replace_state(tagging, scene, id, LodShaderState::Discard)
}

/// True once `id` was tagged or discarded and not yet restored
pub fn is_rendered_with_lod(tagging: &LodTaggingData, id: MaterialId) -> bool {
    tagging.replaced.contains_key(&id)
}

/// Put every replaced material back; returns how many were restored
pub fn restore_all_replaced_shaders(tagging: &mut LodTaggingData, scene: &mut SceneData) -> usize {
    let mut restored = 0;
    for (id, state) in tagging.replaced.drain() {
        match material_mut(scene, id) {
            Ok(material) => {
                material.lod_state = state;
                restored += 1;
            }
            Err(e) => {
                log::warn!(
                    "[lod_tagging::restore_all_replaced_shaders] Cannot restore material {}: {}",
                    id.0,
                    e
                );
            }
        }
    }
    restored
}
