//! Scene Operations - Pure DOP Functions
//!
//! Scene construction plus texture discovery per category.

use super::scene_data::{
    LodShaderState, Material, MaterialId, SceneData, SceneRenderer, TaggingCamera,
    TextureAsset, TextureBinding, TextureCategory, TextureHandle, TextureKey, WorldQuad,
};
use crate::error::{AtlasError, AtlasResult, OptionExt};
use cgmath::{Deg, Vector2};
use image::RgbaImage;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TEXTURE_KEY: AtomicU64 = AtomicU64::new(1);

/// Keywords that make a material blend or alpha-test
pub const TRANSPARENCY_KEYWORDS: [&str; 3] = ["ALPHA_PREMULTIPLY", "ALPHA_TEST", "ALPHA_BLEND"];

/// Register an image as a texture asset with a fresh identity
pub fn create_texture(name: &str, image: RgbaImage) -> TextureHandle {
    let key = TextureKey(NEXT_TEXTURE_KEY.fetch_add(1, Ordering::Relaxed));
    Arc::new(TextureAsset {
        key,
        name: name.to_string(),
        image,
    })
}

pub fn texture_native_size(texture: &TextureAsset) -> Vector2<u32> {
    Vector2::new(texture.image.width(), texture.image.height())
}

/// Material properties relevant to a category, in priority order
pub fn category_property_names(category: TextureCategory) -> &'static [&'static str] {
    match category {
        TextureCategory::Color => &["main_tex"],
        TextureCategory::GlossMap => &["spec_gloss_map", "metallic_gloss_map"],
        TextureCategory::Ao => &["occlusion_map"],
        TextureCategory::Normal => &["bump_map"],
    }
}

pub fn create_scene() -> SceneData {
    SceneData {
        materials: Vec::new(),
        renderers: Vec::new(),
        camera: TaggingCamera {
            fov_y: Deg(60.0),
            near: 0.01,
        },
    }
}

pub fn add_material(scene: &mut SceneData, name: &str, shader_name: &str) -> MaterialId {
    let id = MaterialId(scene.materials.len() as u32);
    scene.materials.push(Material {
        id,
        name: name.to_string(),
        shader_name: shader_name.to_string(),
        keywords: FxHashSet::default(),
        properties: FxHashMap::default(),
        lod_state: LodShaderState::Standard,
    });
    id
}

pub fn material(scene: &SceneData, id: MaterialId) -> AtlasResult<&Material> {
    scene
        .materials
        .get(id.0 as usize)
        .ok_or_atlas(|| material_not_found(id))
}

pub fn material_mut(scene: &mut SceneData, id: MaterialId) -> AtlasResult<&mut Material> {
    scene
        .materials
        .get_mut(id.0 as usize)
        .ok_or_atlas(|| material_not_found(id))
}

fn material_not_found(id: MaterialId) -> AtlasError {
    AtlasError::ResourceNotFound {
        resource_type: "material".to_string(),
        id: id.0.to_string(),
    }
}

/// Declare `property` on a material; `None` declares it without a texture
pub fn set_material_texture(
    scene: &mut SceneData,
    id: MaterialId,
    property: &str,
    texture: Option<TextureHandle>,
) -> AtlasResult<()> {
    material_mut(scene, id)?
        .properties
        .insert(property.to_string(), texture);
    Ok(())
}

pub fn enable_keyword(scene: &mut SceneData, id: MaterialId, keyword: &str) -> AtlasResult<()> {
    material_mut(scene, id)?.keywords.insert(keyword.to_string());
    Ok(())
}

/// Add a renderer; every referenced material must exist
pub fn add_renderer(
    scene: &mut SceneData,
    name: &str,
    materials: Vec<MaterialId>,
    quad: WorldQuad,
) -> AtlasResult<usize> {
    for id in &materials {
        material(scene, *id)?;
    }

    scene.renderers.push(SceneRenderer {
        name: name.to_string(),
        enabled: true,
        visible: true,
        materials,
        quad,
    });
    Ok(scene.renderers.len() - 1)
}

pub fn material_has_transparency(material: &Material) -> bool {
    if TRANSPARENCY_KEYWORDS
        .iter()
        .any(|keyword| material.keywords.contains(*keyword))
    {
        return true;
    }

    let shader = material.shader_name.to_lowercase();
    shader.contains("transparent") || shader.contains("cutout")
}

/// First property of `category` that the material declares
pub fn find_category_property<'a>(
    material: &'a Material,
    category: TextureCategory,
) -> Option<&'a Option<TextureHandle>> {
    category_property_names(category)
        .iter()
        .find_map(|name| material.properties.get(*name))
}

/// Group the materials of enabled, visible renderers by the texture they bind
/// for `category`, in order of first encounter.
///
/// Each material is considered once even when several renderers share it.
/// With `exclude_transparent`, transparent materials are dropped, so a texture
/// survives only if at least one opaque material binds it.
pub fn collect_materials_by_texture(
    scene: &SceneData,
    category: TextureCategory,
    exclude_transparent: bool,
) -> Vec<TextureBinding> {
    let mut processed: FxHashSet<MaterialId> = FxHashSet::default();
    let mut bindings: Vec<TextureBinding> = Vec::new();
    let mut index_by_key: FxHashMap<TextureKey, usize> = FxHashMap::default();
    let mut transparent_skipped = 0usize;

    for renderer in &scene.renderers {
        if !renderer.enabled || !renderer.visible {
            continue;
        }

        for material_id in &renderer.materials {
            if processed.contains(material_id) {
                continue;
            }

            let material = match scene.materials.get(material_id.0 as usize) {
                Some(m) => m,
                None => {
                    log::warn!(
                        "[scene_operations::collect_materials_by_texture] Renderer '{}' references missing material {}",
                        renderer.name,
                        material_id.0
                    );
                    continue;
                }
            };

            let bound = match find_category_property(material, category) {
                Some(bound) => bound,
                None => continue,
            };
            processed.insert(*material_id);

            let texture = match bound {
                Some(texture) => texture,
                None => continue,
            };

            if exclude_transparent && material_has_transparency(material) {
                transparent_skipped += 1;
                continue;
            }

            match index_by_key.get(&texture.key) {
                Some(&index) => bindings[index].materials.push(*material_id),
                None => {
                    index_by_key.insert(texture.key, bindings.len());
                    bindings.push(TextureBinding {
                        texture: Arc::clone(texture),
                        materials: vec![*material_id],
                    });
                }
            }
        }
    }

    log::debug!(
        "[scene_operations::collect_materials_by_texture] {}: {} textures, {} materials, {} transparent skipped",
        category,
        bindings.len(),
        processed.len(),
        transparent_skipped
    );

    bindings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture_utils::create_solid_color;

    fn quad() -> WorldQuad {
        WorldQuad {
            center: Vector2::new(0.0, 0.0),
            size: Vector2::new(1.0, 1.0),
            depth: 2.0,
            uv_repeat: 1.0,
        }
    }

    fn textured_material(scene: &mut SceneData, name: &str, texture: &TextureHandle) -> MaterialId {
        let id = add_material(scene, name, "standard");
        set_material_texture(scene, id, "main_tex", Some(Arc::clone(texture)))
            .expect("material exists");
        id
    }

    #[test]
    fn test_texture_identity() {
        let a = create_texture("a", create_solid_color(1, 2, 3, 4, 4));
        let b = create_texture("b", create_solid_color(1, 2, 3, 4, 4));
        assert_ne!(a.key, b.key);
        assert_ne!(*a, *b);
        assert_eq!(*a, *Arc::clone(&a));
    }

    #[test]
    fn test_transparency_detection() {
        let mut scene = create_scene();
        let opaque = add_material(&mut scene, "opaque", "Standard");
        let blended = add_material(&mut scene, "blended", "Standard");
        let cutout = add_material(&mut scene, "leaves", "Nature/Leaves Cutout");
        enable_keyword(&mut scene, blended, "ALPHA_BLEND").expect("material exists");

        assert!(!material_has_transparency(material(&scene, opaque).expect("exists")));
        assert!(material_has_transparency(material(&scene, blended).expect("exists")));
        assert!(material_has_transparency(material(&scene, cutout).expect("exists")));
    }

    #[test]
    fn test_bindings_grouped_in_first_encounter_order() {
        let mut scene = create_scene();
        let tex_a = create_texture("a", create_solid_color(255, 0, 0, 8, 8));
        let tex_b = create_texture("b", create_solid_color(0, 255, 0, 8, 8));
        let m0 = textured_material(&mut scene, "m0", &tex_b);
        let m1 = textured_material(&mut scene, "m1", &tex_a);
        let m2 = textured_material(&mut scene, "m2", &tex_b);

        add_renderer(&mut scene, "r0", vec![m0, m1], quad()).expect("valid renderer");
        add_renderer(&mut scene, "r1", vec![m2, m0], quad()).expect("valid renderer");

        let bindings = collect_materials_by_texture(&scene, TextureCategory::Color, true);
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].texture.key, tex_b.key);
        assert_eq!(bindings[0].materials, vec![m0, m2]);
        assert_eq!(bindings[1].texture.key, tex_a.key);
        assert_eq!(bindings[1].materials, vec![m1]);
    }

    #[test]
    fn test_hidden_and_disabled_renderers_are_ignored() {
        let mut scene = create_scene();
        let tex = create_texture("t", create_solid_color(1, 1, 1, 4, 4));
        let m = textured_material(&mut scene, "m", &tex);
        let r = add_renderer(&mut scene, "r", vec![m], quad()).expect("valid renderer");

        scene.renderers[r].visible = false;
        assert!(collect_materials_by_texture(&scene, TextureCategory::Color, true).is_empty());

        scene.renderers[r].visible = true;
        scene.renderers[r].enabled = false;
        assert!(collect_materials_by_texture(&scene, TextureCategory::Color, true).is_empty());
    }

    #[test]
    fn test_texture_kept_when_any_opaque_material_uses_it() {
        let mut scene = create_scene();
        let shared = create_texture("shared", create_solid_color(1, 1, 1, 4, 4));
        let glass_only = create_texture("glass", create_solid_color(2, 2, 2, 4, 4));

        let glass = textured_material(&mut scene, "glass", &shared);
        enable_keyword(&mut scene, glass, "ALPHA_BLEND").expect("material exists");
        let wall = textured_material(&mut scene, "wall", &shared);
        let window = textured_material(&mut scene, "window", &glass_only);
        enable_keyword(&mut scene, window, "ALPHA_BLEND").expect("material exists");
        add_renderer(&mut scene, "r", vec![glass, wall, window], quad()).expect("valid renderer");

        let filtered = collect_materials_by_texture(&scene, TextureCategory::Color, true);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].texture.key, shared.key);
        assert_eq!(filtered[0].materials, vec![wall]);

        let all = collect_materials_by_texture(&scene, TextureCategory::Color, false);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].materials, vec![glass, wall]);
    }

    #[test]
    fn test_first_matching_property_wins() {
        let mut scene = create_scene();
        let spec = create_texture("spec", create_solid_color(1, 1, 1, 4, 4));
        let metal = create_texture("metal", create_solid_color(2, 2, 2, 4, 4));
        let m = add_material(&mut scene, "m", "standard");
        set_material_texture(&mut scene, m, "spec_gloss_map", Some(Arc::clone(&spec)))
            .expect("material exists");
        set_material_texture(&mut scene, m, "metallic_gloss_map", Some(Arc::clone(&metal)))
            .expect("material exists");
        add_renderer(&mut scene, "r", vec![m], quad()).expect("valid renderer");

        let bindings = collect_materials_by_texture(&scene, TextureCategory::GlossMap, false);
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].texture.key, spec.key);
    }

    #[test]
    fn test_declared_property_without_texture_is_skipped() {
        let mut scene = create_scene();
        let m = add_material(&mut scene, "m", "standard");
        set_material_texture(&mut scene, m, "bump_map", None).expect("material exists");
        add_renderer(&mut scene, "r", vec![m], quad()).expect("valid renderer");

        assert!(collect_materials_by_texture(&scene, TextureCategory::Normal, false).is_empty());
    }

    #[test]
    fn test_renderer_with_unknown_material_is_rejected() {
        let mut scene = create_scene();
        let result = add_renderer(&mut scene, "r", vec![MaterialId(7)], quad());
        assert!(matches!(result, Err(AtlasError::ResourceNotFound { .. })));
    }
}
