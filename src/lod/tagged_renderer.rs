//! Tagged scene render
//!
//! `TaggedSceneRenderer` is the capability the estimator needs from a
//! renderer: one frame of the scene where every tagged material writes its
//! texture tag and sampled mip level. `SoftwareTaggedRenderer` rasterises the
//! camera-facing quads of the scene model on the CPU with a depth buffer.

use super::visibility_reducer::encode_tagged_pixel;
use crate::error::{AtlasError, AtlasResult};
use crate::scene::scene_data::{LodShaderState, SceneData, SceneRenderer, TextureAsset};
use crate::texture_utils::mip_count_for_smallest_dimension;
use cgmath::Rad;
use image::{Rgba, Rgba32FImage};

/// Slack on the mip selection so an exact 2^n texel ratio does not drop a level
const LOD_EPSILON: f32 = 1e-3;

pub trait TaggedSceneRenderer {
    /// Render with every material's current `LodShaderState`.
    /// Background pixels are fully transparent.
    fn render_tagged(&mut self, scene: &SceneData) -> AtlasResult<Rgba32FImage>;

    /// Output size in pixels
    fn resolution(&self) -> (u32, u32);
}

#[derive(Debug, Clone)]
pub struct SoftwareTaggedRenderer {
    width: u32,
    height: u32,
}

/// Screen-space footprint of a quad
#[derive(Debug, Clone, Copy)]
struct ScreenQuad {
    left: f32,
    top: f32,
    width: f32,
    height: f32,
    depth: f32,
}

impl SoftwareTaggedRenderer {
    pub fn new(width: u32, height: u32) -> AtlasResult<Self> {
        if width == 0 || height == 0 {
            return Err(AtlasError::invalid_argument(
                "render_size",
                format!("must be non-zero, got {}x{}", width, height),
            ));
        }
        Ok(Self { width, height })
    }

    fn focal_length(&self, scene: &SceneData) -> AtlasResult<f32> {
        let fov = Rad::from(scene.camera.fov_y).0;
        if !(fov > 0.0 && fov < std::f32::consts::PI) {
            return Err(AtlasError::invalid_argument(
                "fov_y",
                format!("must be inside (0, 180) degrees, got {:?}", scene.camera.fov_y),
            ));
        }
        Ok(self.height as f32 * 0.5 / (fov * 0.5).tan())
    }

    fn project(&self, renderer: &SceneRenderer, focal: f32) -> ScreenQuad {
        let quad = &renderer.quad;
        let scale = focal / quad.depth;
        let width = quad.size.x * scale;
        let height = quad.size.y * scale;
        let center_x = self.width as f32 * 0.5 + quad.center.x * scale;
        let center_y = self.height as f32 * 0.5 - quad.center.y * scale;

        ScreenQuad {
            left: center_x - width * 0.5,
            top: center_y - height * 0.5,
            width,
            height,
            depth: quad.depth,
        }
    }

    /// Pixels whose centre lies inside `[start, start + extent)`
    fn pixel_span(start: f32, extent: f32, limit: u32) -> std::ops::Range<u32> {
        let first = (start - 0.5).ceil().max(0.0);
        let last = (start + extent - 0.5).ceil().min(limit as f32);
        if last <= first {
            return 0..0;
        }
        first as u32..last as u32
    }
}

/// Mip level sampled when `texture` spans `screen_width x screen_height` pixels
pub fn sampled_lod(texture: &TextureAsset, uv_repeat: f32, screen_width: f32, screen_height: f32) -> i32 {
    let mip_count = mip_count_for_smallest_dimension(texture.image.width(), texture.image.height());
    if mip_count == 0 || screen_width <= 0.0 || screen_height <= 0.0 {
        return 0;
    }

    let repeat = uv_repeat.max(0.0);
    let ratio_x = texture.image.width() as f32 * repeat / screen_width;
    let ratio_y = texture.image.height() as f32 * repeat / screen_height;
    let ratio = ratio_x.max(ratio_y);
    if ratio <= 1.0 {
        return 0;
    }

    let lod = (ratio.log2() + LOD_EPSILON).floor() as i32;
    lod.clamp(0, mip_count as i32 - 1)
}

impl TaggedSceneRenderer for SoftwareTaggedRenderer {
    fn render_tagged(&mut self, scene: &SceneData) -> AtlasResult<Rgba32FImage> {
        let focal = self.focal_length(scene)?;
        let mut image = Rgba32FImage::from_pixel(self.width, self.height, Rgba([0.0; 4]));
        let mut depth_buffer = vec![f32::INFINITY; (self.width * self.height) as usize];
        let mut drawn = 0usize;

        for renderer in &scene.renderers {
            if !renderer.enabled || !renderer.visible || renderer.materials.is_empty() {
                continue;
            }
            if renderer.quad.depth <= scene.camera.near {
                continue;
            }

            let screen = self.project(renderer, focal);
            let bands = renderer.materials.len();
            let band_height = screen.height / bands as f32;

            for (band, material_id) in renderer.materials.iter().enumerate() {
                let material = match scene.materials.get(material_id.0 as usize) {
                    Some(m) => m,
                    None => continue,
                };

                let color = match &material.lod_state {
                    LodShaderState::Discard => continue,
                    LodShaderState::Standard => Rgba([0.0; 4]),
                    LodShaderState::Tagged {
                        target,
                        texture_tag,
                    } => {
                        let lod = sampled_lod(target, renderer.quad.uv_repeat, screen.width, band_height);
                        encode_tagged_pixel(lod, *texture_tag)
                    }
                };

                let xs = Self::pixel_span(screen.left, screen.width, self.width);
                let ys = Self::pixel_span(
                    screen.top + band as f32 * band_height,
                    band_height,
                    self.height,
                );

                for y in ys {
                    for x in xs.clone() {
                        let index = (y * self.width + x) as usize;
                        if screen.depth < depth_buffer[index] {
                            depth_buffer[index] = screen.depth;
                            image.put_pixel(x, y, color);
                        }
                    }
                }
            }
            drawn += 1;
        }

        log::debug!(
            "[SoftwareTaggedRenderer::render_tagged] {}x{} frame, {} renderers drawn",
            self.width,
            self.height,
            drawn
        );

        Ok(image)
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
