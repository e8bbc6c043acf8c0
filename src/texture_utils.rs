//! Texture helpers - pure functions
//!
//! Mip arithmetic and small image builders shared by the estimator, the
//! packer and the tests.

use cgmath::Vector2;
use image::{Rgba, RgbaImage};

/// Create a uniform RGBA texture
pub fn create_uniform_texture(color: Rgba<u8>, width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width.max(1), height.max(1), color)
}

/// Create solid color texture for testing
pub fn create_solid_color(r: u8, g: u8, b: u8, width: u32, height: u32) -> RgbaImage {
    create_uniform_texture(Rgba([r, g, b, 255]), width, height)
}

/// Number of mip levels down to 1 pixel on the smallest side.
/// Works for textures created without a mip chain.
pub fn mip_count_for_smallest_dimension(width: u32, height: u32) -> u32 {
    let smallest = width.min(height);
    if smallest == 0 {
        return 0;
    }
    smallest.ilog2() + 1
}

/// Size of a texture displayed at `lod`.
///
/// Both sides are halved once per level as long as neither half drops below
/// `min_texture_size`. A texture already under the floor keeps its native
/// size and a `lod` past the available halvings stops at the last size that
/// stays on or above the floor.
pub fn size_from_lod(native: Vector2<u32>, lod: i32, min_texture_size: u32) -> Vector2<u32> {
    let floor = min_texture_size.max(1);
    let mut size = native;
    let mut current_lod = 0;

    while current_lod < lod && size.x / 2 >= floor && size.y / 2 >= floor {
        current_lod += 1;
        size.x /= 2;
        size.y /= 2;
    }

    size
}

/// Per-channel comparison with one 8-bit step of tolerance
pub fn colors_roughly_equal(c1: Rgba<f32>, c2: Rgba<f32>) -> bool {
    let step = 1.0 / 255.0;
    c1.0
        .iter()
        .zip(c2.0.iter())
        .all(|(a, b)| (a - b).abs() <= step)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_texture() {
        let tex = create_uniform_texture(Rgba([0, 0, 0, 0]), 2, 2);
        assert_eq!(tex.dimensions(), (2, 2));
        assert!(tex.pixels().all(|p| *p == Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn test_mip_count() {
        assert_eq!(mip_count_for_smallest_dimension(1024, 1024), 11);
        assert_eq!(mip_count_for_smallest_dimension(1024, 256), 9);
        assert_eq!(mip_count_for_smallest_dimension(300, 1000), 9);
        assert_eq!(mip_count_for_smallest_dimension(1, 1), 1);
        assert_eq!(mip_count_for_smallest_dimension(0, 64), 0);
    }

    #[test]
    fn test_lod_zero_keeps_native_size() {
        let size = size_from_lod(Vector2::new(1024, 512), 0, 128);
        assert_eq!(size, Vector2::new(1024, 512));
    }

    #[test]
    fn test_lod_halves_until_floor() {
        let native = Vector2::new(2048, 1024);
        let mut previous = native;
        for lod in 1..4 {
            let size = size_from_lod(native, lod, 128);
            assert_eq!(size.x, previous.x / 2);
            assert_eq!(size.y, previous.y / 2);
            previous = size;
        }
        // 1024 -> 512 -> 256 -> 128 on the short side, then the floor holds
        assert_eq!(size_from_lod(native, 3, 128), Vector2::new(256, 128));
        assert_eq!(size_from_lod(native, 50, 128), Vector2::new(256, 128));
    }

    #[test]
    fn test_small_texture_is_never_shrunk() {
        assert_eq!(size_from_lod(Vector2::new(64, 64), 5, 128), Vector2::new(64, 64));
    }

    #[test]
    fn test_odd_sizes_stop_at_floor() {
        // 200 / 2 = 100 would cross the floor
        assert_eq!(size_from_lod(Vector2::new(200, 200), 1, 128), Vector2::new(200, 200));
        // 300 -> 150, then 75 would cross the floor
        assert_eq!(size_from_lod(Vector2::new(1000, 300), 3, 128), Vector2::new(500, 150));

        for (w, h) in [(200, 200), (1000, 300), (777, 129), (4000, 2500)] {
            for lod in 0..12 {
                let size = size_from_lod(Vector2::new(w, h), lod, 128);
                assert!(size.x >= 128u32.min(w) && size.y >= 128u32.min(h), "{}x{} lod {}", w, h, lod);
            }
        }
    }

    #[test]
    fn test_floor_is_at_least_one() {
        assert_eq!(size_from_lod(Vector2::new(8, 8), 10, 0), Vector2::new(1, 1));
    }

    #[test]
    fn test_colors_roughly_equal() {
        let a = Rgba([0.392, 0.5, 0.0, 1.0]);
        let b = Rgba([0.388, 0.5, 0.0, 1.0]);
        assert!(colors_roughly_equal(a, b));
        assert!(!colors_roughly_equal(a, Rgba([0.2, 0.5, 0.0, 1.0])));
    }
}
