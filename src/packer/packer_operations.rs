//! Rectangle Packer Operations - Pure DOP Functions
//!
//! Shelf packer over a growable atlas. Free space is a list of disjoint
//! rectangles; placing an item splits the zone it lands in into a remainder
//! to its right (same height as the item) and a full-width remainder below.
//! Removing an item hands its rectangle back, and the next insertion merges
//! neighbouring free zones first.

use super::packer_data::{
    AssignedSlot, AtlasUV, NormalizedRect, PackItem, PackedRect, RectanglePackerData, SizeRefiner,
};
use crate::constants::ATLAS_CLEAR_COLOR;
use crate::error::{AtlasError, AtlasResult};
use crate::lod::resolution_estimator::RequiredSizes;
use crate::scene::scene_data::{TextureHandle, TextureKey};
use crate::scene::scene_operations::texture_native_size;
use crate::texture_utils::create_uniform_texture;
use cgmath::Vector2;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use rustc_hash::FxHashSet;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

impl PackedRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn x_max(&self) -> u32 {
        self.x + self.width
    }

    pub fn y_max(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn overlaps(&self, other: &PackedRect) -> bool {
        self.x < other.x_max()
            && other.x < self.x_max()
            && self.y < other.y_max()
            && other.y < self.y_max()
    }
}

/// Layout kept aside while a repack is attempted
struct LayoutSnapshot {
    total_width: u32,
    total_height: u32,
    free_zones: Vec<PackedRect>,
    assigned: BTreeMap<TextureKey, AssignedSlot>,
}

pub fn pack_item(texture: &TextureHandle, required: Vector2<u32>) -> PackItem {
    PackItem {
        texture: Arc::clone(texture),
        required,
    }
}

/// Item reserving the texture's full resolution
pub fn native_item(texture: &TextureHandle) -> PackItem {
    pack_item(texture, texture_native_size(texture))
}

fn validate_max_size(max_size: u32) -> AtlasResult<()> {
    if max_size == 0 {
        return Err(AtlasError::invalid_argument("max_size", "must be greater than 0"));
    }
    Ok(())
}

fn validate_item(item: &PackItem) -> AtlasResult<()> {
    if item.required.x == 0 || item.required.y == 0 {
        return Err(AtlasError::invalid_argument(
            "required_size",
            format!(
                "texture '{}' needs a non-zero size, got {}x{}",
                item.texture.name, item.required.x, item.required.y
            ),
        ));
    }
    Ok(())
}

/// Pack `items` into the smallest atlas that holds them, up to `max_size`.
///
/// Duplicate textures are dropped. When the first pass does not fit and a
/// refiner is given, its sizes are applied and the pack is tried once more.
/// A packer that still does not fit is returned in the failed state with the
/// textures that fit assigned.
pub fn create_packer(
    items: Vec<PackItem>,
    max_size: u32,
    label: &str,
    refiner: Option<&mut SizeRefiner<'_>>,
) -> AtlasResult<RectanglePackerData> {
    validate_max_size(max_size)?;

    let mut seen: FxHashSet<TextureKey> = FxHashSet::default();
    let mut unique = Vec::with_capacity(items.len());
    for item in items {
        validate_item(&item)?;
        if seen.insert(item.texture.key) {
            unique.push(item);
        }
    }

    let mut data = new_packer_data(label, 0, 0, max_size);
    let total = unique.len();
    data.successfully_packed = try_packing_textures(&mut data, unique, false, refiner);
    data.unfit_count = total - data.assigned.len();

    log::info!(
        "[packer::create_packer] {}: {} textures in {}x{}, packed={}",
        data.label,
        data.assigned.len(),
        data.total_width,
        data.total_height,
        data.successfully_packed
    );

    Ok(data)
}

/// Packer with a fixed starting size and nothing assigned
pub fn create_empty_packer(width: u32, height: u32, max_size: u32) -> AtlasResult<RectanglePackerData> {
    validate_max_size(max_size)?;
    if width > max_size || height > max_size {
        return Err(AtlasError::invalid_argument(
            "size",
            format!("{}x{} exceeds max size {}", width, height, max_size),
        ));
    }

    let mut data = new_packer_data("packer", width, height, max_size);
    clear(&mut data);
    Ok(data)
}

fn new_packer_data(label: &str, width: u32, height: u32, max_size: u32) -> RectanglePackerData {
    RectanglePackerData {
        label: label.to_string(),
        max_size,
        total_width: width,
        total_height: height,
        free_zones: Vec::new(),
        assigned: BTreeMap::new(),
        last_action_was_remove: false,
        successfully_packed: true,
        unfit_count: 0,
        packed: None,
    }
}

pub fn is_assigned(data: &RectanglePackerData, key: TextureKey) -> bool {
    data.assigned.contains_key(&key)
}

pub fn assigned_count(data: &RectanglePackerData) -> usize {
    data.assigned.len()
}

pub fn dimensions(data: &RectanglePackerData) -> Vector2<u32> {
    Vector2::new(data.total_width, data.total_height)
}

pub fn get_rect(data: &RectanglePackerData, key: TextureKey) -> Option<PackedRect> {
    data.assigned.get(&key).map(|slot| slot.rect)
}

/// UV rect of a texture, inset by half a texel so bilinear sampling stays
/// inside its slot. `y` is measured from the bottom of the atlas.
pub fn get_normalized_rect(data: &RectanglePackerData, key: TextureKey) -> Option<NormalizedRect> {
    let rect = get_rect(data, key)?;
    let width = data.total_width as f32;
    let height = data.total_height as f32;

    Some(NormalizedRect {
        x: (rect.x as f32 + 0.5) / width,
        y: 1.0 - (rect.y as f32 + 0.5 + rect.height as f32 - 1.0) / height,
        width: (rect.width as f32 - 1.0) / width,
        height: (rect.height as f32 - 1.0) / height,
    })
}

/// Full slot in top-left UV space
pub fn get_atlas_uv(data: &RectanglePackerData, key: TextureKey) -> Option<AtlasUV> {
    let rect = get_rect(data, key)?;
    let width = data.total_width as f32;
    let height = data.total_height as f32;

    Some(AtlasUV {
        min: Vector2::new(rect.x as f32 / width, rect.y as f32 / height),
        max: Vector2::new(rect.x_max() as f32 / width, rect.y_max() as f32 / height),
    })
}

/// Transform local UV (0-1) to atlas UV
pub fn transform_uv(atlas_uv: &AtlasUV, local_uv: Vector2<f32>) -> Vector2<f32> {
    Vector2::new(
        atlas_uv.min.x + (atlas_uv.max.x - atlas_uv.min.x) * local_uv.x,
        atlas_uv.min.y + (atlas_uv.max.y - atlas_uv.min.y) * local_uv.y,
    )
}

/// Get atlas utilization percentage
pub fn utilization(data: &RectanglePackerData) -> f32 {
    let total_area = data.total_width as u64 * data.total_height as u64;
    if total_area == 0 {
        return 0.0;
    }

    let used_area: u64 = data.assigned.values().map(|slot| slot.rect.area()).sum();
    (used_area as f32 / total_area as f32) * 100.0
}

pub fn add(data: &mut RectanglePackerData, item: PackItem) -> AtlasResult<bool> {
    add_with_refinement(data, item, None)
}

/// Insert a texture without disturbing the others when a free zone fits it.
///
/// Falls back to an expand-only repack of everything. If that fails too the
/// previous layout is kept, the new texture stays unassigned and the packer
/// reports failure. Returns the packer's success state.
pub fn add_with_refinement(
    data: &mut RectanglePackerData,
    item: PackItem,
    refiner: Option<&mut SizeRefiner<'_>>,
) -> AtlasResult<bool> {
    validate_item(&item)?;
    if is_assigned(data, item.texture.key) {
        return Ok(data.successfully_packed);
    }

    if data.last_action_was_remove {
        data.last_action_was_remove = false;
        defragment(data);
    }

    if find_slot(data, &item) {
        return Ok(data.successfully_packed);
    }

    defragment(data);
    if find_slot(data, &item) {
        return Ok(data.successfully_packed);
    }

    // Doesn't fit, expand and repack
    let snapshot = take_snapshot(data);
    let mut items: Vec<PackItem> = data.assigned.values().map(|slot| slot.item.clone()).collect();
    items.push(item);

    let packed = try_packing_textures(data, items, true, refiner);
    if !packed {
        restore_snapshot(data, snapshot);
        data.unfit_count = 1;
        log::warn!(
            "[packer::add] {}: repack failed, previous {}x{} layout kept",
            data.label,
            data.total_width,
            data.total_height
        );
    } else {
        data.unfit_count = 0;
    }

    data.successfully_packed = packed;
    Ok(packed)
}

fn take_snapshot(data: &RectanglePackerData) -> LayoutSnapshot {
    LayoutSnapshot {
        total_width: data.total_width,
        total_height: data.total_height,
        free_zones: data.free_zones.clone(),
        assigned: data.assigned.clone(),
    }
}

fn restore_snapshot(data: &mut RectanglePackerData, snapshot: LayoutSnapshot) {
    data.total_width = snapshot.total_width;
    data.total_height = snapshot.total_height;
    data.free_zones = snapshot.free_zones;
    data.assigned = snapshot.assigned;
    data.packed = None;
}

/// Free a texture's slot; returns false when it was not packed
pub fn remove(data: &mut RectanglePackerData, key: TextureKey) -> bool {
    let slot = match data.assigned.remove(&key) {
        Some(slot) => slot,
        None => return false,
    };

    if slot.rect.area() > 1 {
        data.free_zones.push(slot.rect);
        data.last_action_was_remove = true;
    }
    data.packed = None;
    true
}

/// Drop every slot and make the whole atlas one free zone
pub fn clear(data: &mut RectanglePackerData) {
    data.assigned.clear();
    data.free_zones.clear();
    if data.total_width > 0 && data.total_height > 0 {
        data.free_zones
            .push(PackedRect::new(0, 0, data.total_width, data.total_height));
    }
    data.packed = None;
}

/// First free zone that holds the item, or an exact fit found anywhere.
/// The zone is split into a right remainder of the item's height and a
/// full-width remainder below it.
pub fn find_slot(data: &mut RectanglePackerData, item: &PackItem) -> bool {
    let width = item.required.x;
    let height = item.required.y;

    let mut found: Option<usize> = None;
    for (i, zone) in data.free_zones.iter().enumerate() {
        if zone.width == width && zone.height == height {
            found = Some(i);
            break;
        }
        if found.is_none() && width <= zone.width && height <= zone.height {
            found = Some(i);
        }
    }

    let index = match found {
        Some(index) => index,
        None => return false,
    };

    let zone = data.free_zones[index];
    data.assigned.insert(
        item.texture.key,
        AssignedSlot {
            item: item.clone(),
            rect: PackedRect::new(zone.x, zone.y, width, height),
        },
    );

    let below = PackedRect::new(zone.x, zone.y + height, zone.width, zone.height - height);
    if zone.width > width {
        data.free_zones[index] = PackedRect::new(zone.x + width, zone.y, zone.width - width, height);
        if zone.height > height {
            data.free_zones.insert(index + 1, below);
        }
    } else if zone.height > height {
        data.free_zones[index] = below;
    } else {
        data.free_zones.remove(index);
    }

    data.packed = None;
    true
}

/// Pack, and on failure retry once with the refiner's sizes
pub fn try_packing_textures(
    data: &mut RectanglePackerData,
    mut items: Vec<PackItem>,
    expand_only: bool,
    refiner: Option<&mut SizeRefiner<'_>>,
) -> bool {
    if sort_and_pack(data, &mut items, expand_only) {
        return true;
    }

    let refiner = match refiner {
        Some(refiner) => refiner,
        None => return false,
    };

    log::info!("[packer::try_packing_textures] {}: start mip map calculation", data.label);
    let sizes = match refiner() {
        Ok(sizes) => sizes,
        Err(e) => {
            log::error!(
                "[packer::try_packing_textures] {}: LOD refinement failed: {}",
                data.label,
                e
            );
            return false;
        }
    };

    if sizes.is_empty() {
        return false;
    }

    apply_required_sizes(&mut items, &sizes);
    sort_and_pack(data, &mut items, expand_only)
}

/// Overwrite required sizes from `sizes`; returns how many changed
pub fn apply_required_sizes(items: &mut [PackItem], sizes: &RequiredSizes) -> usize {
    let mut replaced = 0;
    for item in items.iter_mut() {
        let size = match sizes.get(&item.texture.key) {
            Some(size) if size.x > 0 && size.y > 0 => *size,
            _ => continue,
        };

        if size != item.required {
            log::debug!(
                "[packer::apply_required_sizes] Replacing size of '{}' from ({}, {}) to ({}, {})",
                item.texture.name,
                item.required.x,
                item.required.y,
                size.x,
                size.y
            );
            item.required = size;
            replaced += 1;
        }
    }
    replaced
}

/// Ascending by area, then height, then width
fn pack_order(a: &PackItem, b: &PackItem) -> Ordering {
    let area_a = a.required.x as u64 * a.required.y as u64;
    let area_b = b.required.x as u64 * b.required.y as u64;
    area_a
        .cmp(&area_b)
        .then(a.required.y.cmp(&b.required.y))
        .then(a.required.x.cmp(&b.required.x))
}

/// Full repack, largest items first, growing the atlas until everything fits
/// or both sides reach `max_size`
pub fn sort_and_pack(data: &mut RectanglePackerData, items: &mut [PackItem], expand_only: bool) -> bool {
    let start = Instant::now();
    estimate_needed_size(data, items, expand_only);
    items.sort_by(pack_order);

    loop {
        clear(data);
        let mut everything_fits = true;

        for (i, item) in items.iter().enumerate().rev() {
            if find_slot(data, item) {
                continue;
            }

            everything_fits = false;
            if !grow(data) {
                log::error!(
                    "[packer::sort_and_pack] {}: done in {:.2}ms, no fit! Missing textures {} out of {}",
                    data.label,
                    start.elapsed().as_secs_f64() * 1000.0,
                    i + 1,
                    items.len()
                );
                return false;
            }
            break;
        }

        if everything_fits {
            break;
        }
    }

    log::info!(
        "[packer::sort_and_pack] {}: fits in {}x{}, done in {:.2}ms, textures added {}",
        data.label,
        data.total_width,
        data.total_height,
        start.elapsed().as_secs_f64() * 1000.0,
        data.assigned.len()
    );
    true
}

fn doubled(side: u32, max_size: u32) -> u32 {
    side.saturating_mul(2).max(1).min(max_size)
}

/// Double the narrower side, width first on ties
fn grow(data: &mut RectanglePackerData) -> bool {
    if data.total_width < data.max_size {
        if data.total_width <= data.total_height {
            data.total_width = doubled(data.total_width, data.max_size);
        } else {
            data.total_height = doubled(data.total_height, data.max_size);
        }
    } else if data.total_height < data.max_size {
        data.total_height = doubled(data.total_height, data.max_size);
    } else {
        return false;
    }
    true
}

/// Starting size from the largest item and the total area.
/// With `expand_only` the atlas never shrinks below its current size.
pub fn estimate_needed_size(data: &mut RectanglePackerData, items: &[PackItem], expand_only: bool) {
    if items.is_empty() {
        if !expand_only {
            data.total_width = 0;
            data.total_height = 0;
        }
        return;
    }

    let mut area: u64 = 0;
    let mut max_width = 0u32;
    let mut max_height = 0u32;
    for item in items {
        area += item.required.x as u64 * item.required.y as u64;
        max_width = max_width.max(item.required.x);
        max_height = max_height.max(item.required.y);
    }

    let max_size = data.max_size;
    let power_of_two = |side: u32| side.checked_next_power_of_two().unwrap_or(max_size).min(max_size);

    let mut width = power_of_two(max_width);
    let mut height = power_of_two(max_height);
    if expand_only {
        width = width.max(data.total_width);
        height = height.max(data.total_height);
    }

    while (width as u64 * height as u64) < area && (width < max_size || height < max_size) {
        // Keep it square
        if width < height || height >= max_size {
            width = doubled(width, max_size);
        } else {
            height = doubled(height, max_size);
        }
    }

    data.total_width = width;
    data.total_height = height;
}

fn position_y_order(r: &PackedRect) -> (u32, u32) {
    (r.y, r.x)
}

/// Merge neighbouring free zones.
///
/// Pass one walks zones by row and joins horizontal neighbours on the same
/// top edge, swapping an uneven pair for a wide strip plus a remainder when
/// that yields a bigger largest zone. Pass two joins vertical neighbours of
/// identical span. One pass of each; callers defragment often enough.
pub fn defragment(data: &mut RectanglePackerData) {
    let zones = &mut data.free_zones;
    zones.sort_by_key(position_y_order);

    let mut index = 0;
    while index + 1 < zones.len() {
        let r0 = zones[index];
        let r1 = zones[index + 1];

        if r0.y == r1.y && r0.x_max() == r1.x {
            if r0.height == r1.height {
                zones[index] = PackedRect::new(r0.x, r0.y, r0.width + r1.width, r0.height);
                zones.remove(index + 1);
                continue;
            }

            let current_max = r0.area().max(r1.area());
            let strip = PackedRect::new(r0.x, r0.y, r0.width + r1.width, r0.height.min(r1.height));
            let remainder = if r0.height < r1.height {
                PackedRect::new(r1.x, r1.y + r0.height, r1.width, r1.height - r0.height)
            } else {
                PackedRect::new(r0.x, r0.y + r1.height, r0.width, r0.height - r1.height)
            };

            if strip.area().max(remainder.area()) > current_max {
                zones[index] = strip;
                zones.remove(index + 1);

                let key = position_y_order(&remainder);
                let insert_at = zones[index + 1..]
                    .iter()
                    .position(|zone| key <= position_y_order(zone))
                    .map_or(zones.len(), |offset| index + 1 + offset);
                zones.insert(insert_at, remainder);
                continue;
            }
        }

        index += 1;
    }

    // Horizontal bars are consolidated, merge vertically
    zones.sort_by_key(|r| (r.x, r.y));
    let mut index = 0;
    while index + 1 < zones.len() {
        let r0 = zones[index];
        let r1 = zones[index + 1];
        if r0.x == r1.x && r0.width == r1.width && r0.y_max() == r1.y {
            zones[index] = PackedRect::new(r0.x, r0.y, r0.width, r0.height + r1.height);
            zones.remove(index + 1);
        } else {
            index += 1;
        }
    }
}

/// Composited atlas, built on first use after a change.
/// Slots are filled with nearest-neighbour scaling over a transparent white
/// background; an empty packer yields a 1x1 image.
pub fn get_texture(data: &mut RectanglePackerData) -> &RgbaImage {
    let image = match data.packed.take() {
        Some(image) => image,
        None => render_packed(data),
    };
    data.packed.insert(image)
}

fn render_packed(data: &RectanglePackerData) -> RgbaImage {
    if data.total_width == 0 || data.total_height == 0 {
        log::debug!("[packer::get_texture] {}: nothing in packer", data.label);
        return create_uniform_texture(Rgba(ATLAS_CLEAR_COLOR), 1, 1);
    }

    let mut canvas = RgbaImage::from_pixel(data.total_width, data.total_height, Rgba(ATLAS_CLEAR_COLOR));
    for slot in data.assigned.values() {
        let source = &slot.item.texture.image;
        if source.width() == 0 || source.height() == 0 {
            continue;
        }

        let rect = slot.rect;
        if source.dimensions() == (rect.width, rect.height) {
            imageops::replace(&mut canvas, source, rect.x as i64, rect.y as i64);
        } else {
            let scaled = imageops::resize(source, rect.width, rect.height, FilterType::Nearest);
            imageops::replace(&mut canvas, &scaled, rect.x as i64, rect.y as i64);
        }
    }

    canvas
}

impl fmt::Display for RectanglePackerData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Packer texture count={}", self.assigned.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::scene_operations::create_texture;
    use crate::texture_utils::create_solid_color;
    use rustc_hash::FxHashMap;

    fn texture(size: u32) -> TextureHandle {
        create_texture("t", create_solid_color(10, 20, 30, size, size))
    }

    fn square_item(size: u32) -> PackItem {
        native_item(&texture(size))
    }

    fn assert_invariants(data: &RectanglePackerData) {
        let slots: Vec<PackedRect> = data.assigned.values().map(|slot| slot.rect).collect();
        let all: Vec<&PackedRect> = slots.iter().chain(data.free_zones.iter()).collect();

        for (i, a) in all.iter().enumerate() {
            assert!(a.x_max() <= data.total_width && a.y_max() <= data.total_height, "{:?} out of atlas", a);
            for b in &all[i + 1..] {
                assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
            }
        }

        let used: u64 = slots.iter().map(|r| r.area()).sum();
        assert!(data.total_width as u64 * data.total_height as u64 >= used);
    }

    #[test]
    fn test_ten_squares_fit_in_one_pass() {
        let items: Vec<PackItem> = (0..10).map(|_| square_item(128)).collect();
        let keys: Vec<TextureKey> = items.iter().map(|item| item.texture.key).collect();
        let data = create_packer(items, 1024, "COLOR", None).expect("valid packer");

        assert!(data.successfully_packed);
        assert_eq!(assigned_count(&data), 10);
        assert!(data.total_width <= 1024 && data.total_height <= 1024);
        assert_invariants(&data);

        let uvs: Vec<NormalizedRect> = keys
            .iter()
            .map(|key| get_normalized_rect(&data, *key).expect("assigned"))
            .collect();
        for (i, a) in uvs.iter().enumerate() {
            for b in &uvs[i + 1..] {
                let disjoint = a.x + a.width <= b.x
                    || b.x + b.width <= a.x
                    || a.y + a.height <= b.y
                    || b.y + b.height <= a.y;
                assert!(disjoint, "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_overflow_leaves_packer_failed() {
        let items: Vec<PackItem> = (0..5).map(|_| square_item(128)).collect();
        let data = create_packer(items, 256, "AO", None).expect("valid packer");

        assert!(!data.successfully_packed);
        assert_eq!(data.unfit_count, 1);
        assert_eq!(assigned_count(&data), 4);
        assert_eq!(dimensions(&data), Vector2::new(256, 256));
        assert_invariants(&data);
    }

    #[test]
    fn test_failed_add_keeps_previous_layout() {
        let items: Vec<PackItem> = (0..4).map(|_| square_item(128)).collect();
        let mut data = create_packer(items, 256, "COLOR", None).expect("valid packer");
        assert!(data.successfully_packed);

        let before: Vec<(TextureKey, PackedRect)> =
            data.assigned.iter().map(|(key, slot)| (*key, slot.rect)).collect();

        let extra = square_item(128);
        let extra_key = extra.texture.key;
        assert!(!add(&mut data, extra).expect("valid item"));
        assert!(!is_assigned(&data, extra_key));

        let after: Vec<(TextureKey, PackedRect)> =
            data.assigned.iter().map(|(key, slot)| (*key, slot.rect)).collect();
        assert_eq!(before, after);
        assert_invariants(&data);
    }

    #[test]
    fn test_add_grows_atlas_when_full() {
        let mut data = create_packer(vec![square_item(128)], 1024, "COLOR", None).expect("valid packer");
        assert_eq!(dimensions(&data), Vector2::new(128, 128));

        let item = square_item(128);
        let key = item.texture.key;
        assert!(add(&mut data, item).expect("valid item"));
        assert!(is_assigned(&data, key));
        assert_eq!(dimensions(&data), Vector2::new(128, 256));
        assert_invariants(&data);
    }

    #[test]
    fn test_add_existing_is_noop() {
        let item = square_item(64);
        let key = item.texture.key;
        let mut data = create_packer(vec![item.clone()], 256, "COLOR", None).expect("valid packer");
        let rect = get_rect(&data, key);

        assert!(add(&mut data, item).expect("valid item"));
        assert_eq!(get_rect(&data, key), rect);
        assert_eq!(assigned_count(&data), 1);
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let shared = texture(32);
        let items = vec![native_item(&shared), native_item(&shared), square_item(32)];
        let data = create_packer(items, 256, "COLOR", None).expect("valid packer");
        assert_eq!(assigned_count(&data), 2);
        assert_eq!(data.to_string(), "Packer texture count=2");
    }

    #[test]
    fn test_split_keeps_right_remainder_at_item_height() {
        let mut data = create_empty_packer(256, 256, 256).expect("valid packer");
        let item = pack_item(&texture(4), Vector2::new(64, 32));

        assert!(find_slot(&mut data, &item));
        assert_eq!(get_rect(&data, item.texture.key), Some(PackedRect::new(0, 0, 64, 32)));
        assert_eq!(
            data.free_zones,
            vec![PackedRect::new(64, 0, 192, 32), PackedRect::new(0, 32, 256, 224)]
        );
    }

    #[test]
    fn test_exact_fit_is_preferred() {
        let mut data = create_empty_packer(256, 256, 256).expect("valid packer");
        data.free_zones = vec![PackedRect::new(0, 0, 100, 100), PackedRect::new(100, 0, 50, 50)];
        let item = pack_item(&texture(4), Vector2::new(50, 50));

        assert!(find_slot(&mut data, &item));
        assert_eq!(get_rect(&data, item.texture.key), Some(PackedRect::new(100, 0, 50, 50)));
        assert_eq!(data.free_zones, vec![PackedRect::new(0, 0, 100, 100)]);
    }

    #[test]
    fn test_growth_alternates_sides() {
        let mut data = create_empty_packer(128, 128, 256).expect("valid packer");
        assert!(grow(&mut data));
        assert_eq!(dimensions(&data), Vector2::new(256, 128));
        assert!(grow(&mut data));
        assert_eq!(dimensions(&data), Vector2::new(256, 256));
        assert!(!grow(&mut data));
    }

    #[test]
    fn test_estimate_never_exceeds_max() {
        let mut data = create_empty_packer(0, 0, 512).expect("valid packer");
        let items: Vec<PackItem> = (0..40).map(|_| square_item(128)).collect();
        estimate_needed_size(&mut data, &items, false);
        assert_eq!(dimensions(&data), Vector2::new(512, 512));

        estimate_needed_size(&mut data, &[], false);
        assert_eq!(dimensions(&data), Vector2::new(0, 0));
    }

    #[test]
    fn test_defragment_merges_neighbours() {
        let mut data = create_empty_packer(256, 256, 256).expect("valid packer");
        data.free_zones = vec![PackedRect::new(64, 0, 64, 64), PackedRect::new(0, 0, 64, 64)];
        defragment(&mut data);
        assert_eq!(data.free_zones, vec![PackedRect::new(0, 0, 128, 64)]);

        data.free_zones = vec![PackedRect::new(0, 32, 64, 32), PackedRect::new(0, 0, 64, 32)];
        defragment(&mut data);
        assert_eq!(data.free_zones, vec![PackedRect::new(0, 0, 64, 64)]);

        defragment(&mut data);
        assert_eq!(data.free_zones, vec![PackedRect::new(0, 0, 64, 64)]);
    }

    #[test]
    fn test_defragment_swaps_uneven_pair_only_when_larger() {
        let mut data = create_empty_packer(256, 256, 256).expect("valid packer");
        data.free_zones = vec![PackedRect::new(0, 0, 128, 64), PackedRect::new(128, 0, 128, 48)];
        defragment(&mut data);
        assert_eq!(
            data.free_zones,
            vec![PackedRect::new(0, 0, 256, 48), PackedRect::new(0, 48, 128, 16)]
        );

        let untouched = vec![PackedRect::new(0, 0, 64, 128), PackedRect::new(64, 0, 64, 32)];
        data.free_zones = untouched.clone();
        defragment(&mut data);
        assert_eq!(data.free_zones, untouched);
    }

    #[test]
    fn test_removed_space_is_reused() {
        let items: Vec<PackItem> = (0..4).map(|_| square_item(64)).collect();
        let first = items[0].texture.key;
        let mut data = create_packer(items, 128, "COLOR", None).expect("valid packer");
        let freed = get_rect(&data, first).expect("assigned");

        assert!(remove(&mut data, first));
        assert!(data.last_action_was_remove);
        assert!(!remove(&mut data, first));

        let item = square_item(64);
        let key = item.texture.key;
        assert!(add(&mut data, item).expect("valid item"));
        assert!(!data.last_action_was_remove);
        assert_eq!(get_rect(&data, key), Some(freed));
        assert_invariants(&data);
    }

    #[test]
    fn test_removing_single_texel_keeps_free_list() {
        let item = pack_item(&texture(4), Vector2::new(1, 1));
        let key = item.texture.key;
        let mut data = create_packer(vec![item, square_item(4)], 64, "COLOR", None).expect("valid packer");
        let zones = data.free_zones.clone();

        assert!(remove(&mut data, key));
        assert_eq!(data.free_zones, zones);
        assert!(!data.last_action_was_remove);
    }

    #[test]
    fn test_invariants_hold_over_add_remove_sequence() {
        let mut data = create_empty_packer(64, 64, 1024).expect("valid packer");
        let mut live: Vec<TextureKey> = Vec::new();
        let mut seed = 12345u32;
        let mut next = move || {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            (seed >> 16) & 0x7fff
        };

        for _ in 0..200 {
            if !live.is_empty() && next() % 3 == 0 {
                let key = live.remove(next() as usize % live.len());
                assert!(remove(&mut data, key));
            } else {
                let width = 1 + next() % 96;
                let height = 1 + next() % 96;
                let item = pack_item(&texture(2), Vector2::new(width, height));
                live.push(item.texture.key);
                assert!(add(&mut data, item).expect("valid item"));
            }
            assert_invariants(&data);
        }

        assert_eq!(assigned_count(&data), live.len());
    }

    #[test]
    fn test_normalized_rect_offsets_half_texel() {
        let mut data = create_empty_packer(256, 256, 256).expect("valid packer");
        let item = pack_item(&texture(4), Vector2::new(64, 32));
        assert!(find_slot(&mut data, &item));

        let uv = get_normalized_rect(&data, item.texture.key).expect("assigned");
        assert_eq!(uv.x, 0.5 / 256.0);
        assert_eq!(uv.y, 1.0 - 31.5 / 256.0);
        assert_eq!(uv.width, 63.0 / 256.0);
        assert_eq!(uv.height, 31.0 / 256.0);

        let atlas_uv = get_atlas_uv(&data, item.texture.key).expect("assigned");
        let center = transform_uv(&atlas_uv, Vector2::new(0.5, 0.5));
        assert_eq!(center, Vector2::new(32.0 / 256.0, 16.0 / 256.0));
        assert!(get_normalized_rect(&data, TextureKey(u64::MAX)).is_none());
    }

    #[test]
    fn test_utilization_percentage() {
        let mut data = create_empty_packer(128, 128, 128).expect("valid packer");
        assert_eq!(utilization(&data), 0.0);
        assert!(find_slot(&mut data, &square_item(64)));
        assert_eq!(utilization(&data), 25.0);
    }

    #[test]
    fn test_empty_packer_texture_is_placeholder() {
        let mut data = create_packer(Vec::new(), 256, "NORMAL", None).expect("valid packer");
        assert!(data.successfully_packed);
        let image = get_texture(&mut data);
        assert_eq!(image.dimensions(), (1, 1));
    }

    #[test]
    fn test_texture_composites_scaled_slots() {
        let red = create_texture("red", create_solid_color(255, 0, 0, 8, 8));
        let green = create_texture("green", create_solid_color(0, 255, 0, 2, 2));
        let items = vec![pack_item(&red, Vector2::new(4, 4)), pack_item(&green, Vector2::new(4, 4))];
        let mut data = create_packer(items, 64, "COLOR", None).expect("valid packer");
        let red_rect = get_rect(&data, red.key).expect("assigned");
        let green_rect = get_rect(&data, green.key).expect("assigned");

        let image = get_texture(&mut data).clone();
        assert_eq!(image.dimensions(), (data.total_width, data.total_height));
        assert_eq!(image.get_pixel(red_rect.x + 3, red_rect.y + 3).0, [255, 0, 0, 255]);
        assert_eq!(image.get_pixel(green_rect.x, green_rect.y).0, [0, 255, 0, 255]);
    }

    #[test]
    fn test_texture_cache_invalidated_by_remove() {
        let item = square_item(8);
        let key = item.texture.key;
        let mut data = create_packer(vec![item, square_item(8)], 64, "COLOR", None).expect("valid packer");
        let rect = get_rect(&data, key).expect("assigned");

        get_texture(&mut data);
        assert!(data.packed.is_some());
        get_texture(&mut data);
        assert!(data.packed.is_some());

        remove(&mut data, key);
        assert!(data.packed.is_none());
        let image = get_texture(&mut data);
        assert_eq!(image.get_pixel(rect.x, rect.y).0, ATLAS_CLEAR_COLOR);
    }

    #[test]
    fn test_refinement_shrinks_textures_to_fit() {
        let items: Vec<PackItem> = (0..3).map(|_| square_item(256)).collect();
        let keys: Vec<TextureKey> = items.iter().map(|item| item.texture.key).collect();
        let mut calls = 0;
        let mut refine = || -> AtlasResult<RequiredSizes> {
            calls += 1;
            let sizes: RequiredSizes = keys.iter().map(|key| (*key, Vector2::new(128, 128))).collect();
            Ok(sizes)
        };
        let refiner: &mut SizeRefiner<'_> = &mut refine;

        let data = create_packer(items, 256, "COLOR", Some(refiner)).expect("valid packer");
        assert!(data.successfully_packed);
        assert_eq!(assigned_count(&data), 3);
        for key in &keys {
            assert_eq!(get_rect(&data, *key).map(|r| (r.width, r.height)), Some((128, 128)));
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_refinement_error_leaves_failed_state() {
        let items: Vec<PackItem> = (0..2).map(|_| square_item(256)).collect();
        let mut refine = || -> AtlasResult<RequiredSizes> {
            Err(AtlasError::ComputeUnsupported("no kernel".to_string()))
        };
        let refiner: &mut SizeRefiner<'_> = &mut refine;

        let data = create_packer(items, 256, "COLOR", Some(refiner)).expect("valid packer");
        assert!(!data.successfully_packed);
        assert_eq!(assigned_count(&data), 1);
    }

    #[test]
    fn test_apply_required_sizes_skips_unknown_and_empty() {
        let a = square_item(64);
        let b = square_item(64);
        let mut sizes: RequiredSizes = FxHashMap::default();
        sizes.insert(a.texture.key, Vector2::new(16, 16));
        sizes.insert(b.texture.key, Vector2::new(0, 16));

        let mut items = vec![a, b, square_item(64)];
        assert_eq!(apply_required_sizes(&mut items, &sizes), 1);
        assert_eq!(items[0].required, Vector2::new(16, 16));
        assert_eq!(items[1].required, Vector2::new(64, 64));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(
            create_packer(Vec::new(), 0, "COLOR", None),
            Err(AtlasError::InvalidArgument { name: "max_size", .. })
        ));
        let zero = pack_item(&texture(4), Vector2::new(0, 4));
        assert!(matches!(
            create_packer(vec![zero.clone()], 64, "COLOR", None),
            Err(AtlasError::InvalidArgument { name: "required_size", .. })
        ));
        let mut data = create_empty_packer(64, 64, 64).expect("valid packer");
        assert!(add(&mut data, zero).is_err());
        assert!(create_empty_packer(128, 64, 64).is_err());
    }
}
