use crate::config::ShadowSettings;
use crate::lights::LightKind;

/// Smallest usable map size relative to the configured maximum; requests
/// mapping below this still get a `min_shadow_map_size` map.
pub fn min_relative_size(settings: &ShadowSettings) -> f32 {
    (settings.min_shadow_map_size as f32 - 1.0) / settings.max_shadow_map_size as f32
}

/// Maps a light's priority scale to a concrete power-of-two map resolution.
/// Point lights render six faces, so they run at half the configured maximum
/// and twice the relative floor.
pub fn shadow_map_size(
    kind: LightKind,
    scale: f32,
    settings: &ShadowSettings,
    min_relative_size: f32,
) -> u32 {
    let mut max_size = settings.max_shadow_map_size;
    let mut floor = min_relative_size;
    if kind == LightKind::Point {
        max_size /= 2;
        floor *= 2.0;
    }
    let clamped = scale.powf(settings.scale_mapping_exponent).clamp(floor, 1.0);
    ceil_pow2((max_size as f32 * clamped) as u32)
}

/// Priority used for packing order: cascades always sort above point/spot
/// lights, whose screen-space score is capped.
pub fn sort_priority(kind: LightKind, scale: f32) -> f32 {
    if kind == LightKind::Directional {
        100.0
    } else {
        scale.min(10.0)
    }
}

fn ceil_pow2(value: u32) -> u32 {
    value.max(1).next_power_of_two()
}
