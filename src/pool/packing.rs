use glam::{Mat4, Vec3, Vec4};
use half::f16;

use super::atlas::AtlasRect;
use super::ShadowRequest;
use crate::camera::Camera;

// Per-light footprints in the packed buffer, in vec4 units. The layout per
// light starts with one parameter vector, followed by the world-to-light
// matrices; directional lights append cascade remap, atlas remap, secondary
// parameter and fade-out vectors.
pub const DIR_SHADOW_DATA_VEC4S: u32 = 17;
pub const POINT_SHADOW_DATA_VEC4S: u32 = 25;
pub const SPOT_SHADOW_DATA_VEC4S: u32 = 5;

pub const fn shadow_params_index(base: u32) -> usize {
    base as usize
}

pub const fn world_to_light_matrix_index(base: u32, view: usize) -> usize {
    base as usize + 1 + view * 4
}

pub const fn cascade_scale_index(base: u32, cascade: usize) -> usize {
    base as usize + 5 + cascade * 2
}

pub const fn cascade_offset_index(base: u32, cascade: usize) -> usize {
    base as usize + 6 + cascade * 2
}

pub const fn atlas_scale_offset_index(base: u32, cascade: usize) -> usize {
    base as usize + 11 + cascade
}

pub const fn shadow_params2_index(base: u32) -> usize {
    base as usize + 15
}

pub const fn fade_out_params_index(base: u32) -> usize {
    base as usize + 16
}

/// Packs a scale/offset pair as two f16 halves bit-cast into one f32 lane.
pub fn pack_f16_pair(scale: f32, offset: f32) -> f32 {
    let bits = f16::from_f32(scale).to_bits() as u32 | (f16::from_f32(offset).to_bits() as u32) << 16;
    f32::from_bits(bits)
}

fn write_mat4(packed: &mut [[f32; 4]], index: usize, matrix: Mat4) {
    packed[index] = matrix.x_axis.to_array();
    packed[index + 1] = matrix.y_axis.to_array();
    packed[index + 2] = matrix.z_axis.to_array();
    packed[index + 3] = matrix.w_axis.to_array();
}

/// Atlas rect as UV scale/offset with the NDC-to-UV half-scale/bias folded
/// in (y flipped).
fn folded_atlas_scale_offset(rect: AtlasRect, inv_atlas: f32) -> [f32; 4] {
    let scale_x = rect.width as f32 * inv_atlas;
    let scale_y = rect.height as f32 * inv_atlas;
    let offset_x = rect.x as f32 * inv_atlas;
    let offset_y = rect.y as f32 * inv_atlas;
    [
        scale_x * 0.5,
        scale_y * -0.5,
        offset_x + scale_x * 0.5,
        offset_y + scale_y * 0.5,
    ]
}

pub(crate) fn encode_directional(
    packed: &mut [[f32; 4]],
    request: &ShadowRequest,
    cameras: &[&Camera],
    rects: &[AtlasRect],
    atlas_size: u32,
    map_size: u32,
) {
    let base = request.packed_offset;
    let cascade_count = cameras.len();
    let inv_atlas = 1.0 / atlas_size as f32;

    let world_to_light = cameras[0].view_projection();
    write_mat4(packed, world_to_light_matrix_index(base, 0), world_to_light);

    for (cascade, camera) in cameras.iter().enumerate() {
        if cascade >= 1 {
            // Remap this cascade's clip space into the first cascade's, so
            // the shader can cross-fade cascades without re-transforming.
            let cascade_to_world = camera.view_projection().inverse();
            let corner = world_to_light.transform_point3(cascade_to_world.transform_point3(Vec3::ZERO));
            let other = world_to_light.transform_point3(cascade_to_world.transform_point3(Vec3::ONE));
            let scale = (Vec3::ONE / (other - corner)).extend(1.0);
            let offset = (corner * -scale.truncate()).extend(0.0);
            packed[cascade_scale_index(base, cascade - 1)] = scale.to_array();
            packed[cascade_offset_index(base, cascade - 1)] = offset.to_array();
        }

        let rect = rects[cascade];
        packed[atlas_scale_offset_index(base, cascade)] = if rect.has_area() {
            folded_atlas_scale_offset(rect, inv_atlas)
        } else {
            [1.0, 1.0, 0.0, 0.0]
        };
    }

    let first_camera = cameras[0];
    let last_camera = cameras[cascade_count - 1];
    let cascade_size = first_camera.ortho_width();
    let texel_size = 1.0 / map_size as f32;
    let penumbra_size = (request.penumbra_size / cascade_size).max(texel_size);
    let good_penumbra_size = 8.0 / map_size as f32;
    let relative_shadow_size = map_size as f32 * inv_atlas;

    // Bias tweaks keep the defaults consistent with spot and point lights.
    let slope_bias = request.slope_bias * penumbra_size.max(good_penumbra_size);
    let constant_bias = request.constant_bias * 0.2;
    let last_cascade_index = (cascade_count - 1) as u32;
    packed[shadow_params_index(base)] = [
        slope_bias,
        constant_bias,
        penumbra_size * relative_shadow_size,
        f32::from_bits(last_cascade_index),
    ];

    let dither_multiplier = 0.2 / cascade_size;
    let z_range = cascade_size / first_camera.far;
    let actual_penumbra_size = request.penumbra_size / last_camera.ortho_width();
    let penumbra_size_increment = (good_penumbra_size - actual_penumbra_size).max(0.0) / request.min_range;
    packed[shadow_params2_index(base)] = [
        1.0 - penumbra_size.max(good_penumbra_size),
        dither_multiplier,
        dither_multiplier * z_range,
        penumbra_size_increment * relative_shadow_size,
    ];

    // Fade shadows out towards the shadow-distance horizon, separately in
    // the map plane, in light depth and in view distance.
    let fade_out_range = 1.0 - request.fade_out_start;
    let xy_scale = -1.0 / fade_out_range;
    let xy_offset = -xy_scale;
    let z_fade_out_range = fade_out_range * last_camera.ortho_width() / last_camera.far;
    let z_scale = -1.0 / z_fade_out_range;
    let z_offset = -z_scale;
    let distance_fade_out_range = fade_out_range * request.actual_range;
    let distance_scale = -1.0 / distance_fade_out_range;
    let distance_offset = -distance_scale * request.actual_range;
    packed[fade_out_params_index(base)] = [
        pack_f16_pair(xy_scale, xy_offset),
        pack_f16_pair(z_scale, z_offset),
        distance_scale,
        distance_offset,
    ];
}

pub(crate) fn encode_projected(
    packed: &mut [[f32; 4]],
    request: &ShadowRequest,
    cameras: &[&Camera],
    rects: &[AtlasRect],
    atlas_size: u32,
    map_size: u32,
    max_shadow_map_size: u32,
) {
    let base = request.packed_offset;
    let inv_atlas = 1.0 / atlas_size as f32;

    let mut ndc_to_uv = Mat4::from_scale(Vec3::new(0.5, -0.5, 1.0));
    ndc_to_uv.w_axis = Vec4::new(0.5, 0.5, 0.0, 1.0);

    for (view, camera) in cameras.iter().enumerate() {
        let rect = rects[view];
        let matrix_index = world_to_light_matrix_index(base, view);
        if rect.has_area() {
            let scale = Vec3::new(rect.width as f32 * inv_atlas, rect.height as f32 * inv_atlas, 1.0);
            let mut atlas_remap = Mat4::from_scale(scale);
            atlas_remap.w_axis =
                Vec4::new(rect.x as f32 * inv_atlas, rect.y as f32 * inv_atlas, 0.0, 1.0);
            write_mat4(packed, matrix_index, atlas_remap * ndc_to_uv * camera.view_projection());
        } else {
            write_mat4(packed, matrix_index, Mat4::IDENTITY);
        }
    }

    let fov = cameras[cameras.len() - 1].fov_y();
    let range = cameras[cameras.len() - 1].far;

    // Screen height in world space at 10m distance.
    let screen_height = (fov * 0.5).tan() * 20.0;
    let texel_size = 1.0 / map_size as f32;
    let penumbra_size = (request.penumbra_size / screen_height).max(texel_size);
    let relative_shadow_size = map_size as f32 * inv_atlas;

    // Empirical tweak factors, tuned visually.
    let fov_factor = 0.15 * 5.5_f32.powf(fov);
    let range_factor = (0.018 * range + 0.0098 * range * range).max(0.1);
    let slope_bias = request.slope_bias * penumbra_size * fov_factor * range_factor;
    let constant_bias = request.constant_bias * max_shadow_map_size as f32 / map_size as f32;

    packed[shadow_params_index(base)] =
        [slope_bias, constant_bias, penumbra_size * relative_shadow_size, 0.0];
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use smallvec::SmallVec;

    use crate::lights::LightKind;

    fn request(kind: LightKind, base: u32) -> ShadowRequest {
        ShadowRequest {
            kind,
            scale: 1.0,
            penumbra_size: 0.1,
            slope_bias: 25.0,
            constant_bias: 0.015,
            fade_out_start: 0.8,
            min_range: 50.0,
            actual_range: 60.0,
            views: SmallVec::new(),
            packed_offset: base,
        }
    }

    fn ortho_camera(center: Vec3, width: f32, far: f32) -> Camera {
        let mut camera = Camera::default();
        camera.look_at(center + Vec3::Y * far * 0.5, center, Vec3::Z);
        camera.set_orthographic(width, 0.0, far);
        camera
    }

    #[test]
    fn footprints_match_the_layout() {
        assert_eq!(fade_out_params_index(0) + 1, DIR_SHADOW_DATA_VEC4S as usize);
        assert_eq!(world_to_light_matrix_index(0, 5) + 4, POINT_SHADOW_DATA_VEC4S as usize);
        assert_eq!(world_to_light_matrix_index(0, 0) + 4, SPOT_SHADOW_DATA_VEC4S as usize);
        assert_eq!(atlas_scale_offset_index(0, 0), cascade_offset_index(0, 2) + 1);
    }

    #[test]
    fn f16_pair_packs_both_halves() {
        let packed = pack_f16_pair(-5.0, 5.0);
        let bits = packed.to_bits();
        assert_eq!(f16::from_bits(bits as u16).to_f32(), -5.0);
        assert_eq!(f16::from_bits((bits >> 16) as u16).to_f32(), 5.0);
    }

    #[test]
    fn overflowed_view_gets_identity_matrix() {
        let mut packed = vec![[0.0f32; 4]; SPOT_SHADOW_DATA_VEC4S as usize];
        let request = request(LightKind::Spot, 0);
        let mut camera = Camera::default();
        camera.set_perspective(1.0, 0.1, 20.0);
        encode_projected(&mut packed, &request, &[&camera], &[AtlasRect::default()], 1024, 256, 1024);

        let index = world_to_light_matrix_index(0, 0);
        assert_eq!(packed[index], [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(packed[index + 1], [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(packed[index + 2], [0.0, 0.0, 1.0, 0.0]);
        assert_eq!(packed[index + 3], [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn atlas_scale_offset_folds_the_uv_bias() {
        let mut packed = vec![[0.0f32; 4]; DIR_SHADOW_DATA_VEC4S as usize];
        let request = request(LightKind::Directional, 0);
        let camera = ortho_camera(Vec3::ZERO, 30.0, 60.0);
        let rect = AtlasRect { x: 0, y: 512, width: 512, height: 512 };
        encode_directional(&mut packed, &request, &[&camera], &[rect], 1024, 512);

        let scale_offset = packed[atlas_scale_offset_index(0, 0)];
        assert_eq!(scale_offset, [0.25, -0.25, 0.25, 0.75]);
    }

    #[test]
    fn cascade_remap_translates_clip_spaces() {
        let cascade0 = ortho_camera(Vec3::ZERO, 20.0, 40.0);
        let cascade1 = ortho_camera(Vec3::new(3.0, 0.0, 1.0), 60.0, 90.0);
        let mut packed = vec![[0.0f32; 4]; DIR_SHADOW_DATA_VEC4S as usize];
        let request = request(LightKind::Directional, 0);
        let rect = AtlasRect { x: 0, y: 0, width: 256, height: 256 };
        encode_directional(&mut packed, &request, &[&cascade0, &cascade1], &[rect, rect], 1024, 256);

        let scale = Vec3::from_slice(&packed[cascade_scale_index(0, 0)][..3]);
        let offset = Vec3::from_slice(&packed[cascade_offset_index(0, 0)][..3]);
        let point = Vec3::new(1.5, -2.0, 4.0);
        let in_first = cascade0.view_projection().transform_point3(point);
        let in_second = cascade1.view_projection().transform_point3(point);
        let remapped = in_first * scale + offset;
        assert!(remapped.distance(in_second) < 1e-3);
    }

    #[test]
    fn directional_params_store_the_last_cascade_index() {
        let cascade0 = ortho_camera(Vec3::ZERO, 20.0, 40.0);
        let cascade1 = ortho_camera(Vec3::ZERO, 60.0, 90.0);
        let mut packed = vec![[0.0f32; 4]; DIR_SHADOW_DATA_VEC4S as usize];
        let request = request(LightKind::Directional, 0);
        let rect = AtlasRect { x: 0, y: 0, width: 256, height: 256 };
        encode_directional(&mut packed, &request, &[&cascade0, &cascade1], &[rect, rect], 1024, 256);

        let params = packed[shadow_params_index(0)];
        assert_eq!(params[3].to_bits(), 1);
        assert!(params[0] > 0.0 && params[1] > 0.0);
    }
}
