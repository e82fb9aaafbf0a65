use glam::Vec3;

use crate::camera::Camera;

/// Near plane shared by all projected (point/spot) shadow cameras.
// TODO: expose this in ShadowSettings once a content setup actually needs it.
pub const PROJECTED_NEAR_PLANE: f32 = 0.1;

pub const CUBE_FACE_COUNT: usize = 6;

pub const CUBE_FACE_DIRS: [Vec3; CUBE_FACE_COUNT] = [
    Vec3::X,
    Vec3::NEG_X,
    Vec3::Y,
    Vec3::NEG_Y,
    Vec3::Z,
    Vec3::NEG_Z,
];

pub const CUBE_FACE_SUFFIXES: [&str; CUBE_FACE_COUNT] = ["+X", "-X", "+Y", "-Y", "+Z", "-Z"];

pub const CASCADE_SUFFIXES: [&str; 4] = ["-C0", "-C1", "-C2", "-C3"];

/// Widens a field of view so the penumbra of filtered shadow samples never
/// reads outside the map.
pub fn add_safe_border(fov_radians: f32, penumbra_size: f32) -> f32 {
    let half_height = (fov_radians * 0.5).tan();
    2.0 * (half_height + penumbra_size).atan()
}

/// Splits the shadow range into cascade band ends, blending linear and
/// logarithmic spacing with `split_mode_weight` (0 = linear, 1 = log).
pub fn cascade_split_distances(near: f32, shadow_range: f32, split_mode_weight: f32, out: &mut [f32]) {
    let count = out.len();
    for (i, value) in out.iter_mut().enumerate() {
        let f = (i + 1) as f32 / count as f32;
        let log_distance = near * (shadow_range / near).powf(f);
        let linear_distance = near + (shadow_range - near) * f;
        *value = linear_distance + (log_distance - linear_distance) * split_mode_weight;
    }
}

pub struct CascadeFitInput {
    pub ref_position: Vec3,
    pub ref_forward: Vec3,
    /// Frustum corner direction at unit distance: (tan(fovx/2), tan(fovy/2), 1).
    pub frustum_corner: Vec3,
    pub cascade_start: f32,
    pub cascade_end: f32,
    pub light_forward: Vec3,
    pub light_up: Vec3,
    pub near_plane_offset: f32,
    pub max_shadow_map_size: u32,
}

/// Fits an orthographic shadow camera around one cascade's frustum slice and
/// snaps it to the light-space texel grid so the map does not shimmer as the
/// reference camera moves. Returns the slice's far corner distance.
pub fn fit_cascade_camera(camera: &mut Camera, input: &CascadeFitInput) -> f32 {
    let start_corner = input.frustum_corner * input.cascade_start;
    let mut end_corner = input.frustum_corner * input.cascade_end;
    let actual_range = end_corner.length();

    // Enclosing sphere for the slice: the center sits on the view's center
    // ray, equally far from the near and far corner rings. With
    // d1^2 = sc.x^2 + sc.y^2 + (x - sc.z)^2 and the far-ring equivalent,
    // d1 == d2 solves to:
    let x = (end_corner.dot(end_corner) - start_corner.dot(start_corner))
        / (2.0 * (end_corner.z - start_corner.z));
    let x = x.min(input.cascade_end);

    let mut center = input.ref_position + input.ref_forward * x;
    // Badly scaled imported scenes can push the center far enough out that
    // adding the forward vector no longer changes it.
    center = center.clamp(Vec3::splat(-1_000_000.0), Vec3::splat(1_000_000.0));

    end_corner.z -= x;
    let radius = end_corner.length();

    let camera_to_center = radius + input.near_plane_offset;
    let shadow_camera_pos = center - input.light_forward * camera_to_center;
    let far_plane = radius + camera_to_center;

    camera.look_at(shadow_camera_pos, center, input.light_up);
    camera.set_orthographic(radius * 2.0, 0.0, far_plane);

    // Snap the world origin to the texel grid in light space.
    let world_to_light = camera.view_matrix();
    let texel_in_world = (2.0 * radius) / input.max_shadow_map_size as f32;
    let offset = world_to_light.transform_point3(Vec3::ZERO);
    let snap_x = offset.x - (offset.x / texel_in_world).floor() * texel_in_world;
    let snap_y = offset.y - (offset.y / texel_in_world).floor() * texel_in_world;
    camera.translate_local(snap_x, snap_y);

    actual_range
}

/// Perspective camera for one face of a point light's cube, world up Y.
pub fn cube_face_camera(camera: &mut Camera, position: Vec3, face: usize, fov_radians: f32, far: f32) {
    let forward = CUBE_FACE_DIRS[face];
    camera.look_at(position, position + forward, Vec3::Y);
    camera.set_perspective(fov_radians, PROJECTED_NEAR_PLANE, far);
}

/// Perspective camera along a spot light's cone axis.
pub fn spot_camera(
    camera: &mut Camera,
    position: Vec3,
    forward: Vec3,
    up: Vec3,
    fov_radians: f32,
    far: f32,
) {
    camera.look_at(position, position + forward, up);
    camera.set_perspective(fov_radians, PROJECTED_NEAR_PLANE, far);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn safe_border_widens_the_fov() {
        let fov = FRAC_PI_2;
        assert!(add_safe_border(fov, 0.1) > fov);
        assert!((add_safe_border(fov, 0.0) - fov).abs() < 1e-5);
    }

    #[test]
    fn split_distances_end_at_the_shadow_range() {
        let mut linear = [0.0; 4];
        cascade_split_distances(0.1, 50.0, 0.0, &mut linear);
        let mut log = [0.0; 4];
        cascade_split_distances(0.1, 50.0, 1.0, &mut log);

        assert!((linear[3] - 50.0).abs() < 1e-3);
        assert!((log[3] - 50.0).abs() < 1e-3);
        for i in 1..4 {
            assert!(linear[i] > linear[i - 1]);
            assert!(log[i] > log[i - 1]);
        }
        // Logarithmic spacing keeps early cascades tighter.
        assert!(log[0] < linear[0]);
    }

    fn fit_input(start: f32, end: f32) -> CascadeFitInput {
        CascadeFitInput {
            ref_position: Vec3::new(0.3, 2.7, 0.0),
            ref_forward: Vec3::NEG_Z,
            frustum_corner: Vec3::new(0.8, 0.6, 1.0),
            cascade_start: start,
            cascade_end: end,
            light_forward: Vec3::new(0.0, -1.0, 0.0),
            light_up: Vec3::Z,
            near_plane_offset: 10.0,
            max_shadow_map_size: 512,
        }
    }

    #[test]
    fn cascade_sphere_encloses_the_slice_corners() {
        let mut camera = Camera::default();
        let input = fit_input(5.0, 20.0);
        fit_cascade_camera(&mut camera, &input);

        let radius = camera.ortho_width() * 0.5;
        let world_corner = |distance: f32, sx: f32, sy: f32| {
            let corner = input.frustum_corner * distance;
            // Reference camera looks down -Z from its position; x right, y up.
            input.ref_position + Vec3::new(corner.x * sx, corner.y * sy, -corner.z)
        };
        // The camera sits radius + offset behind a center that covers both
        // corner rings.
        let center = camera.position + camera.forward * (radius + input.near_plane_offset);
        for &(d, sx, sy) in &[
            (5.0, 1.0, 1.0),
            (5.0, -1.0, 1.0),
            (20.0, 1.0, -1.0),
            (20.0, -1.0, -1.0),
        ] {
            let corner = world_corner(d, sx, sy);
            assert!(center.distance(corner) <= radius + 1e-2);
        }
    }

    #[test]
    fn cascade_camera_snaps_to_texel_grid() {
        let mut camera = Camera::default();
        let input = fit_input(0.0, 30.0);
        fit_cascade_camera(&mut camera, &input);

        let radius = camera.ortho_width() * 0.5;
        let texel = (2.0 * radius) / input.max_shadow_map_size as f32;
        let origin = camera.view_matrix().transform_point3(Vec3::ZERO);
        let rem_x = (origin.x / texel).fract().abs();
        let rem_y = (origin.y / texel).fract().abs();
        assert!(rem_x < 1e-3 || rem_x > 1.0 - 1e-3);
        assert!(rem_y < 1e-3 || rem_y > 1.0 - 1e-3);
    }

    #[test]
    fn cube_faces_cover_all_axes() {
        let mut forwards = Vec::new();
        for face in 0..CUBE_FACE_COUNT {
            let mut camera = Camera::default();
            cube_face_camera(&mut camera, Vec3::ONE, face, FRAC_PI_2, 25.0);
            assert_eq!(camera.position, Vec3::ONE);
            assert_eq!(camera.far, 25.0);
            forwards.push(camera.forward);
        }
        for (i, a) in forwards.iter().enumerate() {
            for b in &forwards[i + 1..] {
                assert!(a.distance(*b) > 1e-3);
            }
        }
    }
}
