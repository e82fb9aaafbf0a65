use glam::{Mat4, Vec3};

/// Projection mode of a shadow camera. Shadow maps are always square, so a
/// single fov / width value is enough for either mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective { fov_y_radians: f32 },
    Orthographic { width: f32 },
}

/// Camera used both for shadow views and as the culling camera of a
/// reference view.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub projection: Projection,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            projection: Projection::Perspective { fov_y_radians: 90.0_f32.to_radians() },
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    pub fn look_at(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.position = position;
        self.forward = (target - position).normalize_or_zero();
        if self.forward.length_squared() < 1e-6 {
            self.forward = Vec3::NEG_Z;
        }
        let mut up = up;
        if self.forward.dot(up).abs() > 0.999 {
            up = if self.forward.x.abs() > 0.9 { Vec3::Y } else { Vec3::X };
        }
        let right = self.forward.cross(up).normalize();
        self.up = right.cross(self.forward);
    }

    pub fn set_perspective(&mut self, fov_y_radians: f32, near: f32, far: f32) {
        self.projection = Projection::Perspective { fov_y_radians };
        self.near = near;
        self.far = far;
    }

    pub fn set_orthographic(&mut self, width: f32, near: f32, far: f32) {
        self.projection = Projection::Orthographic { width };
        self.near = near;
        self.far = far;
    }

    pub fn is_orthographic(&self) -> bool {
        matches!(self.projection, Projection::Orthographic { .. })
    }

    /// Vertical field of view for perspective cameras, zero otherwise.
    pub fn fov_y(&self) -> f32 {
        match self.projection {
            Projection::Perspective { fov_y_radians } => fov_y_radians,
            Projection::Orthographic { .. } => 0.0,
        }
    }

    /// Orthographic frustum width, zero for perspective cameras.
    pub fn ortho_width(&self) -> f32 {
        match self.projection {
            Projection::Perspective { .. } => 0.0,
            Projection::Orthographic { width } => width,
        }
    }

    pub fn right(&self) -> Vec3 {
        self.forward.cross(self.up)
    }

    /// Shifts the camera along its local right/up axes. Used to snap shadow
    /// cameras to a light-space texel grid.
    pub fn translate_local(&mut self, right: f32, up: f32) {
        self.position += self.right() * right + self.up * up;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward, self.up)
    }

    /// Square-aspect projection with depth mapped to [0, 1].
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov_y_radians } => {
                Mat4::perspective_rh(fov_y_radians, 1.0, self.near, self.far)
            }
            Projection::Orthographic { width } => {
                let half = width * 0.5;
                Mat4::orthographic_rh(-half, half, -half, half, self.near, self.far)
            }
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}
