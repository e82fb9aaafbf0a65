use glam::Vec3;

/// Stable identity of a light across a frame. Supplied by the integrator
/// (e.g. an entity id or generational handle), never dereferenced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

/// World placement of a light.
#[derive(Debug, Clone, Copy)]
pub struct LightTransform {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

impl Default for LightTransform {
    fn default() -> Self {
        Self { position: Vec3::ZERO, forward: Vec3::NEG_Z, up: Vec3::Y }
    }
}

/// Shadow-relevant parameters every light kind exposes.
pub trait ShadowCaster {
    fn id(&self) -> LightId;
    fn casts_shadows(&self) -> bool;
    fn penumbra_size(&self) -> f32;
    fn slope_bias(&self) -> f32;
    fn constant_bias(&self) -> f32;
    fn transparent_shadows(&self) -> bool;
    fn display_name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct DirectionalLight {
    pub id: LightId,
    pub transform: LightTransform,
    pub cast_shadows: bool,
    pub penumbra_size: f32,
    pub slope_bias: f32,
    pub constant_bias: f32,
    pub cascade_count: u32,
    pub split_mode_weight: f32,
    pub fade_out_start: f32,
    pub min_shadow_range: f32,
    pub near_plane_offset: f32,
    pub transparent_shadows: bool,
    pub name: String,
}

impl DirectionalLight {
    pub fn new(id: LightId) -> Self {
        Self {
            id,
            transform: LightTransform::default(),
            cast_shadows: true,
            penumbra_size: 0.1,
            slope_bias: 0.25,
            constant_bias: 1.5,
            cascade_count: 4,
            split_mode_weight: 0.7,
            fade_out_start: 0.8,
            min_shadow_range: 50.0,
            near_plane_offset: 100.0,
            transparent_shadows: false,
            name: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PointLight {
    pub id: LightId,
    pub position: Vec3,
    pub range: f32,
    pub cast_shadows: bool,
    pub penumbra_size: f32,
    pub slope_bias: f32,
    pub constant_bias: f32,
    pub transparent_shadows: bool,
    pub name: String,
}

impl PointLight {
    pub fn new(id: LightId) -> Self {
        Self {
            id,
            position: Vec3::ZERO,
            range: 10.0,
            cast_shadows: true,
            penumbra_size: 0.1,
            slope_bias: 0.25,
            constant_bias: 1.5,
            transparent_shadows: false,
            name: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpotLight {
    pub id: LightId,
    pub transform: LightTransform,
    pub outer_angle_radians: f32,
    pub range: f32,
    pub cast_shadows: bool,
    pub penumbra_size: f32,
    pub slope_bias: f32,
    pub constant_bias: f32,
    pub transparent_shadows: bool,
    pub name: String,
}

impl SpotLight {
    pub fn new(id: LightId) -> Self {
        Self {
            id,
            transform: LightTransform::default(),
            outer_angle_radians: 30.0_f32.to_radians(),
            range: 10.0,
            cast_shadows: true,
            penumbra_size: 0.1,
            slope_bias: 0.25,
            constant_bias: 1.5,
            transparent_shadows: false,
            name: String::new(),
        }
    }
}

macro_rules! impl_shadow_caster {
    ($ty:ty) => {
        impl ShadowCaster for $ty {
            fn id(&self) -> LightId {
                self.id
            }

            fn casts_shadows(&self) -> bool {
                self.cast_shadows
            }

            fn penumbra_size(&self) -> f32 {
                self.penumbra_size
            }

            fn slope_bias(&self) -> f32 {
                self.slope_bias
            }

            fn constant_bias(&self) -> f32 {
                self.constant_bias
            }

            fn transparent_shadows(&self) -> bool {
                self.transparent_shadows
            }

            fn display_name(&self) -> &str {
                &self.name
            }
        }
    };
}

impl_shadow_caster!(DirectionalLight);
impl_shadow_caster!(PointLight);
impl_shadow_caster!(SpotLight);
