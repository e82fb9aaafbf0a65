pub mod camera;
pub mod config;
pub mod gpu;
pub mod lights;
pub mod pool;
pub mod view;

pub use camera::{Camera, Projection};
pub use config::ShadowSettings;
pub use gpu::{BufferHandle, ShadowDevice, TextureHandle};
pub use lights::{
    DirectionalLight, LightId, LightKind, LightTransform, PointLight, ShadowCaster, SpotLight,
};
pub use pool::atlas::AtlasRect;
pub use pool::{ShadowPool, ShadowPoolStats, MAX_SHADOW_DATA};
pub use view::{ReferenceView, ReferenceViewId, RenderTags, ShadowView, ViewId};
