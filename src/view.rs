use glam::Vec2;

use crate::camera::Camera;
use crate::gpu::TextureHandle;
use crate::pool::atlas::AtlasRect;

bitflags::bitflags! {
    /// Object filter tags carried by render views. Integrators may add their
    /// own bits with `from_bits_retain`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RenderTags: u32 {
        const CAST_SHADOW = 1 << 0;
        const EDITOR_HIDDEN = 1 << 1;
    }
}

/// Stable identity of a reference (main/editor) view, supplied by the
/// integrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceViewId(pub u64);

/// Handle to a pooled shadow view. The epoch invalidates all outstanding
/// handles when the pool is torn down on a settings change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId {
    pub(crate) index: u32,
    pub(crate) epoch: u32,
}

/// A pooled depth render view: camera, atlas viewport and object filters.
/// The external depth pass renders every active view into `target` at
/// `viewport`.
#[derive(Debug, Clone)]
pub struct ShadowView {
    pub name: String,
    pub camera: Camera,
    pub viewport: AtlasRect,
    pub include_tags: RenderTags,
    pub exclude_tags: RenderTags,
    pub render_transparents: bool,
    pub target: TextureHandle,
}

impl ShadowView {
    pub(crate) fn new(target: TextureHandle) -> Self {
        Self {
            name: String::new(),
            camera: Camera::default(),
            viewport: AtlasRect::default(),
            include_tags: RenderTags::CAST_SHADOW,
            exclude_tags: RenderTags::EDITOR_HIDDEN,
            render_transparents: false,
            target,
        }
    }
}

/// The view a light was extracted for; provides the culling camera for
/// cascade fitting and the tag filter to inherit.
#[derive(Debug, Clone)]
pub struct ReferenceView {
    pub id: ReferenceViewId,
    pub viewport_size: Vec2,
    pub camera: Camera,
    pub exclude_tags: RenderTags,
}

impl ReferenceView {
    pub fn aspect(&self) -> f32 {
        if self.viewport_size.y > 0.0 {
            self.viewport_size.x / self.viewport_size.y
        } else {
            1.0
        }
    }
}

/// Grow-only pool of shadow views. Views are recycled by index each frame;
/// nothing is destroyed until a settings change clears the whole pool.
#[derive(Default)]
pub(crate) struct ViewPool {
    views: Vec<ShadowView>,
    used: usize,
    epoch: u32,
    pub(crate) queue: Vec<ViewId>,
}

impl ViewPool {
    pub fn reset(&mut self) {
        self.used = 0;
        self.queue.clear();
    }

    pub fn all_used(&self) -> bool {
        self.used == self.views.len()
    }

    pub fn push(&mut self, view: ShadowView) {
        self.views.push(view);
    }

    pub fn acquire(&mut self) -> (ViewId, &mut ShadowView) {
        debug_assert!(self.used < self.views.len());
        let id = ViewId { index: self.used as u32, epoch: self.epoch };
        let view = &mut self.views[self.used];
        self.used += 1;
        self.queue.push(id);
        (id, view)
    }

    pub fn get(&self, id: ViewId) -> Option<&ShadowView> {
        if id.epoch != self.epoch {
            return None;
        }
        self.views.get(id.index as usize)
    }

    pub fn get_mut(&mut self, id: ViewId) -> Option<&mut ShadowView> {
        if id.epoch != self.epoch {
            return None;
        }
        self.views.get_mut(id.index as usize)
    }

    pub fn clear_all(&mut self) {
        self.views.clear();
        self.used = 0;
        self.queue.clear();
        self.epoch = self.epoch.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }
}
