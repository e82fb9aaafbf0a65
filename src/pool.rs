use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use glam::Vec3;
use smallvec::SmallVec;

use crate::camera::Camera;
use crate::config::ShadowSettings;
use crate::gpu::{BufferHandle, ShadowDevice, TextureHandle};
use crate::lights::{DirectionalLight, LightId, LightKind, PointLight, ShadowCaster, SpotLight};
use crate::view::{ReferenceView, ReferenceViewId, RenderTags, ShadowView, ViewId, ViewPool};

pub mod atlas;
pub mod cameras;
pub mod double_buffer;
pub mod packing;
pub mod scaling;

use atlas::{AtlasPacker, AtlasRect};
use double_buffer::DoubleBuffer;

/// Capacity of the GPU-side packed data buffer, in vec4 units.
pub const MAX_SHADOW_DATA: usize = 1024;

const SHADOW_DATA_BUFFER_BYTES: u64 = (MAX_SHADOW_DATA * 16) as u64;

const MAX_CASCADE_COUNT: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ShadowKey {
    light: LightId,
    /// None for point/spot lights, whose maps are view independent.
    reference_view: Option<ReferenceViewId>,
}

/// One shadow allocation request, unique per (light, reference view) per
/// frame. Duplicate requests merge into the existing entry.
pub(crate) struct ShadowRequest {
    pub kind: LightKind,
    pub scale: f32,
    pub penumbra_size: f32,
    pub slope_bias: f32,
    pub constant_bias: f32,
    pub fade_out_start: f32,
    pub min_range: f32,
    pub actual_range: f32,
    pub views: SmallVec<[ViewId; 6]>,
    pub packed_offset: u32,
}

struct SortedShadowData {
    index: u32,
    priority: f32,
}

#[derive(Default)]
struct FrameRequests {
    requests: Vec<ShadowRequest>,
    table: HashMap<ShadowKey, usize>,
    used_packed: u32,
    sorted: Vec<SortedShadowData>,
    packer: AtlasPacker,
}

struct GpuState {
    settings: ShadowSettings,
    pending: Option<ShadowSettings>,
    min_relative_size: f32,
    atlas_texture: Option<TextureHandle>,
    data_buffer: Option<BufferHandle>,
}

/// Snapshot of the last packed frame, for diagnostics overlays.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShadowPoolStats {
    pub requests: u32,
    pub views_used: u32,
    pub views_pooled: u32,
    pub overflowed_maps: u32,
    pub atlas_utilization: f32,
}

/// Shadow map pool: deduplicates per-light shadow requests during scene
/// extraction, packs them into the shared depth atlas at end of extraction
/// and uploads the packed shadow constants at begin of render.
///
/// `add_*_light` may run concurrently from extraction tasks;
/// `end_extraction` and `begin_render` are single-threaded by contract.
pub struct ShadowPool {
    device: Arc<dyn ShadowDevice>,
    views: Mutex<ViewPool>,
    frame: Mutex<FrameRequests>,
    packed: Mutex<DoubleBuffer<[f32; 4]>>,
    gpu: Mutex<GpuState>,
    stats: Mutex<ShadowPoolStats>,
    exclude_whitelist: Mutex<RenderTags>,
    overflow_warn: AtomicU8,
    truncation_warn: AtomicU8,
}

impl ShadowPool {
    pub fn new(device: Arc<dyn ShadowDevice>, settings: ShadowSettings) -> Self {
        let settings = settings.sanitized();
        Self {
            device,
            views: Mutex::new(ViewPool::default()),
            frame: Mutex::new(FrameRequests::default()),
            packed: Mutex::new(DoubleBuffer::default()),
            gpu: Mutex::new(GpuState {
                settings,
                pending: None,
                min_relative_size: scaling::min_relative_size(&settings),
                atlas_texture: None,
                data_buffer: None,
            }),
            stats: Mutex::new(ShadowPoolStats::default()),
            exclude_whitelist: Mutex::new(RenderTags::empty()),
            overflow_warn: AtomicU8::new(0),
            truncation_warn: AtomicU8::new(0),
        }
    }

    /// The settings currently in effect (sanitized). Staged settings become
    /// visible here after the next `begin_render`.
    pub fn settings(&self) -> ShadowSettings {
        lock(&self.gpu).settings
    }

    /// Stages new settings; applied at the next `begin_render` with a full
    /// teardown of the atlas texture, data buffer and view pool.
    pub fn set_settings(&self, settings: ShadowSettings) {
        lock(&self.gpu).pending = Some(settings);
    }

    /// Reference-view exclude tags are only inherited by shadow views if
    /// whitelisted here.
    pub fn add_exclude_tag_to_whitelist(&self, tags: RenderTags) {
        *lock(&self.exclude_whitelist) |= tags;
    }

    pub fn atlas_texture(&self) -> Option<TextureHandle> {
        lock(&self.gpu).atlas_texture
    }

    pub fn data_buffer(&self) -> Option<BufferHandle> {
        lock(&self.gpu).data_buffer
    }

    pub fn stats(&self) -> ShadowPoolStats {
        *lock(&self.stats)
    }

    /// Marks all pooled views unused and clears the render list. Must run
    /// once per frame before any `add_*_light` call.
    pub fn begin_extraction(&self) {
        lock(&self.views).reset();
    }

    /// Requests cascaded shadow maps for a directional light as seen from
    /// `ref_view`. Returns the light's packed data offset in vec4 units, or
    /// None for orthographic reference views, which never get cascades.
    /// Idempotent within a frame for the same (light, reference view) pair.
    pub fn add_directional_light(
        &self,
        light: &DirectionalLight,
        ref_view: &ReferenceView,
    ) -> Option<u32> {
        debug_assert!(light.cast_shadows, "only shadow casting lights belong in the pool");
        if ref_view.camera.is_orthographic() {
            return None;
        }

        let settings = self.settings();
        let max_reference_size = ref_view.viewport_size.x.max(ref_view.viewport_size.y);
        let scale = max_reference_size / settings.max_shadow_map_size as f32;
        let key = ShadowKey { light: light.id, reference_view: Some(ref_view.id) };
        let (index, offset, created) =
            self.request_slot(key, light, LightKind::Directional, scale, packing::DIR_SHADOW_DATA_VEC4S);
        if !created {
            return Some(offset);
        }

        let cascade_count = light.cascade_count.clamp(1, MAX_CASCADE_COUNT) as usize;
        let ref_camera = &ref_view.camera;
        let mut ranges = [0.0f32; MAX_CASCADE_COUNT as usize];
        cameras::cascade_split_distances(
            ref_camera.near,
            light.min_shadow_range,
            light.split_mode_weight,
            &mut ranges[..cascade_count],
        );

        let tan_half_y = (ref_camera.fov_y() * 0.5).tan();
        let corner = Vec3::new(tan_half_y * ref_view.aspect(), tan_half_y, 1.0);
        let exclude_tags = self.filtered_exclude_tags(ref_view.exclude_tags);

        let mut views: SmallVec<[ViewId; 6]> = SmallVec::new();
        let mut cascade_end = 0.0;
        let mut actual_range = 1.0;
        for cascade in 0..cascade_count {
            // The last cascade covers the whole range so distance-unbounded
            // effects can sample it alone.
            let cascade_start = if cascade + 1 == cascade_count { 0.0 } else { cascade_end };
            cascade_end = ranges[cascade];

            let input = cameras::CascadeFitInput {
                ref_position: ref_camera.position,
                ref_forward: ref_camera.forward,
                frustum_corner: corner,
                cascade_start,
                cascade_end,
                light_forward: light.transform.forward,
                light_up: light.transform.up,
                near_plane_offset: light.near_plane_offset,
                max_shadow_map_size: settings.max_shadow_map_size,
            };
            let id = self.acquire_view(|view| {
                view.name = view_name(&light.name, "DirLight", cameras::CASCADE_SUFFIXES[cascade]);
                view.include_tags = RenderTags::CAST_SHADOW;
                view.exclude_tags = exclude_tags;
                view.render_transparents = light.transparent_shadows;
                view.viewport = AtlasRect::default();
                actual_range = cameras::fit_cascade_camera(&mut view.camera, &input);
            });
            views.push(id);
        }

        let mut frame = lock(&self.frame);
        let request = &mut frame.requests[index];
        request.fade_out_start = light.fade_out_start;
        request.min_range = light.min_shadow_range;
        request.actual_range = actual_range;
        request.views = views;
        Some(offset)
    }

    /// Requests a six-face cube shadow map for a point light. Returns the
    /// packed data offset in vec4 units. Idempotent within a frame.
    pub fn add_point_light(
        &self,
        light: &PointLight,
        screen_space_size: f32,
        ref_view: &ReferenceView,
    ) -> u32 {
        debug_assert!(light.cast_shadows, "only shadow casting lights belong in the pool");
        let scale = screen_space_size * 0.5;
        let key = ShadowKey { light: light.id, reference_view: None };
        let (index, offset, created) =
            self.request_slot(key, light, LightKind::Point, scale, packing::POINT_SHADOW_DATA_VEC4S);
        if !created {
            return offset;
        }

        let settings = self.settings();
        // At least one texel of penumbra keeps hardware PCF stable.
        let penumbra_size = light.penumbra_size.max(0.5 / settings.min_shadow_map_size as f32);
        let fov = cameras::add_safe_border(FRAC_PI_2, penumbra_size);
        let exclude_tags = self.filtered_exclude_tags(ref_view.exclude_tags);

        let mut views: SmallVec<[ViewId; 6]> = SmallVec::new();
        for face in 0..cameras::CUBE_FACE_COUNT {
            let id = self.acquire_view(|view| {
                view.name = view_name(&light.name, "PointLight", cameras::CUBE_FACE_SUFFIXES[face]);
                view.include_tags = RenderTags::CAST_SHADOW;
                view.exclude_tags = exclude_tags;
                view.render_transparents = light.transparent_shadows;
                view.viewport = AtlasRect::default();
                cameras::cube_face_camera(&mut view.camera, light.position, face, fov, light.range);
            });
            views.push(id);
        }

        lock(&self.frame).requests[index].views = views;
        offset
    }

    /// Requests a single shadow map along a spot light's cone. Returns the
    /// packed data offset in vec4 units. Idempotent within a frame.
    pub fn add_spot_light(
        &self,
        light: &SpotLight,
        screen_space_size: f32,
        ref_view: &ReferenceView,
    ) -> u32 {
        debug_assert!(light.cast_shadows, "only shadow casting lights belong in the pool");
        let scale = screen_space_size * 0.5;
        let key = ShadowKey { light: light.id, reference_view: None };
        let (index, offset, created) =
            self.request_slot(key, light, LightKind::Spot, scale, packing::SPOT_SHADOW_DATA_VEC4S);
        if !created {
            return offset;
        }

        let fov = cameras::add_safe_border(light.outer_angle_radians, light.penumbra_size);
        let exclude_tags = self.filtered_exclude_tags(ref_view.exclude_tags);

        let id = self.acquire_view(|view| {
            view.name = view_name(&light.name, "SpotLight", "");
            view.include_tags = RenderTags::CAST_SHADOW;
            view.exclude_tags = exclude_tags;
            view.render_transparents = light.transparent_shadows;
            view.viewport = AtlasRect::default();
            cameras::spot_camera(
                &mut view.camera,
                light.transform.position,
                light.transform.forward,
                light.transform.up,
                fov,
                light.range,
            );
        });

        let mut frame = lock(&self.frame);
        frame.requests[index].views.push(id);
        offset
    }

    /// Sorts the frame's requests by priority, rebuilds the atlas quadtree,
    /// assigns every view its atlas viewport and encodes the packed shadow
    /// constants into the extraction slot of the double buffer. Clears the
    /// request table afterwards; the view list stays valid for the depth
    /// pass.
    pub fn end_extraction(&self, slot: usize) -> Result<()> {
        let mut frame = lock(&self.frame);
        let mut packed_buffers = lock(&self.packed);
        let packed = packed_buffers.slot_mut(slot);
        packed.clear();
        packed.resize(frame.used_packed as usize, [0.0; 4]);
        if frame.requests.is_empty() {
            return Ok(());
        }

        let (settings, min_relative_size) = {
            let gpu = lock(&self.gpu);
            (gpu.settings, gpu.min_relative_size)
        };

        let FrameRequests { requests, table, used_packed, sorted, packer } = &mut *frame;

        sorted.clear();
        for (index, request) in requests.iter().enumerate() {
            sorted.push(SortedShadowData {
                index: index as u32,
                priority: scaling::sort_priority(request.kind, request.scale),
            });
        }
        sorted.sort_unstable_by(|a, b| b.priority.total_cmp(&a.priority).then(a.index.cmp(&b.index)));

        packer.reset(settings.atlas_size);

        let mut views = lock(&self.views);
        let mut stats = ShadowPoolStats {
            requests: requests.len() as u32,
            views_used: views.used() as u32,
            views_pooled: views.len() as u32,
            ..Default::default()
        };
        let mut used_area = 0u64;

        for entry in sorted.iter() {
            let request = &requests[entry.index as usize];
            let map_size =
                scaling::shadow_map_size(request.kind, request.scale, &settings, min_relative_size);

            let mut rects: SmallVec<[AtlasRect; 6]> = SmallVec::new();
            for &view_id in &request.views {
                let rect = packer.insert(map_size, entry.index);
                if rect.has_area() {
                    used_area += rect.area();
                } else {
                    stats.overflowed_maps += 1;
                    self.warn_atlas_full(map_size);
                }
                let view = views
                    .get_mut(view_id)
                    .context("shadow view pool out of sync with the request table")?;
                view.viewport = rect;
                rects.push(rect);
            }

            let mut view_cameras: SmallVec<[&Camera; 6]> = SmallVec::new();
            for &view_id in &request.views {
                let view =
                    views.get(view_id).context("shadow view pool out of sync with the request table")?;
                view_cameras.push(&view.camera);
            }

            match request.kind {
                LightKind::Directional => packing::encode_directional(
                    packed,
                    request,
                    &view_cameras,
                    &rects,
                    settings.atlas_size,
                    map_size,
                ),
                LightKind::Point | LightKind::Spot => packing::encode_projected(
                    packed,
                    request,
                    &view_cameras,
                    &rects,
                    settings.atlas_size,
                    map_size,
                    settings.max_shadow_map_size,
                ),
            }
        }

        let atlas_area = settings.atlas_size as u64 * settings.atlas_size as u64;
        stats.atlas_utilization = used_area as f32 / atlas_area as f32;
        *lock(&self.stats) = stats;

        requests.clear();
        table.clear();
        *used_packed = 0;
        Ok(())
    }

    /// Applies staged settings (tearing down and recreating the atlas
    /// texture, data buffer and view pool), then uploads the packed shadow
    /// data for `slot`. A no-op before the first view was ever created or
    /// when the slot is empty.
    pub fn begin_render(&self, slot: usize) -> Result<()> {
        let mut gpu = lock(&self.gpu);
        if gpu.atlas_texture.is_none() || gpu.data_buffer.is_none() {
            return Ok(());
        }

        if let Some(pending) = gpu.pending.take() {
            let pending = pending.sanitized();
            if pending != gpu.settings {
                if let Some(texture) = gpu.atlas_texture.take() {
                    self.device.destroy_texture(texture);
                }
                if let Some(buffer) = gpu.data_buffer.take() {
                    self.device.destroy_buffer(buffer);
                }
                lock(&self.views).clear_all();
                gpu.settings = pending;
                gpu.min_relative_size = scaling::min_relative_size(&pending);
                gpu.atlas_texture = Some(self.device.create_depth_texture(
                    pending.atlas_size,
                    pending.atlas_size,
                    "Shadow Atlas",
                ));
                gpu.data_buffer = Some(
                    self.device.create_structured_buffer(SHADOW_DATA_BUFFER_BYTES, "Shadow Data Buffer"),
                );
            }
        }

        let buffer = gpu.data_buffer.context("shadow data buffer missing")?;
        let packed_buffers = lock(&self.packed);
        let packed = packed_buffers.slot(slot);
        if packed.is_empty() {
            return Ok(());
        }
        let upload = if packed.len() > MAX_SHADOW_DATA {
            if self.truncation_warn.fetch_add(1, Ordering::Relaxed) == 0 {
                log::warn!(
                    "packed shadow data exceeds the {MAX_SHADOW_DATA} vec4 buffer capacity; truncating"
                );
            }
            &packed[..MAX_SHADOW_DATA]
        } else {
            packed.as_slice()
        };
        self.device.write_buffer(buffer, 0, bytemuck::cast_slice(upload));
        Ok(())
    }

    /// Views acquired this frame, in acquisition order. The external depth
    /// pass renders each into its atlas viewport.
    pub fn active_views(&self) -> Vec<ViewId> {
        lock(&self.views).queue.clone()
    }

    pub fn visit_views<F: FnMut(&ShadowView)>(&self, mut visit: F) {
        let views = lock(&self.views);
        for &id in &views.queue {
            if let Some(view) = views.get(id) {
                visit(view);
            }
        }
    }

    fn request_slot(
        &self,
        key: ShadowKey,
        caster: &dyn ShadowCaster,
        kind: LightKind,
        scale: f32,
        footprint_vec4s: u32,
    ) -> (usize, u32, bool) {
        let mut frame = lock(&self.frame);
        if let Some(&index) = frame.table.get(&key) {
            let request = &mut frame.requests[index];
            request.scale = request.scale.max(scale);
            return (index, request.packed_offset, false);
        }

        let packed_offset = frame.used_packed;
        frame.used_packed += footprint_vec4s;
        let index = frame.requests.len();
        frame.requests.push(ShadowRequest {
            kind,
            scale,
            penumbra_size: caster.penumbra_size(),
            // User-facing bias values live in friendlier ranges than the
            // shader wants.
            slope_bias: caster.slope_bias() * 100.0,
            constant_bias: caster.constant_bias() / 100.0,
            fade_out_start: 1.0,
            min_range: 1.0,
            actual_range: 1.0,
            views: SmallVec::new(),
            packed_offset,
        });
        frame.table.insert(key, index);
        (index, packed_offset, true)
    }

    fn acquire_view(&self, setup: impl FnOnce(&mut ShadowView)) -> ViewId {
        let mut views = lock(&self.views);
        if views.all_used() {
            // Resource creation goes through the device, which may call back
            // into view enumeration; never hold the pool lock across it.
            drop(views);
            let target = self.ensure_gpu_resources();
            views = lock(&self.views);
            if views.all_used() {
                views.push(ShadowView::new(target));
            }
        }
        let (id, view) = views.acquire();
        setup(view);
        id
    }

    fn ensure_gpu_resources(&self) -> TextureHandle {
        let mut gpu = lock(&self.gpu);
        if gpu.data_buffer.is_none() {
            gpu.data_buffer =
                Some(self.device.create_structured_buffer(SHADOW_DATA_BUFFER_BYTES, "Shadow Data Buffer"));
        }
        if let Some(texture) = gpu.atlas_texture {
            return texture;
        }
        let settings = gpu.settings;
        let texture =
            self.device.create_depth_texture(settings.atlas_size, settings.atlas_size, "Shadow Atlas");
        gpu.atlas_texture = Some(texture);
        gpu.min_relative_size = scaling::min_relative_size(&settings);
        texture
    }

    fn filtered_exclude_tags(&self, reference_tags: RenderTags) -> RenderTags {
        RenderTags::EDITOR_HIDDEN | (reference_tags & *lock(&self.exclude_whitelist))
    }

    fn warn_atlas_full(&self, size: u32) {
        // Wrapping counter: one warning per 256 overflows keeps the log usable.
        if self.overflow_warn.fetch_add(1, Ordering::Relaxed) == 0 {
            log::warn!(
                "shadow atlas is full; no space for a {size}x{size} map, the light will cast no shadow"
            );
        }
    }
}

impl Drop for ShadowPool {
    fn drop(&mut self) {
        let gpu = self.gpu.get_mut().unwrap_or_else(|err| err.into_inner());
        if let Some(texture) = gpu.atlas_texture.take() {
            self.device.destroy_texture(texture);
        }
        if let Some(buffer) = gpu.data_buffer.take() {
            self.device.destroy_buffer(buffer);
        }
    }
}

fn view_name(light_name: &str, fallback: &str, suffix: &str) -> String {
    if light_name.is_empty() {
        format!("{fallback}{suffix}")
    } else {
        format!("{light_name}{suffix}")
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}
