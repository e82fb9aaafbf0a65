use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{BufferHandle, ShadowDevice, TextureHandle};

pub const SHADOW_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth16Unorm;

#[derive(Default)]
struct Resources {
    next_id: u64,
    textures: HashMap<u64, wgpu::Texture>,
    buffers: HashMap<u64, wgpu::Buffer>,
}

impl Resources {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// [`ShadowDevice`] backed by a wgpu device/queue pair.
pub struct WgpuShadowDevice {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    resources: Mutex<Resources>,
}

impl WgpuShadowDevice {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self { device, queue, resources: Mutex::new(Resources::default()) }
    }

    /// Resolves an atlas handle to the underlying texture, e.g. to build the
    /// depth attachment and sampling bind group of the shadow passes.
    pub fn texture(&self, handle: TextureHandle) -> Option<wgpu::Texture> {
        self.lock().textures.get(&handle.0).cloned()
    }

    pub fn buffer(&self, handle: BufferHandle) -> Option<wgpu::Buffer> {
        self.lock().buffers.get(&handle.0).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Resources> {
        self.resources.lock().unwrap_or_else(|err| err.into_inner())
    }
}

impl ShadowDevice for WgpuShadowDevice {
    fn create_depth_texture(&self, width: u32, height: u32, label: &str) -> TextureHandle {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let mut resources = self.lock();
        let id = resources.allocate_id();
        resources.textures.insert(id, texture);
        TextureHandle(id)
    }

    fn create_structured_buffer(&self, size_bytes: u64, label: &str) -> BufferHandle {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut resources = self.lock();
        let id = resources.allocate_id();
        resources.buffers.insert(id, buffer);
        BufferHandle(id)
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        if let Some(texture) = self.lock().textures.remove(&texture.0) {
            texture.destroy();
        }
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        if let Some(buffer) = self.lock().buffers.remove(&buffer.0) {
            buffer.destroy();
        }
    }

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some(buffer) = self.lock().buffers.get(&buffer.0) {
            self.queue.write_buffer(buffer, offset, data);
        }
    }
}
