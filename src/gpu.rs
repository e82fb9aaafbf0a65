pub mod wgpu_backend;

/// Opaque handle to a device texture owned by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Opaque handle to a device buffer owned by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// The slice of the GPU device the shadow pool needs: a depth atlas target,
/// a structured buffer for packed shadow constants, and buffer uploads.
pub trait ShadowDevice: Send + Sync {
    fn create_depth_texture(&self, width: u32, height: u32, label: &str) -> TextureHandle;
    fn create_structured_buffer(&self, size_bytes: u64, label: &str) -> BufferHandle;
    fn destroy_texture(&self, texture: TextureHandle);
    fn destroy_buffer(&self, buffer: BufferHandle);
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]);
}
