/// A single acquired frame. Finalize it with `GpuContext::submit` promptly;
/// holding the surface texture blocks the next acquisition.
pub struct GpuFrame {
    pub surface_texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
    pub encoder: wgpu::CommandEncoder,
}
