//! wgpu-backed surfaces for the context budget.
//!
//! [`WindowSurface`] wraps a winit window; acquiring it builds a
//! [`GpuContext`] (instance, surface, adapter, device, queue), releasing it
//! destroys the device.

mod context;
mod error;
mod frame;
mod init;
mod select;
mod surface;

pub use context::GpuContext;
pub use error::SurfaceErrorAction;
pub use frame::GpuFrame;
pub use init::GpuInit;
pub use surface::WindowSurface;
