//! Compute-shader backend. Mirrors the host propagation math on the device.

mod buffers;
mod context;
mod engine;
pub mod mirror;

pub use buffers::{GpuBuffers, MappedRead, StagingBuffer};
pub use context::GpuContext;
pub use engine::GpuEngine;
