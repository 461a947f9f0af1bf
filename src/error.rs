//! Error types for murmur.
//!
//! The engine corrects degenerate input silently during steady-state
//! operation. The types here cover the two places that can genuinely fail:
//! building a simulator from an invalid configuration, and acquiring the
//! optional GPU execution path.

use thiserror::Error;

/// Invalid values supplied when constructing a simulator or spatial grid.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Grid cells must have a positive, finite edge length.
    #[error("cell size must be positive and finite (got {0})")]
    InvalidCellSize(f32),
    /// The agent store needs room for at least one agent.
    #[error("agent capacity must be at least 1")]
    ZeroCapacity,
    /// World dimensions must be positive and finite.
    #[error("world size must be positive and finite (got {width} x {height})")]
    InvalidWorldSize {
        /// Requested width.
        width: f32,
        /// Requested height.
        height: f32,
    },
}

/// Errors that can occur while acquiring or driving the GPU kernel.
///
/// These are capability-check results: callers fall back to a CPU
/// execution path instead of propagating them.
#[derive(Debug, Error)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found; ensure the system exposes Vulkan/Metal/DX12/WebGPU")]
    NoAdapter,
    /// Failed to create GPU device.
    #[error("failed to create GPU device: {0}")]
    DeviceCreation(#[from] wgpu::RequestDeviceError),
    /// Failed to map buffer for reading.
    #[error("failed to map GPU buffer: {0}")]
    BufferMapping(String),
}
