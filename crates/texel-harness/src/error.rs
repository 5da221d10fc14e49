//! Error types for the dispatch-and-verify harness
//!
//! Failures fall into three families. Configuration errors are programming
//! defects in how resources, layouts and pipelines were put together; they are
//! reported as soon as they are detected and are never retried. Device errors
//! come from the adapter, the queue or synchronization. Kernel errors come from
//! parsing and reflecting the compute kernel source.

use crate::format::TexelFormat;
use crate::layout::ResourceKind;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by every fallible harness operation
#[derive(Debug, Error)]
pub enum Error {
    /// A layout, pipeline, resource set, dispatch or upload was misconfigured
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// The device failed, timed out or reported a validation error
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
    /// The kernel source could not be parsed or lacks the requested entry point
    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),
}

/// Programming defects in the orchestration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Width, height or layer count is zero
    #[error("image '{name}' has a zero dimension ({width}x{height}x{layers})")]
    ZeroExtent { name: String, width: u32, height: u32, layers: u32 },

    /// Extent is larger than the device allows or a staging row would overflow
    #[error("image '{name}' ({width}x{height}x{layers}) exceeds the device limits ({max_dimension} texels per side, {max_layers} layers)")]
    ExtentTooLarge {
        name: String,
        width: u32,
        height: u32,
        layers: u32,
        max_dimension: u32,
        max_layers: u32,
    },

    /// Usage flags do not form a valid class for the requested resource
    #[error("image '{name}' has invalid usage: {reason}")]
    InvalidUsage { name: String, reason: &'static str },

    /// Host data length differs from one layer's tightly packed size
    #[error("upload to '{name}' expected {expected} bytes, got {actual}")]
    UploadSizeMismatch { name: String, expected: usize, actual: usize },

    /// Array layer index past the image's layer count
    #[error("layer {layer} is out of range for '{name}' ({layers} layers)")]
    LayerOutOfRange { name: String, layer: u32, layers: u32 },

    /// Layout description has no elements
    #[error("resource layout must declare at least one element")]
    EmptyLayout,

    /// Layout element omits the compute stage from its visibility
    #[error("layout element '{name}' is not visible to the compute stage")]
    NotComputeVisible { name: String },

    /// Adapter cannot bind the format as a read-write storage texture
    #[error("format {format:?} does not support read-write storage on this adapter")]
    UnsupportedStorageFormat { format: TexelFormat },

    /// Pipeline workgroup size differs from the kernel's declaration
    #[error("workgroup size {requested:?} does not match kernel declaration {declared:?}")]
    WorkgroupSizeMismatch { declared: [u32; 3], requested: [u32; 3] },

    /// Kernel's declared bindings do not match the layout slot for slot
    #[error("kernel binding mismatch at slot {slot}: {reason}")]
    KernelBindingMismatch { slot: usize, reason: String },

    /// Resource set has a different number of views than the layout has slots
    #[error("resource set provides {actual} views, layout declares {expected}")]
    ResourceCountMismatch { expected: usize, actual: usize },

    /// View's usage does not allow the slot's access kind
    #[error("view of '{image}' cannot be bound to slot {slot} ('{element}') as {kind:?}")]
    ResourceKindMismatch { slot: usize, element: String, image: String, kind: ResourceKind },

    /// View's format differs from the slot's format
    #[error("view of '{image}' has format {actual:?}, slot {slot} expects {expected:?}")]
    ResourceFormatMismatch { slot: usize, image: String, expected: TexelFormat, actual: TexelFormat },

    /// Bound pipeline and resource set come from different layouts
    #[error("resource set was created for a different layout than the bound pipeline")]
    ResourceSetLayoutMismatch,

    /// Dispatch recorded before a pipeline or resource set was set
    #[error("dispatch recorded without a bound {missing}")]
    NothingBound { missing: &'static str },

    /// Dispatch with a zero workgroup count on some axis
    #[error("workgroup counts must be positive, got {groups:?}")]
    ZeroWorkgroupCount { groups: [u32; 3] },

    /// Dispatch exceeds `max_compute_workgroups_per_dimension`
    #[error("workgroup count {count} exceeds the device limit {limit}")]
    WorkgroupCountOverLimit { count: u32, limit: u32 },

    /// Staging extent or format differs from the copy source
    #[error("staging resource does not mirror '{image}': {reason}")]
    StagingMismatch { image: String, reason: String },

    /// Host texel type does not match the staging format
    #[error("texel type of format {requested:?} cannot map a {actual:?} staging resource")]
    TexelTypeMismatch { requested: TexelFormat, actual: TexelFormat },
}

/// Failures reported by the device or raised while waiting on it
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No adapter matched the requested options
    #[error("no compatible adapter: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),

    /// The adapter refused the device request
    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    /// Polling failed, usually because the device was lost
    #[error("failed to poll device: {0}")]
    Poll(#[from] wgpu::PollError),

    /// The staging buffer could not be mapped for reading
    #[error("failed to map staging buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    /// The map callback was dropped without reporting a result
    #[error("buffer mapping callback was dropped")]
    MapAbandoned,

    /// wgpu validation error captured by an error scope
    #[error("validation error while {context}: {message}")]
    Validation { context: String, message: String },

    /// The sync policy's deadline passed before the device was idle
    #[error("device did not become idle within {0:?}")]
    Timeout(Duration),

    /// The sync policy's cancel flag was raised
    #[error("wait for idle was cancelled")]
    Cancelled,
}

/// Failures parsing or reflecting a compute kernel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("failed to parse kernel '{label}':\n{message}")]
    Parse { label: String, message: String },

    #[error("kernel '{label}' has no entry point named '{entry_point}'")]
    EntryPointNotFound { label: String, entry_point: String },

    #[error("entry point '{entry_point}' of kernel '{label}' is not a compute entry point")]
    NotCompute { label: String, entry_point: String },
}
