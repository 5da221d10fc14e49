//! GPU compute dispatch-and-verify harness built on wgpu
//!
//! This crate allocates GPU images, binds them to a compute kernel, dispatches
//! the kernel and verifies what it wrote by copying the output to a staging
//! resource and comparing every texel on the host.
//!
//! ```no_run
//! use texel_harness::{ContextOptions, GpuContext, Harness, IdentityRun, Kernel, TexelFormat};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let context = GpuContext::new_blocking(ContextOptions::default())?;
//! let kernel = Kernel::identity(TexelFormat::R8Uint)?;
//! let report = Harness::new(&context, &kernel).run_identity(&IdentityRun::uniform(32, 32, 255u8))?;
//! assert_eq!(report.mismatches, 0);
//! # Ok(())
//! # }
//! ```

mod command;
mod context;
mod error;
mod format;
mod harness;
mod image;
mod kernel;
mod layout;
mod pipeline;
mod readback;

pub use command::{CommandSequence, RecordedSequence, dispatch_size};
pub use context::{ContextOptions, GpuContext, Submission, SyncPolicy};
pub use error::{ConfigError, DeviceError, Error, KernelError, Result};
pub use format::{Texel, TexelFormat};
pub use harness::{Harness, IdentityRun, RunReport};
pub use image::{Image, ImageDescriptor, ImageUsage, ImageView};
pub use kernel::{IDENTITY_ENTRY_POINT, IDENTITY_WORKGROUP_SIZE, Kernel, KernelBinding, KernelBindingShape, KernelEntryPoint};
pub use layout::{ResourceKind, ResourceLayout, ResourceLayoutDescription, ResourceLayoutElement};
pub use pipeline::{Pipeline, ResourceSet};
pub use readback::{MappedImage, Readback, StagingImage, TexelGrid, padded_row_stride};
