//! Compute kernels and their reflected binding contract
//!
//! A kernel is WGSL source plus the entry point to run. The source is parsed
//! with naga when the kernel is created so that pipeline creation can check
//! the requested workgroup size and the resource layout against what the
//! kernel actually declares.

use crate::error::{ConfigError, KernelError};
use crate::format::TexelFormat;
use crate::layout::{ResourceKind, ResourceLayoutElement};

/// Identity kernel source; `STORAGE_FORMAT` is substituted per texel format
const IDENTITY_KERNEL_TEMPLATE: &str = include_str!("../shaders/identity.wgsl");

/// Workgroup size declared by the identity kernel
pub const IDENTITY_WORKGROUP_SIZE: [u32; 3] = [16, 16, 1];

/// Entry point name of the identity kernel
pub const IDENTITY_ENTRY_POINT: &str = "main";

/// Reflected entry point of a kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelEntryPoint {
    pub name: String,
    pub is_compute: bool,
    pub workgroup_size: [u32; 3],
}

/// Shape of a resource a kernel declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelBindingShape {
    /// `texture_2d<T>`; `unsigned` is true for `u32` texels
    SampledTexture { unsigned: bool },
    /// `texture_storage_2d<format, access>`
    StorageTexture { format: Option<TexelFormat>, read: bool, write: bool },
    /// Anything else (buffers, samplers, arrayed or non-2D images)
    Other,
}

/// Reflected resource binding of a kernel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelBinding {
    pub name: Option<String>,
    pub group: u32,
    pub binding: u32,
    pub shape: KernelBindingShape,
}

/// A parsed compute kernel
#[derive(Debug, Clone)]
pub struct Kernel {
    label: String,
    source: String,
    entry_point: String,
    entry_points: Vec<KernelEntryPoint>,
    bindings: Vec<KernelBinding>,
}

impl Kernel {
    /// Parses WGSL source and reflects its entry points and bindings
    pub fn from_wgsl(label: impl Into<String>, source: impl Into<String>, entry_point: impl Into<String>) -> Result<Self, KernelError> {
        let label = label.into();
        let source = source.into();
        let entry_point = entry_point.into();

        let module = naga::front::wgsl::parse_str(&source).map_err(|e| KernelError::Parse {
            label: label.clone(),
            message: e.emit_to_string(&source),
        })?;

        let entry_points = module
            .entry_points
            .iter()
            .map(|ep| KernelEntryPoint {
                name: ep.name.clone(),
                is_compute: ep.stage == naga::ShaderStage::Compute,
                workgroup_size: ep.workgroup_size,
            })
            .collect::<Vec<_>>();

        let mut bindings = module
            .global_variables
            .iter()
            .filter_map(|(_, var)| {
                let binding = var.binding.as_ref()?;
                Some(KernelBinding {
                    name: var.name.clone(),
                    group: binding.group,
                    binding: binding.binding,
                    shape: reflect_shape(&module.types[var.ty].inner),
                })
            })
            .collect::<Vec<_>>();
        bindings.sort_by_key(|b| (b.group, b.binding));

        let kernel = Self {
            label,
            source,
            entry_point,
            entry_points,
            bindings,
        };
        let ep = kernel.entry()?;
        tracing::debug!(kernel = %kernel.label, entry_point = %ep.name, workgroup_size = ?ep.workgroup_size, "kernel parsed");

        Ok(kernel)
    }

    /// The built-in passthrough kernel for `format`
    ///
    /// Binding 0 is the read-only input, binding 1 the read-write output.
    pub fn identity(format: TexelFormat) -> Result<Self, KernelError> {
        let source = IDENTITY_KERNEL_TEMPLATE.replace("STORAGE_FORMAT", format.wgsl_name());
        Self::from_wgsl(format!("identity_{}", format.wgsl_name()), source, IDENTITY_ENTRY_POINT)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn bindings(&self) -> &[KernelBinding] {
        &self.bindings
    }

    /// The selected entry point, which must exist and be a compute entry point
    pub fn entry(&self) -> Result<&KernelEntryPoint, KernelError> {
        let ep = self.entry_points.iter().find(|ep| ep.name == self.entry_point).ok_or_else(|| KernelError::EntryPointNotFound {
            label: self.label.clone(),
            entry_point: self.entry_point.clone(),
        })?;
        if !ep.is_compute {
            return Err(KernelError::NotCompute {
                label: self.label.clone(),
                entry_point: ep.name.clone(),
            });
        }
        Ok(ep)
    }

    /// Checks a requested workgroup size against the entry point's declaration
    pub fn check_workgroup_size(&self, requested: [u32; 3]) -> Result<(), crate::Error> {
        let declared = self.entry()?.workgroup_size;
        if declared != requested {
            return Err(ConfigError::WorkgroupSizeMismatch { declared, requested }.into());
        }
        Ok(())
    }

    /// Checks that the kernel declares exactly the layout's slots, in order
    pub fn check_layout(&self, elements: &[ResourceLayoutElement]) -> Result<(), ConfigError> {
        if self.bindings.len() != elements.len() {
            return Err(ConfigError::KernelBindingMismatch {
                slot: self.bindings.len().min(elements.len()),
                reason: format!("kernel declares {} bindings, layout declares {}", self.bindings.len(), elements.len()),
            });
        }

        for (slot, (binding, element)) in self.bindings.iter().zip(elements).enumerate() {
            let mismatch = |reason: String| ConfigError::KernelBindingMismatch { slot, reason };

            if binding.group != 0 || binding.binding as usize != slot {
                return Err(mismatch(format!(
                    "'{}' expects @group(0) @binding({slot}), kernel declares @group({}) @binding({})",
                    element.name, binding.group, binding.binding
                )));
            }

            match (element.kind, binding.shape) {
                (ResourceKind::TextureReadOnly, KernelBindingShape::SampledTexture { unsigned: true }) => {}
                (ResourceKind::TextureReadWrite, KernelBindingShape::StorageTexture { format, read: true, write: true }) => {
                    if format != Some(element.format) {
                        return Err(mismatch(format!("'{}' expects storage format {:?}, kernel declares {format:?}", element.name, element.format)));
                    }
                }
                (kind, shape) => {
                    return Err(mismatch(format!("'{}' is {kind:?}, kernel declares {shape:?}", element.name)));
                }
            }
        }

        Ok(())
    }
}

fn reflect_shape(inner: &naga::TypeInner) -> KernelBindingShape {
    match inner {
        naga::TypeInner::Image {
            dim: naga::ImageDimension::D2,
            arrayed: false,
            class,
        } => match *class {
            naga::ImageClass::Sampled { kind, multi: false } => KernelBindingShape::SampledTexture {
                unsigned: kind == naga::ScalarKind::Uint,
            },
            naga::ImageClass::Storage { format, access } => KernelBindingShape::StorageTexture {
                format: TexelFormat::from_storage_format(format),
                read: access.contains(naga::StorageAccess::LOAD),
                write: access.contains(naga::StorageAccess::STORE),
            },
            _ => KernelBindingShape::Other,
        },
        _ => KernelBindingShape::Other,
    }
}
