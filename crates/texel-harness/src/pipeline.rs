//! Pipelines and resource sets
//!
//! A pipeline ties a kernel to a resource layout and a fixed workgroup size.
//! A resource set binds concrete image views to the slots of a layout.

use crate::context::GpuContext;
use crate::error::{ConfigError, Result};
use crate::image::{ImageUsage, ImageView};
use crate::kernel::Kernel;
use crate::format::TexelFormat;
use crate::layout::{ResourceKind, ResourceLayout, ResourceLayoutElement};

/// An immutable compute pipeline
#[derive(Debug)]
pub struct Pipeline {
    /// Human-readable name for debugging
    label: String,
    /// Layout every resource set used with this pipeline must come from
    layout: ResourceLayout,
    /// Workgroup size the kernel declares
    workgroup_size: [u32; 3],
    /// The wgpu compute pipeline
    pub(crate) compute_pipeline: wgpu::ComputePipeline,
}

impl Pipeline {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn layout(&self) -> &ResourceLayout {
        &self.layout
    }

    pub fn workgroup_size(&self) -> [u32; 3] {
        self.workgroup_size
    }
}

/// Views bound positionally to the slots of a layout
#[derive(Debug)]
pub struct ResourceSet {
    /// Layout the views were checked against
    layout: ResourceLayout,
    /// Bind group holding the views
    pub(crate) bind_group: wgpu::BindGroup,
}

impl ResourceSet {
    pub fn layout(&self) -> &ResourceLayout {
        &self.layout
    }
}

/// What slot checks need to know about a view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ViewSignature<'a> {
    pub image_name: &'a str,
    pub format: TexelFormat,
    pub usage: ImageUsage,
}

impl ImageView {
    pub(crate) fn signature(&self) -> ViewSignature<'_> {
        ViewSignature {
            image_name: self.image_name(),
            format: self.format(),
            usage: self.usage(),
        }
    }
}

/// Checks views against layout slots without touching the device
pub(crate) fn check_views(elements: &[ResourceLayoutElement], views: &[ViewSignature<'_>]) -> std::result::Result<(), ConfigError> {
    if views.len() != elements.len() {
        return Err(ConfigError::ResourceCountMismatch {
            expected: elements.len(),
            actual: views.len(),
        });
    }

    for (slot, (element, view)) in elements.iter().zip(views).enumerate() {
        let required = match element.kind {
            ResourceKind::TextureReadOnly => ImageUsage::SAMPLED,
            ResourceKind::TextureReadWrite => ImageUsage::STORAGE,
        };
        if !view.usage.contains(required) {
            return Err(ConfigError::ResourceKindMismatch {
                slot,
                element: element.name.clone(),
                image: view.image_name.to_string(),
                kind: element.kind,
            });
        }
        if view.format != element.format {
            return Err(ConfigError::ResourceFormatMismatch {
                slot,
                image: view.image_name.to_string(),
                expected: element.format,
                actual: view.format,
            });
        }
    }

    Ok(())
}

impl GpuContext {
    /// Creates a compute pipeline for `kernel` with a fixed workgroup size
    ///
    /// The workgroup size must equal the kernel's declaration and the kernel's
    /// bindings must match `layout` slot for slot.
    ///
    /// # Arguments
    /// * `kernel` - Parsed kernel and its entry point
    /// * `layout` - Resource layout the kernel's bindings are checked against
    /// * `workgroup_size` - Must equal the kernel's `@workgroup_size`
    ///
    /// # Returns
    /// An immutable pipeline bound to `layout`
    pub fn create_pipeline(&self, kernel: &Kernel, layout: &ResourceLayout, workgroup_size: [u32; 3]) -> Result<Pipeline> {
        kernel.check_workgroup_size(workgroup_size)?;
        kernel.check_layout(layout.elements())?;

        let label = format!("{} pipeline", kernel.label());
        let compute_pipeline = self.validated("creating pipeline", |device| {
            let shader_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(kernel.label()),
                source: wgpu::ShaderSource::Wgsl(kernel.source().into()),
            });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&label),
                bind_group_layouts: &[&layout.bind_group_layout],
                push_constant_ranges: &[],
            });

            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&label),
                layout: Some(&pipeline_layout),
                module: &shader_module,
                entry_point: Some(kernel.entry_point()),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        tracing::debug!(pipeline = %label, ?workgroup_size, "compute pipeline created");

        Ok(Pipeline {
            label,
            layout: layout.clone(),
            workgroup_size,
            compute_pipeline,
        })
    }

    /// Binds `views` to the slots of `layout` in order
    ///
    /// # Arguments
    /// * `layout` - Layout whose slots the views fill
    /// * `views` - One view per slot; view `i` binds to slot `i`
    ///
    /// # Returns
    /// The resource set, or a `ConfigError` naming the first slot that does not fit
    pub fn create_resource_set(&self, layout: &ResourceLayout, views: &[&ImageView]) -> Result<ResourceSet> {
        let signatures = views.iter().map(|view| view.signature()).collect::<Vec<_>>();
        check_views(layout.elements(), &signatures)?;

        let entries = views
            .iter()
            .enumerate()
            .map(|(binding, view)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(&view.view),
            })
            .collect::<Vec<_>>();

        let bind_group = self.validated("creating resource set", |device| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("texel-harness resource set"),
                layout: &layout.bind_group_layout,
                entries: &entries,
            })
        })?;

        tracing::debug!(views = views.len(), "resource set created");

        Ok(ResourceSet {
            layout: layout.clone(),
            bind_group,
        })
    }
}
