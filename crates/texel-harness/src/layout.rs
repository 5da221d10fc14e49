//! Resource layouts: the binding contract a kernel's inputs must satisfy
//!
//! A layout is an ordered list of elements; the binding index of an element is
//! its position in that list. Layouts are not checked against any kernel here.
//! Mismatches surface when a pipeline or resource set is created.

use crate::context::GpuContext;
use crate::error::{ConfigError, Result};
use crate::format::TexelFormat;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LAYOUT_ID: AtomicU64 = AtomicU64::new(0);

/// How a kernel accesses a bound image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Read through a sampled texture binding
    TextureReadOnly,
    /// Read and written through a storage texture binding
    TextureReadWrite,
}

/// One slot of a resource layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLayoutElement {
    pub name: String,
    pub kind: ResourceKind,
    pub stages: wgpu::ShaderStages,
    pub format: TexelFormat,
}

impl ResourceLayoutElement {
    pub fn new(name: impl Into<String>, kind: ResourceKind, stages: wgpu::ShaderStages, format: TexelFormat) -> Self {
        Self {
            name: name.into(),
            kind,
            stages,
            format,
        }
    }

    fn binding_type(&self) -> wgpu::BindingType {
        match self.kind {
            ResourceKind::TextureReadOnly => wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Uint,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            ResourceKind::TextureReadWrite => wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::ReadWrite,
                format: self.format.to_wgpu(),
                view_dimension: wgpu::TextureViewDimension::D2,
            },
        }
    }
}

/// Ordered element list from which a [`ResourceLayout`] is built
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLayoutDescription {
    pub elements: Vec<ResourceLayoutElement>,
}

impl ResourceLayoutDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an element; its binding index is the current element count
    pub fn element(mut self, element: ResourceLayoutElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Appends a compute-visible read-only texture element
    pub fn texture_read_only(self, name: impl Into<String>, format: TexelFormat) -> Self {
        self.element(ResourceLayoutElement::new(name, ResourceKind::TextureReadOnly, wgpu::ShaderStages::COMPUTE, format))
    }

    /// Appends a compute-visible read-write texture element
    pub fn texture_read_write(self, name: impl Into<String>, format: TexelFormat) -> Self {
        self.element(ResourceLayoutElement::new(name, ResourceKind::TextureReadWrite, wgpu::ShaderStages::COMPUTE, format))
    }

    /// Structural checks that need no device
    pub(crate) fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.elements.is_empty() {
            return Err(ConfigError::EmptyLayout);
        }
        for element in &self.elements {
            if !element.stages.contains(wgpu::ShaderStages::COMPUTE) {
                return Err(ConfigError::NotComputeVisible { name: element.name.clone() });
            }
        }
        Ok(())
    }
}

/// An immutable, device-bound resource layout
#[derive(Debug, Clone)]
pub struct ResourceLayout {
    id: u64,
    elements: Arc<[ResourceLayoutElement]>,
    pub(crate) bind_group_layout: wgpu::BindGroupLayout,
}

impl ResourceLayout {
    pub fn elements(&self) -> &[ResourceLayoutElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Whether both handles refer to the same created layout
    pub fn same_as(&self, other: &ResourceLayout) -> bool {
        self.id == other.id
    }
}

impl GpuContext {
    /// Creates an immutable layout from an ordered element description
    pub fn create_resource_layout(&self, description: &ResourceLayoutDescription) -> Result<ResourceLayout> {
        description.validate()?;

        for element in &description.elements {
            if element.kind == ResourceKind::TextureReadWrite && !self.supports_read_write_storage(element.format) {
                return Err(ConfigError::UnsupportedStorageFormat { format: element.format }.into());
            }
        }

        let entries = description
            .elements
            .iter()
            .enumerate()
            .map(|(binding, element)| wgpu::BindGroupLayoutEntry {
                binding: binding as u32,
                visibility: element.stages,
                ty: element.binding_type(),
                count: None,
            })
            .collect::<Vec<_>>();

        let bind_group_layout = self.validated("creating resource layout", |device| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("texel-harness resource layout"),
                entries: &entries,
            })
        })?;

        let id = NEXT_LAYOUT_ID.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id, elements = description.elements.len(), "resource layout created");

        Ok(ResourceLayout {
            id,
            elements: description.elements.clone().into(),
            bind_group_layout,
        })
    }
}
