//! One-shot command sequences
//!
//! A sequence moves through Recording, Submitted and Idle. Recording happens on
//! a [`CommandSequence`], which validates every operation as it is recorded and
//! keeps it host-side. [`CommandSequence::end`] encodes the operations into an
//! immutable [`RecordedSequence`]; [`GpuContext::submit`] hands that to the
//! queue; [`GpuContext::wait_for_idle`] blocks until it completed. A
//! configuration error while recording therefore never leaves partial work on
//! the GPU.

use crate::context::GpuContext;
use crate::error::{ConfigError, Result};
use crate::image::Image;
use crate::pipeline::{Pipeline, ResourceSet};
use crate::readback::StagingImage;

/// Number of workgroups needed to cover `extent` along each axis
///
/// Rounds up, so trailing texels of a partial workgroup are still dispatched.
pub fn dispatch_size(extent: [u32; 3], workgroup_size: [u32; 3]) -> std::result::Result<[u32; 3], ConfigError> {
    let mut groups = [0; 3];
    for axis in 0..3 {
        if workgroup_size[axis] != 0 {
            groups[axis] = extent[axis].div_ceil(workgroup_size[axis]);
        }
    }
    if groups.contains(&0) {
        return Err(ConfigError::ZeroWorkgroupCount { groups });
    }
    Ok(groups)
}

#[derive(Debug)]
enum Command<'a> {
    Dispatch {
        pipeline: &'a Pipeline,
        resource_set: &'a ResourceSet,
        groups: [u32; 3],
    },
    CopyToStaging {
        source: &'a Image,
        layer: u32,
        staging: &'a StagingImage,
    },
}

/// A command sequence in the Recording state
#[derive(Debug)]
pub struct CommandSequence<'a> {
    context: &'a GpuContext,
    label: String,
    commands: Vec<Command<'a>>,
    pipeline: Option<&'a Pipeline>,
    resource_set: Option<&'a ResourceSet>,
}

/// An ended sequence, immutable and ready for submission
#[derive(Debug)]
pub struct RecordedSequence {
    pub(crate) label: String,
    pub(crate) buffer: wgpu::CommandBuffer,
}

impl<'a> CommandSequence<'a> {
    /// Opens a new, empty sequence
    pub fn begin(context: &'a GpuContext, label: impl Into<String>) -> Self {
        Self {
            context,
            label: label.into(),
            commands: Vec::new(),
            pipeline: None,
            resource_set: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of recorded dispatch and copy operations
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn set_pipeline(&mut self, pipeline: &'a Pipeline) -> Result<()> {
        if let Some(resource_set) = self.resource_set {
            if !resource_set.layout().same_as(pipeline.layout()) {
                return Err(ConfigError::ResourceSetLayoutMismatch.into());
            }
        }
        self.pipeline = Some(pipeline);
        Ok(())
    }

    pub fn set_resource_set(&mut self, resource_set: &'a ResourceSet) -> Result<()> {
        if let Some(pipeline) = self.pipeline {
            if !resource_set.layout().same_as(pipeline.layout()) {
                return Err(ConfigError::ResourceSetLayoutMismatch.into());
            }
        }
        self.resource_set = Some(resource_set);
        Ok(())
    }

    /// Records a dispatch of `groups` workgroups with the current bindings
    pub fn dispatch(&mut self, groups: [u32; 3]) -> Result<()> {
        let pipeline = self.pipeline.ok_or(ConfigError::NothingBound { missing: "pipeline" })?;
        let resource_set = self.resource_set.ok_or(ConfigError::NothingBound { missing: "resource set" })?;

        if groups.contains(&0) {
            return Err(ConfigError::ZeroWorkgroupCount { groups }.into());
        }
        let limit = self.context.device.limits().max_compute_workgroups_per_dimension;
        if let Some(&count) = groups.iter().find(|&&count| count > limit) {
            return Err(ConfigError::WorkgroupCountOverLimit { count, limit }.into());
        }

        self.commands.push(Command::Dispatch { pipeline, resource_set, groups });
        Ok(())
    }

    /// Records a dispatch covering `extent` texels with the bound pipeline's workgroup size
    pub fn dispatch_extent(&mut self, extent: [u32; 3]) -> Result<[u32; 3]> {
        let pipeline = self.pipeline.ok_or(ConfigError::NothingBound { missing: "pipeline" })?;
        let groups = dispatch_size(extent, pipeline.workgroup_size())?;
        self.dispatch(groups)?;
        Ok(groups)
    }

    /// Records a copy of one layer of `source` into `staging`
    pub fn copy_image_to_staging(&mut self, source: &'a Image, layer: u32, staging: &'a StagingImage) -> Result<()> {
        source.descriptor().validate_layer(layer)?;
        staging.check_mirrors(source)?;
        self.commands.push(Command::CopyToStaging { source, layer, staging });
        Ok(())
    }

    /// Closes recording and encodes the operations
    pub fn end(self) -> Result<RecordedSequence> {
        let Self { context, label, commands, .. } = self;

        let buffer = context.validated("encoding command sequence", |device| {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(&label) });

            for command in &commands {
                match *command {
                    Command::Dispatch { pipeline, resource_set, groups } => {
                        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                            label: Some(pipeline.label()),
                            timestamp_writes: None,
                        });
                        compute_pass.set_pipeline(&pipeline.compute_pipeline);
                        compute_pass.set_bind_group(0, &resource_set.bind_group, &[]);
                        compute_pass.dispatch_workgroups(groups[0], groups[1], groups[2]);
                    }
                    Command::CopyToStaging { source, layer, staging } => {
                        encoder.copy_texture_to_buffer(
                            wgpu::TexelCopyTextureInfo {
                                texture: &source.texture,
                                mip_level: 0,
                                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                                aspect: wgpu::TextureAspect::All,
                            },
                            wgpu::TexelCopyBufferInfo {
                                buffer: &staging.buffer,
                                layout: wgpu::TexelCopyBufferLayout {
                                    offset: 0,
                                    bytes_per_row: Some(staging.row_stride()),
                                    rows_per_image: Some(staging.height()),
                                },
                            },
                            wgpu::Extent3d {
                                width: staging.width(),
                                height: staging.height(),
                                depth_or_array_layers: 1,
                            },
                        );
                    }
                }
            }

            encoder.finish()
        })?;

        tracing::debug!(sequence = %label, operations = commands.len(), "command sequence recorded");
        Ok(RecordedSequence { label, buffer })
    }
}
