//! The dispatch-and-verify run
//!
//! [`Harness`] is the explicit configuration for a run: the device, the kernel
//! and the workgroup size the pipeline is created with.
//! [`Harness::run_identity`] drives one identity kernel submission end to end
//! and reports how many output texels differ from the expected value.

use crate::command::CommandSequence;
use crate::context::GpuContext;
use crate::error::Result;
use crate::format::Texel;
use crate::image::{ImageDescriptor, ImageUsage};
use crate::kernel::{IDENTITY_WORKGROUP_SIZE, Kernel};
use crate::layout::ResourceLayoutDescription;

/// Parameters of one identity dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRun<T> {
    pub width: u32,
    pub height: u32,
    /// Value every input texel is filled with
    pub fill: T,
    /// Value every output texel is compared against
    pub expected: T,
    /// Value the output is initialized with before dispatch, if any
    pub sentinel: Option<T>,
}

impl<T: Texel> IdentityRun<T> {
    /// A run whose expected output equals its input fill
    pub fn uniform(width: u32, height: u32, fill: T) -> Self {
        Self {
            width,
            height,
            fill,
            expected: fill,
            sentinel: None,
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub width: u32,
    pub height: u32,
    /// Workgroups dispatched along each axis
    pub workgroups: [u32; 3],
    /// Output texels not equal to the expected value
    pub mismatches: u64,
}

impl RunReport {
    pub fn texel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_match(&self) -> bool {
        self.mismatches == 0
    }
}

/// Device, kernel and workgroup size for a run
#[derive(Debug)]
pub struct Harness<'a> {
    pub context: &'a GpuContext,
    pub kernel: &'a Kernel,
    pub workgroup_size: [u32; 3],
}

impl<'a> Harness<'a> {
    /// A harness for `kernel` with the identity kernel's workgroup size
    pub fn new(context: &'a GpuContext, kernel: &'a Kernel) -> Self {
        Self {
            context,
            kernel,
            workgroup_size: IDENTITY_WORKGROUP_SIZE,
        }
    }

    /// Fills an input image, runs the kernel into an output image and counts
    /// output texels that differ from `run.expected`
    ///
    /// The dispatch and the readback copy are separate submissions, each
    /// followed by its own wait for idle. Every resource created here is
    /// released when the function returns, on success or error.
    pub fn run_identity<T: Texel>(&self, run: &IdentityRun<T>) -> Result<RunReport> {
        let context = self.context;
        let format = T::FORMAT;

        let layout = context.create_resource_layout(
            &ResourceLayoutDescription::new()
                .texture_read_only("InputTexture", format)
                .texture_read_write("OutputTexture", format),
        )?;
        let pipeline = context.create_pipeline(self.kernel, &layout, self.workgroup_size)?;

        let usage = ImageUsage::SAMPLED | ImageUsage::STORAGE;
        let input = context.create_image(&ImageDescriptor::texture_2d("INPUT_TEX", run.width, run.height, format, usage))?;
        let input_view = input.create_view();
        context.fill(&input, 0, run.fill)?;

        let output = context.create_image(&ImageDescriptor::texture_2d("OUTPUT_TEX", run.width, run.height, format, usage))?;
        let output_view = output.create_view();
        if let Some(sentinel) = run.sentinel {
            context.fill(&output, 0, sentinel)?;
        }

        let resource_set = context.create_resource_set(&layout, &[&input_view, &output_view])?;

        let (recorded, workgroups) = {
            let mut sequence = CommandSequence::begin(context, "identity dispatch");
            sequence.set_pipeline(&pipeline)?;
            sequence.set_resource_set(&resource_set)?;
            let workgroups = sequence.dispatch_extent([run.width, run.height, 1])?;
            (sequence.end()?, workgroups)
        };
        let _submission = context.submit(recorded);
        context.wait_for_idle()?;

        let mismatches = context.count_texels_not_filled(&output, 0, run.expected)?;

        let report = RunReport {
            width: run.width,
            height: run.height,
            workgroups,
            mismatches,
        };
        if report.is_match() {
            tracing::info!(width = run.width, height = run.height, ?workgroups, "identity run matched");
        } else {
            tracing::warn!(
                width = run.width,
                height = run.height,
                ?workgroups,
                mismatches,
                expected = ?run.expected,
                "identity run produced mismatches"
            );
        }

        Ok(report)
    }
}
