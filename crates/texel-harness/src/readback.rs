//! Staging copies, mapping and texel comparison
//!
//! Readback goes through three types. A [`StagingImage`] is a fresh host-visible
//! mirror that has not been written. [`GpuContext::copy_to_staging`] consumes it,
//! copies the source into it in its own submission, waits for idle and returns a
//! [`Readback`]. Only a `Readback` can be mapped, and the resulting
//! [`MappedImage`] unmaps the buffer when it is dropped, whatever the exit path.

use crate::command::CommandSequence;
use crate::context::GpuContext;
use crate::error::{ConfigError, DeviceError, Result};
use crate::format::{Texel, TexelFormat};
use crate::image::{Image, ImageDescriptor, ImageUsage};
use std::marker::PhantomData;

/// Bytes per row of a staging copy, padded to the copy alignment
///
/// # Returns
/// `None` when the padded row does not fit in a `u32`
pub fn padded_row_stride(width: u32, format: TexelFormat) -> Option<u32> {
    width.checked_mul(format.block_size())?.checked_next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
}

/// A host-mappable mirror of one image layer, not yet written
#[derive(Debug)]
pub struct StagingImage {
    /// Debug name, also used as the buffer label
    name: String,
    /// Width of the mirrored layer in texels
    width: u32,
    /// Height of the mirrored layer in texels
    height: u32,
    /// Format of the mirrored image
    format: TexelFormat,
    /// Padded bytes per row
    row_stride: u32,
    /// `MAP_READ | COPY_DST` buffer holding the copied rows
    pub(crate) buffer: wgpu::Buffer,
}

impl StagingImage {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TexelFormat {
        self.format
    }

    /// Distance in bytes between the starts of consecutive rows
    pub fn row_stride(&self) -> u32 {
        self.row_stride
    }

    pub(crate) fn check_mirrors(&self, source: &Image) -> std::result::Result<(), ConfigError> {
        let mismatch = |reason: String| ConfigError::StagingMismatch {
            image: source.name().to_string(),
            reason,
        };
        if (self.width, self.height) != (source.width(), source.height()) {
            return Err(mismatch(format!("staging is {}x{}, source is {}x{}", self.width, self.height, source.width(), source.height())));
        }
        if self.format != source.format() {
            return Err(mismatch(format!("staging format {:?}, source format {:?}", self.format, source.format())));
        }
        Ok(())
    }
}

/// A staging image whose copy has completed on the device
#[derive(Debug)]
pub struct Readback {
    staging: StagingImage,
}

impl Readback {
    pub fn staging(&self) -> &StagingImage {
        &self.staging
    }

    /// Maps the staging memory for reading as a grid of `T`
    pub fn map<T: Texel>(&mut self, context: &GpuContext) -> Result<MappedImage<'_, T>> {
        if T::FORMAT != self.staging.format {
            return Err(ConfigError::TexelTypeMismatch {
                requested: T::FORMAT,
                actual: self.staging.format,
            }
            .into());
        }

        let buffer = &self.staging.buffer;
        let slice = buffer.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // The receiver only goes away if the wait below already failed.
            let _ = sender.send(result);
        });

        context.wait_for_idle()?;
        pollster::block_on(receiver.receive()).ok_or(DeviceError::MapAbandoned)?.map_err(DeviceError::from)?;

        tracing::debug!(staging = %self.staging.name, "staging image mapped");

        Ok(MappedImage {
            buffer,
            view: Some(slice.get_mapped_range()),
            width: self.staging.width,
            height: self.staging.height,
            row_stride: self.staging.row_stride,
            _texel: PhantomData,
        })
    }
}

/// A row-major texel grid over raw bytes with a row stride
#[derive(Debug, Clone, Copy)]
pub struct TexelGrid<'a, T> {
    bytes: &'a [u8],
    width: u32,
    height: u32,
    row_stride: u32,
    _texel: PhantomData<T>,
}

impl<'a, T: Texel> TexelGrid<'a, T> {
    /// Wraps `bytes`, which must hold `height` rows of `row_stride` bytes
    pub fn new(bytes: &'a [u8], width: u32, height: u32, row_stride: u32) -> Option<Self> {
        let row_bytes = width as usize * std::mem::size_of::<T>();
        let needed = if height == 0 { 0 } else { (height as usize - 1) * row_stride as usize + row_bytes };
        if (row_stride as usize) < row_bytes || bytes.len() < needed {
            return None;
        }
        Some(Self {
            bytes,
            width,
            height,
            row_stride,
            _texel: PhantomData,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The texel at column `x` of row `y`
    pub fn get(&self, x: u32, y: u32) -> Option<T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let size = std::mem::size_of::<T>();
        let offset = y as usize * self.row_stride as usize + x as usize * size;
        Some(bytemuck::pod_read_unaligned(&self.bytes[offset..offset + size]))
    }

    /// One row of texels without the row padding
    pub fn row(&self, y: u32) -> impl Iterator<Item = T> + '_ {
        let size = std::mem::size_of::<T>();
        let range = if y < self.height {
            let start = y as usize * self.row_stride as usize;
            start..start + self.width as usize * size
        } else {
            0..0
        };
        self.bytes[range].chunks_exact(size).map(|chunk| bytemuck::pod_read_unaligned::<T>(chunk))
    }

    /// Counts texels not exactly equal to `expected`
    pub fn count_mismatches(&self, expected: T) -> u64 {
        (0..self.height).map(|y| self.row(y).filter(|texel| *texel != expected).count() as u64).sum()
    }

    /// Counts texels for which `is_mismatch` returns true, stopping at its first error
    pub fn try_count_mismatches<E>(&self, mut is_mismatch: impl FnMut(u32, u32, T) -> std::result::Result<bool, E>) -> std::result::Result<u64, E> {
        let mut count = 0;
        for y in 0..self.height {
            for (x, texel) in self.row(y).enumerate() {
                if is_mismatch(x as u32, y, texel)? {
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

/// A mapped staging resource; unmapped exactly once on drop
pub struct MappedImage<'a, T> {
    buffer: &'a wgpu::Buffer,
    view: Option<wgpu::BufferView<'a>>,
    width: u32,
    height: u32,
    row_stride: u32,
    _texel: PhantomData<T>,
}

impl<T: Texel> MappedImage<'_, T> {
    pub fn grid(&self) -> TexelGrid<'_, T> {
        let bytes: &[u8] = self.view.as_deref().unwrap_or(&[]);
        TexelGrid {
            bytes,
            width: self.width,
            height: self.height,
            row_stride: self.row_stride,
            _texel: PhantomData,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> Option<T> {
        self.grid().get(x, y)
    }

    pub fn count_mismatches(&self, expected: T) -> u64 {
        self.grid().count_mismatches(expected)
    }

    pub fn try_count_mismatches<E>(&self, is_mismatch: impl FnMut(u32, u32, T) -> std::result::Result<bool, E>) -> std::result::Result<u64, E> {
        self.grid().try_count_mismatches(is_mismatch)
    }

    /// Releases the mapping now rather than at end of scope
    pub fn unmap(self) {}
}

impl<T> Drop for MappedImage<'_, T> {
    fn drop(&mut self) {
        // The view must be gone before the buffer can be unmapped.
        drop(self.view.take());
        self.buffer.unmap();
        tracing::debug!("staging image unmapped");
    }
}

impl GpuContext {
    /// Creates a staging mirror; usage must be exactly staging
    pub fn create_staging(&self, descriptor: &ImageDescriptor) -> Result<StagingImage> {
        descriptor.validate_extent()?;
        descriptor.usage.validate_staging(&descriptor.name)?;
        let limits = self.device.limits();
        descriptor.validate_limits(&limits)?;

        let row_stride = padded_row_stride(descriptor.width, descriptor.format).ok_or_else(|| ConfigError::ExtentTooLarge {
            name: descriptor.name.clone(),
            width: descriptor.width,
            height: descriptor.height,
            layers: descriptor.layers,
            max_dimension: limits.max_texture_dimension_2d,
            max_layers: limits.max_texture_array_layers,
        })?;
        let buffer = self.validated("creating staging resource", |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&descriptor.name),
                size: row_stride as u64 * descriptor.height as u64,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            })
        })?;

        Ok(StagingImage {
            name: descriptor.name.clone(),
            width: descriptor.width,
            height: descriptor.height,
            format: descriptor.format,
            row_stride,
            buffer,
        })
    }

    /// Creates a staging mirror matching `image`'s extent and format
    pub fn create_staging_for(&self, image: &Image) -> Result<StagingImage> {
        self.create_staging(&image.descriptor().mirror(format!("{} staging", image.name()), ImageUsage::STAGING))
    }

    /// Copies one layer of `source` into `staging` and waits for the copy
    ///
    /// The copy is its own one-shot submission followed by a wait for idle.
    ///
    /// # Arguments
    /// * `source` - Image to read back
    /// * `layer` - Array layer of `source` to copy
    /// * `staging` - A fresh mirror with the same extent and format
    ///
    /// # Returns
    /// A [`Readback`] that can be mapped for host reads
    pub fn copy_to_staging(&self, source: &Image, layer: u32, staging: StagingImage) -> Result<Readback> {
        let recorded = {
            let mut sequence = CommandSequence::begin(self, format!("copy {} to staging", source.name()));
            sequence.copy_image_to_staging(source, layer, &staging)?;
            sequence.end()?
        };
        let _submission = self.submit(recorded);
        self.wait_for_idle()?;

        tracing::debug!(source = %source.name(), layer, "staging copy completed");
        Ok(Readback { staging })
    }

    /// Copies `image` to a fresh staging mirror and counts texels unequal to `expected`
    ///
    /// # Returns
    /// The number of mismatching texels; zero means every texel equals `expected`
    pub fn count_texels_not_filled<T: Texel>(&self, image: &Image, layer: u32, expected: T) -> Result<u64> {
        let staging = self.create_staging_for(image)?;
        let mut readback = self.copy_to_staging(image, layer, staging)?;
        let mapped = readback.map::<T>(self)?;
        Ok(mapped.count_mismatches(expected))
    }
}
