//! Image allocation, views and uploads
//!
//! Images are 2D texel grids owned by the harness and released when dropped.
//! Kernel-bindable images and staging mirrors are separate usage classes: an
//! image is created with sampled and/or storage usage, while staging resources
//! go through [`GpuContext::create_staging`](crate::GpuContext::create_staging).

use crate::context::GpuContext;
use crate::error::{ConfigError, Result};
use crate::format::{Texel, TexelFormat};
use std::ops::BitOr;

/// Usage flags for an image resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageUsage(u8);

impl ImageUsage {
    /// Readable by kernels through a sampled texture binding
    pub const SAMPLED: Self = Self(1 << 0);
    /// Readable and writable by kernels through a storage texture binding
    pub const STORAGE: Self = Self(1 << 1);
    /// Host-visible mirror used only for readback
    pub const STAGING: Self = Self(1 << 2);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Checks that the flags describe a kernel-bindable image
    pub(crate) fn validate_bindable(self, name: &str) -> std::result::Result<(), ConfigError> {
        let reason = if self.intersects(Self::STAGING) {
            "staging usage cannot be combined with kernel usage; create a staging resource instead"
        } else if !self.intersects(Self::SAMPLED.union(Self::STORAGE)) {
            "kernel-bindable images need sampled or storage usage"
        } else {
            return Ok(());
        };
        Err(ConfigError::InvalidUsage { name: name.to_string(), reason })
    }

    /// Checks that the flags are exactly the staging class
    pub(crate) fn validate_staging(self, name: &str) -> std::result::Result<(), ConfigError> {
        if self == Self::STAGING {
            Ok(())
        } else {
            Err(ConfigError::InvalidUsage {
                name: name.to_string(),
                reason: "staging resources must have exactly staging usage",
            })
        }
    }

    fn to_wgpu(self) -> wgpu::TextureUsages {
        // Every image can be uploaded into and read back from.
        let mut usages = wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST;
        if self.contains(Self::SAMPLED) {
            usages |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if self.contains(Self::STORAGE) {
            usages |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        usages
    }
}

impl BitOr for ImageUsage {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// Description of a 2D image resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    /// Debug name, also used as the wgpu label
    pub name: String,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Number of array layers; 1 for a plain 2D image
    pub layers: u32,
    /// Texel format shared by every layer
    pub format: TexelFormat,
    /// Usage class; kernel-bindable or staging, never both
    pub usage: ImageUsage,
}

impl ImageDescriptor {
    /// A single-layer 2D image description
    pub fn texture_2d(name: impl Into<String>, width: u32, height: u32, format: TexelFormat, usage: ImageUsage) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            layers: 1,
            format,
            usage,
        }
    }

    /// The same extent and format with different usage and name
    pub fn mirror(&self, name: impl Into<String>, usage: ImageUsage) -> Self {
        Self {
            name: name.into(),
            layers: 1,
            usage,
            ..self.clone()
        }
    }

    /// Number of bytes in one layer of tightly packed host data
    pub fn layer_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.block_size() as usize
    }

    pub(crate) fn validate_extent(&self) -> std::result::Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 || self.layers == 0 {
            return Err(ConfigError::ZeroExtent {
                name: self.name.clone(),
                width: self.width,
                height: self.height,
                layers: self.layers,
            });
        }
        Ok(())
    }

    /// Checks the extent against the device's texture limits
    pub(crate) fn validate_limits(&self, limits: &wgpu::Limits) -> std::result::Result<(), ConfigError> {
        let max_dimension = limits.max_texture_dimension_2d;
        let max_layers = limits.max_texture_array_layers;
        if self.width > max_dimension || self.height > max_dimension || self.layers > max_layers {
            return Err(ConfigError::ExtentTooLarge {
                name: self.name.clone(),
                width: self.width,
                height: self.height,
                layers: self.layers,
                max_dimension,
                max_layers,
            });
        }
        Ok(())
    }

    pub(crate) fn validate_layer(&self, layer: u32) -> std::result::Result<(), ConfigError> {
        if layer >= self.layers {
            return Err(ConfigError::LayerOutOfRange {
                name: self.name.clone(),
                layer,
                layers: self.layers,
            });
        }
        Ok(())
    }

    pub(crate) fn validate_upload(&self, len: usize) -> std::result::Result<(), ConfigError> {
        let expected = self.layer_size();
        if len != expected {
            return Err(ConfigError::UploadSizeMismatch {
                name: self.name.clone(),
                expected,
                actual: len,
            });
        }
        Ok(())
    }
}

/// A GPU image owned by the harness
#[derive(Debug)]
pub struct Image {
    descriptor: ImageDescriptor,
    pub(crate) texture: wgpu::Texture,
}

impl Image {
    pub fn descriptor(&self) -> &ImageDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    pub fn format(&self) -> TexelFormat {
        self.descriptor.format
    }

    pub fn usage(&self) -> ImageUsage {
        self.descriptor.usage
    }

    /// Creates a view over the full extent of mip 0 and layer 0
    pub fn create_view(&self) -> ImageView {
        let view = self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&format!("{} view", self.descriptor.name)),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: 0,
            mip_level_count: Some(1),
            base_array_layer: 0,
            array_layer_count: Some(1),
            ..Default::default()
        });

        ImageView {
            image_name: self.descriptor.name.clone(),
            format: self.descriptor.format,
            usage: self.descriptor.usage,
            view,
        }
    }
}

/// A kernel-bindable view over an [`Image`]
#[derive(Debug)]
pub struct ImageView {
    /// Name of the image the view was created from
    image_name: String,
    /// Format of the viewed image
    format: TexelFormat,
    /// Usage of the viewed image, checked against layout slots
    usage: ImageUsage,
    /// The wgpu view over mip 0, layer 0
    pub(crate) view: wgpu::TextureView,
}

impl ImageView {
    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    pub fn format(&self) -> TexelFormat {
        self.format
    }

    pub fn usage(&self) -> ImageUsage {
        self.usage
    }
}

impl GpuContext {
    /// Creates a kernel-bindable image; contents start undefined
    ///
    /// # Arguments
    /// * `descriptor` - Extent, format and usage; usage must include sampled or storage
    ///
    /// # Returns
    /// The image, or a `ConfigError` for zero extents, extents over the device
    /// limits or staging usage
    pub fn create_image(&self, descriptor: &ImageDescriptor) -> Result<Image> {
        descriptor.validate_extent()?;
        descriptor.validate_limits(&self.device.limits())?;
        descriptor.usage.validate_bindable(&descriptor.name)?;

        let texture = self.validated("creating image", |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&descriptor.name),
                size: wgpu::Extent3d {
                    width: descriptor.width,
                    height: descriptor.height,
                    depth_or_array_layers: descriptor.layers,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: descriptor.format.to_wgpu(),
                usage: descriptor.usage.to_wgpu(),
                view_formats: &[],
            })
        })?;

        tracing::debug!(
            name = %descriptor.name,
            width = descriptor.width,
            height = descriptor.height,
            format = ?descriptor.format,
            "image created"
        );

        Ok(Image {
            descriptor: descriptor.clone(),
            texture,
        })
    }

    /// Writes tightly packed host bytes over the full extent of one layer
    ///
    /// The write is queued and lands before any later submission executes.
    ///
    /// # Arguments
    /// * `image` - Destination image
    /// * `layer` - Array layer to overwrite
    /// * `data` - Exactly `width * height * block_size` bytes, rows tightly packed
    pub fn upload(&self, image: &Image, layer: u32, data: &[u8]) -> Result<()> {
        let descriptor = image.descriptor();
        descriptor.validate_layer(layer)?;
        descriptor.validate_upload(data.len())?;

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &image.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(descriptor.width * descriptor.format.block_size()),
                rows_per_image: Some(descriptor.height),
            },
            wgpu::Extent3d {
                width: descriptor.width,
                height: descriptor.height,
                depth_or_array_layers: 1,
            },
        );

        tracing::debug!(name = %descriptor.name, layer, bytes = data.len(), "image upload queued");
        Ok(())
    }

    /// Typed upload; the texel type must match the image format
    pub fn upload_texels<T: Texel>(&self, image: &Image, layer: u32, texels: &[T]) -> Result<()> {
        if T::FORMAT != image.format() {
            return Err(ConfigError::TexelTypeMismatch {
                requested: T::FORMAT,
                actual: image.format(),
            }
            .into());
        }
        self.upload(image, layer, bytemuck::cast_slice(texels))
    }

    /// Fills one layer with a single value
    pub fn fill<T: Texel>(&self, image: &Image, layer: u32, value: T) -> Result<()> {
        let count = image.width() as usize * image.height() as usize;
        self.upload_texels(image, layer, &vec![value; count])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindable_usage_classes() {
        assert!((ImageUsage::SAMPLED | ImageUsage::STORAGE).validate_bindable("a").is_ok());
        assert!(ImageUsage::SAMPLED.validate_bindable("a").is_ok());
        assert!(ImageUsage::STORAGE.validate_bindable("a").is_ok());
        assert!(ImageUsage::empty().validate_bindable("a").is_err());
        assert!(ImageUsage::STAGING.validate_bindable("a").is_err());
        assert!((ImageUsage::STORAGE | ImageUsage::STAGING).validate_bindable("a").is_err());
    }

    #[test]
    fn test_staging_usage_must_be_exact() {
        assert!(ImageUsage::STAGING.validate_staging("s").is_ok());
        assert!((ImageUsage::STAGING | ImageUsage::SAMPLED).validate_staging("s").is_err());
        assert!(ImageUsage::STORAGE.validate_staging("s").is_err());
    }

    #[test]
    fn test_wgpu_usage_always_copyable() {
        let usages = ImageUsage::SAMPLED.to_wgpu();
        assert!(usages.contains(wgpu::TextureUsages::TEXTURE_BINDING));
        assert!(usages.contains(wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::COPY_DST));
        assert!(!usages.contains(wgpu::TextureUsages::STORAGE_BINDING));
    }

    #[test]
    fn test_zero_extent_is_rejected() {
        let descriptor = ImageDescriptor::texture_2d("INPUT_TEX", 0, 32, TexelFormat::R8Uint, ImageUsage::SAMPLED);
        assert!(matches!(descriptor.validate_extent(), Err(ConfigError::ZeroExtent { width: 0, height: 32, .. })));
    }

    #[test]
    fn test_extent_over_device_limit_is_rejected() {
        let limits = wgpu::Limits::downlevel_defaults();
        let max = limits.max_texture_dimension_2d;

        let edge = ImageDescriptor::texture_2d("EDGE", max, 1, TexelFormat::R32Uint, ImageUsage::SAMPLED);
        assert!(edge.validate_limits(&limits).is_ok());

        let wide = ImageDescriptor::texture_2d("WIDE", max + 1, 1, TexelFormat::R32Uint, ImageUsage::SAMPLED);
        assert!(matches!(wide.validate_limits(&limits), Err(ConfigError::ExtentTooLarge { width, .. }) if width == max + 1));

        let huge = ImageDescriptor::texture_2d("HUGE", u32::MAX / 2, u32::MAX, TexelFormat::R32Uint, ImageUsage::STAGING);
        assert!(matches!(huge.validate_limits(&limits), Err(ConfigError::ExtentTooLarge { .. })));
    }

    #[test]
    fn test_upload_size_must_match_extent() {
        let descriptor = ImageDescriptor::texture_2d("INPUT_TEX", 32, 32, TexelFormat::R8Uint, ImageUsage::SAMPLED);
        assert_eq!(descriptor.layer_size(), 1024);
        assert!(descriptor.validate_upload(1024).is_ok());
        assert_eq!(
            descriptor.validate_upload(1023),
            Err(ConfigError::UploadSizeMismatch {
                name: "INPUT_TEX".to_string(),
                expected: 1024,
                actual: 1023,
            })
        );

        let wide = ImageDescriptor::texture_2d("WIDE", 3, 5, TexelFormat::R32Uint, ImageUsage::STORAGE);
        assert_eq!(wide.layer_size(), 60);
    }

    #[test]
    fn test_layer_must_exist() {
        let mut descriptor = ImageDescriptor::texture_2d("ARRAY", 4, 4, TexelFormat::R8Uint, ImageUsage::SAMPLED);
        descriptor.layers = 2;
        assert!(descriptor.validate_layer(1).is_ok());
        assert!(matches!(descriptor.validate_layer(2), Err(ConfigError::LayerOutOfRange { layer: 2, layers: 2, .. })));
    }
}
