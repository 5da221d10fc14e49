//! Texel formats understood by the harness
//!
//! Only exact integer single-channel formats are supported, so readback
//! comparisons are plain equality with no tolerance.

/// Integer single-channel texel formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    /// One unsigned byte per texel
    R8Uint,
    /// One unsigned 32-bit integer per texel
    R32Uint,
}

impl TexelFormat {
    /// Size of one texel in bytes
    pub const fn block_size(self) -> u32 {
        match self {
            Self::R8Uint => 1,
            Self::R32Uint => 4,
        }
    }

    /// Largest value a texel of this format can hold
    pub const fn max_value(self) -> u32 {
        match self {
            Self::R8Uint => u8::MAX as u32,
            Self::R32Uint => u32::MAX,
        }
    }

    /// WGSL storage texel format name
    pub const fn wgsl_name(self) -> &'static str {
        match self {
            Self::R8Uint => "r8uint",
            Self::R32Uint => "r32uint",
        }
    }

    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::R8Uint => wgpu::TextureFormat::R8Uint,
            Self::R32Uint => wgpu::TextureFormat::R32Uint,
        }
    }

    pub(crate) fn from_storage_format(format: naga::StorageFormat) -> Option<Self> {
        match format {
            naga::StorageFormat::R8Uint => Some(Self::R8Uint),
            naga::StorageFormat::R32Uint => Some(Self::R32Uint),
            _ => None,
        }
    }
}

impl std::str::FromStr for TexelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "r8uint" => Ok(Self::R8Uint),
            "r32uint" => Ok(Self::R32Uint),
            _ => Err(format!("unknown texel format '{s}' (expected r8uint or r32uint)")),
        }
    }
}

/// Host element type stored in an image of a given format
pub trait Texel: bytemuck::Pod + PartialEq + std::fmt::Debug + Send + Sync {
    const FORMAT: TexelFormat;
}

impl Texel for u8 {
    const FORMAT: TexelFormat = TexelFormat::R8Uint;
}

impl Texel for u32 {
    const FORMAT: TexelFormat = TexelFormat::R32Uint;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_size_matches_texel_type() {
        assert_eq!(<u8 as Texel>::FORMAT.block_size() as usize, std::mem::size_of::<u8>());
        assert_eq!(<u32 as Texel>::FORMAT.block_size() as usize, std::mem::size_of::<u32>());
    }

    #[test]
    fn test_parse_format_names() {
        assert_eq!("r8uint".parse::<TexelFormat>().unwrap(), TexelFormat::R8Uint);
        assert_eq!("R32Uint".parse::<TexelFormat>().unwrap(), TexelFormat::R32Uint);
        assert!("rgba8unorm".parse::<TexelFormat>().is_err());
    }
}
