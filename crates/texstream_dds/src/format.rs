use crate::header::DdsPixelFormat;
use std::fmt::{self, Display};
use texstream_utils::{fourcc, EnumParseError};

/// Storage class of a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormatKind {
    /// Plain pixels, `bits_per_pixel` bits each.
    Linear,
    /// 4x4 blocks of pixels.
    Block,
}

// Generates the DxgiFormat enum, its raw value conversions and per-format properties from one
// table, so adding a format is a one line change
macro_rules! dxgi_formats {
    ($($(#[$meta:meta])* $name:ident = $value:literal, $bits:literal, $kind:ident;)*) => {
        /// Subset of `DXGI_FORMAT` texstream knows how to size and upload.
        ///
        /// Discriminants match the raw DXGI numbers, as stored in DX10 extended headers.
        #[repr(u32)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum DxgiFormat {
            $($(#[$meta])* $name = $value,)*
        }

        impl DxgiFormat {
            /// Every known format, in ascending raw value order.
            pub const ALL: &'static [DxgiFormat] = &[$(DxgiFormat::$name,)*];

            /// Average amount of bits per pixel. For block compressed formats this is the block
            /// size divided by 16 pixels.
            pub const fn bits_per_pixel(self) -> u32 {
                match self {
                    $(DxgiFormat::$name => $bits,)*
                }
            }

            const fn kind(self) -> FormatKind {
                match self {
                    $(DxgiFormat::$name => FormatKind::$kind,)*
                }
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $(DxgiFormat::$name => stringify!($name),)*
                }
            }
        }

        impl TryFrom<u32> for DxgiFormat {
            type Error = EnumParseError;

            fn try_from(value: u32) -> Result<Self, EnumParseError> {
                match value {
                    $($value => Ok(DxgiFormat::$name),)*
                    other => Err(EnumParseError(other)),
                }
            }
        }
    };
}

dxgi_formats! {
    R32G32B32A32Float = 2, 128, Linear;
    R32G32B32A32Uint = 3, 128, Linear;
    R16G16B16A16Float = 10, 64, Linear;
    R16G16B16A16Unorm = 11, 64, Linear;
    R32G32Float = 16, 64, Linear;
    R10G10B10A2Unorm = 24, 32, Linear;
    R8G8B8A8Unorm = 28, 32, Linear;
    R8G8B8A8UnormSrgb = 29, 32, Linear;
    R16G16Float = 34, 32, Linear;
    R32Float = 41, 32, Linear;
    R8G8Unorm = 49, 16, Linear;
    R16Float = 54, 16, Linear;
    R8Unorm = 61, 8, Linear;
    A8Unorm = 65, 8, Linear;
    /// DXT1
    Bc1Unorm = 71, 4, Block;
    Bc1UnormSrgb = 72, 4, Block;
    /// DXT3
    Bc2Unorm = 74, 8, Block;
    Bc2UnormSrgb = 75, 8, Block;
    /// DXT5
    Bc3Unorm = 77, 8, Block;
    Bc3UnormSrgb = 78, 8, Block;
    Bc4Unorm = 80, 4, Block;
    Bc4Snorm = 81, 4, Block;
    Bc5Unorm = 83, 8, Block;
    Bc5Snorm = 84, 8, Block;
    B5G6R5Unorm = 85, 16, Linear;
    B5G5R5A1Unorm = 86, 16, Linear;
    B8G8R8A8Unorm = 87, 32, Linear;
    B8G8R8X8Unorm = 88, 32, Linear;
    B8G8R8A8UnormSrgb = 91, 32, Linear;
    Bc6hUf16 = 95, 8, Block;
    Bc6hSf16 = 96, 8, Block;
    Bc7Unorm = 98, 8, Block;
    Bc7UnormSrgb = 99, 8, Block;
}

impl DxgiFormat {
    pub const fn is_block_compressed(self) -> bool {
        matches!(self.kind(), FormatKind::Block)
    }

    /// Size of a 4x4 block in bytes: 8 for the BC1 and BC4 families, 16 for every other block
    /// compressed format. [`None`] for uncompressed formats.
    pub const fn bytes_per_block(self) -> Option<u32> {
        match self.kind() {
            FormatKind::Block => Some(self.bits_per_pixel() * 16 / 8),
            FormatKind::Linear => None,
        }
    }

    /// Resolves the format of a legacy (non-DX10) pixel format descriptor.
    ///
    /// Known four character codes map to block compressed formats. Anything else falls back to
    /// inspecting the 32-bit channel masks, and if those aren't recognized either, to
    /// [`DxgiFormat::R8G8B8A8Unorm`]. DX10 descriptors have no legacy format and resolve to
    /// [`None`], the extended header has to be consulted instead.
    ///
    /// ```
    /// # use texstream_dds::{DxgiFormat, DdsPixelFormat};
    /// # use texstream_utils::fourcc;
    /// let dxt5 = DdsPixelFormat::from_fourcc(fourcc("DXT5"));
    /// assert_eq!(DxgiFormat::from_pixel_format(&dxt5), Some(DxgiFormat::Bc3Unorm));
    ///
    /// let bgra = DdsPixelFormat::BGRA8;
    /// assert_eq!(DxgiFormat::from_pixel_format(&bgra), Some(DxgiFormat::B8G8R8A8Unorm));
    ///
    /// let dx10 = DdsPixelFormat::from_fourcc(fourcc("DX10"));
    /// assert_eq!(DxgiFormat::from_pixel_format(&dx10), None);
    /// ```
    pub fn from_pixel_format(pf: &DdsPixelFormat) -> Option<Self> {
        const DXT1: u32 = fourcc("DXT1");
        const DXT3: u32 = fourcc("DXT3");
        const DXT5: u32 = fourcc("DXT5");
        const BC4U: u32 = fourcc("BC4U");
        const BC5U: u32 = fourcc("BC5U");

        match pf.fourcc() {
            Some(DXT1) => return Some(DxgiFormat::Bc1Unorm),
            Some(DXT3) => return Some(DxgiFormat::Bc2Unorm),
            Some(DXT5) => return Some(DxgiFormat::Bc3Unorm),
            Some(BC4U) => return Some(DxgiFormat::Bc4Unorm),
            Some(BC5U) => return Some(DxgiFormat::Bc5Unorm),
            Some(crate::FOURCC_DX10) => return None,
            // Unrecognized codes fall through to the mask checks
            _ => {}
        }

        if pf.rgb_bit_count == 32 {
            match pf.masks() {
                [0x000000ff, 0x0000ff00, 0x00ff0000, 0xff000000] => {
                    return Some(DxgiFormat::R8G8B8A8Unorm)
                }
                [0x00ff0000, 0x0000ff00, 0x000000ff, 0xff000000] => {
                    return Some(DxgiFormat::B8G8R8A8Unorm)
                }
                _ => {}
            }
        }

        Some(DxgiFormat::R8G8B8A8Unorm)
    }
}

impl From<DxgiFormat> for u32 {
    fn from(value: DxgiFormat) -> Self {
        value as u32
    }
}

impl Display for DxgiFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::PixelFormatFlags;

    #[test]
    pub fn raw_values_round_trip_through_the_table() {
        for &format in DxgiFormat::ALL {
            assert_eq!(DxgiFormat::try_from(u32::from(format)), Ok(format));
        }
        assert_eq!(DxgiFormat::try_from(0), Err(EnumParseError(0)));
        assert_eq!(DxgiFormat::try_from(70), Err(EnumParseError(70)));
    }

    #[test]
    pub fn block_sizes() {
        use DxgiFormat::*;
        for format in [Bc1Unorm, Bc1UnormSrgb, Bc4Unorm, Bc4Snorm] {
            assert_eq!(format.bytes_per_block(), Some(8), "{format}");
        }
        for format in [Bc2Unorm, Bc3Unorm, Bc5Snorm, Bc6hUf16, Bc7UnormSrgb] {
            assert_eq!(format.bytes_per_block(), Some(16), "{format}");
        }
        assert_eq!(R8G8B8A8Unorm.bytes_per_block(), None);
        assert!(!B5G6R5Unorm.is_block_compressed());
    }

    #[test]
    pub fn legacy_fourcc_table() {
        let resolve = |code: &str| DxgiFormat::from_pixel_format(&DdsPixelFormat::from_fourcc(fourcc(code)));
        assert_eq!(resolve("DXT1"), Some(DxgiFormat::Bc1Unorm));
        assert_eq!(resolve("DXT3"), Some(DxgiFormat::Bc2Unorm));
        assert_eq!(resolve("BC4U"), Some(DxgiFormat::Bc4Unorm));
        assert_eq!(resolve("BC5U"), Some(DxgiFormat::Bc5Unorm));
        // Unknown codes with no masks end up at the default
        assert_eq!(resolve("ATI2"), Some(DxgiFormat::R8G8B8A8Unorm));
    }

    #[test]
    pub fn fourcc_is_ignored_without_its_flag() {
        let mut pf = DdsPixelFormat::BGRA8;
        pf.fourcc = fourcc("DXT1");
        assert_eq!(DxgiFormat::from_pixel_format(&pf), Some(DxgiFormat::B8G8R8A8Unorm));

        pf.flags |= PixelFormatFlags::FOURCC;
        assert_eq!(DxgiFormat::from_pixel_format(&pf), Some(DxgiFormat::Bc1Unorm));
    }

    #[test]
    pub fn unknown_masks_default_to_rgba() {
        let pf = DdsPixelFormat::masked(32, 0x3ff, 0xffc00, 0x3ff00000, 0xc0000000);
        assert_eq!(DxgiFormat::from_pixel_format(&pf), Some(DxgiFormat::R8G8B8A8Unorm));

        let pf = DdsPixelFormat::masked(16, 0xf800, 0x7e0, 0x1f, 0);
        assert_eq!(DxgiFormat::from_pixel_format(&pf), Some(DxgiFormat::R8G8B8A8Unorm));
    }
}
