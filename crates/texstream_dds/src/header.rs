use bitflags::bitflags;
use std::io::{Read, Write};
use texstream_utils::{
    fourcc, ok,
    packed::{PackedData, PackedReadExt, PackedWriteExt},
    AnyResult,
};

/// `"DDS "` as a little endian integer.
pub const DDS_MAGIC: u32 = fourcc("DDS ");

/// Four character code signaling the presence of a [`DdsHeaderDxt10`].
pub const FOURCC_DX10: u32 = fourcc("DX10");

pub const MAGIC_SIZE: usize = 4;
pub const HEADER_SIZE: usize = DdsHeader::PACKED_SIZE;
pub const DX10_HEADER_SIZE: usize = DdsHeaderDxt10::PACKED_SIZE;

bitflags! {
    /// `DDSD_*` flags, telling which header fields are meaningful.
    pub struct HeaderFlags: u32 {
        const CAPS = 0x1;
        const HEIGHT = 0x2;
        const WIDTH = 0x4;
        const PITCH = 0x8;
        const PIXEL_FORMAT = 0x1000;
        const MIPMAP_COUNT = 0x20000;
        const LINEAR_SIZE = 0x80000;
        const DEPTH = 0x800000;
    }
}

bitflags! {
    /// `DDPF_*` flags of the pixel format descriptor.
    pub struct PixelFormatFlags: u32 {
        const ALPHA_PIXELS = 0x1;
        const ALPHA = 0x2;
        const FOURCC = 0x4;
        const RGB = 0x40;
        const YUV = 0x200;
        const LUMINANCE = 0x20000;
    }
}

bitflags! {
    /// `DDSCAPS_*` flags.
    pub struct Caps: u32 {
        const COMPLEX = 0x8;
        const TEXTURE = 0x1000;
        const MIPMAP = 0x400000;
    }
}

bitflags! {
    /// `DDSCAPS2_*` flags.
    pub struct Caps2: u32 {
        const CUBEMAP = 0x200;
        const VOLUME = 0x200000;
    }
}

/// Pixel format descriptor embedded in the [`DdsHeader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdsPixelFormat {
    pub size: u32,
    pub flags: PixelFormatFlags,
    pub fourcc: u32,
    pub rgb_bit_count: u32,
    pub r_mask: u32,
    pub g_mask: u32,
    pub b_mask: u32,
    pub a_mask: u32,
}

impl DdsPixelFormat {
    /// 32-bit RGBA, red in the lowest byte.
    pub const RGBA8: Self = Self::masked(32, 0x000000ff, 0x0000ff00, 0x00ff0000, 0xff000000);
    /// 32-bit BGRA, blue in the lowest byte.
    pub const BGRA8: Self = Self::masked(32, 0x00ff0000, 0x0000ff00, 0x000000ff, 0xff000000);

    /// Descriptor identified by a four character code, like `DXT1` or `DX10`.
    pub const fn from_fourcc(code: u32) -> Self {
        Self {
            size: 32,
            flags: PixelFormatFlags::FOURCC,
            fourcc: code,
            rgb_bit_count: 0,
            r_mask: 0,
            g_mask: 0,
            b_mask: 0,
            a_mask: 0,
        }
    }

    /// Uncompressed descriptor identified by its channel masks.
    pub const fn masked(bit_count: u32, r: u32, g: u32, b: u32, a: u32) -> Self {
        Self {
            size: 32,
            flags: PixelFormatFlags::from_bits_truncate(
                PixelFormatFlags::RGB.bits() | PixelFormatFlags::ALPHA_PIXELS.bits(),
            ),
            fourcc: 0,
            rgb_bit_count: bit_count,
            r_mask: r,
            g_mask: g,
            b_mask: b,
            a_mask: a,
        }
    }

    /// Returns the four character code, if the descriptor is flagged as using one.
    pub fn fourcc(&self) -> Option<u32> {
        self.flags
            .contains(PixelFormatFlags::FOURCC)
            .then_some(self.fourcc)
    }

    pub fn has_dx10_header(&self) -> bool {
        self.fourcc() == Some(FOURCC_DX10)
    }

    pub fn masks(&self) -> [u32; 4] {
        [self.r_mask, self.g_mask, self.b_mask, self.a_mask]
    }
}

impl PackedData for DdsPixelFormat {
    const PACKED_SIZE: usize = 32;

    fn read_packed<R: Read>(r: &mut R) -> AnyResult<Self> {
        Ok(Self {
            size: r.read_packed()?,
            flags: PixelFormatFlags::from_bits_truncate(r.read_packed()?),
            fourcc: r.read_packed()?,
            rgb_bit_count: r.read_packed()?,
            r_mask: r.read_packed()?,
            g_mask: r.read_packed()?,
            b_mask: r.read_packed()?,
            a_mask: r.read_packed()?,
        })
    }

    fn write_packed<W: Write>(&self, w: &mut W) -> AnyResult {
        w.write_packed(&self.size)?;
        w.write_packed(&self.flags.bits())?;
        w.write_packed(&self.fourcc)?;
        w.write_packed(&self.rgb_bit_count)?;
        w.write_packed(&self.masks())?;
        ok()
    }
}

/// The primary DDS header, following the magic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DdsHeader {
    pub size: u32,
    pub flags: HeaderFlags,
    pub height: u32,
    pub width: u32,
    pub pitch_or_linear_size: u32,
    pub depth: u32,
    pub mip_map_count: u32,
    pub reserved1: [u32; 11],
    pub pixel_format: DdsPixelFormat,
    pub caps: Caps,
    pub caps2: Caps2,
    pub caps3: u32,
    pub caps4: u32,
    pub reserved2: u32,
}

impl DdsHeader {
    /// Creates a header of a plain 2D texture. `mip_map_count` is stored as given, so 0 is
    /// allowed and means a single level.
    pub fn new_2d(width: u32, height: u32, mip_map_count: u32, pixel_format: DdsPixelFormat) -> Self {
        let mut flags = HeaderFlags::CAPS
            | HeaderFlags::WIDTH
            | HeaderFlags::HEIGHT
            | HeaderFlags::PIXEL_FORMAT;
        let mut caps = Caps::TEXTURE;
        if mip_map_count > 1 {
            flags |= HeaderFlags::MIPMAP_COUNT;
            caps |= Caps::COMPLEX | Caps::MIPMAP;
        }

        Self {
            size: 124,
            flags,
            height,
            width,
            pitch_or_linear_size: 0,
            depth: 0,
            mip_map_count,
            reserved1: [0; 11],
            pixel_format,
            caps,
            caps2: Caps2::empty(),
            caps3: 0,
            caps4: 0,
            reserved2: 0,
        }
    }
}

impl PackedData for DdsHeader {
    const PACKED_SIZE: usize = 124;

    fn read_packed<R: Read>(r: &mut R) -> AnyResult<Self> {
        Ok(Self {
            size: r.read_packed()?,
            flags: HeaderFlags::from_bits_truncate(r.read_packed()?),
            height: r.read_packed()?,
            width: r.read_packed()?,
            pitch_or_linear_size: r.read_packed()?,
            depth: r.read_packed()?,
            mip_map_count: r.read_packed()?,
            reserved1: r.read_packed()?,
            pixel_format: r.read_packed()?,
            caps: Caps::from_bits_truncate(r.read_packed()?),
            caps2: Caps2::from_bits_truncate(r.read_packed()?),
            caps3: r.read_packed()?,
            caps4: r.read_packed()?,
            reserved2: r.read_packed()?,
        })
    }

    fn write_packed<W: Write>(&self, w: &mut W) -> AnyResult {
        w.write_packed(&self.size)?;
        w.write_packed(&self.flags.bits())?;
        w.write_packed(&self.height)?;
        w.write_packed(&self.width)?;
        w.write_packed(&self.pitch_or_linear_size)?;
        w.write_packed(&self.depth)?;
        w.write_packed(&self.mip_map_count)?;
        w.write_packed(&self.reserved1)?;
        w.write_packed(&self.pixel_format)?;
        w.write_packed(&self.caps.bits())?;
        w.write_packed(&self.caps2.bits())?;
        w.write_packed(&self.caps3)?;
        w.write_packed(&self.caps4)?;
        w.write_packed(&self.reserved2)?;
        ok()
    }
}

/// `D3D10_RESOURCE_DIMENSION` values stored in the extended header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceDimension {
    Unknown,
    Buffer,
    Texture1D,
    Texture2D,
    Texture3D,
    Other(u32),
}

impl From<u32> for ResourceDimension {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Unknown,
            1 => Self::Buffer,
            2 => Self::Texture1D,
            3 => Self::Texture2D,
            4 => Self::Texture3D,
            other => Self::Other(other),
        }
    }
}

impl From<ResourceDimension> for u32 {
    fn from(value: ResourceDimension) -> Self {
        match value {
            ResourceDimension::Unknown => 0,
            ResourceDimension::Buffer => 1,
            ResourceDimension::Texture1D => 2,
            ResourceDimension::Texture2D => 3,
            ResourceDimension::Texture3D => 4,
            ResourceDimension::Other(other) => other,
        }
    }
}

/// `DDS_RESOURCE_MISC_TEXTURECUBE`
pub const MISC_TEXTURE_CUBE: u32 = 0x4;

/// Extended header, present when the pixel format's four character code is `DX10`.
///
/// The DXGI format is kept as a raw number, as files may legally contain formats this crate
/// knows nothing about. Resolution happens in [`crate::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdsHeaderDxt10 {
    pub dxgi_format: u32,
    pub resource_dimension: ResourceDimension,
    pub misc_flag: u32,
    pub array_size: u32,
    pub misc_flags2: u32,
}

impl DdsHeaderDxt10 {
    pub fn new_2d(dxgi_format: u32) -> Self {
        Self {
            dxgi_format,
            resource_dimension: ResourceDimension::Texture2D,
            misc_flag: 0,
            array_size: 1,
            misc_flags2: 0,
        }
    }

    pub fn is_cubemap(&self) -> bool {
        self.misc_flag & MISC_TEXTURE_CUBE != 0
    }
}

impl PackedData for DdsHeaderDxt10 {
    const PACKED_SIZE: usize = 20;

    fn read_packed<R: Read>(r: &mut R) -> AnyResult<Self> {
        Ok(Self {
            dxgi_format: r.read_packed()?,
            resource_dimension: r.read_packed::<u32>()?.into(),
            misc_flag: r.read_packed()?,
            array_size: r.read_packed()?,
            misc_flags2: r.read_packed()?,
        })
    }

    fn write_packed<W: Write>(&self, w: &mut W) -> AnyResult {
        w.write_packed(&self.dxgi_format)?;
        w.write_packed(&u32::from(self.resource_dimension))?;
        w.write_packed(&self.misc_flag)?;
        w.write_packed(&self.array_size)?;
        w.write_packed(&self.misc_flags2)?;
        ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn header_sizes_match_the_format() {
        assert_eq!(HEADER_SIZE, 124);
        assert_eq!(DX10_HEADER_SIZE, 20);
        assert_eq!(DdsPixelFormat::PACKED_SIZE, 32);

        let header = DdsHeader::new_2d(64, 32, 7, DdsPixelFormat::from_fourcc(fourcc("DXT1")));
        assert_eq!(header.to_packed_bytes().unwrap().len(), HEADER_SIZE);
    }

    #[test]
    pub fn header_fields_land_at_their_offsets() {
        let header = DdsHeader::new_2d(640, 480, 3, DdsPixelFormat::BGRA8);
        let bytes = header.to_packed_bytes().unwrap();
        let word = |offset: usize| u32::from_packed_bytes(&bytes[offset..]).unwrap();

        assert_eq!(word(0), 124);
        assert_eq!(word(8), 480);
        assert_eq!(word(12), 640);
        assert_eq!(word(24), 3);
        // Pixel format starts at 72, its masks at 88
        assert_eq!(word(72), 32);
        assert_eq!(word(84), 32);
        assert_eq!(word(88), 0x00ff0000);

        assert_eq!(DdsHeader::from_packed_bytes(&bytes).unwrap(), header);
    }

    #[test]
    pub fn dx10_flag_requires_fourcc_bit() {
        let mut format = DdsPixelFormat::from_fourcc(FOURCC_DX10);
        assert!(format.has_dx10_header());

        format.flags = PixelFormatFlags::RGB;
        assert!(!format.has_dx10_header());
        assert_eq!(format.fourcc(), None);
    }
}
