use super::{DeviceError, ResourceDesc, ResourceKind};
use texstream_dds::{mip_extent, DxgiFormat, SurfaceInfo};
use texstream_utils::align;

/// Required alignment of a row pitch in buffer to texture copies.
pub const TEXTURE_DATA_PITCH_ALIGNMENT: u64 = 256;

/// Required alignment of a subresource's offset in buffer to texture copies.
pub const TEXTURE_DATA_PLACEMENT_ALIGNMENT: u64 = 512;

/// Shape of a single subresource inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceFootprint {
    pub format: DxgiFormat,
    /// Width in texels. Rounded up to whole blocks for block compressed formats.
    pub width: u32,
    /// Height in texels. Rounded up to whole blocks for block compressed formats.
    pub height: u32,
    pub row_pitch: u32,
}

/// A [`SubresourceFootprint`] placed at an offset of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedFootprint {
    pub offset: u64,
    pub footprint: SubresourceFootprint,
}

/// Result of [`copyable_footprints`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyableFootprints {
    pub layouts: Vec<PlacedFootprint>,
    /// Row counts (block rows for block compressed formats) of each subresource.
    pub num_rows: Vec<u32>,
    /// Unpadded byte size of a single row of each subresource.
    pub row_sizes: Vec<u64>,
    /// Amount of bytes a buffer needs to hold all the subresources.
    pub total_bytes: u64,
}

/// Places subresources `first..first + count` of a 2D texture one after another, with row pitches
/// aligned to [`TEXTURE_DATA_PITCH_ALIGNMENT`] and offsets aligned to
/// [`TEXTURE_DATA_PLACEMENT_ALIGNMENT`].
///
/// ```
/// # use texstream::graphics::{copyable_footprints, ResourceDesc};
/// # use texstream_dds::DxgiFormat;
/// let desc = ResourceDesc::texture_2d(DxgiFormat::R8G8B8A8Unorm, 256, 256, 2);
/// let footprints = copyable_footprints(&desc, 0, 2).unwrap();
///
/// assert_eq!(footprints.layouts[0].footprint.row_pitch, 1024);
/// assert_eq!(footprints.layouts[1].offset, 262144);
/// assert_eq!(footprints.total_bytes, 262144 + 128 * 512);
/// ```
pub fn copyable_footprints(
    desc: &ResourceDesc,
    first: u32,
    count: u32,
) -> Result<CopyableFootprints, DeviceError> {
    let invalid = |message: &str| DeviceError::InvalidDesc(message.to_string());

    if desc.kind != ResourceKind::Texture2D {
        return Err(invalid("footprints can only be computed for textures"));
    }
    let format = desc.format.ok_or_else(|| invalid("texture without a format"))?;
    let width = u32::try_from(desc.width).map_err(|_| invalid("texture too wide"))?;
    let end = first
        .checked_add(count)
        .filter(|&end| end <= desc.mip_levels)
        .ok_or_else(|| invalid("subresource range out of bounds"))?;

    let mut result = CopyableFootprints {
        layouts: Vec::with_capacity(count as usize),
        num_rows: Vec::with_capacity(count as usize),
        row_sizes: Vec::with_capacity(count as usize),
        total_bytes: 0,
    };

    let mut offset = 0;
    for mip in first..end {
        let mip_width = mip_extent(width, mip);
        let mip_height = mip_extent(desc.height, mip);
        let info = SurfaceInfo::compute(format, mip_width, mip_height)
            .ok_or_else(|| invalid("subresource size overflows"))?;

        let row_pitch = align(info.row_pitch, TEXTURE_DATA_PITCH_ALIGNMENT);
        let (footprint_width, footprint_height) = if format.is_block_compressed() {
            (
                align(u64::from(mip_width), 4) as u32,
                align(u64::from(mip_height), 4) as u32,
            )
        } else {
            (mip_width, mip_height)
        };

        offset = align(offset, TEXTURE_DATA_PLACEMENT_ALIGNMENT);
        result.layouts.push(PlacedFootprint {
            offset,
            footprint: SubresourceFootprint {
                format,
                width: footprint_width,
                height: footprint_height,
                row_pitch: u32::try_from(row_pitch).map_err(|_| invalid("row pitch too big"))?,
            },
        });
        result.num_rows.push(info.num_rows);
        result.row_sizes.push(info.row_pitch);

        // The last row doesn't need padding
        result.total_bytes = offset + row_pitch * u64::from(info.num_rows - 1) + info.row_pitch;
        offset += row_pitch * u64::from(info.num_rows);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn offsets_and_pitches_are_aligned() {
        let desc = ResourceDesc::texture_2d(DxgiFormat::R8Unorm, 5, 3, 2);
        let footprints = copyable_footprints(&desc, 0, 2).unwrap();

        let first = footprints.layouts[0];
        assert_eq!(first.offset, 0);
        assert_eq!(first.footprint.row_pitch, 256);
        assert_eq!(footprints.row_sizes[0], 5);
        assert_eq!(footprints.num_rows[0], 3);

        // 3 rows of 256 bytes end at 768, rounded up to the next 512
        let second = footprints.layouts[1];
        assert_eq!(second.offset, 1024);
        assert_eq!((second.footprint.width, second.footprint.height), (2, 1));
        assert_eq!(footprints.total_bytes, 1026);

        for layout in &footprints.layouts {
            assert_eq!(layout.offset % TEXTURE_DATA_PLACEMENT_ALIGNMENT, 0);
            assert_eq!(
                u64::from(layout.footprint.row_pitch) % TEXTURE_DATA_PITCH_ALIGNMENT,
                0
            );
        }
    }

    #[test]
    pub fn block_compressed_chain() {
        let desc = ResourceDesc::texture_2d(DxgiFormat::Bc1Unorm, 8, 8, 4);
        let footprints = copyable_footprints(&desc, 0, 4).unwrap();

        let offsets: Vec<_> = footprints.layouts.iter().map(|l| l.offset).collect();
        assert_eq!(offsets, [0, 512, 1024, 1536]);
        assert_eq!(footprints.num_rows, [2, 1, 1, 1]);
        assert_eq!(footprints.row_sizes, [16, 8, 8, 8]);

        // Sub-block mips still occupy a whole block
        let last = footprints.layouts[3].footprint;
        assert_eq!((last.width, last.height), (4, 4));
        assert_eq!(footprints.total_bytes, 1544);
    }

    #[test]
    pub fn partial_ranges() {
        let desc = ResourceDesc::texture_2d(DxgiFormat::R8G8B8A8Unorm, 64, 64, 3);
        let footprints = copyable_footprints(&desc, 1, 2).unwrap();
        assert_eq!(footprints.layouts[0].footprint.width, 32);
        assert_eq!(footprints.layouts[0].offset, 0);

        assert!(copyable_footprints(&desc, 2, 2).is_err());
        assert!(copyable_footprints(&ResourceDesc::buffer(16), 0, 1).is_err());
    }
}
