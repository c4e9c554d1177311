//! Pitch math of a single 2D surface

use crate::DxgiFormat;

/// Memory layout of one 2D surface (a mip level) of a given format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    /// Bytes between the starts of two consecutive rows. For block compressed formats a "row" is
    /// a row of 4x4 blocks.
    pub row_pitch: u64,
    /// Bytes of the entire surface.
    pub slice_pitch: u64,
    /// Amount of rows, as defined above.
    pub num_rows: u32,
}

impl SurfaceInfo {
    /// Computes the layout of a tightly packed `width` x `height` surface. Returns [`None`] if
    /// any of the results doesn't fit in 64 bits.
    ///
    /// ```
    /// # use texstream_dds::{DxgiFormat, SurfaceInfo};
    /// // A single BC1 block
    /// let info = SurfaceInfo::compute(DxgiFormat::Bc1Unorm, 4, 4).unwrap();
    /// assert_eq!((info.row_pitch, info.slice_pitch, info.num_rows), (8, 8, 1));
    ///
    /// // Sizes under 4 pixels still take up a whole block
    /// let info = SurfaceInfo::compute(DxgiFormat::Bc3Unorm, 1, 2).unwrap();
    /// assert_eq!((info.row_pitch, info.slice_pitch), (16, 16));
    /// ```
    pub fn compute(format: DxgiFormat, width: u32, height: u32) -> Option<Self> {
        let width = u64::from(width);
        let height = u64::from(height);

        match format.bytes_per_block() {
            Some(block_size) => {
                let blocks_wide = width.div_ceil(4).max(1);
                let blocks_high = height.div_ceil(4).max(1);
                let row_pitch = blocks_wide.checked_mul(u64::from(block_size))?;
                Some(Self {
                    row_pitch,
                    slice_pitch: row_pitch.checked_mul(blocks_high)?,
                    num_rows: u32::try_from(blocks_high).ok()?,
                })
            }
            None => {
                let bits = width.checked_mul(u64::from(format.bits_per_pixel()))?;
                let row_pitch = bits.div_ceil(8);
                Some(Self {
                    row_pitch,
                    slice_pitch: row_pitch.checked_mul(height)?,
                    num_rows: u32::try_from(height).ok()?,
                })
            }
        }
    }
}

/// Size of a dimension at the given mip level, never less than 1.
///
/// ```
/// # use texstream_dds::mip_extent;
/// assert_eq!(mip_extent(256, 0), 256);
/// assert_eq!(mip_extent(256, 3), 32);
/// assert_eq!(mip_extent(5, 1), 2);
/// assert_eq!(mip_extent(5, 40), 1);
/// ```
pub fn mip_extent(size: u32, level: u32) -> u32 {
    size.checked_shr(level).unwrap_or(0).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn uncompressed_pitches() {
        let info = SurfaceInfo::compute(DxgiFormat::R8G8B8A8Unorm, 256, 256).unwrap();
        assert_eq!(info.row_pitch, 1024);
        assert_eq!(info.slice_pitch, 262144);
        assert_eq!(info.num_rows, 256);

        // 3 pixels of 16 bits
        let info = SurfaceInfo::compute(DxgiFormat::B5G6R5Unorm, 3, 1).unwrap();
        assert_eq!(info.row_pitch, 6);

        let info = SurfaceInfo::compute(DxgiFormat::R32G32B32A32Float, 2, 3).unwrap();
        assert_eq!((info.row_pitch, info.slice_pitch), (32, 96));
    }

    #[test]
    pub fn block_pitches_round_up() {
        let info = SurfaceInfo::compute(DxgiFormat::Bc1Unorm, 10, 6).unwrap();
        // 3 x 2 blocks of 8 bytes
        assert_eq!(info.row_pitch, 24);
        assert_eq!(info.slice_pitch, 48);
        assert_eq!(info.num_rows, 2);

        let info = SurfaceInfo::compute(DxgiFormat::Bc7Unorm, 1, 1).unwrap();
        assert_eq!((info.row_pitch, info.slice_pitch, info.num_rows), (16, 16, 1));
    }

    #[test]
    pub fn huge_surfaces() {
        // 2^36 byte rows still fit
        let info = SurfaceInfo::compute(DxgiFormat::R32G32B32A32Float, u32::MAX, 1).unwrap();
        assert_eq!(info.row_pitch, u64::from(u32::MAX) * 16);
        assert_eq!(info.slice_pitch, info.row_pitch);
        assert_eq!(info.num_rows, 1);

        // A 2^68 byte slice doesn't
        let info = SurfaceInfo::compute(DxgiFormat::R32G32B32A32Float, u32::MAX, u32::MAX);
        assert!(info.is_none());
    }

    #[test]
    pub fn extents_never_reach_zero() {
        for level in 0..40 {
            assert!(mip_extent(1000, level) >= 1);
        }
        assert_eq!(mip_extent(u32::MAX, 31), 1);
        assert_eq!(mip_extent(u32::MAX, 32), 1);
    }
}
