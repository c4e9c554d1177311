use crate::{
    mip_extent, DdsError, DdsHeader, DdsHeaderDxt10, DxgiFormat, ResourceDimension, SurfaceInfo,
    DDS_MAGIC, DX10_HEADER_SIZE, HEADER_SIZE, MAGIC_SIZE,
};
use log::*;
use texstream_utils::{packed::PackedData, AsciiDisplay};

/// Decoded DDS file, borrowing the buffer it was decoded from.
#[derive(Debug, Clone)]
pub struct DdsContainer<'a> {
    pub header: DdsHeader,
    pub dx10: Option<DdsHeaderDxt10>,
    pub format: DxgiFormat,
    pub width: u32,
    pub height: u32,
    /// At least 1, even if the header declares 0.
    pub mip_count: u32,
    data_offset: usize,
    subresources: Vec<SubresourceView<'a>>,
    bytes: &'a [u8],
}

impl<'a> DdsContainer<'a> {
    /// Views of all mip levels, largest first.
    pub fn subresources(&self) -> &[SubresourceView<'a>] {
        &self.subresources
    }

    /// Offset of the first pixel byte, right after the magic and all headers.
    pub fn data_offset(&self) -> usize {
        self.data_offset
    }

    /// The whole buffer passed to [`decode`].
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Amount of bytes after the last mip level. Those are ignored.
    pub fn trailing_bytes(&self) -> usize {
        let end = self
            .subresources
            .last()
            .map(|view| view.offset + view.data.len())
            .unwrap_or(self.data_offset);
        self.bytes.len() - end
    }

    pub fn resource_dimension(&self) -> Option<ResourceDimension> {
        self.dx10.map(|dx10| dx10.resource_dimension)
    }

    pub fn array_size(&self) -> Option<u32> {
        self.dx10.map(|dx10| dx10.array_size)
    }
}

/// Pixel data of a single mip level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceView<'a> {
    pub mip_level: u32,
    pub width: u32,
    pub height: u32,
    /// Offset of `data` within the decoded buffer.
    pub offset: usize,
    pub data: &'a [u8],
    pub row_pitch: usize,
    pub slice_pitch: usize,
}

impl<'a> SubresourceView<'a> {
    /// Amount of rows, block rows for block compressed formats.
    pub fn num_rows(&self) -> usize {
        if self.row_pitch == 0 {
            0
        } else {
            self.slice_pitch / self.row_pitch
        }
    }

    /// Iterates over the rows of the level.
    pub fn rows(&self) -> impl Iterator<Item = &'a [u8]> {
        self.data.chunks_exact(self.row_pitch.max(1))
    }
}

/// Decodes a DDS file held in memory. No pixel data is copied.
///
/// Only the first surface of array textures and cubemaps is described by the returned views.
pub fn decode(bytes: &[u8]) -> Result<DdsContainer<'_>, DdsError> {
    const MIN_SIZE: usize = MAGIC_SIZE + HEADER_SIZE;

    if bytes.len() < MIN_SIZE {
        return Err(DdsError::TooShort {
            what: "DDS header",
            len: bytes.len(),
            required: MIN_SIZE,
        });
    }

    let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if magic != DDS_MAGIC {
        return Err(DdsError::BadMagic(AsciiDisplay::from_fourcc(magic)));
    }

    let header = DdsHeader::from_packed_bytes(&bytes[MAGIC_SIZE..]).map_err(DdsError::Header)?;
    if header.size as usize != HEADER_SIZE {
        warn!("DDS header declares size {}, expected {HEADER_SIZE}", header.size);
    }

    let (format, dx10, data_offset) = if header.pixel_format.has_dx10_header() {
        let required = MIN_SIZE + DX10_HEADER_SIZE;
        if bytes.len() < required {
            return Err(DdsError::TooShort {
                what: "DX10 header",
                len: bytes.len(),
                required,
            });
        }

        let dx10 = DdsHeaderDxt10::from_packed_bytes(&bytes[MIN_SIZE..])
            .map_err(DdsError::Header)?;
        let format = DxgiFormat::try_from(dx10.dxgi_format)
            .map_err(|_| DdsError::UnknownDxgiFormat(dx10.dxgi_format))?;
        if dx10.array_size > 1 || dx10.is_cubemap() {
            debug!("DDS file has multiple surfaces, only the first one is used");
        }
        (format, Some(dx10), required)
    } else {
        // Legacy headers always resolve to something, the DX10 case is handled above
        let format = DxgiFormat::from_pixel_format(&header.pixel_format)
            .unwrap_or(DxgiFormat::R8G8B8A8Unorm);
        (format, None, MIN_SIZE)
    };

    let mip_count = header.mip_map_count.max(1);
    let mut subresources = Vec::with_capacity(mip_count as usize);
    let mut cursor = data_offset as u64;

    for mip in 0..mip_count {
        let width = mip_extent(header.width, mip);
        let height = mip_extent(header.height, mip);
        let info = SurfaceInfo::compute(format, width, height).ok_or(DdsError::Overflow { mip })?;

        let end = cursor
            .checked_add(info.slice_pitch)
            .ok_or(DdsError::Overflow { mip })?;
        if end > bytes.len() as u64 {
            return Err(DdsError::Truncated {
                mip,
                required: end,
                available: bytes.len(),
            });
        }

        // Both fit in usize, since they're bounded by the buffer length
        let (start, end_index) = (cursor as usize, end as usize);
        subresources.push(SubresourceView {
            mip_level: mip,
            width,
            height,
            offset: start,
            data: &bytes[start..end_index],
            row_pitch: info.row_pitch as usize,
            slice_pitch: info.slice_pitch as usize,
        });

        cursor = end;
    }

    trace!(
        "Decoded DDS {}x{} {format} with {mip_count} mips",
        header.width,
        header.height
    );

    Ok(DdsContainer {
        width: header.width,
        height: header.height,
        header,
        dx10,
        format,
        mip_count,
        data_offset,
        subresources,
        bytes,
    })
}
