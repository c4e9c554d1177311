//! Decoder of DDS texture containers
//!
//! ## Introduction
//! DDS ("DirectDraw Surface") is the container format Direct3D-style pipelines use for textures
//! that are ready to be uploaded as-is: the pixel data is stored in the exact layout the GPU
//! expects, including any block compression, so loading a texture is mostly a matter of finding
//! where each mip level starts.
//!
//! ## Layout
//! Everything is little endian. Here's a pseudocode definition of the file:
//! ```c
//! struct DdsFile {
//!     u32 magic;               // "DDS " (0x20534444)
//!     DdsHeader header;        // 124 bytes
//!     DdsHeaderDxt10 dx10;     // 20 bytes, only if header.pixel_format.fourcc == "DX10"
//!     u8  data[];              // mip levels, largest first, no padding in between
//! }
//!
//! struct DdsHeader {
//!     u32 size;                // 124
//!     u32 flags;
//!     u32 height;
//!     u32 width;
//!     u32 pitch_or_linear_size;
//!     u32 depth;
//!     u32 mip_map_count;       // 0 means there's just one level
//!     u32 reserved1[11];
//!     DdsPixelFormat pixel_format;
//!     u32 caps, caps2, caps3, caps4;
//!     u32 reserved2;
//! }
//!
//! struct DdsPixelFormat {
//!     u32 size;                // 32
//!     u32 flags;
//!     u32 fourcc;
//!     u32 rgb_bit_count;
//!     u32 r_mask, g_mask, b_mask, a_mask;
//! }
//!
//! struct DdsHeaderDxt10 {
//!     u32 dxgi_format;
//!     u32 resource_dimension;
//!     u32 misc_flag;
//!     u32 array_size;
//!     u32 misc_flags2;
//! }
//! ```
//!
//! ## Formats
//! Legacy files describe their pixel format with a four character code (`DXT1`, `DXT5`, ...) or
//! with channel bit masks. Newer files set the four character code to `DX10` and store an
//! explicit DXGI format number in the extended header. See [`DxgiFormat::from_pixel_format`] for
//! the exact resolution rules.
//!
//! ## Decoding
//! [`decode`] doesn't copy any pixel data. The returned [`DdsContainer`] borrows the input buffer
//! and exposes one [`SubresourceView`] per mip level.
//!
//! ```
//! use texstream_dds::{decode, DdsHeader, DdsPixelFormat, DxgiFormat, DDS_MAGIC};
//! use texstream_utils::packed::PackedData;
//!
//! let header = DdsHeader::new_2d(8, 8, 2, DdsPixelFormat::RGBA8);
//! let mut file = DDS_MAGIC.to_le_bytes().to_vec();
//! file.extend(header.to_packed_bytes().unwrap());
//! file.extend([0u8; 8 * 8 * 4 + 4 * 4 * 4]);
//!
//! let container = decode(&file).unwrap();
//! assert_eq!(container.format, DxgiFormat::R8G8B8A8Unorm);
//! assert_eq!(container.subresources().len(), 2);
//! assert_eq!(container.subresources()[1].row_pitch, 16);
//! ```

pub mod container;
pub mod error;
pub mod format;
pub mod header;
pub mod surface;

#[doc(inline)]
pub use container::{decode, DdsContainer, SubresourceView};
#[doc(inline)]
pub use error::DdsError;
#[doc(inline)]
pub use format::DxgiFormat;
#[doc(inline)]
pub use header::*;
#[doc(inline)]
pub use surface::{mip_extent, SurfaceInfo};
