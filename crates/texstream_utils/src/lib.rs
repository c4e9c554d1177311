//! Various utilities shared by the texstream crates

pub mod packed;

mod pool;
pub use pool::*;

mod ascii_display;
pub use ascii_display::*;

mod wait_event;
pub use wait_event::WaitEvent;

pub type AnyResult<T = (), E = anyhow::Error> = anyhow::Result<T, E>;

/// Shorthand for `Ok(())`, cause it looks ugly
pub const fn ok<E>() -> Result<(), E> {
    Ok(())
}

/// Aligns the value. Alignment doesn't have to be a power of two.
///
/// ```
/// use texstream_utils::align;
/// assert_eq!(16, align(10, 8));
/// assert_eq!(512, align(512, 512));
/// ```
pub const fn align(n: u64, a: u64) -> u64 {
    (n + a - 1) / a * a
}

/// Converts a 4-byte string into a four character code (little endian), the way DDS headers
/// store them.
///
/// ## Example
/// ```
/// use texstream_utils::fourcc;
/// assert_eq!(fourcc("DXT3"), 0x33545844);
/// assert_eq!(fourcc("DDS "), 0x20534444);
/// ```
///
/// ## Panics
/// Panics if the string isn't exactly 4 bytes long. Used in constant contexts, so this is a
/// compile error most of the time.
pub const fn fourcc(s: &str) -> u32 {
    if s.len() == 4 {
        let bytes = s.as_bytes();
        let mut result = 0u32;
        result |= (bytes[0] as u32) << 0;
        result |= (bytes[1] as u32) << 8;
        result |= (bytes[2] as u32) << 16;
        result |= (bytes[3] as u32) << 24;
        result
    } else {
        panic!("Invalid four character code length");
    }
}

/// Error returned by `TryFrom` conversions of raw enum values, like DXGI format numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid enum value {0:#x}")]
pub struct EnumParseError(pub u32);
