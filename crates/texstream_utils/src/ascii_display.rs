use crate::ok;
use std::fmt::{self, Display};

/// Wrapper type for displaying byte buffers that contain all, or mostly all ASCII text, such as
/// four character codes or file magics. Any non-ASCII bytes are displayed as `\xNN` where `NN` is
/// their hex code. `\` is reinterpreted as `\\`.
///
/// ## Example
/// ```
/// # use texstream_utils::AsciiDisplay;
/// assert_eq!(AsciiDisplay(b"DXT1").to_string(), "DXT1");
/// assert_eq!(AsciiDisplay(b"DDS\x00").to_string(), "DDS\\x00");
/// assert_eq!(AsciiDisplay::from_fourcc(0x20534444).to_string(), "DDS\\x20");
/// ```
pub struct AsciiDisplay<'a>(pub &'a [u8]);

impl AsciiDisplay<'static> {
    /// Displays a little endian four character code.
    pub fn from_fourcc(code: u32) -> FourCcDisplay {
        FourCcDisplay(code.to_le_bytes())
    }
}

impl<'a> From<&'a [u8]> for AsciiDisplay<'a> {
    fn from(value: &'a [u8]) -> Self {
        Self(value)
    }
}

impl<'a> Display for AsciiDisplay<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in self.0 {
            if byte == b'\\' {
                write!(f, "\\\\")?;
            } else if byte.is_ascii_graphic() {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, r"\x{byte:02X}")?;
            }
        }
        ok()
    }
}

/// Owned variant of [`AsciiDisplay`] for four character codes, see [`AsciiDisplay::from_fourcc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCcDisplay(pub [u8; 4]);

impl Display for FourCcDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        AsciiDisplay(&self.0).fmt(f)
    }
}
