use texstream_utils::FourCcDisplay;
use thiserror::Error;

/// Error returned when a DDS container is malformed or uses something unsupported.
#[derive(Error, Debug)]
pub enum DdsError {
    #[error("buffer too short for the {what} ({len} bytes, {required} required)")]
    TooShort {
        what: &'static str,
        len: usize,
        required: usize,
    },

    #[error("invalid magic `{0}`")]
    BadMagic(FourCcDisplay),

    #[error("unknown DXGI format {0}")]
    UnknownDxgiFormat(u32),

    #[error("mip {mip} ends at byte {required}, but the buffer is only {available} bytes long")]
    Truncated {
        mip: u32,
        required: u64,
        available: usize,
    },

    #[error("size of mip {mip} overflows")]
    Overflow { mip: u32 },

    #[error("couldn't parse the header: {0:#}")]
    Header(anyhow::Error),
}
