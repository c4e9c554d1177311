use super::StorageFile;
use crate::graphics::ResourceId;
use parking_lot::Mutex;
use std::sync::Arc;

/// Byte range of a file to read.
#[derive(Debug, Clone)]
pub struct RequestSource {
    pub file: Arc<dyn StorageFile>,
    pub offset: u64,
    pub size: u32,
}

/// Where the bytes of a request end up.
#[derive(Debug, Clone)]
pub enum RequestDestination {
    /// Host memory. The buffer is shared with the queue until the request completes, the first
    /// `size` bytes are overwritten.
    Memory {
        buffer: Arc<Mutex<Vec<u8>>>,
        size: u32,
    },
    /// A device buffer, written at `offset`.
    Buffer {
        resource: ResourceId,
        offset: u64,
        size: u32,
    },
}

impl RequestDestination {
    pub fn size(&self) -> u32 {
        match self {
            RequestDestination::Memory { size, .. } => *size,
            RequestDestination::Buffer { size, .. } => *size,
        }
    }
}

/// A single read, enqueued into a [`super::StorageQueue`]. Requests aren't tracked individually
/// once enqueued, completion is observed through fence signals enqueued after them.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Shows up in error records.
    pub name: String,
    pub source: RequestSource,
    pub destination: RequestDestination,
    /// Always equal to the source size, data is never compressed at this layer.
    pub uncompressed_size: u32,
}

impl LoadRequest {
    /// Creates a request reading a whole file of `size` bytes.
    pub fn whole_file(file: Arc<dyn StorageFile>, size: u32, destination: RequestDestination) -> Self {
        Self {
            name: file.path().display().to_string(),
            source: RequestSource {
                file,
                offset: 0,
                size,
            },
            destination,
            uncompressed_size: size,
        }
    }
}
