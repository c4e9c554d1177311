//! Interfaces of the accelerated storage channel

use super::{LoadRequest, StorageError};
use crate::graphics::{Device, Fence};
use serde::Deserialize;
use std::{fmt::Debug, io, path::Path, sync::Arc};

/// Smallest allowed queue capacity.
pub const MIN_QUEUE_CAPACITY: u16 = 0x80;
/// Largest allowed queue capacity.
pub const MAX_QUEUE_CAPACITY: u16 = 0x2000;

/// Scheduling priority of a queue relative to other queues of the same factory.
///
/// Advisory: [`super::worker::WorkerQueue`] runs every queue on its own thread and only logs the
/// priority it was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Realtime,
}

/// Kind of sources the requests of a queue read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestSourceType {
    File,
    Memory,
}

#[derive(Debug, Clone)]
pub struct QueueDesc {
    pub source_type: RequestSourceType,
    /// Amount of requests that can be enqueued before the queue submits them on its own.
    pub capacity: u16,
    pub priority: Priority,
    pub name: String,
    /// Device the queue writes buffer destinations into.
    pub device: Arc<dyn Device>,
}

/// Details of the first failed request of a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub request_name: String,
    pub message: String,
}

/// Failures accumulated by a queue since the record was last retrieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorRecord {
    pub failure_count: u32,
    pub first_failure: Option<FailureRecord>,
}

/// Entry point of an accelerated storage implementation.
pub trait StorageFactory: Send + Debug {
    fn create_queue(&self, desc: &QueueDesc) -> Result<Box<dyn StorageQueue>, StorageError>;
    fn open_file(&self, path: &Path) -> Result<Arc<dyn StorageFile>, StorageError>;
}

/// A file opened through a [`StorageFactory`].
pub trait StorageFile: Send + Sync + Debug {
    fn path(&self) -> &Path;
    fn size(&self) -> Result<u64, StorageError>;
    /// Fills `buffer` with bytes starting at `offset`.
    fn read_at(&self, offset: u64, buffer: &mut [u8]) -> io::Result<()>;
}

/// Queue of requests and fence signals, executed in enqueue order once submitted.
pub trait StorageQueue: Send + Debug {
    fn enqueue_request(&mut self, request: LoadRequest) -> Result<(), StorageError>;
    /// Signals `fence` with `value` once every request enqueued before completes.
    fn enqueue_signal(&mut self, fence: &Arc<Fence>, value: u64) -> Result<(), StorageError>;
    /// Starts executing everything enqueued so far.
    fn submit(&mut self) -> Result<(), StorageError>;
    /// Returns the failures recorded since the previous call, and clears the record.
    fn retrieve_error_record(&self) -> ErrorRecord;
}
