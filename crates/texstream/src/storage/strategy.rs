use super::{
    LoadRequest, RequestDestination, StorageError, StorageFactory, StorageFile, StorageQueue,
};
use crate::graphics::{Device, Fence, ResourceId};
use log::*;
use parking_lot::Mutex;
use std::{fmt::Debug, fs::File, io::Read, mem, path::Path, sync::Arc};
use texstream_utils::WaitEvent;

/// One of the two ways of serving loads, chosen once by [`super::StorageLoader::initialize`].
pub(super) trait LoadStrategy: Send + Debug {
    fn is_accelerated(&self) -> bool;
    fn load_to_host_memory(&mut self, path: &Path, out: &mut Vec<u8>) -> Result<(), StorageError>;
    fn load_to_device_buffer(
        &mut self,
        path: &Path,
        resource: ResourceId,
        offset: u64,
    ) -> Result<(), StorageError>;
    fn flush(&mut self) -> Result<u64, StorageError>;
    fn wait_for_completion(&mut self) -> Result<(), StorageError>;
    fn completion_value(&self) -> u64;
}

/// Synchronous file reads, used when the accelerated channel is unavailable.
#[derive(Debug, Default)]
pub struct FallbackStrategy;

impl LoadStrategy for FallbackStrategy {
    fn is_accelerated(&self) -> bool {
        false
    }

    fn load_to_host_memory(&mut self, path: &Path, out: &mut Vec<u8>) -> Result<(), StorageError> {
        let mut file = File::open(path).map_err(|source| StorageError::InvalidArgument {
            path: path.to_owned(),
            source,
        })?;

        let size = file.metadata()?.len();
        let size = usize::try_from(size).map_err(|_| StorageError::FileTooLarge {
            path: path.to_owned(),
            size,
        })?;

        out.resize(size, 0);
        file.read_exact(out)?;
        Ok(())
    }

    fn load_to_device_buffer(&mut self, _: &Path, _: ResourceId, _: u64) -> Result<(), StorageError> {
        Err(StorageError::NotImplemented("loading into device buffers"))
    }

    fn flush(&mut self) -> Result<u64, StorageError> {
        Ok(0)
    }

    fn wait_for_completion(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn completion_value(&self) -> u64 {
        0
    }
}

/// Loads going through a [`StorageQueue`], synchronized with a fence.
#[derive(Debug)]
pub struct AcceleratedStrategy {
    pub(super) device: Arc<dyn Device>,
    pub(super) factory: Box<dyn StorageFactory>,
    pub(super) queue: Box<dyn StorageQueue>,
    pub(super) fence: Arc<Fence>,
    pub(super) event: Arc<WaitEvent>,
    /// Last value a signal was enqueued with.
    pub(super) fence_value: u64,
}

impl AcceleratedStrategy {
    /// Opens a file and checks whether it fits in a single request.
    fn open(&self, path: &Path) -> Result<(Arc<dyn StorageFile>, u32), StorageError> {
        let file = self.factory.open_file(path)?;
        let size = file.size()?;
        let size = u32::try_from(size).map_err(|_| StorageError::FileTooLarge {
            path: path.to_owned(),
            size,
        })?;
        Ok((file, size))
    }

    fn enqueue_and_wait(&mut self, request: LoadRequest) -> Result<(), StorageError> {
        self.queue.enqueue_request(request)?;
        self.flush()?;
        self.wait_for_completion()
    }
}

impl LoadStrategy for AcceleratedStrategy {
    fn is_accelerated(&self) -> bool {
        true
    }

    fn load_to_host_memory(&mut self, path: &Path, out: &mut Vec<u8>) -> Result<(), StorageError> {
        let (file, size) = self.open(path)?;

        // The buffer is lent to the queue until the request completes
        let mut buffer = mem::take(out);
        buffer.resize(size as usize, 0);
        let buffer = Arc::new(Mutex::new(buffer));

        let destination = RequestDestination::Memory {
            buffer: buffer.clone(),
            size,
        };
        let result = self.enqueue_and_wait(LoadRequest::whole_file(file, size, destination));

        *out = mem::take(&mut *buffer.lock());
        result
    }

    fn load_to_device_buffer(
        &mut self,
        path: &Path,
        resource: ResourceId,
        offset: u64,
    ) -> Result<(), StorageError> {
        self.device.check_status()?;

        let (file, size) = self.open(path)?;
        let destination = RequestDestination::Buffer {
            resource,
            offset,
            size,
        };
        self.queue
            .enqueue_request(LoadRequest::whole_file(file, size, destination))
    }

    fn flush(&mut self) -> Result<u64, StorageError> {
        self.fence_value += 1;
        self.queue.enqueue_signal(&self.fence, self.fence_value)?;
        self.queue.submit()?;
        Ok(self.fence_value)
    }

    fn wait_for_completion(&mut self) -> Result<(), StorageError> {
        if self.fence.completed_value() < self.fence_value {
            self.fence
                .set_event_on_completion(self.fence_value, self.event.clone());
            self.event.wait();
        }

        let record = self.queue.retrieve_error_record();
        if record.failure_count > 0 {
            let failures = record.failure_count;
            let first = record
                .first_failure
                .map(|failure| format!("{}: {}", failure.request_name, failure.message))
                .unwrap_or_default();
            error!("Storage transfer failed ({failures} new failures), first failure: {first}");
            return Err(StorageError::Transfer { failures, first });
        }

        Ok(())
    }

    fn completion_value(&self) -> u64 {
        self.fence_value
    }
}
