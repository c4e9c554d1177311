//! Thread backed implementation of the accelerated storage channel
//!
//! Every queue owns a worker thread. Submitted batches are sent to it over a channel and executed
//! in order, reading file ranges into host buffers or device buffers. Fence signals are executed in
//! the same stream, so a signal always observes the requests enqueued before it.

use super::{
    ErrorRecord, FailureRecord, LoadRequest, QueueDesc, RequestDestination, RequestSourceType,
    StorageError, StorageFactory, StorageFile, StorageQueue, MAX_QUEUE_CAPACITY,
    MIN_QUEUE_CAPACITY,
};
use crate::{
    config::StorageConfig,
    graphics::{Device, Fence},
};
use anyhow::{ensure, Context};
use crossbeam::channel::{self, Receiver, Sender};
use log::*;
use parking_lot::Mutex;
use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::Arc,
    thread::{self, JoinHandle},
};
use texstream_utils::AnyResult;

#[derive(Debug)]
pub struct WorkerStorageFactory {
    worker_name: String,
}

impl WorkerStorageFactory {
    /// Fails if the channel is disabled in the configuration.
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        if !config.enabled {
            return Err(StorageError::Disabled);
        }
        Ok(Self {
            worker_name: config.worker_name.clone(),
        })
    }
}

impl StorageFactory for WorkerStorageFactory {
    fn create_queue(&self, desc: &QueueDesc) -> Result<Box<dyn StorageQueue>, StorageError> {
        if desc.source_type != RequestSourceType::File {
            return Err(StorageError::Queue(String::from(
                "only file sources are supported",
            )));
        }
        if !(MIN_QUEUE_CAPACITY..=MAX_QUEUE_CAPACITY).contains(&desc.capacity) {
            return Err(StorageError::Queue(format!(
                "capacity {} is outside of {MIN_QUEUE_CAPACITY}..={MAX_QUEUE_CAPACITY}",
                desc.capacity
            )));
        }
        if !desc.device.capabilities().direct_storage {
            return Err(StorageError::Queue(String::from(
                "the device doesn't accept storage requests",
            )));
        }

        Ok(Box::new(WorkerQueue::spawn(desc, &self.worker_name)?))
    }

    fn open_file(&self, path: &Path) -> Result<Arc<dyn StorageFile>, StorageError> {
        let file = File::open(path).map_err(|source| StorageError::Open {
            path: path.to_owned(),
            source,
        })?;
        Ok(Arc::new(WorkerFile {
            path: path.to_owned(),
            file: Mutex::new(file),
        }))
    }
}

#[derive(Debug)]
struct WorkerFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl StorageFile for WorkerFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn size(&self) -> Result<u64, StorageError> {
        Ok(self.file.lock().metadata()?.len())
    }

    fn read_at(&self, offset: u64, buffer: &mut [u8]) -> io::Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buffer)
    }
}

#[derive(Debug)]
enum QueueEntry {
    Request(LoadRequest),
    Signal(Arc<Fence>, u64),
}

/// Storage queue executing on its own worker thread.
#[derive(Debug)]
pub struct WorkerQueue {
    name: String,
    capacity: usize,
    pending: Vec<QueueEntry>,
    pending_requests: usize,
    sender: Option<Sender<Vec<QueueEntry>>>,
    worker: Option<JoinHandle<()>>,
    errors: Arc<Mutex<ErrorRecord>>,
}

impl WorkerQueue {
    fn spawn(desc: &QueueDesc, worker_name: &str) -> Result<Self, StorageError> {
        let (sender, receiver) = channel::unbounded();
        let errors = Arc::new(Mutex::new(ErrorRecord::default()));

        let device = desc.device.clone();
        let worker_errors = errors.clone();
        let worker = thread::Builder::new()
            .name(worker_name.to_string())
            .spawn(move || storage_worker(receiver, device, worker_errors))
            .map_err(|err| StorageError::Queue(format!("couldn't spawn the worker: {err}")))?;

        debug!(
            "Created storage queue `{}` (capacity {}, {:?} priority)",
            desc.name, desc.capacity, desc.priority
        );

        Ok(Self {
            name: desc.name.clone(),
            capacity: usize::from(desc.capacity),
            pending: vec![],
            pending_requests: 0,
            sender: Some(sender),
            worker: Some(worker),
            errors,
        })
    }

    /// Amount of requests enqueued, but not submitted yet.
    pub fn pending_requests(&self) -> usize {
        self.pending_requests
    }
}

impl StorageQueue for WorkerQueue {
    fn enqueue_request(&mut self, request: LoadRequest) -> Result<(), StorageError> {
        self.pending.push(QueueEntry::Request(request));
        self.pending_requests += 1;

        if self.pending_requests >= self.capacity {
            trace!("Storage queue `{}` is full, submitting", self.name);
            self.submit()?;
        }
        Ok(())
    }

    fn enqueue_signal(&mut self, fence: &Arc<Fence>, value: u64) -> Result<(), StorageError> {
        self.pending.push(QueueEntry::Signal(fence.clone(), value));
        Ok(())
    }

    fn submit(&mut self) -> Result<(), StorageError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let batch = std::mem::take(&mut self.pending);
        self.pending_requests = 0;
        self.sender
            .as_ref()
            .and_then(|sender| sender.send(batch).ok())
            .ok_or_else(|| StorageError::Queue(String::from("the worker has stopped")))
    }

    fn retrieve_error_record(&self) -> ErrorRecord {
        std::mem::take(&mut *self.errors.lock())
    }
}

impl Drop for WorkerQueue {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                "Dropping storage queue `{}` with {} unsubmitted entries",
                self.name,
                self.pending.len()
            );
        }

        self.sender = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("The storage worker of `{}` has panicked", self.name);
            }
        }
    }
}

fn storage_worker(
    receiver: Receiver<Vec<QueueEntry>>,
    device: Arc<dyn Device>,
    errors: Arc<Mutex<ErrorRecord>>,
) {
    trace!("Starting the storage worker");
    for batch in receiver {
        for entry in batch {
            match entry {
                QueueEntry::Request(request) => {
                    if let Err(err) = execute_request(&request, device.as_ref()) {
                        debug!("Storage request `{}` failed: {err:#}", request.name);

                        let mut errors = errors.lock();
                        errors.failure_count += 1;
                        errors.first_failure.get_or_insert_with(|| FailureRecord {
                            request_name: request.name.clone(),
                            message: format!("{err:#}"),
                        });
                    }
                }
                QueueEntry::Signal(fence, value) => fence.signal(value),
            }
        }
    }
    trace!("Storage worker finished");
}

fn execute_request(request: &LoadRequest, device: &dyn Device) -> AnyResult {
    let source = &request.source;
    ensure!(
        request.uncompressed_size == source.size,
        "compressed requests are not supported"
    );
    ensure!(
        request.destination.size() == source.size,
        "destination size {} doesn't match the source size {}",
        request.destination.size(),
        source.size
    );

    let size = source.size as usize;
    match &request.destination {
        RequestDestination::Memory { buffer, .. } => {
            let mut buffer = buffer.lock();
            ensure!(
                buffer.len() >= size,
                "destination buffer holds {} bytes, {size} required",
                buffer.len()
            );
            source
                .file
                .read_at(source.offset, &mut buffer[..size])
                .context("couldn't read the source file")?;
        }
        RequestDestination::Buffer {
            resource, offset, ..
        } => {
            let mut data = vec![0; size];
            source
                .file
                .read_at(source.offset, &mut data)
                .context("couldn't read the source file")?;
            device
                .write_buffer(*resource, *offset, &data)
                .context("couldn't write the destination buffer")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graphics::soft::{SoftDevice, SoftDeviceOptions},
        storage::Priority,
    };
    use std::fs;
    use texstream_utils::WaitEvent;

    fn queue_desc(device: Arc<dyn Device>, capacity: u16) -> QueueDesc {
        QueueDesc {
            source_type: RequestSourceType::File,
            capacity,
            priority: Priority::Normal,
            name: String::from("test"),
            device,
        }
    }

    fn wait(fence: &Fence, value: u64) {
        let event = Arc::new(WaitEvent::new());
        fence.set_event_on_completion(value, event.clone());
        event.wait();
    }

    #[test]
    pub fn queue_descriptions_are_validated() {
        let factory = WorkerStorageFactory::new(&StorageConfig::default()).unwrap();
        let device: Arc<dyn Device> = Arc::new(SoftDevice::default());

        assert!(factory.create_queue(&queue_desc(device.clone(), 0x10)).is_err());
        assert!(factory.create_queue(&queue_desc(device.clone(), 0x4000)).is_err());

        let mut memory = queue_desc(device.clone(), MIN_QUEUE_CAPACITY);
        memory.source_type = RequestSourceType::Memory;
        assert!(factory.create_queue(&memory).is_err());

        let unsupported: Arc<dyn Device> = Arc::new(SoftDevice::new(SoftDeviceOptions {
            direct_storage: false,
            ..Default::default()
        }));
        assert!(matches!(
            factory.create_queue(&queue_desc(unsupported, MAX_QUEUE_CAPACITY)),
            Err(StorageError::Queue(_))
        ));

        assert!(factory.create_queue(&queue_desc(device, MAX_QUEUE_CAPACITY)).is_ok());
    }

    #[test]
    pub fn disabled_factory() {
        let config = StorageConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(matches!(
            WorkerStorageFactory::new(&config),
            Err(StorageError::Disabled)
        ));
    }

    #[test]
    pub fn full_queues_submit_on_their_own() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, [7u8; 4]).unwrap();

        let factory = WorkerStorageFactory::new(&StorageConfig::default()).unwrap();
        let device: Arc<dyn Device> = Arc::new(SoftDevice::default());
        let desc = queue_desc(device, MIN_QUEUE_CAPACITY);
        let mut queue = WorkerQueue::spawn(&desc, "test storage").unwrap();
        let file = factory.open_file(&path).unwrap();

        let buffers: Vec<_> = (0..MIN_QUEUE_CAPACITY)
            .map(|_| Arc::new(Mutex::new(vec![0u8; 4])))
            .collect();
        for (index, buffer) in buffers.iter().enumerate() {
            assert_eq!(queue.pending_requests(), index);
            let destination = RequestDestination::Memory {
                buffer: buffer.clone(),
                size: 4,
            };
            queue
                .enqueue_request(LoadRequest::whole_file(file.clone(), 4, destination))
                .unwrap();
        }
        assert_eq!(queue.pending_requests(), 0);

        let fence = Arc::new(Fence::new(0));
        queue.enqueue_signal(&fence, 1).unwrap();
        queue.submit().unwrap();
        wait(&fence, 1);

        assert!(buffers.iter().all(|buffer| *buffer.lock() == [7; 4]));
        assert_eq!(queue.retrieve_error_record(), ErrorRecord::default());
    }

    #[test]
    pub fn failures_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        fs::write(&path, [1u8; 2]).unwrap();

        let factory = WorkerStorageFactory::new(&StorageConfig::default()).unwrap();
        let device: Arc<dyn Device> = Arc::new(SoftDevice::default());
        let mut queue = factory
            .create_queue(&queue_desc(device, MAX_QUEUE_CAPACITY))
            .unwrap();
        let file = factory.open_file(&path).unwrap();

        // Reading 8 bytes out of a 2 byte file
        let buffer = Arc::new(Mutex::new(vec![0u8; 8]));
        let destination = RequestDestination::Memory {
            buffer: buffer.clone(),
            size: 8,
        };
        queue
            .enqueue_request(LoadRequest::whole_file(file, 8, destination))
            .unwrap();

        let fence = Arc::new(Fence::new(0));
        queue.enqueue_signal(&fence, 1).unwrap();
        queue.submit().unwrap();
        wait(&fence, 1);

        let record = queue.retrieve_error_record();
        assert_eq!(record.failure_count, 1);
        let failure = record.first_failure.unwrap();
        assert!(failure.request_name.ends_with("short.bin"));

        // Retrieving clears the record
        assert_eq!(queue.retrieve_error_record(), ErrorRecord::default());
    }

    #[test]
    pub fn missing_files_fail_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let factory = WorkerStorageFactory::new(&StorageConfig::default()).unwrap();
        assert!(matches!(
            factory.open_file(&dir.path().join("missing.dds")),
            Err(StorageError::Open { .. })
        ));
    }
}
