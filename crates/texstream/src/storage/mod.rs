//! Storage request engine
//!
//! [`StorageLoader`] reads files into host memory or straight into device buffers. When possible,
//! requests go through an accelerated storage channel (see [`StorageFactory`]), executing
//! asynchronously and signalling a fence once done. If the channel can't be set up, the loader
//! degrades to plain synchronous file reads, and device buffer loads become unavailable.
//!
//! ## Example
//! ```
//! # use texstream::{config::StorageConfig, graphics::soft::SoftDevice, storage::StorageLoader};
//! # use std::sync::Arc;
//! # let dir = tempfile::tempdir().unwrap();
//! # let path = dir.path().join("texture.dds");
//! # std::fs::write(&path, b"DDS ").unwrap();
//! let device = Arc::new(SoftDevice::default());
//! let mut loader = StorageLoader::initialize(device, &StorageConfig::default()).unwrap();
//! assert!(loader.is_supported());
//!
//! let mut bytes = vec![];
//! loader.load_to_host_memory(&path, &mut bytes).unwrap();
//! assert_eq!(bytes, b"DDS ");
//! assert_eq!(loader.completion_value(), 1);
//! ```

use crate::{
    config::StorageConfig,
    graphics::{Device, DeviceError, ResourceId},
};
use log::*;
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use strategy::{AcceleratedStrategy, FallbackStrategy, LoadStrategy};
use texstream_utils::WaitEvent;
use thiserror::Error;

pub mod worker;

#[doc(inline)]
pub use channel::*;
mod channel;

#[doc(inline)]
pub use request::*;
mod request;

mod strategy;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("couldn't open `{}`: {source}", path.display())]
    InvalidArgument { path: PathBuf, source: io::Error },
    #[error("the storage channel couldn't open `{}`: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("`{}` is too large for a single request ({size} bytes)", path.display())]
    FileTooLarge { path: PathBuf, size: u64 },
    #[error("{0} is not available without the accelerated storage channel")]
    NotImplemented(&'static str),
    #[error("the accelerated storage channel is disabled")]
    Disabled,
    #[error("couldn't create the request queue: {0}")]
    Queue(String),
    #[error("couldn't create the completion fence: {0}")]
    Fence(#[source] DeviceError),
    #[error("{failures} storage request(s) failed, first failure: {first}")]
    Transfer { failures: u32, first: String },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
}

/// Loads files through the accelerated storage channel, or through synchronous reads if the
/// channel is unavailable.
///
/// All operations are meant to be called from one thread, the loader exclusively owns its queue
/// and fence.
#[derive(Debug)]
pub struct StorageLoader {
    strategy: Box<dyn LoadStrategy>,
}

impl StorageLoader {
    /// Sets up the accelerated channel for the device, using a [`worker::WorkerStorageFactory`].
    ///
    /// Failing to create the factory or the queue isn't an error, the loader degrades to
    /// synchronous reads instead. Failing to create the fence is.
    pub fn initialize(device: Arc<dyn Device>, config: &StorageConfig) -> Result<Self, StorageError> {
        let factory = worker::WorkerStorageFactory::new(config)
            .map(|factory| Box::new(factory) as Box<dyn StorageFactory>);
        Self::initialize_with(device, config, factory)
    }

    /// Like [`StorageLoader::initialize`], with an explicitly provided factory (or the error that
    /// occurred while creating one).
    pub fn initialize_with(
        device: Arc<dyn Device>,
        config: &StorageConfig,
        factory: Result<Box<dyn StorageFactory>, StorageError>,
    ) -> Result<Self, StorageError> {
        let factory = match factory {
            Ok(factory) => factory,
            Err(err) => {
                warn!("Storage channel not available ({err}), falling back to synchronous reads");
                return Ok(Self::fallback());
            }
        };

        let desc = QueueDesc {
            source_type: RequestSourceType::File,
            capacity: config.queue_capacity,
            priority: config.priority,
            name: config.worker_name.clone(),
            device: device.clone(),
        };
        let queue = match factory.create_queue(&desc) {
            Ok(queue) => queue,
            Err(err) => {
                warn!("Failed to create a storage queue ({err}), falling back to synchronous reads");
                return Ok(Self::fallback());
            }
        };

        let fence = device.create_fence(0).map_err(StorageError::Fence)?;

        info!("Storage channel initialized successfully");
        Ok(Self {
            strategy: Box::new(AcceleratedStrategy {
                device,
                factory,
                queue,
                fence,
                event: Arc::new(WaitEvent::new()),
                fence_value: 0,
            }),
        })
    }

    /// Creates a loader that only does synchronous reads.
    pub fn fallback() -> Self {
        Self {
            strategy: Box::new(FallbackStrategy),
        }
    }

    /// Whether loads go through the accelerated channel.
    pub fn is_supported(&self) -> bool {
        self.strategy.is_accelerated()
    }

    /// Reads a whole file into `out`, resizing it to the file's size. Blocks until done.
    pub fn load_to_host_memory(
        &mut self,
        path: impl AsRef<Path>,
        out: &mut Vec<u8>,
    ) -> Result<(), StorageError> {
        self.strategy.load_to_host_memory(path.as_ref(), out)
    }

    /// Enqueues a read of a whole file into a device buffer, at `offset`. Doesn't submit or wait,
    /// see [`StorageLoader::flush`] and [`StorageLoader::wait_for_completion`].
    ///
    /// Only available with the accelerated channel.
    pub fn load_to_device_buffer(
        &mut self,
        path: impl AsRef<Path>,
        resource: ResourceId,
        offset: u64,
    ) -> Result<(), StorageError> {
        self.strategy
            .load_to_device_buffer(path.as_ref(), resource, offset)
    }

    /// Submits everything enqueued so far, followed by a fence signal. Returns the signalled
    /// value.
    pub fn flush(&mut self) -> Result<u64, StorageError> {
        self.strategy.flush()
    }

    /// Blocks until the last flushed value is reached, then reports transfer failures that
    /// happened since the previous wait.
    pub fn wait_for_completion(&mut self) -> Result<(), StorageError> {
        self.strategy.wait_for_completion()
    }

    /// Last fence value assigned to a submission.
    pub fn completion_value(&self) -> u64 {
        self.strategy.completion_value()
    }
}
