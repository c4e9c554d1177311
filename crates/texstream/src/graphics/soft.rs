//! Software reference device
//!
//! Keeps every resource in host memory. Command queues execute on a dedicated worker thread, so
//! work submitted to them really is asynchronous, and fences are the only way to know when it's
//! done. Errors found while executing put the device into the removed state, see
//! [`Device::check_status`].

use super::{
    Command, CommandList, CommandQueue, Device, DeviceCapabilities, DeviceError, Fence, HeapType,
    ResourceDesc, ResourceId, ResourceKind, ResourceState,
};
use crossbeam::channel::{self, Receiver, Sender};
use log::*;
use parking_lot::Mutex;
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};
use texstream_dds::{mip_extent, SurfaceInfo};
use texstream_utils::HandlePool;

/// Behavior switches of a [`SoftDevice`].
#[derive(Debug, Clone)]
pub struct SoftDeviceOptions {
    pub direct_storage: bool,
    pub bc_compression: bool,
    /// Total amount of bytes all resources may occupy.
    pub memory_budget: u64,
    /// Makes every [`Device::create_fence`] call fail, for exercising error paths.
    pub fail_fence_creation: bool,
}

impl Default for SoftDeviceOptions {
    fn default() -> Self {
        Self {
            direct_storage: true,
            bc_compression: true,
            memory_budget: 1 << 30,
            fail_fence_creation: false,
        }
    }
}

#[derive(Debug)]
struct SoftResource {
    desc: ResourceDesc,
    state: ResourceState,
    /// One entry for buffers, tightly packed mips for textures.
    subresources: Vec<Vec<u8>>,
}

impl SoftResource {
    fn size(&self) -> u64 {
        self.subresources.iter().map(|data| data.len() as u64).sum()
    }
}

#[derive(Debug, Default)]
struct SoftState {
    resources: HandlePool<SoftResource>,
    allocated_bytes: u64,
    removed: Option<String>,
}

impl SoftState {
    fn get(&self, id: ResourceId) -> Result<&SoftResource, DeviceError> {
        self.resources
            .get(id.0)
            .ok_or(DeviceError::InvalidResource(id))
    }

    fn get_mut(&mut self, id: ResourceId) -> Result<&mut SoftResource, DeviceError> {
        self.resources
            .get_mut(id.0)
            .ok_or(DeviceError::InvalidResource(id))
    }

    fn check_removed(&self) -> Result<(), DeviceError> {
        match &self.removed {
            Some(reason) => Err(DeviceError::DeviceRemoved(reason.clone())),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
pub struct SoftDevice {
    options: SoftDeviceOptions,
    state: Arc<Mutex<SoftState>>,
}

impl SoftDevice {
    pub fn new(options: SoftDeviceOptions) -> Self {
        Self {
            options,
            state: Default::default(),
        }
    }

    /// Copies the contents of a buffer out.
    pub fn read_buffer(&self, id: ResourceId) -> Result<Vec<u8>, DeviceError> {
        let state = self.state.lock();
        let resource = state.get(id)?;
        if resource.desc.kind != ResourceKind::Buffer {
            return Err(DeviceError::InvalidDesc(String::from("resource is not a buffer")));
        }
        Ok(resource.subresources[0].clone())
    }

    /// Copies a tightly packed mip level of a texture out.
    pub fn read_subresource(&self, id: ResourceId, mip: u32) -> Result<Vec<u8>, DeviceError> {
        let state = self.state.lock();
        state
            .get(id)?
            .subresources
            .get(mip as usize)
            .cloned()
            .ok_or_else(|| DeviceError::InvalidDesc(format!("no subresource {mip}")))
    }

    pub fn resource_state(&self, id: ResourceId) -> Result<ResourceState, DeviceError> {
        Ok(self.state.lock().get(id)?.state)
    }

    /// Amount of resources that haven't been released yet.
    pub fn live_resources(&self) -> usize {
        self.state.lock().resources.count_allocated()
    }
}

impl Default for SoftDevice {
    fn default() -> Self {
        Self::new(SoftDeviceOptions::default())
    }
}

impl Device for SoftDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities {
            direct_storage: self.options.direct_storage,
            bc_compression: self.options.bc_compression,
        }
    }

    fn create_committed_resource(
        &self,
        heap: HeapType,
        desc: &ResourceDesc,
        initial_state: ResourceState,
    ) -> Result<ResourceId, DeviceError> {
        let subresources = allocate_subresources(heap, desc)?;
        if let Some(format) = desc.format {
            if format.is_block_compressed() && !self.options.bc_compression {
                return Err(DeviceError::UnsupportedFormat(format));
            }
        }

        let resource = SoftResource {
            desc: desc.clone(),
            state: initial_state,
            subresources,
        };

        let mut state = self.state.lock();
        state.check_removed()?;

        let size = resource.size();
        if state.allocated_bytes + size > self.options.memory_budget {
            return Err(DeviceError::OutOfMemory);
        }
        state.allocated_bytes += size;

        let id = ResourceId(state.resources.allocate(resource));
        trace!(
            "Created resource {id:?} ({}, {size} bytes)",
            desc.label.as_deref().unwrap_or("unnamed")
        );
        Ok(id)
    }

    fn release_resource(&self, id: ResourceId) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        let resource = state
            .resources
            .release(id.0)
            .ok_or(DeviceError::InvalidResource(id))?;
        state.allocated_bytes -= resource.size();
        Ok(())
    }

    fn write_buffer(&self, id: ResourceId, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.check_removed()?;

        let resource = state.get_mut(id)?;
        if resource.desc.kind != ResourceKind::Buffer {
            return Err(DeviceError::InvalidDesc(String::from("resource is not a buffer")));
        }

        let buffer = &mut resource.subresources[0];
        let range = checked_range(offset, data.len() as u64, buffer.len() as u64)?;
        buffer[range].copy_from_slice(data);
        Ok(())
    }

    fn create_command_queue(&self) -> Result<Box<dyn CommandQueue>, DeviceError> {
        Ok(Box::new(SoftQueue::spawn(self.state.clone())?))
    }

    fn create_fence(&self, initial_value: u64) -> Result<Arc<Fence>, DeviceError> {
        if self.options.fail_fence_creation {
            return Err(DeviceError::OutOfMemory);
        }
        Ok(Arc::new(Fence::new(initial_value)))
    }

    fn check_status(&self) -> Result<(), DeviceError> {
        self.state.lock().check_removed()
    }
}

fn allocate_subresources(heap: HeapType, desc: &ResourceDesc) -> Result<Vec<Vec<u8>>, DeviceError> {
    let invalid = |message: &str| DeviceError::InvalidDesc(message.to_string());

    match desc.kind {
        ResourceKind::Buffer => {
            if desc.width == 0 {
                return Err(invalid("empty buffer"));
            }
            let size = usize::try_from(desc.width).map_err(|_| DeviceError::OutOfMemory)?;
            Ok(vec![vec![0; size]])
        }
        ResourceKind::Texture2D => {
            if heap == HeapType::Upload {
                return Err(invalid("textures can't be placed in upload heaps"));
            }
            let format = desc.format.ok_or_else(|| invalid("texture without a format"))?;
            let width = u32::try_from(desc.width).map_err(|_| invalid("texture too wide"))?;
            if width == 0 || desc.height == 0 {
                return Err(invalid("empty texture"));
            }

            let full_chain = 32 - width.max(desc.height).leading_zeros();
            if desc.mip_levels == 0 || desc.mip_levels > full_chain {
                return Err(invalid("invalid mip level count"));
            }

            (0..desc.mip_levels)
                .map(|mip| {
                    let info = SurfaceInfo::compute(
                        format,
                        mip_extent(width, mip),
                        mip_extent(desc.height, mip),
                    )
                    .ok_or(DeviceError::OutOfMemory)?;
                    let size = usize::try_from(info.slice_pitch).map_err(|_| DeviceError::OutOfMemory)?;
                    Ok(vec![0; size])
                })
                .collect()
        }
    }
}

fn checked_range(offset: u64, len: u64, size: u64) -> Result<std::ops::Range<usize>, DeviceError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(offset as usize..end as usize),
        _ => Err(DeviceError::OutOfBounds { offset, len, size }),
    }
}

enum QueueJob {
    Execute(Vec<Command>),
    Signal(Arc<Fence>, u64),
}

/// Command queue of a [`SoftDevice`].
#[derive(Debug)]
pub struct SoftQueue {
    sender: Option<Sender<QueueJob>>,
    worker: Option<JoinHandle<()>>,
    state: Arc<Mutex<SoftState>>,
}

impl SoftQueue {
    fn spawn(state: Arc<Mutex<SoftState>>) -> Result<Self, DeviceError> {
        let (sender, receiver) = channel::unbounded();
        let worker_state = state.clone();
        let worker = thread::Builder::new()
            .name(String::from("Soft Queue"))
            .spawn(move || queue_worker(receiver, worker_state))
            .map_err(|err| DeviceError::Backend(err.into()))?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            state,
        })
    }

    fn send(&self, job: QueueJob) -> Result<(), DeviceError> {
        self.sender
            .as_ref()
            .and_then(|sender| sender.send(job).ok())
            .ok_or_else(|| DeviceError::DeviceRemoved(String::from("queue worker stopped")))
    }
}

impl CommandQueue for SoftQueue {
    fn execute_command_lists(&self, lists: &[&CommandList]) -> Result<(), DeviceError> {
        self.state.lock().check_removed()?;

        let mut commands = vec![];
        for list in lists {
            if list.is_recording() {
                return Err(DeviceError::ListNotClosed);
            }
            commands.extend_from_slice(list.commands());
        }
        self.send(QueueJob::Execute(commands))
    }

    fn signal(&self, fence: &Arc<Fence>, value: u64) -> Result<(), DeviceError> {
        self.send(QueueJob::Signal(fence.clone(), value))
    }
}

impl Drop for SoftQueue {
    fn drop(&mut self) {
        // Disconnecting the channel stops the worker once it drains the remaining jobs
        self.sender = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("The soft queue worker has panicked");
            }
        }
    }
}

fn queue_worker(receiver: Receiver<QueueJob>, state: Arc<Mutex<SoftState>>) {
    trace!("Starting the soft queue worker");
    for job in receiver {
        match job {
            QueueJob::Execute(commands) => {
                let mut state = state.lock();
                if state.removed.is_some() {
                    continue;
                }
                for command in &commands {
                    if let Err(err) = execute(&mut state, command) {
                        error!("Soft device removed while executing {command:?}: {err}");
                        state.removed = Some(err.to_string());
                        break;
                    }
                }
            }
            // Signals still go through on removed devices, so nobody waits forever
            QueueJob::Signal(fence, value) => fence.signal(value),
        }
    }
    trace!("Soft queue worker finished");
}

fn execute(state: &mut SoftState, command: &Command) -> Result<(), DeviceError> {
    match *command {
        Command::CopyBufferToTexture {
            src,
            footprint,
            dst,
            subresource,
        } => {
            let source = state.get(src)?;
            if source.desc.kind != ResourceKind::Buffer {
                return Err(DeviceError::InvalidDesc(String::from("copy source is not a buffer")));
            }

            let target = state.get(dst)?;
            if target.state != ResourceState::CopyDest {
                return Err(DeviceError::WrongState {
                    resource: dst,
                    expected: ResourceState::CopyDest,
                    actual: target.state,
                });
            }
            if target.desc.format != Some(footprint.footprint.format) {
                return Err(DeviceError::InvalidDesc(String::from("copy format mismatch")));
            }
            let format = footprint.footprint.format;
            let width = u32::try_from(target.desc.width).unwrap_or(u32::MAX);
            let info = SurfaceInfo::compute(
                format,
                mip_extent(width, subresource),
                mip_extent(target.desc.height, subresource),
            )
            .ok_or(DeviceError::OutOfMemory)?;

            // Gather the rows first, the source and destination are borrowed from the same pool
            let buffer = &source.subresources[0];
            let mut rows = Vec::with_capacity(info.slice_pitch as usize);
            for row in 0..u64::from(info.num_rows) {
                let offset = footprint.offset + row * u64::from(footprint.footprint.row_pitch);
                let range = checked_range(offset, info.row_pitch, buffer.len() as u64)?;
                rows.extend_from_slice(&buffer[range]);
            }

            let target = state.get_mut(dst)?;
            let data = target
                .subresources
                .get_mut(subresource as usize)
                .ok_or_else(|| DeviceError::InvalidDesc(format!("no subresource {subresource}")))?;
            data.copy_from_slice(&rows);
        }
        Command::Barrier {
            resource,
            before,
            after,
        } => {
            let target = state.get_mut(resource)?;
            if target.state != before {
                return Err(DeviceError::WrongState {
                    resource,
                    expected: before,
                    actual: target.state,
                });
            }
            target.state = after;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::{copyable_footprints, CommandAllocator};
    use texstream_dds::DxgiFormat;
    use texstream_utils::WaitEvent;

    fn wait_for(queue: &dyn CommandQueue, value: u64) {
        let fence = Arc::new(Fence::new(0));
        let event = Arc::new(WaitEvent::new());
        queue.signal(&fence, value).unwrap();
        fence.set_event_on_completion(value, event.clone());
        event.wait();
    }

    #[test]
    pub fn buffers_are_bounds_checked() {
        let device = SoftDevice::default();
        let buffer = device
            .create_committed_resource(
                HeapType::Upload,
                &ResourceDesc::buffer(8),
                ResourceState::GenericRead,
            )
            .unwrap();

        device.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(device.read_buffer(buffer).unwrap(), [0, 0, 0, 0, 1, 2, 3, 4]);
        assert!(matches!(
            device.write_buffer(buffer, 6, &[0; 4]),
            Err(DeviceError::OutOfBounds { offset: 6, len: 4, size: 8 })
        ));

        device.release_resource(buffer).unwrap();
        assert!(matches!(
            device.write_buffer(buffer, 0, &[0]),
            Err(DeviceError::InvalidResource(_))
        ));
        assert_eq!(device.live_resources(), 0);
    }

    #[test]
    pub fn resource_validation() {
        let device = SoftDevice::new(SoftDeviceOptions {
            bc_compression: false,
            memory_budget: 1024,
            ..Default::default()
        });
        let create = |desc: &ResourceDesc| {
            device.create_committed_resource(HeapType::Default, desc, ResourceState::CopyDest)
        };

        assert!(matches!(
            create(&ResourceDesc::texture_2d(DxgiFormat::Bc1Unorm, 4, 4, 1)),
            Err(DeviceError::UnsupportedFormat(DxgiFormat::Bc1Unorm))
        ));
        assert!(matches!(
            create(&ResourceDesc::texture_2d(DxgiFormat::R8Unorm, 4, 4, 4)),
            Err(DeviceError::InvalidDesc(_))
        ));
        assert!(matches!(
            create(&ResourceDesc::buffer(2048)),
            Err(DeviceError::OutOfMemory)
        ));
        assert!(create(&ResourceDesc::texture_2d(DxgiFormat::R8Unorm, 4, 4, 3)).is_ok());
    }

    #[test]
    pub fn queue_copies_and_transitions() {
        let device = SoftDevice::default();
        let queue = device.create_command_queue().unwrap();

        let desc = ResourceDesc::texture_2d(DxgiFormat::R8Unorm, 2, 2, 1);
        let texture = device
            .create_committed_resource(HeapType::Default, &desc, ResourceState::CopyDest)
            .unwrap();
        let footprints = copyable_footprints(&desc, 0, 1).unwrap();
        let staging = device
            .create_committed_resource(
                HeapType::Upload,
                &ResourceDesc::buffer(footprints.total_bytes),
                ResourceState::GenericRead,
            )
            .unwrap();
        device.write_buffer(staging, 0, &[1, 2]).unwrap();
        device.write_buffer(staging, 256, &[3, 4]).unwrap();

        let allocator = CommandAllocator::new();
        let mut list = CommandList::new(None);
        list.reset(&allocator).unwrap();
        list.copy_buffer_to_texture(staging, footprints.layouts[0], texture, 0)
            .unwrap();
        list.resource_barrier(
            texture,
            ResourceState::CopyDest,
            ResourceState::PixelShaderResource,
        )
        .unwrap();

        assert!(matches!(
            queue.execute_command_lists(&[&list]),
            Err(DeviceError::ListNotClosed)
        ));
        list.close().unwrap();
        queue.execute_command_lists(&[&list]).unwrap();
        wait_for(queue.as_ref(), 1);

        device.check_status().unwrap();
        assert_eq!(device.read_subresource(texture, 0).unwrap(), [1, 2, 3, 4]);
        assert_eq!(
            device.resource_state(texture).unwrap(),
            ResourceState::PixelShaderResource
        );
    }

    #[test]
    pub fn execution_errors_remove_the_device() {
        let device = SoftDevice::default();
        let queue = device.create_command_queue().unwrap();
        let texture = device
            .create_committed_resource(
                HeapType::Default,
                &ResourceDesc::texture_2d(DxgiFormat::R8Unorm, 1, 1, 1),
                ResourceState::Common,
            )
            .unwrap();

        let allocator = CommandAllocator::new();
        let mut list = CommandList::new(None);
        list.reset(&allocator).unwrap();
        list.resource_barrier(
            texture,
            ResourceState::CopyDest,
            ResourceState::PixelShaderResource,
        )
        .unwrap();
        list.close().unwrap();

        queue.execute_command_lists(&[&list]).unwrap();
        wait_for(queue.as_ref(), 1);

        assert!(matches!(
            device.check_status(),
            Err(DeviceError::DeviceRemoved(_))
        ));
        assert!(queue.execute_command_lists(&[&list]).is_err());
    }
}
