use super::{DeviceError, PlacedFootprint, ResourceId, ResourceState};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

/// A single recorded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Copies one subresource out of a buffer laid out as described by the footprint.
    CopyBufferToTexture {
        src: ResourceId,
        footprint: PlacedFootprint,
        dst: ResourceId,
        subresource: u32,
    },
    /// Transitions all subresources of a resource between states.
    Barrier {
        resource: ResourceId,
        before: ResourceState,
        after: ResourceState,
    },
}

/// Backing memory of recorded commands. Only one command list may record into an allocator at a
/// time.
///
/// Cloning creates another reference to the same allocator.
#[derive(Debug, Clone, Default)]
pub struct CommandAllocator {
    recording: Arc<AtomicU32>,
}

impl CommandAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a command list is currently recording into this allocator.
    pub fn is_in_use(&self) -> bool {
        self.recording.load(Ordering::Acquire) > 0
    }
}

/// List of commands, recorded on the host and later executed by a [`super::CommandQueue`].
///
/// Lists are created closed. [`CommandList::reset`] starts recording, [`CommandList::close`]
/// finishes it.
#[derive(Debug)]
pub struct CommandList {
    pub label: Option<String>,
    commands: Vec<Command>,
    allocator: Option<Arc<AtomicU32>>,
}

impl CommandList {
    pub fn new(label: Option<&str>) -> Self {
        Self {
            label: label.map(String::from),
            commands: vec![],
            allocator: None,
        }
    }

    /// Discards previously recorded commands and starts recording into `allocator`.
    pub fn reset(&mut self, allocator: &CommandAllocator) -> Result<(), DeviceError> {
        if self.is_recording() {
            return Err(DeviceError::ListNotClosed);
        }

        allocator
            .recording
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DeviceError::AllocatorInUse)?;

        self.commands.clear();
        self.allocator = Some(allocator.recording.clone());
        Ok(())
    }

    pub fn copy_buffer_to_texture(
        &mut self,
        src: ResourceId,
        footprint: PlacedFootprint,
        dst: ResourceId,
        subresource: u32,
    ) -> Result<(), DeviceError> {
        self.record(Command::CopyBufferToTexture {
            src,
            footprint,
            dst,
            subresource,
        })
    }

    pub fn resource_barrier(
        &mut self,
        resource: ResourceId,
        before: ResourceState,
        after: ResourceState,
    ) -> Result<(), DeviceError> {
        self.record(Command::Barrier {
            resource,
            before,
            after,
        })
    }

    /// Finishes recording, releasing the allocator.
    pub fn close(&mut self) -> Result<(), DeviceError> {
        match self.allocator.take() {
            Some(recording) => {
                recording.fetch_sub(1, Ordering::AcqRel);
                Ok(())
            }
            None => Err(DeviceError::ListNotRecording),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.allocator.is_some()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    fn record(&mut self, command: Command) -> Result<(), DeviceError> {
        if !self.is_recording() {
            return Err(DeviceError::ListNotRecording);
        }
        self.commands.push(command);
        Ok(())
    }
}

impl Drop for CommandList {
    fn drop(&mut self) {
        if let Some(recording) = self.allocator.take() {
            recording.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;
    use texstream_utils::PoolHandle;

    fn dummy_id() -> ResourceId {
        ResourceId(PoolHandle {
            index: 0,
            generation: NonZeroU32::MIN,
        })
    }

    #[test]
    pub fn recording_lifecycle() {
        let allocator = CommandAllocator::new();
        let mut list = CommandList::new(Some("upload"));

        assert!(matches!(
            list.resource_barrier(dummy_id(), ResourceState::CopyDest, ResourceState::Common),
            Err(DeviceError::ListNotRecording)
        ));

        list.reset(&allocator).unwrap();
        assert!(allocator.is_in_use());
        list.resource_barrier(dummy_id(), ResourceState::CopyDest, ResourceState::Common)
            .unwrap();
        list.close().unwrap();

        assert!(!allocator.is_in_use());
        assert_eq!(list.commands().len(), 1);
        assert!(matches!(list.close(), Err(DeviceError::ListNotRecording)));

        // Resetting discards the old commands
        list.reset(&allocator).unwrap();
        assert!(list.commands().is_empty());
    }

    #[test]
    pub fn new_lists_start_closed() {
        let list = CommandList::new(Some("copy"));
        assert_eq!(list.label.as_deref(), Some("copy"));
        assert!(!list.is_recording());
        assert!(list.commands().is_empty());

        // Dropping a list that never recorded leaves allocators alone
        let allocator = CommandAllocator::new();
        drop(CommandList::new(None));
        assert!(!allocator.is_in_use());
    }

    #[test]
    pub fn one_recording_list_per_allocator() {
        let allocator = CommandAllocator::new();
        let mut first = CommandList::new(None);
        let mut second = CommandList::new(None);

        first.reset(&allocator).unwrap();
        assert!(matches!(
            second.reset(&allocator),
            Err(DeviceError::AllocatorInUse)
        ));
        assert!(matches!(first.reset(&allocator), Err(DeviceError::ListNotClosed)));

        // Dropping a recording list frees the allocator too
        drop(first);
        second.reset(&allocator).unwrap();
    }
}
