//! Device abstraction used by the upload driver and the storage engine
//!
//! The model follows explicit graphics APIs: resources are created on a [`Device`] and referred to
//! by [`ResourceId`]s, work is recorded into a [`CommandList`] backed by a [`CommandAllocator`],
//! and submitted to a [`CommandQueue`]. Queues execute asynchronously, progress is observed through
//! [`Fence`]s.
//!
//! Two backends exist:
//!  * [`soft::SoftDevice`], a CPU reference device keeping all resources in host memory. Its queue
//!    executes work on a separate thread, the way a GPU timeline would.
//!  * `wgpu_backend::WgpuDevice`, running on top of [`wgpu`] (behind the `wgpu-backend` feature).

use std::{fmt::Debug, sync::Arc};
use texstream_dds::DxgiFormat;
use texstream_utils::PoolHandle;
use thiserror::Error;

pub mod soft;
#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

#[doc(inline)]
pub use command::*;
mod command;

#[doc(inline)]
pub use fence::*;
mod fence;

#[doc(inline)]
pub use footprint::*;
mod footprint;

/// Handle of a resource created by a [`Device`]. Only meaningful to the device that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub PoolHandle);

/// Memory pool a committed resource is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapType {
    /// Device local memory, not accessible from the host.
    Default,
    /// Host writable memory, used to stage uploads.
    Upload,
}

/// Usage state of a resource. Transitions between states are recorded with
/// [`CommandList::resource_barrier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Common,
    CopyDest,
    CopySource,
    GenericRead,
    PixelShaderResource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Buffer,
    Texture2D,
}

/// Description of a committed resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDesc {
    pub label: Option<String>,
    pub kind: ResourceKind,
    /// Byte size for buffers, texel width for textures.
    pub width: u64,
    pub height: u32,
    pub mip_levels: u32,
    /// [`None`] for buffers.
    pub format: Option<DxgiFormat>,
}

impl ResourceDesc {
    pub fn buffer(size: u64) -> Self {
        Self {
            label: None,
            kind: ResourceKind::Buffer,
            width: size,
            height: 1,
            mip_levels: 1,
            format: None,
        }
    }

    pub fn texture_2d(format: DxgiFormat, width: u32, height: u32, mip_levels: u32) -> Self {
        Self {
            label: None,
            kind: ResourceKind::Texture2D,
            width: u64::from(width),
            height,
            mip_levels,
            format: Some(format),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn is_buffer(&self) -> bool {
        self.kind == ResourceKind::Buffer
    }
}

/// Metadata needed to bind an uploaded texture to a pixel shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderResourceViewDesc {
    pub format: DxgiFormat,
    pub dimension: ViewDimension,
    /// Channel swizzle, see [`DEFAULT_COMPONENT_MAPPING`].
    pub component_mapping: u32,
    pub most_detailed_mip: u32,
    pub mip_levels: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewDimension {
    Texture2D,
}

/// Identity swizzle: every channel maps to itself.
pub const DEFAULT_COMPONENT_MAPPING: u32 = 0x1688;

impl ShaderResourceViewDesc {
    pub fn texture_2d(format: DxgiFormat, mip_levels: u32) -> Self {
        Self {
            format,
            dimension: ViewDimension::Texture2D,
            component_mapping: DEFAULT_COMPONENT_MAPPING,
            most_detailed_mip: 0,
            mip_levels,
        }
    }
}

/// Optional features of a device, determined at runtime from the configuration and the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Whether storage queues may target this device.
    pub direct_storage: bool,
    /// Specifies whether BC/DXT compressed textures can be created.
    pub bc_compression: bool,
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("resource {0:?} doesn't exist")]
    InvalidResource(ResourceId),
    #[error("invalid resource description: {0}")]
    InvalidDesc(String),
    #[error("format {0} is not supported by the device")]
    UnsupportedFormat(DxgiFormat),
    #[error("access of {len} bytes at offset {offset} is out of bounds of a {size} byte resource")]
    OutOfBounds { offset: u64, len: u64, size: u64 },
    #[error("resource {resource:?} is in state {actual:?}, expected {expected:?}")]
    WrongState {
        resource: ResourceId,
        expected: ResourceState,
        actual: ResourceState,
    },
    #[error("the command allocator is already used by a recording command list")]
    AllocatorInUse,
    #[error("the command list is not recording")]
    ListNotRecording,
    #[error("the command list is still recording")]
    ListNotClosed,
    #[error("out of device memory")]
    OutOfMemory,
    #[error("the device was removed: {0}")]
    DeviceRemoved(String),
    #[error("backend error: {0:#}")]
    Backend(anyhow::Error),
}

/// A device capable of creating resources and fences.
pub trait Device: Send + Sync + Debug {
    fn capabilities(&self) -> DeviceCapabilities;

    /// Creates a resource with its own memory allocation, in the given initial state.
    fn create_committed_resource(
        &self,
        heap: HeapType,
        desc: &ResourceDesc,
        initial_state: ResourceState,
    ) -> Result<ResourceId, DeviceError>;

    fn release_resource(&self, id: ResourceId) -> Result<(), DeviceError>;

    /// Writes bytes into a buffer. Upload heap buffers are written directly, default heap buffers
    /// are written the way storage queues would, bypassing command lists.
    fn write_buffer(&self, id: ResourceId, offset: u64, data: &[u8]) -> Result<(), DeviceError>;

    /// Creates a command queue executing on this device.
    fn create_command_queue(&self) -> Result<Box<dyn CommandQueue>, DeviceError>;

    fn create_fence(&self, initial_value: u64) -> Result<Arc<Fence>, DeviceError> {
        Ok(Arc::new(Fence::new(initial_value)))
    }

    /// Lays out `count` subresources of a texture, starting at `first`, in a linear buffer
    /// suitable for buffer to texture copies.
    fn copyable_footprints(
        &self,
        desc: &ResourceDesc,
        first: u32,
        count: u32,
    ) -> Result<CopyableFootprints, DeviceError> {
        footprint::copyable_footprints(desc, first, count)
    }

    /// Reports whether the device is still usable. Errors encountered while executing submitted
    /// work surface here.
    fn check_status(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// Executes closed command lists in submission order.
pub trait CommandQueue: Send + Sync + Debug {
    fn execute_command_lists(&self, lists: &[&CommandList]) -> Result<(), DeviceError>;

    /// Sets the fence to `value` once all previously submitted work finishes.
    fn signal(&self, fence: &Arc<Fence>, value: u64) -> Result<(), DeviceError>;
}
