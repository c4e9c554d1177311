//! [`wgpu`] device backend
//!
//! wgpu tracks resource states on its own, so recorded barriers are only checked for being
//! recorded, not replayed. Copies are encoded into a single command encoder per submission.

use super::{
    Command, CommandList, CommandQueue, Device, DeviceCapabilities, DeviceError, Fence, HeapType,
    ResourceDesc, ResourceId, ResourceKind, ResourceState,
};
use anyhow::anyhow;
use log::*;
use parking_lot::Mutex;
use pollster::FutureExt;
use std::sync::Arc;
use texstream_dds::DxgiFormat;
use texstream_utils::{align, HandlePool};
use wgpu::{Features, TextureFormat};

/// The device context contains public information regarding the current [`wgpu`] instance,
/// including the device, queue and adapter. No surface is created, texstream renders nothing.
#[derive(Debug)]
pub struct DeviceContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
}

impl DeviceContext {
    /// Creates a new [`wgpu`] instance and initializes a whole device context based from that.
    pub fn create_headless() -> Result<Arc<Self>, DeviceError> {
        info!("Creating a device context...");

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .block_on()
            .ok_or_else(|| DeviceError::Backend(anyhow!("couldn't find a GPU")))?;

        info!("Using adapter: {}", adapter.get_info().name);
        info!("Using backend: {:?}", adapter.get_info().backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("texstream"),
                    // BC compression, aka DXTn or S3, if there's any
                    required_features: adapter.features() & Features::TEXTURE_COMPRESSION_BC,
                    required_limits: adapter.limits(),
                },
                None,
            )
            .block_on()
            .map_err(|err| DeviceError::Backend(err.into()))?;

        device.on_uncaptured_error(Box::new(|error| {
            error!("An error has been reported by wgpu!");
            error!("{error}");
        }));

        Ok(Arc::new(Self {
            device,
            queue,
            instance,
            adapter,
        }))
    }

    /// Runs `f` inside a validation error scope, turning captured errors into [`DeviceError`]s.
    fn validated<T>(&self, f: impl FnOnce() -> T) -> Result<T, DeviceError> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let result = f();
        match self.device.pop_error_scope().block_on() {
            Some(error) => Err(DeviceError::Backend(anyhow!("{error}"))),
            None => Ok(result),
        }
    }
}

#[derive(Debug)]
enum WgpuResource {
    Buffer {
        buffer: wgpu::Buffer,
        heap: HeapType,
    },
    Texture {
        texture: wgpu::Texture,
    },
}

type ResourcePool = Arc<Mutex<HandlePool<WgpuResource>>>;

#[derive(Debug)]
pub struct WgpuDevice {
    dc: Arc<DeviceContext>,
    capabilities: DeviceCapabilities,
    resources: ResourcePool,
}

impl WgpuDevice {
    /// Wraps a device context. Requested capabilities are masked with what the device supports.
    pub fn new(dc: Arc<DeviceContext>, requested: DeviceCapabilities) -> Self {
        let bc_supported = dc.device.features().contains(Features::TEXTURE_COMPRESSION_BC);
        if requested.bc_compression && !bc_supported {
            warn!("BC compression is not supported by the adapter");
        }

        Self {
            capabilities: DeviceCapabilities {
                direct_storage: requested.direct_storage,
                bc_compression: requested.bc_compression && bc_supported,
            },
            dc,
            resources: Default::default(),
        }
    }
}

impl Device for WgpuDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_committed_resource(
        &self,
        heap: HeapType,
        desc: &ResourceDesc,
        initial_state: ResourceState,
    ) -> Result<ResourceId, DeviceError> {
        trace!("Creating {desc:?} in {heap:?} heap, initial state {initial_state:?}");

        let resource = match desc.kind {
            ResourceKind::Buffer => {
                let usage = match heap {
                    HeapType::Upload => wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
                    HeapType::Default => {
                        wgpu::BufferUsages::COPY_DST
                            | wgpu::BufferUsages::COPY_SRC
                            | wgpu::BufferUsages::STORAGE
                    }
                };
                let buffer = self.dc.validated(|| {
                    self.dc.device.create_buffer(&wgpu::BufferDescriptor {
                        label: desc.label.as_deref(),
                        size: align(desc.width, wgpu::COPY_BUFFER_ALIGNMENT),
                        usage,
                        mapped_at_creation: false,
                    })
                })?;
                WgpuResource::Buffer { buffer, heap }
            }
            ResourceKind::Texture2D => {
                let dxgi = desc
                    .format
                    .ok_or_else(|| DeviceError::InvalidDesc(String::from("texture without a format")))?;
                if dxgi.is_block_compressed() && !self.capabilities.bc_compression {
                    return Err(DeviceError::UnsupportedFormat(dxgi));
                }
                let format = texture_format(dxgi).ok_or(DeviceError::UnsupportedFormat(dxgi))?;
                let width = u32::try_from(desc.width)
                    .map_err(|_| DeviceError::InvalidDesc(String::from("texture too wide")))?;

                let texture = self.dc.validated(|| {
                    self.dc.device.create_texture(&wgpu::TextureDescriptor {
                        label: desc.label.as_deref(),
                        size: wgpu::Extent3d {
                            width,
                            height: desc.height,
                            depth_or_array_layers: 1,
                        },
                        mip_level_count: desc.mip_levels,
                        sample_count: 1,
                        dimension: wgpu::TextureDimension::D2,
                        format,
                        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                        view_formats: &[],
                    })
                })?;
                WgpuResource::Texture { texture }
            }
        };

        Ok(ResourceId(self.resources.lock().allocate(resource)))
    }

    fn release_resource(&self, id: ResourceId) -> Result<(), DeviceError> {
        match self.resources.lock().release(id.0) {
            Some(WgpuResource::Buffer { buffer, .. }) => buffer.destroy(),
            Some(WgpuResource::Texture { texture }) => texture.destroy(),
            None => return Err(DeviceError::InvalidResource(id)),
        }
        Ok(())
    }

    fn write_buffer(&self, id: ResourceId, offset: u64, data: &[u8]) -> Result<(), DeviceError> {
        let resources = self.resources.lock();
        let Some(WgpuResource::Buffer { buffer, heap }) = resources.get(id.0) else {
            return Err(DeviceError::InvalidResource(id));
        };

        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
            return Err(DeviceError::InvalidDesc(format!(
                "buffer writes must be aligned to {} bytes",
                wgpu::COPY_BUFFER_ALIGNMENT
            )));
        }

        let len = data.len() as u64;
        let padded_len = align(len, wgpu::COPY_BUFFER_ALIGNMENT);
        if offset + padded_len > buffer.size() {
            return Err(DeviceError::OutOfBounds {
                offset,
                len,
                size: buffer.size(),
            });
        }

        if padded_len == len {
            self.dc.queue.write_buffer(buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(padded_len as usize, 0);
            self.dc.queue.write_buffer(buffer, offset, &padded);
        }

        // Writes are only flushed on submission, which storage loads never do themselves
        if *heap == HeapType::Default {
            self.dc.queue.submit(std::iter::empty());
        }
        Ok(())
    }

    fn create_command_queue(&self) -> Result<Box<dyn CommandQueue>, DeviceError> {
        Ok(Box::new(WgpuQueue {
            dc: self.dc.clone(),
            resources: self.resources.clone(),
        }))
    }
}

#[derive(Debug)]
pub struct WgpuQueue {
    dc: Arc<DeviceContext>,
    resources: ResourcePool,
}

impl CommandQueue for WgpuQueue {
    fn execute_command_lists(&self, lists: &[&CommandList]) -> Result<(), DeviceError> {
        if lists.iter().any(|list| list.is_recording()) {
            return Err(DeviceError::ListNotClosed);
        }

        let resources = self.resources.lock();
        let mut encoder = self
            .dc
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: lists.first().and_then(|list| list.label.as_deref()),
            });

        for command in lists.iter().flat_map(|list| list.commands()) {
            match *command {
                Command::CopyBufferToTexture {
                    src,
                    footprint,
                    dst,
                    subresource,
                } => {
                    let Some(WgpuResource::Buffer { buffer, .. }) = resources.get(src.0) else {
                        return Err(DeviceError::InvalidResource(src));
                    };
                    let Some(WgpuResource::Texture { texture }) = resources.get(dst.0) else {
                        return Err(DeviceError::InvalidResource(dst));
                    };

                    encoder.copy_buffer_to_texture(
                        wgpu::ImageCopyBuffer {
                            buffer,
                            layout: wgpu::ImageDataLayout {
                                offset: footprint.offset,
                                bytes_per_row: Some(footprint.footprint.row_pitch),
                                rows_per_image: None, // Not a multilayered image
                            },
                        },
                        wgpu::ImageCopyTexture {
                            texture,
                            mip_level: subresource,
                            origin: wgpu::Origin3d::ZERO,
                            aspect: wgpu::TextureAspect::All,
                        },
                        wgpu::Extent3d {
                            width: footprint.footprint.width,
                            height: footprint.footprint.height,
                            depth_or_array_layers: 1,
                        },
                    );
                }
                Command::Barrier {
                    resource,
                    before,
                    after,
                } => trace!("Barrier {resource:?}: {before:?} -> {after:?} (tracked by wgpu)"),
            }
        }

        self.dc.validated(|| {
            self.dc.queue.submit(Some(encoder.finish()));
        })
    }

    fn signal(&self, fence: &Arc<Fence>, value: u64) -> Result<(), DeviceError> {
        let fence = fence.clone();
        self.dc
            .queue
            .on_submitted_work_done(move || fence.signal(value));

        // Callbacks only fire while the device is polled
        let _ = self.dc.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }
}

/// Maps a DXGI format to its [`wgpu`] counterpart. Formats with no equivalent return [`None`].
pub fn texture_format(format: DxgiFormat) -> Option<TextureFormat> {
    use DxgiFormat as D;
    use TextureFormat as T;

    Some(match format {
        D::R32G32B32A32Float => T::Rgba32Float,
        D::R32G32B32A32Uint => T::Rgba32Uint,
        D::R16G16B16A16Float => T::Rgba16Float,
        D::R16G16B16A16Unorm => T::Rgba16Unorm,
        D::R32G32Float => T::Rg32Float,
        D::R10G10B10A2Unorm => T::Rgb10a2Unorm,
        D::R8G8B8A8Unorm => T::Rgba8Unorm,
        D::R8G8B8A8UnormSrgb => T::Rgba8UnormSrgb,
        D::R16G16Float => T::Rg16Float,
        D::R32Float => T::R32Float,
        D::R8G8Unorm => T::Rg8Unorm,
        D::R16Float => T::R16Float,
        D::R8Unorm => T::R8Unorm,
        D::B8G8R8A8Unorm => T::Bgra8Unorm,
        D::B8G8R8A8UnormSrgb => T::Bgra8UnormSrgb,
        D::Bc1Unorm => T::Bc1RgbaUnorm,
        D::Bc1UnormSrgb => T::Bc1RgbaUnormSrgb,
        D::Bc2Unorm => T::Bc2RgbaUnorm,
        D::Bc2UnormSrgb => T::Bc2RgbaUnormSrgb,
        D::Bc3Unorm => T::Bc3RgbaUnorm,
        D::Bc3UnormSrgb => T::Bc3RgbaUnormSrgb,
        D::Bc4Unorm => T::Bc4RUnorm,
        D::Bc4Snorm => T::Bc4RSnorm,
        D::Bc5Unorm => T::Bc5RgUnorm,
        D::Bc5Snorm => T::Bc5RgSnorm,
        D::Bc6hUf16 => T::Bc6hRgbUfloat,
        D::Bc6hSf16 => T::Bc6hRgbFloat,
        D::Bc7Unorm => T::Bc7RgbaUnorm,
        D::Bc7UnormSrgb => T::Bc7RgbaUnormSrgb,
        D::A8Unorm | D::B5G6R5Unorm | D::B5G5R5A1Unorm | D::B8G8R8X8Unorm => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn block_compression_is_preserved() {
        for &format in DxgiFormat::ALL {
            if let Some(mapped) = texture_format(format) {
                assert_eq!(mapped.is_compressed(), format.is_block_compressed(), "{format}");
                if format.is_block_compressed() {
                    assert_eq!(mapped.block_dimensions(), (4, 4));
                }
            }
        }
    }

    #[test]
    pub fn common_formats_are_mapped() {
        assert_eq!(texture_format(DxgiFormat::Bc1Unorm), Some(TextureFormat::Bc1RgbaUnorm));
        assert_eq!(texture_format(DxgiFormat::B8G8R8A8Unorm), Some(TextureFormat::Bgra8Unorm));
        assert_eq!(texture_format(DxgiFormat::B5G6R5Unorm), None);
    }
}
