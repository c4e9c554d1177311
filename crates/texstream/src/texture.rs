//! DDS texture upload driver
//!
//! Decodes a DDS file and copies all of its mip levels into a device local texture, through an
//! upload heap staging buffer. The call blocks until the copy finishes, the texture is returned in
//! the [`ResourceState::PixelShaderResource`] state, ready to be bound through the returned
//! [`ShaderResourceViewDesc`].

use crate::graphics::{
    CommandAllocator, CommandList, CommandQueue, CopyableFootprints, Device, DeviceError,
    HeapType, ResourceDesc, ResourceId, ResourceState, ShaderResourceViewDesc,
};
use itertools::Itertools;
use log::*;
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use texstream_dds::{DdsContainer, DdsError};
use texstream_utils::WaitEvent;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextureLoadError {
    #[error("couldn't read `{}`: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("a DDS decoding error occurred: {0}")]
    Decode(#[from] DdsError),
    #[error("a device error occurred: {0}")]
    Device(#[from] DeviceError),
}

/// Objects an upload records and submits work with. All of them are borrowed, the caller keeps
/// ownership.
#[derive(Debug)]
pub struct UploadContext<'a> {
    pub device: &'a dyn Device,
    pub queue: &'a dyn CommandQueue,
    pub allocator: &'a CommandAllocator,
    /// Must be closed. Gets reset, recorded into and closed again.
    pub list: &'a mut CommandList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedTexture {
    pub resource: ResourceId,
    pub desc: ResourceDesc,
    pub srv: ShaderResourceViewDesc,
}

/// Reads a DDS file and uploads it with [`upload_dds`], labelling the texture with the file name.
pub fn load_dds_texture(
    ctx: &mut UploadContext,
    path: impl AsRef<Path>,
) -> Result<LoadedTexture, TextureLoadError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| TextureLoadError::Read {
        path: path.to_owned(),
        source,
    })?;

    let label = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    upload_dds(ctx, &bytes, &label)
}

/// Decodes a DDS file and uploads every mip level of it into a new default heap texture.
///
/// Nothing gets created on the device if the data can't be decoded. If any later step fails, the
/// texture and the staging buffer are released before returning.
pub fn upload_dds(
    ctx: &mut UploadContext,
    bytes: &[u8],
    label: &str,
) -> Result<LoadedTexture, TextureLoadError> {
    let dds = texstream_dds::decode(bytes)?;
    trace!(
        "Uploading `{label}` ({}x{}, {} mips, {})",
        dds.width,
        dds.height,
        dds.mip_count,
        dds.format
    );

    let desc = ResourceDesc::texture_2d(dds.format, dds.width, dds.height, dds.mip_count)
        .with_label(label);
    let resource =
        ctx.device
            .create_committed_resource(HeapType::Default, &desc, ResourceState::CopyDest)?;

    if let Err(err) = upload_subresources(ctx, &dds, &desc, resource) {
        if let Err(release_err) = ctx.device.release_resource(resource) {
            warn!("Couldn't release texture `{label}` after a failed upload: {release_err}");
        }
        return Err(err.into());
    }

    Ok(LoadedTexture {
        resource,
        srv: ShaderResourceViewDesc::texture_2d(dds.format, dds.mip_count),
        desc,
    })
}

fn upload_subresources(
    ctx: &mut UploadContext,
    dds: &DdsContainer,
    desc: &ResourceDesc,
    texture: ResourceId,
) -> Result<(), DeviceError> {
    let footprints = ctx.device.copyable_footprints(desc, 0, dds.mip_count)?;
    let staging_data = lay_out_staging(dds, &footprints)?;

    let staging_desc = ResourceDesc::buffer(footprints.total_bytes)
        .with_label(format!("{} (staging)", desc.label.as_deref().unwrap_or("texture")));
    let staging =
        ctx.device
            .create_committed_resource(HeapType::Upload, &staging_desc, ResourceState::GenericRead)?;

    let result = copy_and_wait(ctx, &footprints, &staging_data, staging, texture);
    if ctx.list.is_recording() {
        // Only reachable if recording failed midway
        ctx.list.close()?;
    }

    ctx.device.release_resource(staging)?;
    result
}

/// Places the rows of every level at their footprints. Padding bytes stay zeroed.
fn lay_out_staging(
    dds: &DdsContainer,
    footprints: &CopyableFootprints,
) -> Result<Vec<u8>, DeviceError> {
    let total = usize::try_from(footprints.total_bytes).map_err(|_| DeviceError::OutOfMemory)?;
    let mut staging = vec![0; total];

    for (view, layout) in dds.subresources().iter().zip_eq(&footprints.layouts) {
        let row_pitch = layout.footprint.row_pitch as usize;
        for (index, row) in view.rows().enumerate() {
            let start = layout.offset as usize + index * row_pitch;
            let out_of_bounds = DeviceError::OutOfBounds {
                offset: start as u64,
                len: row.len() as u64,
                size: footprints.total_bytes,
            };
            staging
                .get_mut(start..start + row.len())
                .ok_or(out_of_bounds)?
                .copy_from_slice(row);
        }
    }

    Ok(staging)
}

fn copy_and_wait(
    ctx: &mut UploadContext,
    footprints: &CopyableFootprints,
    staging_data: &[u8],
    staging: ResourceId,
    texture: ResourceId,
) -> Result<(), DeviceError> {
    ctx.device.write_buffer(staging, 0, staging_data)?;

    let list = &mut *ctx.list;
    list.reset(ctx.allocator)?;
    for (mip, layout) in footprints.layouts.iter().enumerate() {
        list.copy_buffer_to_texture(staging, *layout, texture, mip as u32)?;
    }
    list.resource_barrier(
        texture,
        ResourceState::CopyDest,
        ResourceState::PixelShaderResource,
    )?;
    list.close()?;

    let fence = ctx.device.create_fence(0)?;
    ctx.queue.execute_command_lists(&[&*list])?;
    ctx.queue.signal(&fence, 1)?;

    let event = Arc::new(WaitEvent::new());
    fence.set_event_on_completion(1, event.clone());
    event.wait();

    // Errors while executing the copies surface here
    ctx.device.check_status()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::{
        soft::{SoftDevice, SoftDeviceOptions},
        Command,
    };
    use texstream_dds::{DdsHeader, DdsPixelFormat, DxgiFormat, DDS_MAGIC};
    use texstream_utils::{fourcc, packed::PackedData};

    fn build(header: &DdsHeader, data_len: usize) -> Vec<u8> {
        let mut file = DDS_MAGIC.to_le_bytes().to_vec();
        file.extend(header.to_packed_bytes().unwrap());
        file.extend((0..data_len).map(|i| (i * 7 % 251) as u8));
        file
    }

    struct Fixture {
        device: SoftDevice,
        queue: Box<dyn CommandQueue>,
        allocator: CommandAllocator,
        list: CommandList,
    }

    impl Fixture {
        fn new(options: SoftDeviceOptions) -> Self {
            let device = SoftDevice::new(options);
            let queue = device.create_command_queue().unwrap();
            Self {
                device,
                queue,
                allocator: CommandAllocator::new(),
                list: CommandList::new(Some("upload")),
            }
        }

        fn upload(&mut self, bytes: &[u8]) -> Result<LoadedTexture, TextureLoadError> {
            let mut ctx = UploadContext {
                device: &self.device,
                queue: self.queue.as_ref(),
                allocator: &self.allocator,
                list: &mut self.list,
            };
            upload_dds(&mut ctx, bytes, "test")
        }
    }

    fn assert_round_trip(fixture: &Fixture, file: &[u8], texture: &LoadedTexture) {
        let dds = texstream_dds::decode(file).unwrap();
        for view in dds.subresources() {
            let uploaded = fixture
                .device
                .read_subresource(texture.resource, view.mip_level)
                .unwrap();
            assert_eq!(uploaded, view.data, "mip {} differs", view.mip_level);
        }
    }

    #[test]
    pub fn uncompressed_mip_chain() {
        let mut fixture = Fixture::new(Default::default());
        // 4x4 + 2x2 + 1x1 texels, 4 bytes each
        let file = build(&DdsHeader::new_2d(4, 4, 3, DdsPixelFormat::RGBA8), 84);
        let texture = fixture.upload(&file).unwrap();

        assert_eq!(texture.desc.format, Some(DxgiFormat::R8G8B8A8Unorm));
        assert_eq!(texture.desc.mip_levels, 3);
        assert_eq!(texture.srv.format, DxgiFormat::R8G8B8A8Unorm);
        assert_eq!(texture.srv.most_detailed_mip, 0);
        assert_eq!(texture.srv.mip_levels, 3);
        assert_round_trip(&fixture, &file, &texture);

        assert_eq!(
            fixture.device.resource_state(texture.resource).unwrap(),
            ResourceState::PixelShaderResource
        );
        // The staging buffer is gone
        assert_eq!(fixture.device.live_resources(), 1);
    }

    #[test]
    pub fn block_compressed_chain() {
        let mut fixture = Fixture::new(Default::default());
        let format = DdsPixelFormat::from_fourcc(fourcc("DXT1"));
        // 16x8: 4x2 + 2x1 + 1x1 + 1x1 + 1x1 blocks, 8 bytes each
        let file = build(&DdsHeader::new_2d(16, 8, 5, format), 8 * (8 + 2 + 1 + 1 + 1));
        let texture = fixture.upload(&file).unwrap();

        assert_eq!(texture.srv.format, DxgiFormat::Bc1Unorm);
        assert_round_trip(&fixture, &file, &texture);
    }

    #[test]
    pub fn exactly_one_barrier_is_recorded() {
        let mut fixture = Fixture::new(Default::default());
        let file = build(&DdsHeader::new_2d(8, 8, 4, DdsPixelFormat::BGRA8), 340);
        let texture = fixture.upload(&file).unwrap();

        let commands = fixture.list.commands();
        let copies = commands
            .iter()
            .filter(|command| matches!(command, Command::CopyBufferToTexture { .. }))
            .count();
        assert_eq!(copies, 4);
        assert_eq!(
            commands.last(),
            Some(&Command::Barrier {
                resource: texture.resource,
                before: ResourceState::CopyDest,
                after: ResourceState::PixelShaderResource,
            })
        );
        assert_eq!(commands.len(), 5);
        assert!(!fixture.list.is_recording());
        assert!(!fixture.allocator.is_in_use());
    }

    #[test]
    pub fn decode_failures_create_nothing() {
        let mut fixture = Fixture::new(Default::default());
        let mut file = build(&DdsHeader::new_2d(4, 4, 1, DdsPixelFormat::RGBA8), 64);
        file[0] = b'X';

        assert!(matches!(
            fixture.upload(&file),
            Err(TextureLoadError::Decode(DdsError::BadMagic(_)))
        ));
        assert!(matches!(
            fixture.upload(&file[..64]),
            Err(TextureLoadError::Decode(DdsError::TooShort { .. }))
        ));
        assert_eq!(fixture.device.live_resources(), 0);
    }

    #[test]
    pub fn unsupported_formats() {
        let mut fixture = Fixture::new(SoftDeviceOptions {
            bc_compression: false,
            ..Default::default()
        });
        let file = build(
            &DdsHeader::new_2d(4, 4, 1, DdsPixelFormat::from_fourcc(fourcc("DXT5"))),
            16,
        );

        assert!(matches!(
            fixture.upload(&file),
            Err(TextureLoadError::Device(DeviceError::UnsupportedFormat(
                DxgiFormat::Bc3Unorm
            )))
        ));
        assert_eq!(fixture.device.live_resources(), 0);
    }

    #[test]
    pub fn busy_allocators_are_refused() {
        let mut fixture = Fixture::new(Default::default());
        let mut other = CommandList::new(None);
        other.reset(&fixture.allocator).unwrap();

        let file = build(&DdsHeader::new_2d(4, 4, 1, DdsPixelFormat::RGBA8), 64);
        assert!(matches!(
            fixture.upload(&file),
            Err(TextureLoadError::Device(DeviceError::AllocatorInUse))
        ));
        assert_eq!(fixture.device.live_resources(), 0);

        other.close().unwrap();
        fixture.upload(&file).unwrap();
    }

    #[test]
    pub fn loading_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grass.dds");
        let file = build(&DdsHeader::new_2d(2, 2, 1, DdsPixelFormat::RGBA8), 16);
        fs::write(&path, &file).unwrap();

        let mut fixture = Fixture::new(Default::default());
        let mut ctx = UploadContext {
            device: &fixture.device,
            queue: fixture.queue.as_ref(),
            allocator: &fixture.allocator,
            list: &mut fixture.list,
        };
        let texture = load_dds_texture(&mut ctx, &path).unwrap();
        assert_eq!(texture.desc.label.as_deref(), Some("grass.dds"));

        assert!(matches!(
            load_dds_texture(&mut ctx, dir.path().join("missing.dds")),
            Err(TextureLoadError::Read { .. })
        ));
    }
}
