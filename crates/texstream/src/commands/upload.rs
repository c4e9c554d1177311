use super::create_device;
use crate::{
    config::LoaderConfig,
    graphics::{CommandAllocator, CommandList},
    texture::{load_dds_texture, UploadContext},
};
use clap::Args;
use std::{path::PathBuf, time::Instant};
use texstream_utils::{ok, AnyResult};

#[derive(Args)]
pub struct UploadCommand {
    /// Path to the DDS file.
    pub path: PathBuf,
}

impl crate::Command for UploadCommand {
    fn run(self, config: &LoaderConfig) -> AnyResult {
        let device = create_device(&config.device)?;
        let queue = device.create_command_queue()?;
        let allocator = CommandAllocator::new();
        let mut list = CommandList::new(Some("Texture Upload"));

        let start = Instant::now();
        let mut ctx = UploadContext {
            device: device.as_ref(),
            queue: queue.as_ref(),
            allocator: &allocator,
            list: &mut list,
        };
        let texture = load_dds_texture(&mut ctx, &self.path)?;

        println!(
            "Uploaded {} in {:.2?}",
            self.path.display(),
            start.elapsed()
        );
        println!("{:#?}", texture.desc);
        println!("{:#?}", texture.srv);

        device.release_resource(texture.resource)?;
        ok()
    }
}
