use super::create_device;
use crate::{
    config::LoaderConfig,
    graphics::{HeapType, ResourceDesc, ResourceState},
    storage::StorageLoader,
};
use anyhow::Context;
use clap::Args;
use std::{fs, path::PathBuf, time::Instant};
use texstream_utils::{ok, AnyResult};

#[derive(Args)]
pub struct ReadCommand {
    /// Path to the file to load.
    pub path: PathBuf,
    /// Loads the file into a device buffer instead of host memory.
    ///
    /// Requires the accelerated storage channel.
    #[arg(long)]
    pub to_buffer: bool,
}

impl crate::Command for ReadCommand {
    fn run(self, config: &LoaderConfig) -> AnyResult {
        let device = create_device(&config.device)?;
        let mut loader = StorageLoader::initialize(device.clone(), &config.storage)?;
        let mode = if loader.is_supported() {
            "accelerated"
        } else {
            "synchronous"
        };

        let start = Instant::now();
        let size = if self.to_buffer {
            let size = fs::metadata(&self.path)
                .with_context(|| format!("couldn't stat {}", self.path.display()))?
                .len();
            let desc = ResourceDesc::buffer(size.max(1)).with_label("read target");
            let buffer =
                device.create_committed_resource(HeapType::Default, &desc, ResourceState::Common)?;

            let result = loader
                .load_to_device_buffer(&self.path, buffer, 0)
                .and_then(|_| loader.flush())
                .and_then(|_| loader.wait_for_completion());
            device.release_resource(buffer)?;
            result?;
            size
        } else {
            let mut data = vec![];
            loader.load_to_host_memory(&self.path, &mut data)?;
            data.len() as u64
        };

        println!(
            "Read {size} bytes from {} ({mode}, {:.2?})",
            self.path.display(),
            start.elapsed()
        );
        ok()
    }
}
