//! texstream - streams DDS textures from disk into device memory
//!
//! The crate consists of three layers:
//!  * [`storage`], reading files through an accelerated storage channel (or synchronous reads,
//!    if the channel isn't available),
//!  * the DDS decoder, living in the `texstream_dds` crate,
//!  * [`texture`], uploading decoded mip chains into device local textures.
//!
//! Devices are abstracted by [`graphics::Device`]. Along with the library, a command line utility
//! is provided, see [`Cli`].

use clap::{Parser, Subcommand};
use commands::{inspect::InspectCommand, read::ReadCommand, upload::UploadCommand};
use config::LoaderConfig;
use std::path::PathBuf;
use texstream_utils::{ok, AnyResult};

pub mod commands;
pub mod config;
pub mod graphics;
pub mod storage;
pub mod texture;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file. Defaults are used if not specified.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
    /// Overrides the log level of the configuration file.
    #[arg(long)]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand)]
pub enum CliCommand {
    /// Decodes a DDS file and prints its layout
    Inspect(InspectCommand),
    /// Loads a file through the storage engine
    Read(ReadCommand),
    /// Uploads a DDS file into a device texture
    Upload(UploadCommand),
}

pub trait Command {
    fn run(self, config: &LoaderConfig) -> AnyResult;
}

/// Runs `texstream` as if it was ran from the command line, with an already loaded
/// configuration.
pub fn run(cli: Cli, config: &LoaderConfig) -> AnyResult {
    match cli.command {
        CliCommand::Inspect(c) => c.run(config)?,
        CliCommand::Read(c) => c.run(config)?,
        CliCommand::Upload(c) => c.run(config)?,
    }
    ok()
}
