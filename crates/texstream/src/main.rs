use clap::Parser;
use log::*;
use texstream::{config::LoaderConfig, Cli, VERSION};
use texstream_utils::{ok, AnyResult};

fn main() -> AnyResult {
    let cli = Cli::parse_from(wild::args());

    let mut config = LoaderConfig::load(cli.config.as_deref())?;
    if let Some(log_level) = &cli.log_level {
        config.log_level = log_level.clone();
    }

    pretty_env_logger::formatted_builder()
        .format_indent(None)
        .format_timestamp(None)
        .filter_level(config.level_filter()?)
        .filter_module("wgpu_hal", LevelFilter::Off)
        .filter_module("wgpu_core", LevelFilter::Error)
        .filter_module("naga", LevelFilter::Off)
        .init();

    debug!("texstream {VERSION}");

    texstream::run(cli, &config)?;
    ok()
}
