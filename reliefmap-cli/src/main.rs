//! Reliefmap CLI - heightmap workers and offline rendering
//!
//! `reliefmap run` consumes both task queues; `single` and `batch` consume
//! one each. `render` turns a local GeoTIFF or grayscale image into a relief
//! PNG without any services.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::render::{RenderArgs, StyleArg};
use commands::serve::WorkerMode;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "reliefmap", version, about = "Shaded-relief heightmaps from aerial imagery")]
struct Cli {
    /// Config file (default: ~/.reliefmap/config.ini)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Consume the single-image and batch queues concurrently
    Run,

    /// Consume only the single-image queue
    Single,

    /// Consume only the batch queue
    Batch,

    /// Render a local GeoTIFF or grayscale image to a relief PNG
    Render {
        /// Input raster (.tif/.tiff are read as DEMs)
        input: PathBuf,

        /// Output PNG path
        output: PathBuf,

        /// Render style (default: dem for GeoTIFF input, single otherwise)
        #[arg(long, value_enum)]
        style: Option<StyleArg>,
    },

    /// Inspect the effective configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();

    let result: Result<(), CliError> = match cli.command {
        Commands::Run => commands::serve::run(cli.config, WorkerMode::Both),
        Commands::Single => commands::serve::run(cli.config, WorkerMode::Single),
        Commands::Batch => commands::serve::run(cli.config, WorkerMode::Batch),
        Commands::Render {
            input,
            output,
            style,
        } => commands::render::run(RenderArgs {
            input,
            output,
            style,
        }),
        Commands::Config(command) => commands::config::run(cli.config, command),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_render_arguments() {
        let cli = Cli::try_parse_from(["reliefmap", "render", "dem.tif", "out.png", "--style", "single"])
            .unwrap();
        match cli.command {
            Commands::Render { input, output, style } => {
                assert_eq!(input, PathBuf::from("dem.tif"));
                assert_eq!(output, PathBuf::from("out.png"));
                assert_eq!(style, Some(StyleArg::Single));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["reliefmap", "batch", "--config", "/etc/reliefmap.ini"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/reliefmap.ini")));
        assert!(matches!(cli.command, Commands::Batch));
    }
}
