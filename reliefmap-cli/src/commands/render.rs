//! Render command - offline relief rendering of a local raster.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use reliefmap::dem::read_dem;
use reliefmap::relief::{render, RasterBuffer, ReliefStyle, StyleKind};

use crate::error::CliError;

/// Render style selection for CLI arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StyleArg {
    /// Single-light relief used for depth-estimated heightmaps
    Single,
    /// Dual-light relief with edge layer used for engine DEMs
    Dem,
}

impl From<StyleArg> for StyleKind {
    fn from(style: StyleArg) -> Self {
        match style {
            StyleArg::Single => StyleKind::Single,
            StyleArg::Dem => StyleKind::Dem,
        }
    }
}

/// Arguments for the render command.
pub struct RenderArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    pub style: Option<StyleArg>,
}

/// Run the render command.
pub fn run(args: RenderArgs) -> Result<(), CliError> {
    let is_dem = is_tiff(&args.input);
    let kind = args
        .style
        .map(StyleKind::from)
        .unwrap_or(if is_dem { StyleKind::Dem } else { StyleKind::Single });

    let raster = load_raster(&args.input, is_dem)?;
    let relief = render(&raster, &ReliefStyle::for_kind(kind))?;
    relief.save_png(&args.output)?;

    println!("Input:  {} ({}x{})", args.input.display(), raster.width(), raster.height());
    println!("Style:  {}", kind.as_str());
    println!(
        "Range:  {:.2} .. {:.2} ({} of {} cells valid)",
        relief.stats.input_range.min,
        relief.stats.input_range.max,
        relief.stats.valid_cells,
        relief.stats.total_cells
    );
    println!("Output: {}", args.output.display());
    Ok(())
}

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "tif" | "tiff"))
        .unwrap_or(false)
}

fn load_raster(path: &Path, is_dem: bool) -> Result<RasterBuffer, CliError> {
    if is_dem {
        return Ok(read_dem(path)?.raster);
    }
    let image = image::open(path)
        .map_err(|e| CliError::Render(format!("{}: {}", path.display(), e)))?
        .to_luma8();
    Ok(RasterBuffer::from_gray(&image)?)
}
