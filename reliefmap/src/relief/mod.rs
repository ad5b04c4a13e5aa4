//! Relief visualization of height fields.
//!
//! Rendering is a pure function of a [`RasterBuffer`] and a [`ReliefStyle`]:
//!
//! ```text
//! height field ─► 8-bit plane ─► CLAHE ─┬─► Sobel ─► hillshade ─┐
//!                                       ├─► JET colormap ───────┼─► blend ─► mask ─► RGB
//!                                       └─► Laplacian (DEM) ────┘
//! ```
//!
//! Two presets exist: [`ReliefStyle::single`] for depth-estimated heightmaps
//! and [`ReliefStyle::dem`] for engine elevation models with no-data cells.

mod blend;
mod clahe;
mod colormap;
mod error;
mod filters;
mod hillshade;
mod normalize;
mod raster;
mod render;
mod style;

pub use clahe::{equalize, ClaheParams};
pub use colormap::{apply_jet, jet_lut};
pub use error::RenderError;
pub use filters::{laplacian3, magnitude_to_gray, sobel5, Gradients};
pub use hillshade::{hillshade, shade_value, LightSource};
pub use normalize::{normalize_percentile, percentile, value_range, ValueRange, FLAT_GRAY};
pub use raster::RasterBuffer;
pub use render::{render, ReliefStats, RenderedRelief};
pub use style::{Normalization, ReliefStyle, StyleKind};
