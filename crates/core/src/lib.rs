//! Core library for reducing large GeoJSON feature collections into
//! map-ready derivative datasets.
//!
//! This library streams feature collections that are too large to parse
//! naively, filters them by year/administrative unit, thins polygon vertices,
//! optionally remaps mis-projected coordinates, and projects attributes down
//! to a declared essential subset.
//!
//! # Examples
//!
//! ```no_run
//! use geoslim_core::pipeline::{process_dataset, PipelineConfig};
//! use geoslim_core::project::DatasetKind;
//! use std::path::Path;
//!
//! let config = PipelineConfig::fire();
//! let stats = process_dataset(
//!     Path::new("fire_perimeters.geojson"),
//!     Path::new("fires_processed.geojson"),
//!     DatasetKind::Fire,
//!     &config,
//! ).unwrap();
//! println!("wrote {} features", stats.features_written);
//! ```

use thiserror::Error;

pub mod filter;
pub mod pipeline;
pub mod project;
pub mod reader;
pub mod remap;
pub mod simplify;

pub use filter::FilterOptions;
pub use pipeline::{process_dataset, DatasetStats, PipelineConfig, SampleProfile};
pub use project::DatasetKind;
pub use remap::RemapChain;
pub use simplify::SimplifyOptions;

/// Errors that can occur while reducing a feature collection
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read feature collection: {0}")]
    Read(String),

    #[error("Failed to write feature collection: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
