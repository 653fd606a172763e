//! minicsc-core: Types and aggregates for MiniCSC digi analysis.
//!
//! This crate provides the digi data model, the chamber geometry,
//! fixed-binning histogram primitives, the closed table of analysis
//! series and the aggregate store that holds one run's results.
//!

pub mod config;
pub mod digi;
pub mod error;
pub mod geometry;
pub mod histogram;
pub mod series;
pub mod store;

pub use config::AnalysisConfig;
pub use digi::{ClctDigi, DigiCollection, DigiEvent, StripDigi, WireDigi};
pub use error::{ConfigurationError, DataIntegrityError, Error, Result};
pub use geometry::{DetId, Layer, Ring, NUM_LAYERS};
pub use histogram::{Axis, Hist1D, Hist2D, Profile1D};
pub use series::{Series, SeriesKey, SeriesKind, SeriesTag};
pub use store::{AggregateStore, LayerIndexing, LayeredSeries, MissingPolicy, StoreOptions};
