//! Error types for minicsc-core.

use crate::series::{SeriesKind, SeriesTag};
use thiserror::Error;

/// Result type alias for minicsc operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for minicsc operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid request or run parameter. Fatal, the run aborts.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Malformed input digis. Fatal, the run aborts.
    #[error("data integrity error: {0}")]
    DataIntegrity(#[from] DataIntegrityError),

    /// Finalization was requested a second time.
    #[error("run has already been finalized")]
    AlreadyFinalized,

    /// An event was submitted after finalization.
    #[error("cannot process events after the run was finalized")]
    Finalized,
}

/// Errors raised by configuration and aggregate-store lookups.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// Tag name is not in the fixed tag table.
    #[error("unknown series tag: {0:?}")]
    UnknownTag(String),

    /// Persisted path does not belong to any known series.
    #[error("unknown series path: {0:?}")]
    UnknownPath(String),

    /// Series exists but holds a different aggregate kind.
    #[error("series {tag} is a {found}, not a {expected}")]
    KindMismatch {
        tag: SeriesTag,
        expected: SeriesKind,
        found: SeriesKind,
    },

    /// A layer was given for a run-wide series.
    #[error("series {0} is run-wide and has no layers")]
    NotLayered(SeriesTag),

    /// A per-layer series was requested without a layer.
    #[error("series {0} is per-layer; a layer is required")]
    LayerRequired(SeriesTag),

    /// Run parameter outside its valid range.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Axis with no bins or an empty range.
    #[error("invalid binning: {bins} bins over [{low}, {high})")]
    InvalidBinning { bins: usize, low: f64, high: f64 },

    /// Stored per-bin array does not match the binning.
    #[error("expected {expected} stored bins, found {found}")]
    BinCountMismatch { expected: usize, found: usize },
}

/// Errors raised when input digis violate the input contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataIntegrityError {
    /// Layer number outside 1..=6.
    #[error("layer {0} outside 1..=6")]
    LayerOutOfRange(u8),

    /// Front-end board id outside the layer mapping range 2..=7.
    #[error("front-end board id {0} does not map to a layer (valid: 2..=7)")]
    CfebOutOfRange(u16),

    /// Channel list not in ascending order.
    #[error("layer {layer}: channel {current} follows channel {previous}; channels must be ascending")]
    UnsortedChannels {
        layer: u8,
        previous: u32,
        current: u32,
    },

    /// Strip digi without the two samples needed for a pedestal.
    #[error("layer {layer}: strip {strip} has {len} ADC samples; at least 2 are required")]
    ShortAdcSamples { layer: u8, strip: u32, len: usize },

    /// Channel number does not fit once the outer-ring offset is added.
    #[error("layer {layer}: channel {channel} overflows with the ring offset {offset}")]
    ChannelOverflow { layer: u8, channel: u32, offset: u32 },
}
