//! minicsc-io: Event input and aggregate persistence for MiniCSC analysis.
//!
//! Events are read from JSON-lines files. Aggregate stores are written to
//! and reopened from JSON or, with the `hdf5` feature, HDF5 containers.
//!

pub mod container;
mod error;
pub mod events;
#[cfg(feature = "hdf5")]
mod hdf5;
mod json;

pub use container::{
    open_container, open_store, read_metadata, write_store, ContainerFormat, ContainerMetadata, FORMAT_VERSION,
    PRODUCER,
};
pub use error::{Error, Result};
pub use events::{write_events, EventReader};
