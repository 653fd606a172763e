//! Aggregate container persistence.

use std::path::Path;

use log::{debug, info};
use minicsc_core::{AggregateStore, AnalysisConfig, StoreOptions};
use serde::{Deserialize, Serialize};

use crate::{json, Error, Result};

/// Version of the persisted container layout.
pub const FORMAT_VERSION: &str = "0.1";

/// Producer name recorded in every container.
pub const PRODUCER: &str = "minicsc";

/// On-disk container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Json,
    Hdf5,
}

impl ContainerFormat {
    /// Picks the format from the file extension; anything but
    /// `.h5`/`.hdf5` is JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("h5" | "hdf5") => Self::Hdf5,
            _ => Self::Json,
        }
    }
}

/// Run information stored alongside the series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetadata {
    pub format_version: String,
    pub producer: String,
    pub strip_width_charges: u32,
    pub adc_threshold: u32,
    /// Reference level the first pedestals were compared against.
    #[serde(default = "default_pedestal_baseline")]
    pub pedestal_baseline: f64,
    pub events_processed: u64,
}

pub(crate) fn default_pedestal_baseline() -> f64 {
    AnalysisConfig::default().pedestal_baseline
}

impl ContainerMetadata {
    /// Metadata for a store produced by a run of `events_processed` events.
    #[must_use]
    pub fn for_store(store: &AggregateStore, events_processed: u64) -> Self {
        let config = store.config();
        Self {
            format_version: FORMAT_VERSION.to_string(),
            producer: PRODUCER.to_string(),
            strip_width_charges: config.strip_width_charges,
            adc_threshold: config.adc_threshold,
            pedestal_baseline: config.pedestal_baseline,
            events_processed,
        }
    }

    /// Run parameters the series were booked with.
    #[must_use]
    pub fn analysis_config(&self) -> AnalysisConfig {
        AnalysisConfig::default()
            .with_strip_width_charges(self.strip_width_charges)
            .with_adc_threshold(self.adc_threshold)
            .with_pedestal_baseline(self.pedestal_baseline)
    }

    pub(crate) fn check_version(&self) -> Result<()> {
        if self.format_version == FORMAT_VERSION {
            Ok(())
        } else {
            Err(Error::InvalidFormat(format!(
                "unsupported container version {:?} (expected {FORMAT_VERSION:?})",
                self.format_version
            )))
        }
    }
}

/// Writes every non-empty series of `store`.
///
/// Returns the number of series written.
///
/// # Errors
/// Returns [`Error::Destination`] if the file cannot be created, or an
/// encoding error.
pub fn write_store<P: AsRef<Path>>(
    path: P,
    store: &AggregateStore,
    events_processed: u64,
) -> Result<usize> {
    let path = path.as_ref();
    let metadata = ContainerMetadata::for_store(store, events_processed);
    let format = ContainerFormat::from_path(path);
    debug!("Writing {format:?} container to {}", path.display());

    let written = match format {
        ContainerFormat::Json => json::write(path, store, &metadata)?,
        ContainerFormat::Hdf5 => write_hdf5(path, store, &metadata)?,
    };
    info!(
        "Wrote {written} of {} series to {}",
        store.len(),
        path.display()
    );
    Ok(written)
}

/// Opens a container, returning its metadata and a read-only store.
///
/// The file is parsed once.
///
/// # Errors
/// Returns an error if the file cannot be read or holds unknown series.
pub fn open_container<P: AsRef<Path>>(
    path: P,
    options: StoreOptions,
) -> Result<(ContainerMetadata, AggregateStore)> {
    let path = path.as_ref();
    let (metadata, store) = match ContainerFormat::from_path(path) {
        ContainerFormat::Json => json::read(path, options)?,
        ContainerFormat::Hdf5 => read_hdf5(path, options)?,
    };
    debug!(
        "Opened {} ({} series, {} events)",
        path.display(),
        store.len(),
        metadata.events_processed
    );
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((metadata, store.with_source_name(name)))
}

/// Opens a container as a read-only store.
///
/// # Errors
/// Returns an error if the file cannot be read or holds unknown series.
pub fn open_store<P: AsRef<Path>>(path: P, options: StoreOptions) -> Result<AggregateStore> {
    open_container(path, options).map(|(_, store)| store)
}

/// Reads only the metadata of a container.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_metadata<P: AsRef<Path>>(path: P) -> Result<ContainerMetadata> {
    open_container(path, StoreOptions::strict()).map(|(metadata, _)| metadata)
}

#[cfg(feature = "hdf5")]
fn write_hdf5(path: &Path, store: &AggregateStore, metadata: &ContainerMetadata) -> Result<usize> {
    crate::hdf5::write(path, store, metadata)
}

#[cfg(not(feature = "hdf5"))]
fn write_hdf5(path: &Path, _: &AggregateStore, _: &ContainerMetadata) -> Result<usize> {
    Err(hdf5_disabled(path))
}

#[cfg(feature = "hdf5")]
fn read_hdf5(path: &Path, options: StoreOptions) -> Result<(ContainerMetadata, AggregateStore)> {
    crate::hdf5::read(path, options)
}

#[cfg(not(feature = "hdf5"))]
fn read_hdf5(path: &Path, _: StoreOptions) -> Result<(ContainerMetadata, AggregateStore)> {
    Err(hdf5_disabled(path))
}

#[cfg(not(feature = "hdf5"))]
fn hdf5_disabled(path: &Path) -> Error {
    Error::UnsupportedFormat(format!(
        "{} is an HDF5 container; rebuild with the `hdf5` feature",
        path.display()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ContainerFormat::from_path(&PathBuf::from("run.h5")),
            ContainerFormat::Hdf5
        );
        assert_eq!(
            ContainerFormat::from_path(&PathBuf::from("run.HDF5")),
            ContainerFormat::Hdf5
        );
        assert_eq!(
            ContainerFormat::from_path(&PathBuf::from("run.json")),
            ContainerFormat::Json
        );
        assert_eq!(
            ContainerFormat::from_path(&PathBuf::from("run")),
            ContainerFormat::Json
        );
    }

    #[test]
    fn test_metadata_config() {
        let config = AnalysisConfig::default()
            .with_strip_width_charges(3)
            .with_adc_threshold(20)
            .with_pedestal_baseline(1000.0);
        let store = AggregateStore::book(&config).unwrap();
        let metadata = ContainerMetadata::for_store(&store, 7);
        assert_eq!(metadata.producer, PRODUCER);
        assert_eq!(metadata.events_processed, 7);
        let restored = metadata.analysis_config();
        assert_eq!(restored.strip_width_charges, 3);
        assert_eq!(restored.adc_threshold, 20);
        assert!((restored.pedestal_baseline - 1000.0).abs() < f64::EPSILON);
        assert!(metadata.check_version().is_ok());
    }
}
