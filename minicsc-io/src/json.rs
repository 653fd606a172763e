//! JSON container: metadata plus a map from series path to series.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use minicsc_core::{AggregateStore, Series, SeriesKey, StoreOptions};
use serde::{Deserialize, Serialize};

use crate::container::ContainerMetadata;
use crate::{Error, Result};

#[derive(Serialize)]
struct ContainerRef<'a> {
    metadata: &'a ContainerMetadata,
    series: BTreeMap<String, &'a Series>,
}

#[derive(Deserialize)]
struct ContainerOwned {
    metadata: ContainerMetadata,
    series: BTreeMap<String, Series>,
}

pub(crate) fn write(
    path: &Path,
    store: &AggregateStore,
    metadata: &ContainerMetadata,
) -> Result<usize> {
    let series: BTreeMap<String, &Series> = store
        .persistable()
        .map(|(key, series)| (key.path(), series))
        .collect();
    let written = series.len();

    let file = File::create(path).map_err(|source| Error::Destination {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &ContainerRef { metadata, series })?;
    writer.flush()?;
    Ok(written)
}

pub(crate) fn read(
    path: &Path,
    options: StoreOptions,
) -> Result<(ContainerMetadata, AggregateStore)> {
    let file = File::open(path)?;
    let container: ContainerOwned = serde_json::from_reader(BufReader::new(file))?;
    container.metadata.check_version()?;

    let mut recorded = Vec::with_capacity(container.series.len());
    for (path, series) in container.series {
        let key = SeriesKey::from_path(&path)?;
        if series.kind() != key.tag.kind() {
            return Err(Error::InvalidFormat(format!(
                "{path} holds a {}, expected a {}",
                series.kind(),
                key.tag.kind()
            )));
        }
        recorded.push((key, series));
    }

    let config = container.metadata.analysis_config();
    let store = AggregateStore::from_series(recorded, &config, options)?;
    Ok((container.metadata, store))
}
