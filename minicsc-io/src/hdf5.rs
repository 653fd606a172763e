//! HDF5 container.
//!
//! Each series is a group at its persisted path (`/Cathode/charge/chargeL3`)
//! holding the per-bin arrays as datasets and the binning as attributes.
//! Run metadata lives in attributes of the root group.

use std::path::Path;
use std::str::FromStr;

use hdf5::types::{H5Type, VarLenUnicode};
use hdf5::{Dataset, File, Group};
use minicsc_core::{
    AggregateStore, Axis, Hist1D, Hist2D, Profile1D, Series, SeriesKey, StoreOptions,
};
use ndarray::ArrayView1;

use crate::container::{default_pedestal_baseline, ContainerMetadata};
use crate::{Error, Result};

pub(crate) fn write(
    path: &Path,
    store: &AggregateStore,
    metadata: &ContainerMetadata,
) -> Result<usize> {
    let file = File::create(path)?;
    set_attr_str(&file, "format_version", &metadata.format_version)?;
    set_attr_str(&file, "producer", &metadata.producer)?;
    set_attr_scalar(&file, "strip_width_charges", metadata.strip_width_charges)?;
    set_attr_scalar(&file, "adc_threshold", metadata.adc_threshold)?;
    set_attr_scalar(&file, "pedestal_baseline", metadata.pedestal_baseline)?;
    set_attr_scalar(&file, "events_processed", metadata.events_processed)?;

    let mut written = 0;
    for (key, series) in store.persistable() {
        let group = ensure_group(&file, &key.path())?;
        write_series(&group, series)?;
        written += 1;
    }
    Ok(written)
}

pub(crate) fn read(
    path: &Path,
    options: StoreOptions,
) -> Result<(ContainerMetadata, AggregateStore)> {
    let file = File::open(path)?;
    let metadata = ContainerMetadata {
        format_version: read_attr_str(&file, "format_version")?,
        producer: read_attr_str(&file, "producer")?,
        strip_width_charges: read_attr::<u32>(&file, "strip_width_charges")?,
        adc_threshold: read_attr::<u32>(&file, "adc_threshold")?,
        pedestal_baseline: read_attr_opt::<f64>(&file, "pedestal_baseline")?
            .unwrap_or_else(default_pedestal_baseline),
        events_processed: read_attr::<u64>(&file, "events_processed")?,
    };
    metadata.check_version()?;

    let mut recorded = Vec::new();
    for key in SeriesKey::all() {
        if let Some(group) = open_group(&file, &key.path())? {
            let series = read_series(&group)?;
            if series.kind() != key.tag.kind() {
                return Err(Error::InvalidFormat(format!(
                    "{key} holds a {}, expected a {}",
                    series.kind(),
                    key.tag.kind()
                )));
            }
            recorded.push((key, series));
        }
    }

    let config = metadata.analysis_config();
    let store = AggregateStore::from_series(recorded, &config, options)?;
    Ok((metadata, store))
}

fn write_series(group: &Group, series: &Series) -> Result<()> {
    set_attr_str(group, "title", series.title())?;
    set_attr_scalar(group, "entries", series.entries())?;
    match series {
        Series::H1(hist) => {
            set_attr_str(group, "kind", "h1")?;
            set_axis_attrs(group, "x", hist.axis())?;
            write_vec(group, "sum_w", &hist.contents())?;
            write_vec(group, "sum_w2", &hist.sum_w2())?;
        }
        Series::H2(hist) => {
            set_attr_str(group, "kind", "h2")?;
            set_axis_attrs(group, "x", hist.x_axis())?;
            set_axis_attrs(group, "y", hist.y_axis())?;
            write_vec(group, "sum_w", &hist.contents())?;
            write_vec(group, "sum_w2", &hist.sum_w2())?;
        }
        Series::Profile(profile) => {
            set_attr_str(group, "kind", "profile")?;
            set_axis_attrs(group, "x", profile.axis())?;
            write_vec(group, "sum_w", &profile.sum_w())?;
            write_vec(group, "sum_wy", &profile.sum_wy())?;
            write_vec(group, "sum_wy2", &profile.sum_wy2())?;
        }
    }
    Ok(())
}

fn read_series(group: &Group) -> Result<Series> {
    let kind = read_attr_str(group, "kind")?;
    let title = read_attr_str(group, "title")?;
    let entries = read_attr::<u64>(group, "entries")?;
    let series = match kind.as_str() {
        "h1" => Series::H1(
            Hist1D::from_parts(
                title,
                read_axis_attrs(group, "x")?,
                read_dataset_vec(group, "sum_w")?,
                read_dataset_vec(group, "sum_w2")?,
                entries,
            )?,
        ),
        "h2" => Series::H2(
            Hist2D::from_parts(
                title,
                read_axis_attrs(group, "x")?,
                read_axis_attrs(group, "y")?,
                read_dataset_vec(group, "sum_w")?,
                read_dataset_vec(group, "sum_w2")?,
                entries,
            )?,
        ),
        "profile" => Series::Profile(
            Profile1D::from_parts(
                title,
                read_axis_attrs(group, "x")?,
                read_dataset_vec(group, "sum_w")?,
                read_dataset_vec(group, "sum_wy")?,
                read_dataset_vec(group, "sum_wy2")?,
                entries,
            )?,
        ),
        other => {
            return Err(Error::InvalidFormat(format!(
                "{}: unknown series kind {other:?}",
                group.name()
            )))
        }
    };
    Ok(series)
}

fn ensure_group(file: &File, path: &str) -> Result<Group> {
    let mut current: Option<Group> = None;
    for part in path.split('/').filter(|part| !part.is_empty()) {
        let parent: &Group = current.as_ref().unwrap_or(file);
        let next = if parent.link_exists(part) {
            parent.group(part)?
        } else {
            parent.create_group(part)?
        };
        current = Some(next);
    }
    current.ok_or_else(|| Error::InvalidFormat(format!("empty group path {path:?}")))
}

fn open_group(file: &File, path: &str) -> Result<Option<Group>> {
    let mut current: Option<Group> = None;
    for part in path.split('/').filter(|part| !part.is_empty()) {
        let parent: &Group = current.as_ref().unwrap_or(file);
        if !parent.link_exists(part) {
            return Ok(None);
        }
        current = Some(parent.group(part)?);
    }
    Ok(current)
}

fn write_vec(group: &Group, name: &str, data: &[f64]) -> Result<()> {
    let dataset = create_fixed_dataset::<f64>(group, name, data.len())?;
    dataset.write(ArrayView1::from(data))?;
    Ok(())
}

fn create_fixed_dataset<T: H5Type>(group: &Group, name: &str, len: usize) -> Result<Dataset> {
    Ok(group.new_dataset::<T>().shape((len,)).create(name)?)
}

fn set_axis_attrs(group: &Group, prefix: &str, axis: &Axis) -> Result<()> {
    set_attr_scalar(group, &format!("{prefix}_bins"), axis.bins() as u64)?;
    set_attr_scalar(group, &format!("{prefix}_low"), axis.low())?;
    set_attr_scalar(group, &format!("{prefix}_high"), axis.high())?;
    Ok(())
}

fn read_axis_attrs(group: &Group, prefix: &str) -> Result<Axis> {
    let bins = read_attr::<u64>(group, &format!("{prefix}_bins"))?;
    let bins = usize::try_from(bins).map_err(|_| {
        Error::InvalidFormat(format!("{}: bin count {bins} too large", group.name()))
    })?;
    Ok(Axis::new(
        bins,
        read_attr::<f64>(group, &format!("{prefix}_low"))?,
        read_attr::<f64>(group, &format!("{prefix}_high"))?,
    ))
}

fn set_attr_scalar<T: H5Type>(group: &Group, name: &str, value: T) -> Result<()> {
    group
        .new_attr::<T>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn set_attr_str(group: &Group, name: &str, value: &str) -> Result<()> {
    let value = to_var_len_unicode(value)?;
    group
        .new_attr::<VarLenUnicode>()
        .create(name)?
        .write_scalar(&value)?;
    Ok(())
}

fn read_attr<T: H5Type + Clone>(group: &Group, name: &str) -> Result<T> {
    Ok(group.attr(name)?.read_scalar::<T>()?)
}

fn read_attr_opt<T: H5Type + Clone>(group: &Group, name: &str) -> Result<Option<T>> {
    if group.attr_names()?.iter().any(|attr| attr == name) {
        read_attr(group, name).map(Some)
    } else {
        Ok(None)
    }
}

fn read_attr_str(group: &Group, name: &str) -> Result<String> {
    let value: VarLenUnicode = group.attr(name)?.read_scalar()?;
    Ok(value.to_string())
}

fn read_dataset_vec(group: &Group, name: &str) -> Result<Vec<f64>> {
    let dataset = group.dataset(name)?;
    Ok(dataset.read_raw::<f64>()?)
}

fn to_var_len_unicode(value: &str) -> Result<VarLenUnicode> {
    VarLenUnicode::from_str(value)
        .map_err(|e| Error::InvalidFormat(format!("invalid utf-8 attribute: {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use minicsc_core::{AnalysisConfig, Layer, SeriesTag};
    use tempfile::Builder;

    #[test]
    fn test_hdf5_store_roundtrip() {
        let config = AnalysisConfig::default().with_pedestal_baseline(1010.0);
        let mut store = AggregateStore::book(&config).unwrap();
        let layer = Layer::new(2).ok();
        store
            .hist1d_mut(SeriesTag::ChargeSpectra, layer)
            .unwrap()
            .fill(170.0);
        store
            .hist2d_mut(SeriesTag::StripTBinAdcVal, layer)
            .unwrap()
            .fill_weighted(3.0, 17.0, 90.0);
        store
            .profile_mut(SeriesTag::FiredStripsAdc, None)
            .unwrap()
            .fill(3.0, 170.0);
        let metadata = ContainerMetadata::for_store(&store, 1);

        let file = Builder::new().suffix(".h5").tempfile().unwrap();
        assert_eq!(write(file.path(), &store, &metadata).unwrap(), 3);

        let (read_metadata, reopened) = read(file.path(), StoreOptions::strict()).unwrap();
        assert_eq!(read_metadata, metadata);
        assert_eq!(read_metadata.pedestal_baseline, 1010.0);
        assert_eq!(reopened.config().pedestal_baseline, 1010.0);
        assert_eq!(reopened.len(), 3);
        for (key, series) in store.persistable() {
            assert_eq!(reopened.get(key.tag, key.layer).unwrap(), Some(series));
        }
        assert!(reopened
            .get(SeriesTag::ChargeSpectra, Layer::new(1).ok())
            .unwrap()
            .is_none());
    }
}
