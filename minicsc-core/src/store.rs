//! The aggregate store: every series of one run, addressed by tag and layer.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::config::AnalysisConfig;
use crate::error::{ConfigurationError, Result};
use crate::geometry::{Layer, NUM_LAYERS};
use crate::histogram::{Hist1D, Hist2D, Profile1D};
use crate::series::{Series, SeriesKey, SeriesKind, SeriesTag};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How lookups of unrecorded series resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MissingPolicy {
    /// A missing series resolves to an empty series with zero entries.
    #[default]
    Tolerant,
    /// A missing series resolves to `None`.
    Strict,
}

/// Index convention of [`LayeredSeries::get`] and [`AggregateStore::get_named`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LayerIndexing {
    /// Index `n` is physical layer `n` (1..=6).
    #[default]
    Physical,
    /// Index `n` is physical layer `n + 1` (0..=5).
    ZeroBased,
}

impl LayerIndexing {
    /// Translates an index into a physical layer.
    #[must_use]
    pub fn layer(self, index: usize) -> Option<Layer> {
        let number = match self {
            Self::Physical => index,
            Self::ZeroBased => index.checked_add(1)?,
        };
        u8::try_from(number).ok().and_then(|n| Layer::new(n).ok())
    }

    /// Translates a physical layer into an index.
    #[must_use]
    pub fn index(self, layer: Layer) -> usize {
        let number = usize::from(layer.number());
        match self {
            Self::Physical => number,
            Self::ZeroBased => number - 1,
        }
    }
}

/// Lookup behavior of an [`AggregateStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StoreOptions {
    pub policy: MissingPolicy,
    pub indexing: LayerIndexing,
}

impl StoreOptions {
    /// Strict policy with physical indexing.
    #[must_use]
    pub fn strict() -> Self {
        Self::default().with_policy(MissingPolicy::Strict)
    }

    #[must_use]
    pub fn with_policy(mut self, policy: MissingPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_indexing(mut self, indexing: LayerIndexing) -> Self {
        self.indexing = indexing;
        self
    }
}

/// Every series of one run.
///
/// A store is either booked for a new run ([`AggregateStore::book`]) and
/// filled by the extractors, or rebuilt from a persisted container
/// ([`AggregateStore::from_series`]), where series with no entries are
/// absent. Lookups of absent series follow the [`MissingPolicy`].
#[derive(Debug, Clone)]
pub struct AggregateStore {
    series: BTreeMap<SeriesKey, Series>,
    placeholders: BTreeMap<SeriesKey, Series>,
    config: AnalysisConfig,
    options: StoreOptions,
    source_name: Option<String>,
}

impl AggregateStore {
    /// Books every series of a run.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidBinning`] if the run parameters
    /// produce an unusable axis.
    pub fn book(config: &AnalysisConfig) -> Result<Self> {
        Ok(Self {
            series: Self::book_keys(SeriesKey::all(), config)?,
            placeholders: BTreeMap::new(),
            config: config.clone(),
            options: StoreOptions::default(),
            source_name: None,
        })
    }

    fn book_keys(
        keys: impl Iterator<Item = SeriesKey>,
        config: &AnalysisConfig,
    ) -> std::result::Result<BTreeMap<SeriesKey, Series>, ConfigurationError> {
        keys.map(|key| key.tag.book(key.layer, config).map(|series| (key, series)))
            .collect()
    }

    /// Rebuilds a store from recorded series.
    ///
    /// `config` supplies the binning of placeholders for absent series.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidBinning`] if `config` produces
    /// an unusable placeholder axis.
    pub fn from_series(
        recorded: impl IntoIterator<Item = (SeriesKey, Series)>,
        config: &AnalysisConfig,
        options: StoreOptions,
    ) -> Result<Self> {
        let series: BTreeMap<SeriesKey, Series> = recorded.into_iter().collect();
        let placeholders = match options.policy {
            MissingPolicy::Tolerant => Self::book_keys(
                SeriesKey::all().filter(|key| !series.contains_key(key)),
                config,
            )?,
            MissingPolicy::Strict => BTreeMap::new(),
        };
        Ok(Self {
            series,
            placeholders,
            config: config.clone(),
            options,
            source_name: None,
        })
    }

    /// Attaches the name of the container the store was read from.
    #[must_use]
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// Name of the container the store was read from.
    #[must_use]
    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    /// Lookup behavior.
    #[must_use]
    pub fn options(&self) -> StoreOptions {
        self.options
    }

    /// Run parameters the series were booked with.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Number of recorded series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// True if no series is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Keys of the recorded series, in tag then layer order.
    pub fn keys(&self) -> impl Iterator<Item = &SeriesKey> {
        self.series.keys()
    }

    /// Recorded series, in tag then layer order.
    pub fn iter(&self) -> impl Iterator<Item = (&SeriesKey, &Series)> {
        self.series.iter()
    }

    /// Series with at least one entry; the ones written to a container.
    pub fn persistable(&self) -> impl Iterator<Item = (&SeriesKey, &Series)> {
        self.series.iter().filter(|(_, series)| !series.is_empty())
    }

    fn key(
        tag: SeriesTag,
        layer: Option<Layer>,
    ) -> std::result::Result<SeriesKey, ConfigurationError> {
        match (tag.is_layered(), layer) {
            (true, Some(layer)) => Ok(SeriesKey::layered(tag, layer)),
            (true, None) => Err(ConfigurationError::LayerRequired(tag)),
            (false, None) => Ok(SeriesKey::run_wide(tag)),
            (false, Some(_)) => Err(ConfigurationError::NotLayered(tag)),
        }
    }

    fn mismatch(tag: SeriesTag, expected: SeriesKind) -> ConfigurationError {
        ConfigurationError::KindMismatch {
            tag,
            expected,
            found: tag.kind(),
        }
    }

    /// Resolves a series.
    ///
    /// `layer` must be given for per-layer tags and omitted for run-wide
    /// ones. An unrecorded series is an empty series under
    /// [`MissingPolicy::Tolerant`] and `None` under [`MissingPolicy::Strict`].
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] if `layer` does not match the tag.
    pub fn get(&self, tag: SeriesTag, layer: Option<Layer>) -> Result<Option<&Series>> {
        let key = Self::key(tag, layer)?;
        Ok(self
            .series
            .get(&key)
            .or_else(|| self.placeholders.get(&key)))
    }

    /// Resolves a series by tag name and layer index.
    ///
    /// The index follows the store's [`LayerIndexing`].
    ///
    /// # Errors
    /// Returns [`ConfigurationError::UnknownTag`] for an unknown name and
    /// the errors of [`AggregateStore::get`].
    pub fn get_named(&self, name: &str, index: Option<usize>) -> Result<Option<&Series>> {
        let tag: SeriesTag = name.parse()?;
        let layer = match index {
            Some(index) => match self.options.indexing.layer(index) {
                Some(layer) => Some(layer),
                None => return Ok(None),
            },
            None => None,
        };
        self.get(tag, layer)
    }

    /// Resolves all six layers of a per-layer tag.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::NotLayered`] for a run-wide tag.
    pub fn get_all(&self, tag: SeriesTag) -> Result<LayeredSeries<'_>> {
        if !tag.is_layered() {
            return Err(ConfigurationError::NotLayered(tag).into());
        }
        let mut layers = [None; NUM_LAYERS];
        for (slot, layer) in layers.iter_mut().zip(Layer::all()) {
            *slot = self.get(tag, Some(layer))?;
        }
        Ok(LayeredSeries {
            tag,
            layers,
            indexing: self.options.indexing,
        })
    }

    /// Resolves a 1D histogram series.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::KindMismatch`] if the tag is not a 1D
    /// histogram, and the errors of [`AggregateStore::get`].
    pub fn get_hist1d(&self, tag: SeriesTag, layer: Option<Layer>) -> Result<Option<&Hist1D>> {
        if tag.kind() != SeriesKind::Hist1D {
            return Err(Self::mismatch(tag, SeriesKind::Hist1D).into());
        }
        Ok(self.get(tag, layer)?.and_then(Series::as_hist1d))
    }

    /// Resolves a 2D histogram series.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::KindMismatch`] if the tag is not a 2D
    /// histogram, and the errors of [`AggregateStore::get`].
    pub fn get_hist2d(&self, tag: SeriesTag, layer: Option<Layer>) -> Result<Option<&Hist2D>> {
        if tag.kind() != SeriesKind::Hist2D {
            return Err(Self::mismatch(tag, SeriesKind::Hist2D).into());
        }
        Ok(self.get(tag, layer)?.and_then(Series::as_hist2d))
    }

    /// Resolves a profile series.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::KindMismatch`] if the tag is not a
    /// profile, and the errors of [`AggregateStore::get`].
    pub fn get_profile(&self, tag: SeriesTag, layer: Option<Layer>) -> Result<Option<&Profile1D>> {
        if tag.kind() != SeriesKind::Profile {
            return Err(Self::mismatch(tag, SeriesKind::Profile).into());
        }
        Ok(self.get(tag, layer)?.and_then(Series::as_profile))
    }

    fn series_mut(&mut self, tag: SeriesTag, layer: Option<Layer>) -> Result<&mut Series> {
        let key = Self::key(tag, layer)?;
        let config = &self.config;
        match self.series.entry(key) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(tag.book(layer, config)?)),
        }
    }

    /// Mutable 1D histogram, booked on first use.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] for a kind or layer mismatch.
    pub fn hist1d_mut(&mut self, tag: SeriesTag, layer: Option<Layer>) -> Result<&mut Hist1D> {
        match self.series_mut(tag, layer)? {
            Series::H1(h) => Ok(h),
            _ => Err(Self::mismatch(tag, SeriesKind::Hist1D).into()),
        }
    }

    /// Mutable 2D histogram, booked on first use.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] for a kind or layer mismatch.
    pub fn hist2d_mut(&mut self, tag: SeriesTag, layer: Option<Layer>) -> Result<&mut Hist2D> {
        match self.series_mut(tag, layer)? {
            Series::H2(h) => Ok(h),
            _ => Err(Self::mismatch(tag, SeriesKind::Hist2D).into()),
        }
    }

    /// Mutable profile, booked on first use.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] for a kind or layer mismatch.
    pub fn profile_mut(&mut self, tag: SeriesTag, layer: Option<Layer>) -> Result<&mut Profile1D> {
        match self.series_mut(tag, layer)? {
            Series::Profile(p) => Ok(p),
            _ => Err(Self::mismatch(tag, SeriesKind::Profile).into()),
        }
    }

    fn layered_hist1d(&self, tag: SeriesTag, layer: Layer) -> Option<&Hist1D> {
        self.get_hist1d(tag, Some(layer)).ok().flatten()
    }

    fn layered_hist2d(&self, tag: SeriesTag, layer: Layer) -> Option<&Hist2D> {
        self.get_hist2d(tag, Some(layer)).ok().flatten()
    }

    /// Wiregroup occupancy of `layer`.
    ///
    /// `None` if the series is absent under [`MissingPolicy::Strict`].
    #[must_use]
    pub fn wire_occupancy(&self, layer: Layer) -> Option<&Hist1D> {
        self.layered_hist1d(SeriesTag::WireOccupancy, layer)
    }

    /// Anode cluster first wiregroup versus cluster size of `layer`.
    #[must_use]
    pub fn simul_anode_hit(&self, layer: Layer) -> Option<&Hist2D> {
        self.layered_hist2d(SeriesTag::SimulAnodeHit, layer)
    }

    /// Fired wiregroup time bins of `layer`.
    #[must_use]
    pub fn fired_tbin_anode(&self, layer: Layer) -> Option<&Hist2D> {
        self.layered_hist2d(SeriesTag::FiredTBinAnode, layer)
    }

    /// Summed cluster charge of `layer`.
    #[must_use]
    pub fn charge_spectra(&self, layer: Layer) -> Option<&Hist1D> {
        self.layered_hist1d(SeriesTag::ChargeSpectra, layer)
    }

    /// Pedestal-subtracted strip charge per time bin of `layer`.
    #[must_use]
    pub fn strip_tbin_adc(&self, layer: Layer) -> Option<&Hist2D> {
        self.layered_hist2d(SeriesTag::StripTBinAdcVal, layer)
    }

    /// Occupancy of strips with signal in `layer`.
    #[must_use]
    pub fn strip_occupancy(&self, layer: Layer) -> Option<&Hist1D> {
        self.layered_hist1d(SeriesTag::StripOccupancy, layer)
    }

    /// Half-strip trigger occupancy of `layer`.
    #[must_use]
    pub fn half_strip_occupancy(&self, layer: Layer) -> Option<&Hist1D> {
        self.layered_hist1d(SeriesTag::HalfStripOccupancy, layer)
    }

    /// Run-averaged strip pedestals of `layer`, once finalized.
    #[must_use]
    pub fn average_pedestal(&self, layer: Layer) -> Option<&Hist1D> {
        self.layered_hist1d(SeriesTag::AveragePedestal, layer)
    }

    /// Pedestal of each strip at its first appearance in `layer`.
    #[must_use]
    pub fn first_pedestal(&self, layer: Layer) -> Option<&Hist1D> {
        self.layered_hist1d(SeriesTag::FirstPedestal, layer)
    }

    /// Wiregroup cluster sizes over all layers.
    ///
    /// `None` if the series is absent under [`MissingPolicy::Strict`].
    #[must_use]
    pub fn fired_wire_group(&self) -> Option<&Hist1D> {
        self.get_hist1d(SeriesTag::FiredWireGroup, None).ok().flatten()
    }

    /// Strip cluster sizes over all layers.
    #[must_use]
    pub fn fired_strip(&self) -> Option<&Hist1D> {
        self.get_hist1d(SeriesTag::FiredStrip, None).ok().flatten()
    }

    /// Mean strip charge per time bin over all layers.
    #[must_use]
    pub fn charge_tbin_profile(&self) -> Option<&Profile1D> {
        self.get_profile(SeriesTag::ChargeTBinProfile, None)
            .ok()
            .flatten()
    }

    /// Mean summed cluster charge versus cluster width.
    #[must_use]
    pub fn fired_strips_adc(&self) -> Option<&Profile1D> {
        self.get_profile(SeriesTag::FiredStripsAdc, None).ok().flatten()
    }
}

/// The six layers of one per-layer tag.
#[derive(Debug, Clone, Copy)]
pub struct LayeredSeries<'a> {
    tag: SeriesTag,
    layers: [Option<&'a Series>; NUM_LAYERS],
    indexing: LayerIndexing,
}

impl<'a> LayeredSeries<'a> {
    /// Tag of the series.
    #[must_use]
    pub fn tag(&self) -> SeriesTag {
        self.tag
    }

    /// Index convention of [`LayeredSeries::get`].
    #[must_use]
    pub fn indexing(&self) -> LayerIndexing {
        self.indexing
    }

    /// Always six.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Never true; present for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Series at `index`, translated by the store's [`LayerIndexing`].
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'a Series> {
        self.indexing.layer(index).and_then(|layer| self.layer(layer))
    }

    /// Series of a physical layer.
    #[must_use]
    pub fn layer(&self, layer: Layer) -> Option<&'a Series> {
        self.layers[usize::from(layer.number()) - 1]
    }

    /// Layers in physical order.
    pub fn iter(&self) -> impl Iterator<Item = (Layer, Option<&'a Series>)> + '_ {
        Layer::all().zip(self.layers.iter().copied())
    }
}
