//! The fixed table of aggregate series and their booking parameters.

use std::fmt;
use std::str::FromStr;

use crate::config::AnalysisConfig;
use crate::error::ConfigurationError;
use crate::geometry::Layer;
use crate::histogram::{Axis, Hist1D, Hist2D, Profile1D};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of ADC counts per charge-spectrum bin group, per summed strip.
pub const CHARGE_RANGE_PER_STRIP: usize = 4096;

/// Axis of per-layer channel series (strips and wiregroups).
const CHANNEL_AXIS: Axis = Axis::new(120, 0.5, 120.5);
/// Axis of time-bin series.
const TBIN_AXIS: Axis = Axis::new(8, -0.5, 7.5);
/// Axis of per-event cluster-size series.
const CLUSTER_SIZE_AXIS: Axis = Axis::new(20, 0.5, 20.5);

/// Kind of aggregate a series holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SeriesKind {
    Hist1D,
    Hist2D,
    Profile,
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hist1D => "1D histogram",
            Self::Hist2D => "2D histogram",
            Self::Profile => "profile",
        };
        f.pad(name)
    }
}

/// Every series the analysis produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SeriesTag {
    /// Per-layer wiregroup occupancy.
    WireOccupancy,
    /// Per-layer (first wiregroup, cluster size) of anode clusters.
    SimulAnodeHit,
    /// Per-layer (wiregroup, time bin) of fired wire time bins.
    FiredTBinAnode,
    /// Wiregroup cluster sizes over all layers.
    FiredWireGroup,
    /// Per-layer summed top-K cluster charge.
    ChargeSpectra,
    /// Per-layer (time bin, strip) map of pedestal-subtracted charge.
    StripTBinAdcVal,
    /// Per-layer occupancy of strips with signal.
    StripOccupancy,
    /// Per-layer half-strip trigger occupancy.
    HalfStripOccupancy,
    /// Per-layer pedestal averaged over the run.
    AveragePedestal,
    /// Per-layer pedestal of each strip's first appearance.
    FirstPedestal,
    /// Strip cluster sizes over all layers.
    FiredStrip,
    /// Mean charge per time bin over all layers.
    ChargeTBinProfile,
    /// Mean summed cluster charge versus cluster width.
    FiredStripsAdc,
}

impl SeriesTag {
    /// All tags in booking order.
    pub const ALL: [SeriesTag; 13] = [
        Self::WireOccupancy,
        Self::SimulAnodeHit,
        Self::FiredTBinAnode,
        Self::FiredWireGroup,
        Self::ChargeSpectra,
        Self::StripTBinAdcVal,
        Self::StripOccupancy,
        Self::HalfStripOccupancy,
        Self::AveragePedestal,
        Self::FirstPedestal,
        Self::FiredStrip,
        Self::ChargeTBinProfile,
        Self::FiredStripsAdc,
    ];

    /// Stable short name, used on the command line and in `FromStr`.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.layout().1
    }

    /// Group directory in the persisted container.
    #[must_use]
    pub fn directory(self) -> &'static str {
        self.layout().0
    }

    fn layout(self) -> (&'static str, &'static str) {
        match self {
            Self::WireOccupancy => ("/Anode/wire", "wire"),
            Self::SimulAnodeHit => ("/Anode/simulAnodeHit", "simulAnodeHit"),
            Self::FiredTBinAnode => ("/Anode/firedTBinAnode", "firedTBinAnode"),
            Self::FiredWireGroup => ("/Anode", "firedWireGroup"),
            Self::ChargeSpectra => ("/Cathode/charge", "charge"),
            Self::StripTBinAdcVal => ("/Cathode/stripTBinADCVal", "stripTBinADCVal"),
            Self::StripOccupancy => ("/Cathode/strip", "strip"),
            Self::HalfStripOccupancy => ("/Cathode/halfStrip", "halfStrip"),
            Self::AveragePedestal => ("/Cathode/avgPedestal", "avgPedestal"),
            Self::FirstPedestal => ("/Cathode/fstPedestal", "fstPedestal"),
            Self::FiredStrip => ("/Cathode", "firedStrip"),
            Self::ChargeTBinProfile => ("/Cathode", "chargeTBinProfile"),
            Self::FiredStripsAdc => ("/Cathode", "firedStripsADC"),
        }
    }

    /// True if the series has one instance per layer.
    #[must_use]
    pub fn is_layered(self) -> bool {
        !matches!(
            self,
            Self::FiredWireGroup | Self::FiredStrip | Self::ChargeTBinProfile | Self::FiredStripsAdc
        )
    }

    /// Aggregate kind of the series.
    #[must_use]
    pub fn kind(self) -> SeriesKind {
        match self {
            Self::SimulAnodeHit | Self::FiredTBinAnode | Self::StripTBinAdcVal => {
                SeriesKind::Hist2D
            }
            Self::ChargeTBinProfile | Self::FiredStripsAdc => SeriesKind::Profile,
            _ => SeriesKind::Hist1D,
        }
    }

    /// Creates an empty aggregate for this tag.
    ///
    /// `layer` only affects the title.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidBinning`] if the run
    /// parameters produce an unusable axis.
    pub fn book(
        self,
        layer: Option<Layer>,
        config: &AnalysisConfig,
    ) -> Result<Series, ConfigurationError> {
        let title = match layer {
            Some(layer) => format!("{} layer {layer}", self.description()),
            None => self.description().to_string(),
        };
        let series = match self {
            Self::WireOccupancy
            | Self::StripOccupancy
            | Self::AveragePedestal
            | Self::FirstPedestal => Series::H1(Hist1D::new(title, CHANNEL_AXIS)?),
            Self::HalfStripOccupancy => {
                Series::H1(Hist1D::new(title, Axis::new(225, 0.5, 225.5))?)
            }
            Self::FiredWireGroup | Self::FiredStrip => {
                Series::H1(Hist1D::new(title, CLUSTER_SIZE_AXIS)?)
            }
            Self::ChargeSpectra => {
                let bins = config.strip_width_charges as usize * CHARGE_RANGE_PER_STRIP;
                #[allow(clippy::cast_precision_loss)]
                let high = bins as f64 + 0.5;
                Series::H1(Hist1D::new(title, Axis::new(bins, 0.5, high))?)
            }
            Self::SimulAnodeHit => Series::H2(Hist2D::new(
                title,
                CHANNEL_AXIS,
                Axis::new(11, -1.5, 9.0),
            )?),
            Self::FiredTBinAnode => Series::H2(Hist2D::new(
                title,
                CHANNEL_AXIS,
                Axis::new(16, 0.0, 16.0),
            )?),
            Self::StripTBinAdcVal => Series::H2(Hist2D::new(title, TBIN_AXIS, CHANNEL_AXIS)?),
            Self::ChargeTBinProfile => Series::Profile(Profile1D::new(title, TBIN_AXIS)?),
            Self::FiredStripsAdc => Series::Profile(Profile1D::new(title, CLUSTER_SIZE_AXIS)?),
        };
        Ok(series)
    }

    fn description(self) -> &'static str {
        match self {
            Self::WireOccupancy => "Wiregroup occupancy",
            Self::SimulAnodeHit => "Anode cluster start vs size",
            Self::FiredTBinAnode => "Fired wiregroup time bins",
            Self::FiredWireGroup => "Wiregroup cluster size",
            Self::ChargeSpectra => "Cluster charge",
            Self::StripTBinAdcVal => "Strip charge per time bin",
            Self::StripOccupancy => "Strip occupancy",
            Self::HalfStripOccupancy => "Half-strip occupancy",
            Self::AveragePedestal => "Average pedestal",
            Self::FirstPedestal => "First pedestal",
            Self::FiredStrip => "Strip cluster size",
            Self::ChargeTBinProfile => "Charge vs time bin",
            Self::FiredStripsAdc => "Cluster charge vs width",
        }
    }
}

impl fmt::Display for SeriesTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for SeriesTag {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.name() == s)
            .ok_or_else(|| ConfigurationError::UnknownTag(s.to_string()))
    }
}

/// Address of one series instance in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    pub tag: SeriesTag,
    pub layer: Option<Layer>,
}

impl SeriesKey {
    /// Key of a per-layer series instance.
    #[must_use]
    pub fn layered(tag: SeriesTag, layer: Layer) -> Self {
        Self {
            tag,
            layer: Some(layer),
        }
    }

    /// Key of a run-wide series.
    #[must_use]
    pub fn run_wide(tag: SeriesTag) -> Self {
        Self { tag, layer: None }
    }

    /// Every key booked by a run, in booking order.
    pub fn all() -> impl Iterator<Item = SeriesKey> {
        SeriesTag::ALL.into_iter().flat_map(|tag| {
            let layers: Vec<Option<Layer>> = if tag.is_layered() {
                Layer::all().map(Some).collect()
            } else {
                vec![None]
            };
            layers.into_iter().map(move |layer| SeriesKey { tag, layer })
        })
    }

    /// Persisted path, e.g. `/Cathode/charge/chargeL3`.
    #[must_use]
    pub fn path(&self) -> String {
        match self.layer {
            Some(layer) => format!("{}/{}L{layer}", self.tag.directory(), self.tag.name()),
            None => format!("{}/{}", self.tag.directory(), self.tag.name()),
        }
    }

    /// Parses a persisted path back into a key.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::UnknownPath`] if the path does not
    /// name a booked series.
    pub fn from_path(path: &str) -> Result<Self, ConfigurationError> {
        for tag in SeriesTag::ALL {
            let stem = format!("{}/{}", tag.directory(), tag.name());
            let Some(rest) = path.strip_prefix(&stem) else {
                continue;
            };
            if tag.is_layered() {
                if let Some(layer) = rest
                    .strip_prefix('L')
                    .and_then(|n| n.parse::<u8>().ok())
                    .and_then(|n| Layer::new(n).ok())
                {
                    return Ok(Self::layered(tag, layer));
                }
            } else if rest.is_empty() {
                return Ok(Self::run_wide(tag));
            }
        }
        Err(ConfigurationError::UnknownPath(path.to_string()))
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// One stored aggregate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Series {
    H1(Hist1D),
    H2(Hist2D),
    Profile(Profile1D),
}

impl Series {
    /// Kind of the aggregate.
    #[must_use]
    pub fn kind(&self) -> SeriesKind {
        match self {
            Self::H1(_) => SeriesKind::Hist1D,
            Self::H2(_) => SeriesKind::Hist2D,
            Self::Profile(_) => SeriesKind::Profile,
        }
    }

    /// Number of fills.
    #[must_use]
    pub fn entries(&self) -> u64 {
        match self {
            Self::H1(h) => h.entries(),
            Self::H2(h) => h.entries(),
            Self::Profile(p) => p.entries(),
        }
    }

    /// True if nothing was ever filled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries() == 0
    }

    /// Title of the aggregate.
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            Self::H1(h) => h.title(),
            Self::H2(h) => h.title(),
            Self::Profile(p) => p.title(),
        }
    }

    #[must_use]
    pub fn as_hist1d(&self) -> Option<&Hist1D> {
        match self {
            Self::H1(h) => Some(h),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_hist2d(&self) -> Option<&Hist2D> {
        match self {
            Self::H2(h) => Some(h),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_profile(&self) -> Option<&Profile1D> {
        match self {
            Self::Profile(p) => Some(p),
            _ => None,
        }
    }
}
