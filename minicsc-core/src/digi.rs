//! Digi types: per-channel readout records for one event.

use crate::error::DataIntegrityError;
use crate::geometry::{DetId, Layer};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Anode (wiregroup) hit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WireDigi {
    /// Wiregroup number.
    pub wire_group: u32,
    /// Time bins in which the wiregroup was on.
    #[cfg_attr(feature = "serde", serde(default))]
    pub time_bins_on: Vec<u16>,
}

impl WireDigi {
    /// Creates a wire digi.
    #[must_use]
    pub fn new(wire_group: u32, time_bins_on: Vec<u16>) -> Self {
        Self {
            wire_group,
            time_bins_on,
        }
    }
}

/// Cathode strip hit with its time-sampled ADC values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StripDigi {
    /// Strip number within the chamber's own numbering.
    pub strip: u32,
    /// ADC value per time bin; index is the time bin.
    pub adc_counts: Vec<i32>,
}

impl StripDigi {
    /// Creates a strip digi.
    #[must_use]
    pub fn new(strip: u32, adc_counts: Vec<i32>) -> Self {
        Self { strip, adc_counts }
    }

    /// Pedestal estimate: mean of the first two time bins.
    ///
    /// Returns `None` when fewer than two samples are present.
    #[must_use]
    pub fn pedestal(&self) -> Option<f64> {
        match self.adc_counts.as_slice() {
            [first, second, ..] => Some((f64::from(*first) + f64::from(*second)) / 2.0),
            _ => None,
        }
    }
}

/// Half-strip trigger primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClctDigi {
    /// Front-end board id; selects the layer.
    pub cfeb: u16,
    /// Key half-strip position.
    pub key_strip: u32,
}

impl ClctDigi {
    /// Creates a trigger primitive.
    #[must_use]
    pub fn new(cfeb: u16, key_strip: u32) -> Self {
        Self { cfeb, key_strip }
    }
}

/// Digis sharing one detector id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DigiCollection<D> {
    /// Detector id of every digi in the collection.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub id: DetId,
    /// Digis, ordered by channel as delivered by the event source.
    pub digis: Vec<D>,
}

impl<D> DigiCollection<D> {
    /// Creates a collection.
    #[must_use]
    pub fn new(id: DetId, digis: Vec<D>) -> Self {
        Self { id, digis }
    }

    /// Number of digis.
    #[must_use]
    pub fn len(&self) -> usize {
        self.digis.len()
    }

    /// True if the collection holds no digis.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digis.is_empty()
    }
}

/// The three digi collections of one event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DigiEvent {
    /// Event number from the event source.
    #[cfg_attr(feature = "serde", serde(default))]
    pub event_id: u64,
    /// Wire digis per layer.
    #[cfg_attr(feature = "serde", serde(default))]
    pub wires: Vec<DigiCollection<WireDigi>>,
    /// Strip digis per layer.
    #[cfg_attr(feature = "serde", serde(default))]
    pub strips: Vec<DigiCollection<StripDigi>>,
    /// Half-strip trigger primitives per chamber.
    #[cfg_attr(feature = "serde", serde(default))]
    pub clcts: Vec<DigiCollection<ClctDigi>>,
}

impl DigiEvent {
    /// Creates an event with no digis.
    #[must_use]
    pub fn new(event_id: u64) -> Self {
        Self {
            event_id,
            ..Self::default()
        }
    }

    /// Adds a wire collection.
    #[must_use]
    pub fn with_wires(mut self, id: DetId, digis: Vec<WireDigi>) -> Self {
        self.wires.push(DigiCollection::new(id, digis));
        self
    }

    /// Adds a strip collection.
    #[must_use]
    pub fn with_strips(mut self, id: DetId, digis: Vec<StripDigi>) -> Self {
        self.strips.push(DigiCollection::new(id, digis));
        self
    }

    /// Adds a trigger-primitive collection.
    #[must_use]
    pub fn with_clcts(mut self, id: DetId, digis: Vec<ClctDigi>) -> Self {
        self.clcts.push(DigiCollection::new(id, digis));
        self
    }

    /// Checks the input contract for the whole event.
    ///
    /// Wire and strip collections need a valid layer and channels in
    /// ascending order (strips strictly, wires may repeat a wiregroup).
    /// Every strip needs at least two ADC samples and every trigger
    /// primitive a mappable front-end board.
    ///
    /// # Errors
    /// Returns the first [`DataIntegrityError`] found.
    pub fn validate(&self) -> Result<(), DataIntegrityError> {
        for collection in &self.wires {
            let layer = collection.id.layer()?;
            check_ascending(layer, collection.digis.iter().map(|d| d.wire_group), false)?;
        }

        for collection in &self.strips {
            let layer = collection.id.layer()?;
            check_ascending(layer, collection.digis.iter().map(|d| d.strip), true)?;
            let ring = collection.id.ring;
            if let Some(last) = collection.digis.last() {
                ring.strip_channel(last.strip)
                    .ok_or(DataIntegrityError::ChannelOverflow {
                        layer: layer.number(),
                        channel: last.strip,
                        offset: ring.strip_offset(),
                    })?;
            }
            if let Some(short) = collection.digis.iter().find(|d| d.adc_counts.len() < 2) {
                return Err(DataIntegrityError::ShortAdcSamples {
                    layer: layer.number(),
                    strip: short.strip,
                    len: short.adc_counts.len(),
                });
            }
        }

        for collection in &self.clcts {
            let ring = collection.id.ring;
            for digi in &collection.digis {
                let layer = Layer::from_cfeb(digi.cfeb)?;
                ring.half_strip_channel(digi.key_strip)
                    .ok_or(DataIntegrityError::ChannelOverflow {
                        layer: layer.number(),
                        channel: digi.key_strip,
                        offset: ring.half_strip_offset(),
                    })?;
            }
        }

        Ok(())
    }
}

fn check_ascending(
    layer: Layer,
    channels: impl Iterator<Item = u32>,
    strict: bool,
) -> Result<(), DataIntegrityError> {
    let mut previous: Option<u32> = None;
    for current in channels {
        if let Some(prev) = previous {
            if current < prev || (strict && current == prev) {
                return Err(DataIntegrityError::UnsortedChannels {
                    layer: layer.number(),
                    previous: prev,
                    current,
                });
            }
        }
        previous = Some(current);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pedestal_from_first_two_bins() {
        let digi = StripDigi::new(5, vec![1020, 1028, 1400, 1200, 1100, 1050, 1030, 1025]);
        assert_eq!(digi.pedestal(), Some(1024.0));
        assert_eq!(StripDigi::new(5, vec![1020]).pedestal(), None);
    }

    #[test]
    fn test_validate_accepts_sorted_event() {
        let event = DigiEvent::new(1)
            .with_wires(
                DetId::new(1, 1),
                vec![WireDigi::new(5, vec![3]), WireDigi::new(5, vec![4])],
            )
            .with_strips(
                DetId::new(1, 2),
                vec![
                    StripDigi::new(3, vec![1000, 1000]),
                    StripDigi::new(4, vec![1000, 1000]),
                ],
            )
            .with_clcts(DetId::chamber(1), vec![ClctDigi::new(3, 40)]);
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unsorted_strips() {
        let event = DigiEvent::new(1).with_strips(
            DetId::new(1, 2),
            vec![
                StripDigi::new(9, vec![1000, 1000]),
                StripDigi::new(4, vec![1000, 1000]),
            ],
        );
        assert_eq!(
            event.validate().unwrap_err(),
            DataIntegrityError::UnsortedChannels {
                layer: 2,
                previous: 9,
                current: 4
            }
        );
    }

    #[test]
    fn test_validate_rejects_bad_cfeb_and_layer() {
        let event = DigiEvent::new(1).with_clcts(DetId::chamber(1), vec![ClctDigi::new(9, 1)]);
        assert_eq!(
            event.validate().unwrap_err(),
            DataIntegrityError::CfebOutOfRange(9)
        );

        let event = DigiEvent::new(1).with_wires(DetId::new(1, 0), vec![]);
        assert_eq!(
            event.validate().unwrap_err(),
            DataIntegrityError::LayerOutOfRange(0)
        );
    }

    #[test]
    fn test_validate_rejects_short_adc() {
        let event =
            DigiEvent::new(1).with_strips(DetId::new(1, 3), vec![StripDigi::new(7, vec![1000])]);
        assert!(matches!(
            event.validate(),
            Err(DataIntegrityError::ShortAdcSamples { strip: 7, len: 1, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_channel_overflow_on_outer_ring() {
        let event = DigiEvent::new(1).with_strips(
            DetId::new(4, 2),
            vec![StripDigi::new(u32::MAX - 10, vec![1000, 1000])],
        );
        assert_eq!(
            event.validate().unwrap_err(),
            DataIntegrityError::ChannelOverflow {
                layer: 2,
                channel: u32::MAX - 10,
                offset: 64
            }
        );

        let event = DigiEvent::new(1)
            .with_clcts(DetId::chamber(4), vec![ClctDigi::new(2, u32::MAX - 10)]);
        assert_eq!(
            event.validate().unwrap_err(),
            DataIntegrityError::ChannelOverflow {
                layer: 1,
                channel: u32::MAX - 10,
                offset: 128
            }
        );

        let inner = DigiEvent::new(1)
            .with_strips(
                DetId::new(1, 2),
                vec![StripDigi::new(u32::MAX - 10, vec![1000, 1000])],
            )
            .with_clcts(DetId::chamber(1), vec![ClctDigi::new(2, u32::MAX - 10)]);
        assert!(inner.validate().is_ok());
    }
}
