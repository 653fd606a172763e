//! Chamber geometry: layers, rings and detector ids.

use crate::error::DataIntegrityError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of layers in a CSC.
pub const NUM_LAYERS: usize = 6;

/// Ring whose strips use a shifted numbering convention.
pub const OUTER_RING: u8 = 4;

/// Strip channel offset applied to outer-ring strips.
pub const OUTER_RING_STRIP_OFFSET: u32 = 64;

/// Half-strip channel offset applied to outer-ring trigger primitives.
pub const OUTER_RING_HALF_STRIP_OFFSET: u32 = 128;

/// Lowest front-end board id with a layer mapping.
const FIRST_MAPPED_CFEB: u16 = 2;

/// Physical detection plane, always numbered 1..=6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "u8", into = "u8")
)]
pub struct Layer(u8);

impl Layer {
    /// Creates a layer from its physical number.
    ///
    /// # Errors
    /// Returns [`DataIntegrityError::LayerOutOfRange`] outside 1..=6.
    pub fn new(number: u8) -> Result<Self, DataIntegrityError> {
        if (1..=NUM_LAYERS as u8).contains(&number) {
            Ok(Self(number))
        } else {
            Err(DataIntegrityError::LayerOutOfRange(number))
        }
    }

    /// Maps a front-end board id onto the layer it reads out.
    ///
    /// Board ids 2..=7 cover layers 1..=6.
    ///
    /// # Errors
    /// Returns [`DataIntegrityError::CfebOutOfRange`] for any other id.
    pub fn from_cfeb(cfeb: u16) -> Result<Self, DataIntegrityError> {
        let last = FIRST_MAPPED_CFEB + NUM_LAYERS as u16 - 1;
        if (FIRST_MAPPED_CFEB..=last).contains(&cfeb) {
            #[allow(clippy::cast_possible_truncation)]
            Ok(Self((cfeb - FIRST_MAPPED_CFEB + 1) as u8))
        } else {
            Err(DataIntegrityError::CfebOutOfRange(cfeb))
        }
    }

    /// Physical layer number (1..=6).
    #[inline]
    #[must_use]
    pub fn number(self) -> u8 {
        self.0
    }

    /// Iterates over all layers in physical order.
    pub fn all() -> impl Iterator<Item = Layer> {
        (1..=NUM_LAYERS as u8).map(Layer)
    }
}

impl TryFrom<u8> for Layer {
    type Error = DataIntegrityError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Layer> for u8 {
    fn from(layer: Layer) -> Self {
        layer.0
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Detector ring. Affects channel numbering only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct Ring(pub u8);

impl Ring {
    /// True for the ring with shifted strip numbering.
    #[inline]
    #[must_use]
    pub fn is_outer(self) -> bool {
        self.0 == OUTER_RING
    }

    /// Offset added to strip numbers of this ring.
    #[inline]
    #[must_use]
    pub fn strip_offset(self) -> u32 {
        if self.is_outer() {
            OUTER_RING_STRIP_OFFSET
        } else {
            0
        }
    }

    /// Offset added to key half-strips of this ring.
    #[inline]
    #[must_use]
    pub fn half_strip_offset(self) -> u32 {
        if self.is_outer() {
            OUTER_RING_HALF_STRIP_OFFSET
        } else {
            0
        }
    }

    /// Strip channel on the shared strip axis, `None` on overflow.
    #[inline]
    #[must_use]
    pub fn strip_channel(self, strip: u32) -> Option<u32> {
        strip.checked_add(self.strip_offset())
    }

    /// Half-strip channel on the shared half-strip axis, `None` on overflow.
    #[inline]
    #[must_use]
    pub fn half_strip_channel(self, key_strip: u32) -> Option<u32> {
        key_strip.checked_add(self.half_strip_offset())
    }
}

/// Detector id attached to a digi collection.
///
/// `layer == 0` denotes a chamber-level collection (trigger primitives).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetId {
    /// Ring of the chamber.
    pub ring: Ring,
    /// Raw layer number as delivered by the event source.
    #[cfg_attr(feature = "serde", serde(default))]
    pub layer: u8,
}

impl DetId {
    /// Creates a layer-level id.
    #[must_use]
    pub fn new(ring: u8, layer: u8) -> Self {
        Self {
            ring: Ring(ring),
            layer,
        }
    }

    /// Creates a chamber-level id.
    #[must_use]
    pub fn chamber(ring: u8) -> Self {
        Self::new(ring, 0)
    }

    /// Physical layer of a layer-level id.
    ///
    /// # Errors
    /// Returns [`DataIntegrityError::LayerOutOfRange`] for chamber-level or invalid ids.
    pub fn layer(&self) -> Result<Layer, DataIntegrityError> {
        Layer::new(self.layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_range() {
        assert!(Layer::new(0).is_err());
        assert_eq!(Layer::new(1).unwrap().number(), 1);
        assert_eq!(Layer::new(6).unwrap().number(), 6);
        assert_eq!(
            Layer::new(7).unwrap_err(),
            DataIntegrityError::LayerOutOfRange(7)
        );
        assert_eq!(Layer::all().count(), NUM_LAYERS);
    }

    #[test]
    fn test_cfeb_mapping() {
        assert_eq!(Layer::from_cfeb(2).unwrap().number(), 1);
        assert_eq!(Layer::from_cfeb(7).unwrap().number(), 6);
        assert_eq!(
            Layer::from_cfeb(1).unwrap_err(),
            DataIntegrityError::CfebOutOfRange(1)
        );
        assert!(Layer::from_cfeb(8).is_err());
        assert!(Layer::from_cfeb(0).is_err());
    }

    #[test]
    fn test_outer_ring_offsets() {
        let outer = Ring(4);
        let inner = Ring(1);
        assert_eq!(outer.strip_channel(10), Some(74));
        assert_eq!(outer.half_strip_channel(10), Some(138));
        assert_eq!(inner.strip_channel(10), Some(10));
        assert_eq!(inner.half_strip_channel(10), Some(10));
        assert_eq!(outer.strip_channel(u32::MAX - 10), None);
        assert_eq!(outer.half_strip_channel(u32::MAX - 127), None);
        assert_eq!(inner.strip_channel(u32::MAX), Some(u32::MAX));
    }

    #[test]
    fn test_chamber_id_has_no_layer() {
        assert!(DetId::chamber(4).layer().is_err());
        assert_eq!(DetId::new(4, 3).layer().unwrap().number(), 3);
    }
}
