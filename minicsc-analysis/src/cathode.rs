//! Cathode (strip and half-strip) feature extraction.
//!
//! For every strip the pedestal is the mean of the first two ADC samples.
//! A strip carries signal if any sample exceeds the pedestal by more than
//! the configured threshold. Signal strips contribute their per-bin charge
//! to the time-bin series and their summed charge to the cluster they
//! belong to; each cluster then reports the sum of its K largest strip
//! charges.

use std::collections::BTreeSet;

use minicsc_core::{
    AggregateStore, AnalysisConfig, ClctDigi, DataIntegrityError, DigiCollection, Layer, Result,
    Ring, SeriesTag, StripDigi,
};

use crate::clustering::cluster_gated;

/// Per-strip quantities of one event.
#[derive(Debug, Clone, PartialEq)]
pub struct StripSignal {
    /// Strip channel on the shared strip axis.
    pub channel: u32,
    /// Mean of the first two ADC samples.
    pub pedestal: f64,
    /// True if any sample exceeds the pedestal by more than the threshold.
    pub is_signal: bool,
    /// Sum of pedestal-subtracted charge over all time bins.
    pub total_charge: f64,
}

impl StripSignal {
    /// Evaluates one strip digi.
    ///
    /// # Errors
    /// Returns [`DataIntegrityError::ShortAdcSamples`] if the digi has
    /// fewer than two samples and [`DataIntegrityError::ChannelOverflow`]
    /// if the ring offset pushes the strip past `u32::MAX`.
    pub fn evaluate(
        digi: &StripDigi,
        ring: Ring,
        layer: Layer,
        threshold: f64,
    ) -> std::result::Result<Self, DataIntegrityError> {
        let pedestal = digi
            .pedestal()
            .ok_or(DataIntegrityError::ShortAdcSamples {
                layer: layer.number(),
                strip: digi.strip,
                len: digi.adc_counts.len(),
            })?;
        let is_signal = digi
            .adc_counts
            .iter()
            .any(|&adc| f64::from(adc) - pedestal > threshold);
        let total_charge = if is_signal {
            digi.adc_counts
                .iter()
                .map(|&adc| f64::from(adc) - pedestal)
                .sum()
        } else {
            0.0
        };

        let channel = ring
            .strip_channel(digi.strip)
            .ok_or(DataIntegrityError::ChannelOverflow {
                layer: layer.number(),
                channel: digi.strip,
                offset: ring.strip_offset(),
            })?;
        Ok(Self {
            channel,
            pedestal,
            is_signal,
            total_charge,
        })
    }
}

/// Sums the `k` largest charges.
///
/// Sorts `charges` in descending order and returns the number of charges
/// used (at most `k`) with their sum.
pub fn top_k_charge(charges: &mut [f64], k: usize) -> (usize, f64) {
    charges.sort_unstable_by(|a, b| b.total_cmp(a));
    let width = k.min(charges.len());
    (width, charges[..width].iter().sum())
}

/// Fills the cathode series from the strip and trigger-primitive
/// collections of one event.
///
/// Keeps the set of strips already seen so the first-pedestal series
/// records each strip exactly once per run.
#[derive(Debug, Clone)]
pub struct CathodeExtractor {
    threshold: f64,
    strip_width: usize,
    seen_strips: BTreeSet<(Layer, u32)>,
}

impl CathodeExtractor {
    /// Creates a cathode extractor for one run.
    #[must_use]
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            threshold: config.threshold(),
            strip_width: config.strip_width_charges as usize,
            seen_strips: BTreeSet::new(),
        }
    }

    /// Strips that have appeared at least once, as `(layer, channel)`.
    pub fn seen_strips(&self) -> impl Iterator<Item = &(Layer, u32)> {
        self.seen_strips.iter()
    }

    /// Processes the strip pass, then the half-strip pass, of one event.
    ///
    /// # Errors
    /// Returns an error on an invalid layer, a short ADC array or a
    /// front-end board id without a layer mapping.
    pub fn process(
        &mut self,
        strips: &[DigiCollection<StripDigi>],
        clcts: &[DigiCollection<ClctDigi>],
        store: &mut AggregateStore,
    ) -> Result<()> {
        for collection in strips {
            self.process_strips(collection, store)?;
        }
        for collection in clcts {
            Self::process_half_strips(collection, store)?;
        }
        Ok(())
    }

    fn process_strips(
        &mut self,
        collection: &DigiCollection<StripDigi>,
        store: &mut AggregateStore,
    ) -> Result<()> {
        let layer = collection.id.layer()?;
        let ring = collection.id.ring;
        let at = Some(layer);

        let mut signals = Vec::with_capacity(collection.len());
        for digi in &collection.digis {
            let strip = StripSignal::evaluate(digi, ring, layer, self.threshold)?;
            let channel = f64::from(strip.channel);

            store
                .hist1d_mut(SeriesTag::AveragePedestal, at)?
                .fill_weighted(channel, strip.pedestal);
            if self.seen_strips.insert((layer, strip.channel)) {
                store
                    .hist1d_mut(SeriesTag::FirstPedestal, at)?
                    .fill_weighted(channel, strip.pedestal);
            }

            if strip.is_signal {
                for (tbin, &adc) in digi.adc_counts.iter().enumerate() {
                    #[allow(clippy::cast_precision_loss)]
                    let tbin = tbin as f64;
                    let charge = f64::from(adc) - strip.pedestal;
                    store
                        .hist2d_mut(SeriesTag::StripTBinAdcVal, at)?
                        .fill_weighted(tbin, channel, charge);
                    store
                        .profile_mut(SeriesTag::ChargeTBinProfile, None)?
                        .fill(tbin, charge);
                }
                store
                    .hist1d_mut(SeriesTag::StripOccupancy, at)?
                    .fill(channel);
            }

            signals.push(strip);
        }

        let channels: Vec<u32> = signals.iter().map(|s| s.channel).collect();
        for cluster in cluster_gated(&channels, |i| signals[i].is_signal) {
            #[allow(clippy::cast_precision_loss)]
            store
                .hist1d_mut(SeriesTag::FiredStrip, None)?
                .fill(cluster.len() as f64);

            let mut charges: Vec<f64> = signals[cluster.members.clone()]
                .iter()
                .map(|s| s.total_charge)
                .collect();
            let (width, sum) = top_k_charge(&mut charges, self.strip_width);
            if sum > 0.0 {
                store
                    .hist1d_mut(SeriesTag::ChargeSpectra, at)?
                    .fill(sum);
                #[allow(clippy::cast_precision_loss)]
                store
                    .profile_mut(SeriesTag::FiredStripsAdc, None)?
                    .fill(width as f64, sum);
            }
        }

        Ok(())
    }

    fn process_half_strips(
        collection: &DigiCollection<ClctDigi>,
        store: &mut AggregateStore,
    ) -> Result<()> {
        let ring = collection.id.ring;
        for digi in &collection.digis {
            let layer = Layer::from_cfeb(digi.cfeb)?;
            let channel = ring.half_strip_channel(digi.key_strip).ok_or(
                DataIntegrityError::ChannelOverflow {
                    layer: layer.number(),
                    channel: digi.key_strip,
                    offset: ring.half_strip_offset(),
                },
            )?;
            store
                .hist1d_mut(SeriesTag::HalfStripOccupancy, Some(layer))?
                .fill(f64::from(channel));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use minicsc_core::DetId;

    fn layer(n: u8) -> Layer {
        Layer::new(n).unwrap()
    }

    /// Strip with a flat 1024 pedestal and `peak` counts above it in bin 3.
    fn strip(number: u32, peak: i32) -> StripDigi {
        let mut adc = vec![1024; 8];
        adc[3] += peak;
        StripDigi::new(number, adc)
    }

    #[test]
    fn test_evaluate_pedestal_and_signal() {
        let digi = StripDigi::new(5, vec![1020, 1028, 1400, 1200, 1100, 1050, 1030, 1025]);
        let signal = StripSignal::evaluate(&digi, Ring(1), layer(1), 32.0).unwrap();
        assert_eq!(signal.pedestal, 1024.0);
        assert!(signal.is_signal);
        assert_eq!(signal.channel, 5);
        let expected: f64 = digi.adc_counts.iter().map(|&a| f64::from(a) - 1024.0).sum();
        assert_eq!(signal.total_charge, expected);

        let quiet = StripDigi::new(6, vec![1020, 1028, 1050, 1030, 1024, 1024, 1024, 1024]);
        let quiet = StripSignal::evaluate(&quiet, Ring(1), layer(1), 32.0).unwrap();
        assert!(!quiet.is_signal);
        assert_eq!(quiet.total_charge, 0.0);
    }

    #[test]
    fn test_evaluate_rejects_short_adc() {
        let digi = StripDigi::new(5, vec![1020]);
        assert!(matches!(
            StripSignal::evaluate(&digi, Ring(1), layer(2), 32.0),
            Err(DataIntegrityError::ShortAdcSamples { layer: 2, strip: 5, len: 1 })
        ));
    }

    #[test]
    fn test_evaluate_rejects_outer_ring_overflow() {
        let digi = StripDigi::new(u32::MAX - 10, vec![1024, 1024]);
        assert!(matches!(
            StripSignal::evaluate(&digi, Ring(4), layer(1), 32.0),
            Err(DataIntegrityError::ChannelOverflow { layer: 1, offset: 64, .. })
        ));
        let inner = StripSignal::evaluate(&digi, Ring(1), layer(1), 32.0).unwrap();
        assert_eq!(inner.channel, u32::MAX - 10);
    }

    #[test]
    fn test_top_k_charge() {
        let mut charges = vec![50.0, 30.0, 90.0, 10.0];
        assert_eq!(top_k_charge(&mut charges, 3), (3, 170.0));
        assert_eq!(charges, vec![90.0, 50.0, 30.0, 10.0]);

        let mut small = vec![7.0, 5.0];
        assert_eq!(top_k_charge(&mut small, 5), (2, 12.0));
        assert_eq!(top_k_charge(&mut [], 5), (0, 0.0));
    }

    #[test]
    fn test_outer_ring_strip_channels() {
        let config = AnalysisConfig::default();
        let mut store = AggregateStore::book(&config).unwrap();
        let mut extractor = CathodeExtractor::new(&config);
        let strips = vec![DigiCollection::new(DetId::new(4, 2), vec![strip(10, 400)])];
        let clcts = vec![DigiCollection::new(DetId::chamber(4), vec![ClctDigi::new(3, 10)])];

        extractor.process(&strips, &clcts, &mut store).unwrap();

        assert_eq!(store.strip_occupancy(layer(2)).unwrap().content_at(74.0), 1.0);
        assert_eq!(store.strip_occupancy(layer(2)).unwrap().content_at(10.0), 0.0);
        assert_eq!(store.half_strip_occupancy(layer(2)).unwrap().content_at(138.0), 1.0);
        assert_eq!(store.average_pedestal(layer(2)).unwrap().content_at(74.0), 1024.0);
    }

    #[test]
    fn test_clusters_and_top_k() {
        let config = AnalysisConfig::default().with_strip_width_charges(3);
        let mut store = AggregateStore::book(&config).unwrap();
        let mut extractor = CathodeExtractor::new(&config);
        let strips = vec![DigiCollection::new(
            DetId::new(1, 3),
            vec![
                strip(1, 50),
                strip(2, 30),
                strip(3, 90),
                strip(4, 10),
                strip(5, 0),
                strip(7, 200),
            ],
        )];

        extractor.process(&strips, &[], &mut store).unwrap();

        // strip 4 stays below threshold, so {1, 2, 3} and {7} are the clusters
        let fired = store.fired_strip().unwrap();
        assert_eq!(fired.entries(), 2);
        assert_eq!(fired.content_at(3.0), 1.0);
        assert_eq!(fired.content_at(1.0), 1.0);

        let charge = store.charge_spectra(layer(3)).unwrap();
        assert_eq!(charge.entries(), 2);
        assert_eq!(charge.content_at(170.0), 1.0);
        assert_eq!(charge.content_at(200.0), 1.0);

        let by_width = store.fired_strips_adc().unwrap();
        assert_eq!(by_width.bin_mean(3), 170.0);
        assert_eq!(by_width.bin_mean(1), 200.0);

        assert_eq!(store.strip_occupancy(layer(3)).unwrap().entries(), 4);
        let tbin = store.strip_tbin_adc(layer(3)).unwrap();
        assert_eq!(tbin.content_at(3.0, 3.0), 90.0);
        assert_eq!(store.charge_tbin_profile().unwrap().entries(), 4 * 8);
    }

    #[test]
    fn test_first_pedestal_recorded_once() {
        let config = AnalysisConfig::default();
        let mut store = AggregateStore::book(&config).unwrap();
        let mut extractor = CathodeExtractor::new(&config);

        let first = vec![DigiCollection::new(
            DetId::new(1, 1),
            vec![StripDigi::new(9, vec![1000, 1000, 1000])],
        )];
        let second = vec![DigiCollection::new(
            DetId::new(1, 1),
            vec![StripDigi::new(9, vec![1010, 1010, 1010])],
        )];
        extractor.process(&first, &[], &mut store).unwrap();
        extractor.process(&second, &[], &mut store).unwrap();

        let first_ped = store.first_pedestal(layer(1)).unwrap();
        assert_eq!(first_ped.entries(), 1);
        assert_eq!(first_ped.content_at(9.0), 1000.0);
        assert_eq!(store.average_pedestal(layer(1)).unwrap().content_at(9.0), 2010.0);
        assert_eq!(extractor.seen_strips().count(), 1);
    }

    #[test]
    fn test_first_pedestal_of_zero_is_not_overwritten() {
        let config = AnalysisConfig::default();
        let mut store = AggregateStore::book(&config).unwrap();
        let mut extractor = CathodeExtractor::new(&config);

        for adc in [0, 500] {
            let strips = vec![DigiCollection::new(
                DetId::new(1, 1),
                vec![StripDigi::new(9, vec![adc, adc])],
            )];
            extractor.process(&strips, &[], &mut store).unwrap();
        }

        let first_ped = store.first_pedestal(layer(1)).unwrap();
        assert_eq!(first_ped.entries(), 1);
        assert_eq!(first_ped.content_at(9.0), 0.0);
    }

    #[test]
    fn test_half_strip_rejects_unmapped_board() {
        let config = AnalysisConfig::default();
        let mut store = AggregateStore::book(&config).unwrap();
        let mut extractor = CathodeExtractor::new(&config);
        let clcts = vec![DigiCollection::new(DetId::chamber(1), vec![ClctDigi::new(8, 1)])];
        assert!(extractor.process(&[], &clcts, &mut store).is_err());
    }
}
