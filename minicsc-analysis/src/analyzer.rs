//! Run driver: per-event extraction and end-of-run finalization.

use log::{debug, info, warn};
use minicsc_core::{
    AggregateStore, AnalysisConfig, DigiEvent, Error, Layer, Result, SeriesTag, NUM_LAYERS,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::anode::AnodeExtractor;
use crate::cathode::CathodeExtractor;

/// Run-scoped counters owned by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunCounters {
    /// Events fully processed.
    pub events_processed: u64,
    /// Empty wire collections seen.
    pub empty_wire_collections: u64,
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Accumulating,
    Finalized,
}

/// End-of-run report.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RunSummary {
    /// Events processed.
    pub events_processed: u64,
    /// Empty wire collections seen.
    pub empty_wire_collections: u64,
    /// Charge-spectrum entries per layer, layer 1 first.
    pub charge_entries: [u64; NUM_LAYERS],
}

impl RunSummary {
    /// Charge-spectrum entries of one layer.
    #[must_use]
    pub fn charge_entries(&self, layer: Layer) -> u64 {
        self.charge_entries[usize::from(layer.number()) - 1]
    }
}

/// Drives one run over a sequence of events.
///
/// Events must be submitted in run order; the first-pedestal series keeps
/// the value from the first event in which a strip appears.
#[derive(Debug)]
pub struct Analyzer {
    config: AnalysisConfig,
    store: AggregateStore,
    counters: RunCounters,
    anode: AnodeExtractor,
    cathode: CathodeExtractor,
    state: RunState,
}

impl Analyzer {
    /// Validates the run parameters and books every series.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] for invalid parameters.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            "Booking series: strip width charges = {}, ADC threshold = {}",
            config.strip_width_charges, config.adc_threshold
        );
        Ok(Self {
            store: AggregateStore::book(&config)?,
            cathode: CathodeExtractor::new(&config),
            anode: AnodeExtractor::new(),
            counters: RunCounters::default(),
            state: RunState::Accumulating,
            config,
        })
    }

    /// Run parameters.
    #[must_use]
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Aggregates accumulated so far.
    #[must_use]
    pub fn store(&self) -> &AggregateStore {
        &self.store
    }

    /// Consumes the analyzer and returns its aggregates.
    #[must_use]
    pub fn into_store(self) -> AggregateStore {
        self.store
    }

    /// Run counters.
    #[must_use]
    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Extracts one event into the store.
    ///
    /// The event is validated before any series is touched, so a rejected
    /// event leaves the store unchanged.
    ///
    /// # Errors
    /// Returns [`Error::Finalized`] after finalization and
    /// [`Error::DataIntegrity`] for malformed digis.
    pub fn process_event(&mut self, event: &DigiEvent) -> Result<()> {
        if self.state == RunState::Finalized {
            return Err(Error::Finalized);
        }
        event.validate()?;

        self.anode
            .process(&event.wires, &mut self.store, &mut self.counters)?;
        self.cathode
            .process(&event.strips, &event.clcts, &mut self.store)?;

        self.counters.events_processed += 1;
        Ok(())
    }

    /// Processes every event of an iterator, stopping at the first error.
    ///
    /// # Errors
    /// Returns the first error from the iterator or from
    /// [`Analyzer::process_event`].
    pub fn process_all<I, E>(&mut self, events: I) -> std::result::Result<u64, E>
    where
        I: IntoIterator<Item = std::result::Result<DigiEvent, E>>,
        E: From<Error>,
    {
        let mut processed = 0;
        for event in events {
            self.process_event(&event?)?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Normalizes the pedestal series and closes the run.
    ///
    /// The running pedestal sum becomes a per-event mean, and every
    /// strip with a first pedestal gets its deviation from the nominal
    /// baseline as bin error.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyFinalized`] on a second call; the series
    /// are left untouched.
    pub fn finalize(&mut self) -> Result<RunSummary> {
        if self.state == RunState::Finalized {
            return Err(Error::AlreadyFinalized);
        }

        self.normalize_pedestals()?;
        self.mark_first_pedestals()?;
        self.state = RunState::Finalized;

        let summary = self.summary();
        info!("Events processed: {}", summary.events_processed);
        info!(
            "Charge spectrum entries (layer 3): {}",
            summary.charge_entries[2]
        );
        info!(
            "Empty wire collections: {}",
            summary.empty_wire_collections
        );
        Ok(summary)
    }

    fn normalize_pedestals(&mut self) -> Result<()> {
        let events = self.counters.events_processed;
        if events == 0 {
            warn!("No events processed; average pedestals left unnormalized");
            return Ok(());
        }
        #[allow(clippy::cast_precision_loss)]
        let events = events as f64;

        for layer in Layer::all() {
            let pedestal = self
                .store
                .hist1d_mut(SeriesTag::AveragePedestal, Some(layer))?;
            for bin in 0..pedestal.axis().storage_len() {
                let content = pedestal.bin_content(bin) / events;
                let error = pedestal.bin_error(bin) / events;
                pedestal.set_bin_content(bin, content);
                pedestal.set_bin_error(bin, error);
            }
        }
        Ok(())
    }

    fn mark_first_pedestals(&mut self) -> Result<()> {
        let baseline = self.config.pedestal_baseline;
        for &(layer, channel) in self.cathode.seen_strips() {
            let first = self
                .store
                .hist1d_mut(SeriesTag::FirstPedestal, Some(layer))?;
            if let Some(bin) = first.find_bin(f64::from(channel)) {
                let deviation = baseline - first.bin_content(bin);
                first.set_bin_error(bin, deviation);
            }
        }
        Ok(())
    }

    fn summary(&self) -> RunSummary {
        let mut charge_entries = [0; NUM_LAYERS];
        for (slot, layer) in charge_entries.iter_mut().zip(Layer::all()) {
            *slot = self
                .store
                .charge_spectra(layer)
                .map_or(0, minicsc_core::Hist1D::entries);
        }
        RunSummary {
            events_processed: self.counters.events_processed,
            empty_wire_collections: self.counters.empty_wire_collections,
            charge_entries,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use minicsc_core::{ConfigurationError, DetId, StripDigi};

    fn pedestal_event(id: u64, adc: i32) -> DigiEvent {
        DigiEvent::new(id).with_strips(
            DetId::new(1, 1),
            vec![StripDigi::new(9, vec![adc, adc, adc, adc])],
        )
    }

    #[test]
    fn test_rejects_invalid_config() {
        let err = Analyzer::new(AnalysisConfig::default().with_strip_width_charges(0)).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_finalize_averages_pedestal() {
        let mut analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
        analyzer.process_event(&pedestal_event(1, 1000)).unwrap();
        analyzer.process_event(&pedestal_event(2, 1020)).unwrap();

        let summary = analyzer.finalize().unwrap();
        assert_eq!(summary.events_processed, 2);
        // no wire collections in either event
        assert_eq!(summary.empty_wire_collections, 2);

        let layer = Layer::new(1).unwrap();
        let avg = analyzer.store().average_pedestal(layer).unwrap();
        assert_eq!(avg.content_at(9.0), 1010.0);
        let expected_error = (1000.0_f64.powi(2) + 1020.0_f64.powi(2)).sqrt() / 2.0;
        approx::assert_relative_eq!(avg.bin_error(9), expected_error);

        let first = analyzer.store().first_pedestal(layer).unwrap();
        assert_eq!(first.content_at(9.0), 1000.0);
        assert_eq!(first.bin_error(9), 24.0);
    }

    #[test]
    fn test_second_finalize_fails_without_dividing_again() {
        let mut analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
        analyzer.process_event(&pedestal_event(1, 1000)).unwrap();
        analyzer.process_event(&pedestal_event(2, 1000)).unwrap();
        analyzer.finalize().unwrap();

        assert!(matches!(analyzer.finalize(), Err(Error::AlreadyFinalized)));
        let avg = analyzer
            .store()
            .average_pedestal(Layer::new(1).unwrap())
            .unwrap();
        assert_eq!(avg.content_at(9.0), 1000.0);
        assert_eq!(analyzer.state(), RunState::Finalized);
    }

    #[test]
    fn test_no_events_after_finalize() {
        let mut analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
        analyzer.finalize().unwrap();
        assert!(matches!(
            analyzer.process_event(&pedestal_event(1, 1000)),
            Err(Error::Finalized)
        ));
    }

    #[test]
    fn test_invalid_event_leaves_store_untouched() {
        let mut analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
        let event = DigiEvent::new(1).with_strips(
            DetId::new(1, 1),
            vec![
                StripDigi::new(9, vec![1000, 1000]),
                StripDigi::new(3, vec![1000, 1000]),
            ],
        );
        assert!(matches!(
            analyzer.process_event(&event),
            Err(Error::DataIntegrity(_))
        ));
        assert_eq!(analyzer.counters().events_processed, 0);
        assert_eq!(analyzer.store().persistable().count(), 0);
    }
}
