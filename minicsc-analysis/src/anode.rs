//! Anode (wiregroup) feature extraction.

use minicsc_core::{AggregateStore, DigiCollection, Result, SeriesTag, WireDigi};

use crate::analyzer::RunCounters;
use crate::clustering::cluster_adjacent;

/// Fills the anode series from the wire collections of one event.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnodeExtractor;

impl AnodeExtractor {
    /// Creates an anode extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Processes every wire collection of one event.
    ///
    /// A present but empty collection counts as one empty wire
    /// collection, and so does an event with no wire collection at all.
    ///
    /// # Errors
    /// Returns an error if a collection has an invalid layer.
    pub fn process(
        &self,
        collections: &[DigiCollection<WireDigi>],
        store: &mut AggregateStore,
        counters: &mut RunCounters,
    ) -> Result<()> {
        if collections.is_empty() {
            counters.empty_wire_collections += 1;
            return Ok(());
        }

        for collection in collections {
            if collection.is_empty() {
                counters.empty_wire_collections += 1;
                continue;
            }
            Self::process_layer(collection, store)?;
        }
        Ok(())
    }

    fn process_layer(
        collection: &DigiCollection<WireDigi>,
        store: &mut AggregateStore,
    ) -> Result<()> {
        let layer = Some(collection.id.layer()?);

        {
            let tbins = store.hist2d_mut(SeriesTag::FiredTBinAnode, layer)?;
            for digi in &collection.digis {
                for &tbin in &digi.time_bins_on {
                    tbins.fill(f64::from(digi.wire_group), f64::from(tbin));
                }
            }
        }

        let occupancy = store.hist1d_mut(SeriesTag::WireOccupancy, layer)?;
        for digi in &collection.digis {
            occupancy.fill(f64::from(digi.wire_group));
        }

        let wire_groups: Vec<u32> = collection.digis.iter().map(|d| d.wire_group).collect();
        for cluster in cluster_adjacent(&wire_groups) {
            #[allow(clippy::cast_precision_loss)]
            let size = cluster.len() as f64;
            store
                .hist1d_mut(SeriesTag::FiredWireGroup, None)?
                .fill(size);
            store
                .hist2d_mut(SeriesTag::SimulAnodeHit, layer)?
                .fill(f64::from(cluster.first_channel), size);
        }

        Ok(())
    }
}
