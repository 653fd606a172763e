//! minicsc-analysis: Feature extraction for MiniCSC digis.
//!
//! The [`Analyzer`] drives a run: each event goes through the
//! [`AnodeExtractor`] and the [`CathodeExtractor`], which fill the series
//! of an [`minicsc_core::AggregateStore`]. [`Analyzer::finalize`] turns
//! the pedestal sums into means once all events are in.
//!

pub mod analyzer;
pub mod anode;
pub mod cathode;
pub mod clustering;

pub use analyzer::{Analyzer, RunCounters, RunState, RunSummary};
pub use anode::AnodeExtractor;
pub use cathode::{top_k_charge, CathodeExtractor, StripSignal};
pub use clustering::{cluster_adjacent, cluster_gated, ChannelCluster};
