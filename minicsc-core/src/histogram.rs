//! Fixed-binning statistical aggregates.
//!
//! These are the primitives the extractors fill: [`Hist1D`], [`Hist2D`]
//! and [`Profile1D`]. Binning and bin lookup come from `ndhistogram`
//! uniform axes, whose bin numbering follows the usual convention for
//! physics histograms:
//!
//! - bin `0` is the underflow bin,
//! - bins `1..=bins` cover `[low, high)`,
//! - bin `bins + 1` is the overflow bin.
//!
//! Per-bin storage always includes under- and overflow, so a persisted
//! array of a 120-bin axis has 122 entries. The per-bin values are kept
//! as raw sums so that finalization can rewrite content and error and a
//! persisted histogram can be rebuilt bin by bin.
#![allow(clippy::cast_precision_loss)]

use std::fmt;

use ndhistogram::axis::{Axis as _, Uniform};
use ndhistogram::{ndhistogram, FillWith, HistND, Histogram};

use crate::error::ConfigurationError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

type Binned1D<V> = HistND<(Uniform<f64>,), V>;
type Binned2D<V> = HistND<(Uniform<f64>, Uniform<f64>), V>;

/// Uniform binning over `[low, high)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Axis {
    bins: usize,
    low: f64,
    high: f64,
}

impl Axis {
    /// Describes an axis. It is checked when a histogram is built on it.
    #[must_use]
    pub const fn new(bins: usize, low: f64, high: f64) -> Self {
        Self { bins, low, high }
    }

    /// Number of in-range bins.
    #[inline]
    #[must_use]
    pub fn bins(&self) -> usize {
        self.bins
    }

    /// Lower edge of the first in-range bin.
    #[inline]
    #[must_use]
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Upper edge of the last in-range bin.
    #[inline]
    #[must_use]
    pub fn high(&self) -> f64 {
        self.high
    }

    /// Width of one bin.
    #[inline]
    #[must_use]
    pub fn width(&self) -> f64 {
        (self.high - self.low) / self.bins as f64
    }

    /// Number of stored bins, including under- and overflow.
    #[inline]
    #[must_use]
    pub fn storage_len(&self) -> usize {
        self.bins + 2
    }

    /// Builds the `ndhistogram` axis.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidBinning`] for zero bins or an
    /// empty or non-finite range.
    pub fn uniform(&self) -> Result<Uniform<f64>, ConfigurationError> {
        let invalid = || ConfigurationError::InvalidBinning {
            bins: self.bins,
            low: self.low,
            high: self.high,
        };
        if self.bins == 0 || !self.low.is_finite() || !self.high.is_finite() || self.high <= self.low
        {
            return Err(invalid());
        }
        Uniform::new(self.bins, self.low, self.high).map_err(|_| invalid())
    }
}

/// Sum of weights and of squared weights in one bin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct WeightSum {
    sum_w: f64,
    sum_w2: f64,
}

impl FillWith<f64> for WeightSum {
    fn fill_with(&mut self, weight: f64) {
        self.sum_w += weight;
        self.sum_w2 += weight * weight;
    }
}

/// Count, sum and sum of squares of the samples in one profile bin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SampleSum {
    sum_w: f64,
    sum_wy: f64,
    sum_wy2: f64,
}

impl FillWith<f64> for SampleSum {
    fn fill_with(&mut self, y: f64) {
        self.sum_w += 1.0;
        self.sum_wy += y;
        self.sum_wy2 += y * y;
    }
}

fn check_lengths(expected: usize, arrays: &[&[f64]]) -> Result<(), ConfigurationError> {
    match arrays.iter().find(|array| array.len() != expected) {
        Some(array) => Err(ConfigurationError::BinCountMismatch {
            expected,
            found: array.len(),
        }),
        None => Ok(()),
    }
}

/// One-dimensional weighted histogram.
#[derive(Clone)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "Hist1DParts", into = "Hist1DParts")
)]
pub struct Hist1D {
    title: String,
    axis: Axis,
    bins: Binned1D<WeightSum>,
    entries: u64,
}

impl Hist1D {
    /// Creates an empty histogram.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidBinning`] for an unusable axis.
    pub fn new(title: impl Into<String>, axis: Axis) -> Result<Self, ConfigurationError> {
        Ok(Self {
            title: title.into(),
            bins: ndhistogram!(axis.uniform()?; WeightSum),
            axis,
            entries: 0,
        })
    }

    /// Rebuilds a histogram from stored arrays.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::BinCountMismatch`] if an array length
    /// does not match the axis.
    pub fn from_parts(
        title: impl Into<String>,
        axis: Axis,
        sum_w: Vec<f64>,
        sum_w2: Vec<f64>,
        entries: u64,
    ) -> Result<Self, ConfigurationError> {
        let mut hist = Self::new(title, axis)?;
        check_lengths(axis.storage_len(), &[sum_w.as_slice(), sum_w2.as_slice()])?;
        for (bin, (w, w2)) in sum_w.into_iter().zip(sum_w2).enumerate() {
            if let Some(value) = hist.bins.value_at_index_mut(bin) {
                *value = WeightSum { sum_w: w, sum_w2: w2 };
            }
        }
        hist.entries = entries;
        Ok(hist)
    }

    fn value(&self, bin: usize) -> WeightSum {
        self.bins.value_at_index(bin).copied().unwrap_or_default()
    }

    /// Adds a unit-weight sample.
    #[inline]
    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }

    /// Adds a weighted sample.
    pub fn fill_weighted(&mut self, x: f64, weight: f64) {
        self.bins.fill_with(&x, weight);
        self.entries += 1;
    }

    /// Bin holding `x`, or `None` if `x` cannot be binned (NaN).
    #[must_use]
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        self.bins.axes().index(&x)
    }

    /// Accumulated weight in `bin` (0 outside the stored range).
    #[must_use]
    pub fn bin_content(&self, bin: usize) -> f64 {
        self.value(bin).sum_w
    }

    /// Statistical error of `bin`.
    #[must_use]
    pub fn bin_error(&self, bin: usize) -> f64 {
        self.value(bin).sum_w2.sqrt()
    }

    /// Overwrites the content of `bin`. Ignored outside the stored range.
    pub fn set_bin_content(&mut self, bin: usize, content: f64) {
        if let Some(value) = self.bins.value_at_index_mut(bin) {
            value.sum_w = content;
        }
    }

    /// Overwrites the error of `bin`. Only the magnitude is kept.
    pub fn set_bin_error(&mut self, bin: usize, error: f64) {
        if let Some(value) = self.bins.value_at_index_mut(bin) {
            value.sum_w2 = error * error;
        }
    }

    /// Content of the bin holding `x`.
    #[must_use]
    pub fn content_at(&self, x: f64) -> f64 {
        self.bins.value(&x).map_or(0.0, |value| value.sum_w)
    }

    /// Number of fills.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// True if nothing was ever filled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Sum of in-range bin contents.
    #[must_use]
    pub fn integral(&self) -> f64 {
        (1..=self.axis.bins).map(|bin| self.bin_content(bin)).sum()
    }

    /// Histogram title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Binning.
    #[must_use]
    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    /// Per-bin weights, including under- and overflow.
    #[must_use]
    pub fn contents(&self) -> Vec<f64> {
        (0..self.axis.storage_len())
            .map(|bin| self.value(bin).sum_w)
            .collect()
    }

    /// Per-bin squared weights, including under- and overflow.
    #[must_use]
    pub fn sum_w2(&self) -> Vec<f64> {
        (0..self.axis.storage_len())
            .map(|bin| self.value(bin).sum_w2)
            .collect()
    }
}

impl PartialEq for Hist1D {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.axis == other.axis
            && self.entries == other.entries
            && self.contents() == other.contents()
            && self.sum_w2() == other.sum_w2()
    }
}

impl fmt::Debug for Hist1D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hist1D")
            .field("title", &self.title)
            .field("axis", &self.axis)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct Hist1DParts {
    title: String,
    axis: Axis,
    sum_w: Vec<f64>,
    sum_w2: Vec<f64>,
    entries: u64,
}

#[cfg(feature = "serde")]
impl From<Hist1D> for Hist1DParts {
    fn from(hist: Hist1D) -> Self {
        Self {
            sum_w: hist.contents(),
            sum_w2: hist.sum_w2(),
            title: hist.title,
            axis: hist.axis,
            entries: hist.entries,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<Hist1DParts> for Hist1D {
    type Error = ConfigurationError;

    fn try_from(parts: Hist1DParts) -> Result<Self, Self::Error> {
        Self::from_parts(
            parts.title,
            parts.axis,
            parts.sum_w,
            parts.sum_w2,
            parts.entries,
        )
    }
}

/// Two-dimensional weighted histogram.
///
/// Flattened storage runs x fastest: `index = ybin * (x_bins + 2) + xbin`.
#[derive(Clone)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "Hist2DParts", into = "Hist2DParts")
)]
pub struct Hist2D {
    title: String,
    x_axis: Axis,
    y_axis: Axis,
    bins: Binned2D<WeightSum>,
    entries: u64,
}

impl Hist2D {
    /// Creates an empty histogram.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidBinning`] for an unusable axis.
    pub fn new(
        title: impl Into<String>,
        x_axis: Axis,
        y_axis: Axis,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            title: title.into(),
            bins: ndhistogram!(x_axis.uniform()?, y_axis.uniform()?; WeightSum),
            x_axis,
            y_axis,
            entries: 0,
        })
    }

    /// Rebuilds a histogram from stored arrays.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::BinCountMismatch`] if an array length
    /// does not match the axes.
    pub fn from_parts(
        title: impl Into<String>,
        x_axis: Axis,
        y_axis: Axis,
        sum_w: Vec<f64>,
        sum_w2: Vec<f64>,
        entries: u64,
    ) -> Result<Self, ConfigurationError> {
        let mut hist = Self::new(title, x_axis, y_axis)?;
        check_lengths(hist.storage_len(), &[sum_w.as_slice(), sum_w2.as_slice()])?;
        for (idx, (w, w2)) in sum_w.into_iter().zip(sum_w2).enumerate() {
            if let Some(value) = hist.bins.value_at_index_mut(idx) {
                *value = WeightSum { sum_w: w, sum_w2: w2 };
            }
        }
        hist.entries = entries;
        Ok(hist)
    }

    fn storage_len(&self) -> usize {
        self.x_axis.storage_len() * self.y_axis.storage_len()
    }

    #[inline]
    fn index(&self, xbin: usize, ybin: usize) -> Option<usize> {
        (xbin < self.x_axis.storage_len() && ybin < self.y_axis.storage_len())
            .then(|| ybin * self.x_axis.storage_len() + xbin)
    }

    fn value(&self, idx: usize) -> WeightSum {
        self.bins.value_at_index(idx).copied().unwrap_or_default()
    }

    /// Adds a unit-weight sample.
    #[inline]
    pub fn fill(&mut self, x: f64, y: f64) {
        self.fill_weighted(x, y, 1.0);
    }

    /// Adds a weighted sample.
    pub fn fill_weighted(&mut self, x: f64, y: f64, weight: f64) {
        self.bins.fill_with(&(x, y), weight);
        self.entries += 1;
    }

    /// Accumulated weight in `(xbin, ybin)`.
    #[must_use]
    pub fn bin_content(&self, xbin: usize, ybin: usize) -> f64 {
        self.index(xbin, ybin)
            .map_or(0.0, |idx| self.value(idx).sum_w)
    }

    /// Statistical error of `(xbin, ybin)`.
    #[must_use]
    pub fn bin_error(&self, xbin: usize, ybin: usize) -> f64 {
        self.index(xbin, ybin)
            .map_or(0.0, |idx| self.value(idx).sum_w2.sqrt())
    }

    /// Content of the bin holding `(x, y)`.
    #[must_use]
    pub fn content_at(&self, x: f64, y: f64) -> f64 {
        self.bins.value(&(x, y)).map_or(0.0, |value| value.sum_w)
    }

    /// Number of fills.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// True if nothing was ever filled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Histogram title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// X binning.
    #[must_use]
    pub fn x_axis(&self) -> &Axis {
        &self.x_axis
    }

    /// Y binning.
    #[must_use]
    pub fn y_axis(&self) -> &Axis {
        &self.y_axis
    }

    /// Flattened per-bin weights.
    #[must_use]
    pub fn contents(&self) -> Vec<f64> {
        (0..self.storage_len())
            .map(|idx| self.value(idx).sum_w)
            .collect()
    }

    /// Flattened per-bin squared weights.
    #[must_use]
    pub fn sum_w2(&self) -> Vec<f64> {
        (0..self.storage_len())
            .map(|idx| self.value(idx).sum_w2)
            .collect()
    }
}

impl PartialEq for Hist2D {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.x_axis == other.x_axis
            && self.y_axis == other.y_axis
            && self.entries == other.entries
            && self.contents() == other.contents()
            && self.sum_w2() == other.sum_w2()
    }
}

impl fmt::Debug for Hist2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hist2D")
            .field("title", &self.title)
            .field("x_axis", &self.x_axis)
            .field("y_axis", &self.y_axis)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct Hist2DParts {
    title: String,
    x_axis: Axis,
    y_axis: Axis,
    sum_w: Vec<f64>,
    sum_w2: Vec<f64>,
    entries: u64,
}

#[cfg(feature = "serde")]
impl From<Hist2D> for Hist2DParts {
    fn from(hist: Hist2D) -> Self {
        Self {
            sum_w: hist.contents(),
            sum_w2: hist.sum_w2(),
            title: hist.title,
            x_axis: hist.x_axis,
            y_axis: hist.y_axis,
            entries: hist.entries,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<Hist2DParts> for Hist2D {
    type Error = ConfigurationError;

    fn try_from(parts: Hist2DParts) -> Result<Self, Self::Error> {
        Self::from_parts(
            parts.title,
            parts.x_axis,
            parts.y_axis,
            parts.sum_w,
            parts.sum_w2,
            parts.entries,
        )
    }
}

/// Mean of `y` per bin of `x`.
#[derive(Clone)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "Profile1DParts", into = "Profile1DParts")
)]
pub struct Profile1D {
    title: String,
    axis: Axis,
    bins: Binned1D<SampleSum>,
    entries: u64,
}

impl Profile1D {
    /// Creates an empty profile.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidBinning`] for an unusable axis.
    pub fn new(title: impl Into<String>, axis: Axis) -> Result<Self, ConfigurationError> {
        Ok(Self {
            title: title.into(),
            bins: ndhistogram!(axis.uniform()?; SampleSum),
            axis,
            entries: 0,
        })
    }

    /// Rebuilds a profile from stored arrays.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::BinCountMismatch`] if an array length
    /// does not match the axis.
    pub fn from_parts(
        title: impl Into<String>,
        axis: Axis,
        sum_w: Vec<f64>,
        sum_wy: Vec<f64>,
        sum_wy2: Vec<f64>,
        entries: u64,
    ) -> Result<Self, ConfigurationError> {
        let mut profile = Self::new(title, axis)?;
        check_lengths(
            axis.storage_len(),
            &[sum_w.as_slice(), sum_wy.as_slice(), sum_wy2.as_slice()],
        )?;
        let sums = sum_w.into_iter().zip(sum_wy).zip(sum_wy2);
        for (bin, ((w, wy), wy2)) in sums.enumerate() {
            if let Some(value) = profile.bins.value_at_index_mut(bin) {
                *value = SampleSum {
                    sum_w: w,
                    sum_wy: wy,
                    sum_wy2: wy2,
                };
            }
        }
        profile.entries = entries;
        Ok(profile)
    }

    fn value(&self, bin: usize) -> SampleSum {
        self.bins.value_at_index(bin).copied().unwrap_or_default()
    }

    /// Adds a sample `y` at `x`.
    pub fn fill(&mut self, x: f64, y: f64) {
        self.bins.fill_with(&x, y);
        self.entries += 1;
    }

    /// Number of samples in `bin`.
    #[must_use]
    pub fn bin_entries(&self, bin: usize) -> f64 {
        self.value(bin).sum_w
    }

    /// Mean of `y` in `bin`, 0 for an empty bin.
    #[must_use]
    pub fn bin_mean(&self, bin: usize) -> f64 {
        let value = self.value(bin);
        if value.sum_w > 0.0 {
            value.sum_wy / value.sum_w
        } else {
            0.0
        }
    }

    /// Error on the mean of `y` in `bin`.
    #[must_use]
    pub fn bin_error(&self, bin: usize) -> f64 {
        let value = self.value(bin);
        if value.sum_w <= 0.0 {
            return 0.0;
        }
        let mean = value.sum_wy / value.sum_w;
        let variance = (value.sum_wy2 / value.sum_w - mean * mean).max(0.0);
        (variance / value.sum_w).sqrt()
    }

    /// Number of fills.
    #[must_use]
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// True if nothing was ever filled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Profile title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Binning.
    #[must_use]
    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    fn column(&self, pick: impl Fn(SampleSum) -> f64) -> Vec<f64> {
        (0..self.axis.storage_len())
            .map(|bin| pick(self.value(bin)))
            .collect()
    }

    /// Per-bin sample counts.
    #[must_use]
    pub fn sum_w(&self) -> Vec<f64> {
        self.column(|value| value.sum_w)
    }

    /// Per-bin sums of `y`.
    #[must_use]
    pub fn sum_wy(&self) -> Vec<f64> {
        self.column(|value| value.sum_wy)
    }

    /// Per-bin sums of `y²`.
    #[must_use]
    pub fn sum_wy2(&self) -> Vec<f64> {
        self.column(|value| value.sum_wy2)
    }
}

impl PartialEq for Profile1D {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.axis == other.axis
            && self.entries == other.entries
            && self.sum_w() == other.sum_w()
            && self.sum_wy() == other.sum_wy()
            && self.sum_wy2() == other.sum_wy2()
    }
}

impl fmt::Debug for Profile1D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile1D")
            .field("title", &self.title)
            .field("axis", &self.axis)
            .field("entries", &self.entries)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct Profile1DParts {
    title: String,
    axis: Axis,
    sum_w: Vec<f64>,
    sum_wy: Vec<f64>,
    sum_wy2: Vec<f64>,
    entries: u64,
}

#[cfg(feature = "serde")]
impl From<Profile1D> for Profile1DParts {
    fn from(profile: Profile1D) -> Self {
        Self {
            sum_w: profile.sum_w(),
            sum_wy: profile.sum_wy(),
            sum_wy2: profile.sum_wy2(),
            title: profile.title,
            axis: profile.axis,
            entries: profile.entries,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<Profile1DParts> for Profile1D {
    type Error = ConfigurationError;

    fn try_from(parts: Profile1DParts) -> Result<Self, Self::Error> {
        Self::from_parts(
            parts.title,
            parts.axis,
            parts.sum_w,
            parts.sum_wy,
            parts.sum_wy2,
            parts.entries,
        )
    }
}
