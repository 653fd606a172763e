//! Run parameters.

use std::path::PathBuf;

use crate::error::ConfigurationError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest accepted number of summed strip charges per cluster.
pub const MAX_STRIP_WIDTH_CHARGES: u32 = 20;

/// Parameters fixed for the lifetime of one run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct AnalysisConfig {
    /// Number of highest strip charges summed per cluster (K).
    pub strip_width_charges: u32,
    /// Minimum pedestal-subtracted ADC value for a strip to carry signal.
    pub adc_threshold: u32,
    /// Nominal pedestal used as the reference for first-sample deviations.
    pub pedestal_baseline: f64,
    /// Destination of the persisted aggregate store.
    pub output: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            strip_width_charges: 5,
            adc_threshold: 32,
            pedestal_baseline: 1024.0,
            output: PathBuf::from("output.json"),
        }
    }
}

impl AnalysisConfig {
    /// Sets the number of summed strip charges.
    #[must_use]
    pub fn with_strip_width_charges(mut self, k: u32) -> Self {
        self.strip_width_charges = k;
        self
    }

    /// Sets the signal threshold.
    #[must_use]
    pub fn with_adc_threshold(mut self, threshold: u32) -> Self {
        self.adc_threshold = threshold;
        self
    }

    /// Sets the nominal pedestal.
    #[must_use]
    pub fn with_pedestal_baseline(mut self, baseline: f64) -> Self {
        self.pedestal_baseline = baseline;
        self
    }

    /// Sets the output path.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    /// Signal threshold as a float for comparisons against charge.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        f64::from(self.adc_threshold)
    }

    /// Checks parameter ranges.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::InvalidParameter`] for the first
    /// out-of-range parameter.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(1..=MAX_STRIP_WIDTH_CHARGES).contains(&self.strip_width_charges) {
            return Err(ConfigurationError::InvalidParameter {
                name: "strip_width_charges",
                reason: format!(
                    "must be within 1..={MAX_STRIP_WIDTH_CHARGES}, got {}",
                    self.strip_width_charges
                ),
            });
        }
        if self.adc_threshold == 0 {
            return Err(ConfigurationError::InvalidParameter {
                name: "adc_threshold",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !self.pedestal_baseline.is_finite() {
            return Err(ConfigurationError::InvalidParameter {
                name: "pedestal_baseline",
                reason: format!("must be finite, got {}", self.pedestal_baseline),
            });
        }
        Ok(())
    }
}
