//! Strips non-USD structure from a raw day histogram and normalizes it

use tracing::debug;

use super::histogram::Histogram;
use crate::config::calibration::CleaningCalibration;
use crate::core::{OracleError, OracleResult};

pub struct HistogramCleaner<'a> {
    calibration: &'a CleaningCalibration,
}

impl<'a> HistogramCleaner<'a> {
    pub fn new(calibration: &'a CleaningCalibration) -> Self {
        Self { calibration }
    }

    /// Zeroes uninformative bins, de-spikes round BTC amounts, normalizes the
    /// informative range to sum to one and caps each bin.
    ///
    /// An informative range with no weight cannot be normalized and is reported
    /// as [`OracleError::DegenerateScore`].
    pub fn clean(&self, histogram: &mut Histogram) -> OracleResult<()> {
        let end = self.calibration.informative_end.min(histogram.len());
        let start = self.calibration.informative_start.min(end);
        let counts = histogram.counts_mut();

        for count in counts.iter_mut().take(start) {
            *count = 0.0;
        }
        for count in counts.iter_mut().skip(end) {
            *count = 0.0;
        }

        for &bin in &self.calibration.round_btc_bins {
            if bin == 0 || bin + 1 >= counts.len() {
                continue;
            }
            counts[bin] = 0.5 * (counts[bin - 1] + counts[bin + 1]);
        }

        let sum: f64 = counts[start..end].iter().sum();
        if !(sum > 0.0 && sum.is_finite()) {
            return Err(OracleError::DegenerateScore(
                "no qualifying outputs in the informative amount range".to_string(),
            ));
        }

        let cap = self.calibration.bin_cap;
        let mut capped = 0usize;
        for count in &mut counts[start..end] {
            *count /= sum;
            if *count > cap {
                *count = cap;
                capped += 1;
            }
        }

        debug!(sum, capped, "histogram normalized");
        Ok(())
    }
}
