//! Versioned calibration data for the estimator
//!
//! Every empirically tuned constant of the pipeline lives here so it can be
//! revised (or loaded from a TOML file) without touching algorithm code.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::algo::bins::BIN_COUNT;

pub const CALIBRATION_VERSION: u32 = 8;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Calibration {
    pub version: u32,
    pub locator: LocatorCalibration,
    pub filter: FilterRules,
    pub cleaning: CleaningCalibration,
    pub matching: MatchingCalibration,
}

/// Block search heuristics
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LocatorCalibration {
    /// Expected blocks per day at ~10 minutes per block
    pub blocks_per_day: f64,
    /// Jumps at or below this many blocks are finished by walking
    pub jump_tolerance: i64,
    /// Upper bound on estimate-and-jump rounds before walking
    pub max_jump_iterations: u32,
}

/// Transaction and output filters applied while scanning a day
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterRules {
    pub max_inputs: usize,
    pub required_outputs: usize,
    /// Longest accepted witness item, in hex characters as reported by the node
    pub max_witness_hex_len: usize,
    /// Exclusive lower bound on counted output values (BTC)
    pub min_output_btc: f64,
    /// Exclusive upper bound on counted output values (BTC)
    pub max_output_btc: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CleaningCalibration {
    /// First bin carrying round-dollar signal
    pub informative_start: usize,
    /// One past the last informative bin
    pub informative_end: usize,
    /// Bins sitting on round BTC amounts, replaced by their neighbours' mean
    pub round_btc_bins: Vec<usize>,
    /// Maximum normalized weight of a single bin
    pub bin_cap: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MatchingCalibration {
    /// Bin aligned with stencil centre at slide 0 (edge 10^-3 BTC)
    pub center_bin: usize,
    pub min_slide: i64,
    /// Exclusive
    pub max_slide: i64,
    pub smooth_weight: f64,
    /// Slides at or above this use the spike stencil alone
    pub smooth_slide_cutoff: i64,
    pub stencil_len: usize,
    pub smooth: SmoothStencilParams,
    pub spikes: Vec<SpikeWeight>,
}

/// Gaussian bump plus a linear tilt: `amplitude * e^(-(x-mean)^2 / 2sd^2) + slope * x`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SmoothStencilParams {
    pub mean: f64,
    pub std_dev: f64,
    pub amplitude: f64,
    pub slope: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct SpikeWeight {
    pub index: usize,
    pub weight: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            version: CALIBRATION_VERSION,
            locator: LocatorCalibration::default(),
            filter: FilterRules::default(),
            cleaning: CleaningCalibration::default(),
            matching: MatchingCalibration::default(),
        }
    }
}

impl Default for LocatorCalibration {
    fn default() -> Self {
        Self {
            blocks_per_day: 144.0,
            jump_tolerance: 6,
            max_jump_iterations: 64,
        }
    }
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            max_inputs: 5,
            required_outputs: 2,
            max_witness_hex_len: 500,
            min_output_btc: 1e-5,
            max_output_btc: 1e5,
        }
    }
}

impl Default for CleaningCalibration {
    fn default() -> Self {
        Self {
            informative_start: 201,
            informative_end: 1601,
            round_btc_bins: vec![
                201, 401, 461, 496, 540, 601, 661, 696, 740, 801, 861, 896, 940, 1001, 1061,
                1096, 1140, 1201,
            ],
            bin_cap: 0.008,
        }
    }
}

impl Default for MatchingCalibration {
    fn default() -> Self {
        Self {
            center_bin: 601,
            min_slide: -141,
            max_slide: 201,
            smooth_weight: 0.65,
            smooth_slide_cutoff: 150,
            stencil_len: 803,
            smooth: SmoothStencilParams::default(),
            spikes: default_spikes(),
        }
    }
}

impl Default for SmoothStencilParams {
    fn default() -> Self {
        Self {
            mean: 411.0,
            std_dev: 201.0,
            amplitude: 0.00150,
            slope: 0.0000005,
        }
    }
}

fn default_spikes() -> Vec<SpikeWeight> {
    const SPIKES: [(usize, f64); 29] = [
        (40, 0.001300198324984352),
        (141, 0.001676746949820743),
        (201, 0.003468805546942046),
        (202, 0.001991977522512513),
        (236, 0.001905066647961839),
        (261, 0.003341772718156079),
        (262, 0.002588902624584287),
        (296, 0.002577893841190244),
        (297, 0.002733728814200412),
        (340, 0.003076117748975647),
        (341, 0.005613067550103145),
        (342, 0.003088253178535568),
        (400, 0.002918457489366139),
        (401, 0.006174500465286022),
        (402, 0.004417068070043504),
        (403, 0.002628663628020371),
        (436, 0.002858828161543839),
        (461, 0.004097463611984264),
        (462, 0.003345917406120509),
        (496, 0.002521467726855856),
        (497, 0.002784125730361008),
        (541, 0.003792850444811335),
        (601, 0.003688240815848247),
        (602, 0.002392400117402263),
        (636, 0.001280993059008106),
        (661, 0.001654665137536031),
        (662, 0.001395501347054946),
        (741, 0.001154279140906312),
        (801, 0.000832244504868709),
    ];
    SPIKES
        .iter()
        .map(|&(index, weight)| SpikeWeight { index, weight })
        .collect()
}

static BUILTIN: OnceLock<Calibration> = OnceLock::new();

impl Calibration {
    /// Process-wide default calibration, built on first use
    pub fn builtin() -> &'static Calibration {
        BUILTIN.get_or_init(Calibration::default)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading calibration file {}", path.display()))?;
        let calibration: Calibration = toml::from_str(&content)
            .with_context(|| format!("parsing calibration file {}", path.display()))?;
        calibration.validate()?;
        Ok(calibration)
    }

    /// Half the stencil width, rounded up; stencil index `half_width` lands on `center_bin + slide`
    pub fn stencil_half_width(&self) -> usize {
        (self.matching.stencil_len + 1) / 2
    }

    /// Rejects calibrations whose windows or bins would index outside the histogram
    pub fn validate(&self) -> Result<()> {
        let cleaning = &self.cleaning;
        let matching = &self.matching;

        if self.locator.blocks_per_day <= 0.0 {
            bail!("blocks_per_day must be positive");
        }
        if cleaning.informative_start == 0
            || cleaning.informative_start >= cleaning.informative_end
            || cleaning.informative_end > BIN_COUNT
        {
            bail!(
                "informative range [{}, {}) must be a non-empty range inside 1..{}",
                cleaning.informative_start,
                cleaning.informative_end,
                BIN_COUNT
            );
        }
        if let Some(bad) = cleaning
            .round_btc_bins
            .iter()
            .find(|&&bin| bin == 0 || bin + 1 >= BIN_COUNT)
        {
            bail!("round BTC bin {} has no neighbours on both sides", bad);
        }
        if !(cleaning.bin_cap > 0.0) {
            bail!("bin_cap must be positive");
        }
        if matching.min_slide >= matching.max_slide {
            bail!("slide range [{}, {}) is empty", matching.min_slide, matching.max_slide);
        }
        if matching.stencil_len == 0 {
            bail!("stencil_len must be positive");
        }
        if let Some(spike) = matching.spikes.iter().find(|s| s.index >= matching.stencil_len) {
            bail!("spike index {} exceeds stencil length {}", spike.index, matching.stencil_len);
        }

        // Neighbour scoring reaches one slide beyond each end of the range.
        let lowest_start =
            matching.center_bin as i64 - self.stencil_half_width() as i64 + matching.min_slide - 1;
        let highest_end = matching.center_bin as i64 - self.stencil_half_width() as i64
            + matching.max_slide
            + matching.stencil_len as i64;
        if lowest_start < 0 || highest_end > BIN_COUNT as i64 {
            bail!(
                "stencil windows span [{}, {}) which falls outside 0..{}",
                lowest_start,
                highest_end,
                BIN_COUNT
            );
        }
        let lowest_center = matching.center_bin as i64 + matching.min_slide - 1;
        if lowest_center < 1 {
            bail!("slide range reaches the sentinel bin");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_calibration_is_valid() {
        let calibration = Calibration::builtin();
        calibration.validate().unwrap();
        assert_eq!(calibration.cleaning.round_btc_bins.len(), 18);
        assert_eq!(calibration.matching.spikes.len(), 29);
        assert_eq!(calibration.stencil_half_width(), 402);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "version = 9\n\n[matching]\nsmooth_weight = 0.5").unwrap();

        let calibration = Calibration::load_from_file(file.path()).unwrap();
        assert_eq!(calibration.version, 9);
        assert_eq!(calibration.matching.smooth_weight, 0.5);
        assert_eq!(calibration.matching.stencil_len, 803);
        assert_eq!(calibration.filter, FilterRules::default());
    }

    #[test]
    fn test_rejects_window_outside_histogram() {
        let mut calibration = Calibration::default();
        calibration.matching.max_slide = 2000;
        assert!(calibration.validate().is_err());

        let mut calibration = Calibration::default();
        calibration.cleaning.round_btc_bins.push(2400);
        assert!(calibration.validate().is_err());
    }
}
