//! Reference stencils and the slide search that aligns them with a day histogram

use std::sync::OnceLock;

use serde::Serialize;
use tracing::debug;

use super::histogram::Histogram;
use crate::config::calibration::{Calibration, MatchingCalibration, SmoothStencilParams, SpikeWeight};
use crate::core::{OracleError, OracleResult};

/// Fixed weight pattern matched against a window of the histogram
#[derive(Debug, Clone, PartialEq)]
pub struct Stencil {
    weights: Vec<f64>,
}

impl Stencil {
    /// Bell curve of typical round-USD output volume around the $100 bin
    pub fn smooth(len: usize, params: &SmoothStencilParams) -> Self {
        let variance2 = 2.0 * params.std_dev * params.std_dev;
        let weights = (0..len)
            .map(|x| {
                let x = x as f64;
                let exp_part = -((x - params.mean).powi(2)) / variance2;
                params.amplitude * exp_part.exp() + params.slope * x
            })
            .collect();
        Self { weights }
    }

    /// Sparse peaks at popular round-USD amounts ($1, $5, $10, ... $10k)
    pub fn spikes(len: usize, spikes: &[SpikeWeight]) -> Self {
        let mut weights = vec![0.0; len];
        for spike in spikes {
            if let Some(weight) = weights.get_mut(spike.index) {
                *weight = spike.weight;
            }
        }
        Self { weights }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Dot product with `counts[start..start + len]`, `None` if the window leaves the slice
    pub fn score_at(&self, counts: &[f64], start: usize) -> Option<f64> {
        let window = counts.get(start..start.checked_add(self.weights.len())?)?;
        Some(window.iter().zip(&self.weights).map(|(c, w)| c * w).sum())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stencils {
    pub smooth: Stencil,
    pub spike: Stencil,
}

static BUILTIN: OnceLock<Stencils> = OnceLock::new();

impl Stencils {
    pub fn from_calibration(matching: &MatchingCalibration) -> Self {
        Self {
            smooth: Stencil::smooth(matching.stencil_len, &matching.smooth),
            spike: Stencil::spikes(matching.stencil_len, &matching.spikes),
        }
    }

    /// Stencils for the built-in calibration
    pub fn builtin() -> &'static Stencils {
        BUILTIN.get_or_init(|| Stencils::from_calibration(&Calibration::builtin().matching))
    }
}

/// Outcome of the slide search
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlideMatch {
    pub best_slide: i64,
    pub best_score: f64,
    pub neighbor_slide: i64,
    pub neighbor_score: f64,
    pub avg_score: f64,
}

pub struct StencilMatcher<'a> {
    calibration: &'a MatchingCalibration,
    stencils: &'a Stencils,
}

impl<'a> StencilMatcher<'a> {
    pub fn new(calibration: &'a MatchingCalibration, stencils: &'a Stencils) -> Self {
        Self { calibration, stencils }
    }

    fn window_start(&self, slide: i64) -> OracleResult<usize> {
        let half_width = ((self.calibration.stencil_len + 1) / 2) as i64;
        let start = self.calibration.center_bin as i64 - half_width + slide;
        usize::try_from(start).map_err(|_| {
            OracleError::Calibration(format!("window for slide {} starts before bin 0", slide))
        })
    }

    fn out_of_range(slide: i64) -> OracleError {
        OracleError::Calibration(format!("window for slide {} runs past the histogram", slide))
    }

    pub fn spike_score(&self, histogram: &Histogram, slide: i64) -> OracleResult<f64> {
        let start = self.window_start(slide)?;
        self.stencils
            .spike
            .score_at(histogram.counts(), start)
            .ok_or_else(|| Self::out_of_range(slide))
    }

    pub fn smooth_score(&self, histogram: &Histogram, slide: i64) -> OracleResult<f64> {
        let start = self.window_start(slide)?;
        self.stencils
            .smooth
            .score_at(histogram.counts(), start)
            .ok_or_else(|| Self::out_of_range(slide))
    }

    /// Spike score, plus the weighted smooth score below the cutoff slide
    pub fn total_score(&self, histogram: &Histogram, slide: i64) -> OracleResult<f64> {
        let spike = self.spike_score(histogram, slide)?;
        if slide < self.calibration.smooth_slide_cutoff {
            Ok(spike + self.calibration.smooth_weight * self.smooth_score(histogram, slide)?)
        } else {
            Ok(spike)
        }
    }

    pub fn best_match(&self, histogram: &Histogram) -> OracleResult<SlideMatch> {
        let mut best: Option<(i64, f64)> = None;
        let mut total = 0.0;
        let mut slides = 0usize;

        for slide in self.calibration.min_slide..self.calibration.max_slide {
            let score = self.total_score(histogram, slide)?;
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((slide, score));
            }
            total += score;
            slides += 1;
        }

        let (best_slide, best_score) = best.ok_or_else(|| {
            OracleError::Calibration("slide range is empty".to_string())
        })?;
        let avg_score = total / slides as f64;

        let up_score = self.spike_score(histogram, best_slide + 1)?;
        let down_score = self.spike_score(histogram, best_slide - 1)?;
        let (neighbor_slide, neighbor_score) = if down_score > up_score {
            (best_slide - 1, down_score)
        } else {
            (best_slide + 1, up_score)
        };

        debug!(best_slide, best_score, neighbor_slide, neighbor_score, avg_score, "stencil slide search complete");

        Ok(SlideMatch {
            best_slide,
            best_score,
            neighbor_slide,
            neighbor_score,
            avg_score,
        })
    }
}
