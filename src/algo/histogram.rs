//! Per-bin output counts for one day

use super::bins::BIN_COUNT;

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    counts: Vec<f64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            counts: vec![0.0; BIN_COUNT],
        }
    }

    pub fn from_counts(counts: Vec<f64>) -> Self {
        Self { counts }
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    pub(crate) fn counts_mut(&mut self) -> &mut [f64] {
        &mut self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn increment(&mut self, bin: usize) {
        if let Some(count) = self.counts.get_mut(bin) {
            *count += 1.0;
        }
    }

    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    pub fn range_sum(&self, start: usize, end: usize) -> f64 {
        self.counts
            .get(start..end.min(self.counts.len()))
            .map_or(0.0, |slice| slice.iter().sum())
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}
