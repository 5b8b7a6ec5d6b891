//! Logarithmic bin edges for output amounts

use std::sync::OnceLock;

/// Lowest decade exponent (10^-6 BTC)
pub const FIRST_EXPONENT: i32 = -6;
/// One past the highest decade exponent (10^6 BTC)
pub const LAST_EXPONENT: i32 = 6;
pub const STEPS_PER_DECADE: usize = 200;
/// Sentinel edge plus 12 decades of 200 steps
pub const BIN_COUNT: usize = 1 + (LAST_EXPONENT - FIRST_EXPONENT) as usize * STEPS_PER_DECADE;

static SHARED: OnceLock<BinTable> = OnceLock::new();

/// Ordered, strictly increasing bin edges; `edges[0]` is a `0.0` sentinel
#[derive(Debug, Clone)]
pub struct BinTable {
    edges: Vec<f64>,
}

impl BinTable {
    pub fn new() -> Self {
        let mut edges = Vec::with_capacity(BIN_COUNT);
        edges.push(0.0);
        for exponent in FIRST_EXPONENT..LAST_EXPONENT {
            for step in 0..STEPS_PER_DECADE {
                let power = exponent as f64 + step as f64 / STEPS_PER_DECADE as f64;
                edges.push(10f64.powf(power));
            }
        }
        Self { edges }
    }

    /// Process-wide table, built on first use
    pub fn shared() -> &'static BinTable {
        SHARED.get_or_init(BinTable::new)
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edge(&self, index: usize) -> Option<f64> {
        self.edges.get(index).copied()
    }

    /// Index of the bin holding `amount`: the greatest `i` with `edges[i] <= amount`.
    /// Returns `None` outside `[10^-6, 10^6)`.
    pub fn locate(&self, amount: f64) -> Option<usize> {
        let highest = 10f64.powf(LAST_EXPONENT as f64);
        if !(amount >= self.edges[1] && amount < highest) {
            return None;
        }

        let range = (LAST_EXPONENT - FIRST_EXPONENT) as f64;
        let fraction = (amount.log10() - FIRST_EXPONENT as f64) / range;
        let mut index = ((fraction * self.edges.len() as f64).floor() as usize).min(self.edges.len() - 1);

        // The log estimate can land a bin early or late; settle on the exact edge.
        while index > 0 && self.edges[index] > amount {
            index -= 1;
        }
        while index < self.edges.len() && self.edges[index] <= amount {
            index += 1;
        }
        Some(index - 1)
    }
}

impl Default for BinTable {
    fn default() -> Self {
        Self::new()
    }
}
