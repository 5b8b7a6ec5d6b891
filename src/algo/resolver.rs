//! Turns the best stencil alignment into a USD price

use serde::Serialize;

use super::bins::BinTable;
use super::stencil::SlideMatch;
use crate::core::{OracleError, OracleResult};

/// USD value the stencil centre represents
const CENTER_USD: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceCandidate {
    pub slide: i64,
    /// BTC amount worth $100 at this alignment
    pub usd100_in_btc: f64,
    pub btc_in_usd: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedPrice {
    /// Whole USD per BTC, truncated
    pub price_usd: u64,
    pub best: PriceCandidate,
    pub neighbor: PriceCandidate,
}

pub struct PriceResolver<'a> {
    bins: &'a BinTable,
    center_bin: usize,
}

impl<'a> PriceResolver<'a> {
    pub fn new(bins: &'a BinTable, center_bin: usize) -> Self {
        Self { bins, center_bin }
    }

    fn usd100_in_btc(&self, slide: i64) -> OracleResult<f64> {
        let index = usize::try_from(self.center_bin as i64 + slide)
            .map_err(|_| OracleError::Calibration(format!("slide {} maps below bin 0", slide)))?;
        match self.bins.edge(index) {
            Some(edge) if edge > 0.0 => Ok(edge),
            _ => Err(OracleError::Calibration(format!(
                "slide {} maps to bin {} which has no positive edge",
                slide, index
            ))),
        }
    }

    /// Weighted blend of the best alignment and its stronger neighbour.
    ///
    /// Weights are each candidate's score distance from the average slide score;
    /// if both distances are zero the weighting is undefined and an error is returned.
    pub fn resolve(&self, matched: &SlideMatch) -> OracleResult<ResolvedPrice> {
        let a1 = matched.best_score - matched.avg_score;
        let a2 = (matched.neighbor_score - matched.avg_score).abs();
        let norm = a1 + a2;
        if !(norm.is_finite() && norm > 0.0) {
            return Err(OracleError::DegenerateScore(format!(
                "best and neighbour scores do not separate from the average (a1 = {}, a2 = {})",
                a1, a2
            )));
        }
        let w1 = a1 / norm;
        let w2 = a2 / norm;

        let best_btc = self.usd100_in_btc(matched.best_slide)?;
        let neighbor_btc = self.usd100_in_btc(matched.neighbor_slide)?;
        let best = PriceCandidate {
            slide: matched.best_slide,
            usd100_in_btc: best_btc,
            btc_in_usd: CENTER_USD / best_btc,
            weight: w1,
        };
        let neighbor = PriceCandidate {
            slide: matched.neighbor_slide,
            usd100_in_btc: neighbor_btc,
            btc_in_usd: CENTER_USD / neighbor_btc,
            weight: w2,
        };

        let blended = w1 * best.btc_in_usd + w2 * neighbor.btc_in_usd;
        Ok(ResolvedPrice {
            price_usd: blended.floor() as u64,
            best,
            neighbor,
        })
    }
}
