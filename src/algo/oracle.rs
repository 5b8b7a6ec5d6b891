//! One-day price estimate: locate, scan, clean, match, resolve

use std::borrow::Cow;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tracing::{info, instrument};

use super::bins::BinTable;
use super::cleaner::HistogramCleaner;
use super::locator::{ChainTip, DayBlockLocator};
use super::resolver::{PriceResolver, ResolvedPrice};
use super::stencil::{SlideMatch, StencilMatcher, Stencils};
use crate::config::Calibration;
use crate::core::{DateRange, NodeError, OracleError, OracleResult};
use crate::ingest::{BlockProgress, NodeDataSource, OutputHistogramBuilder, ScanStats};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// What the node can currently serve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainStatus {
    pub tip: ChainTip,
    pub tip_time: DateTime<Utc>,
    /// Most recent fully elapsed UTC day
    pub latest_price_date: NaiveDate,
    pub earliest_price_date: NaiveDate,
}

impl ChainStatus {
    pub fn tip_date(&self) -> NaiveDate {
        self.tip_time.date_naive()
    }

    fn check_range(&self, date: NaiveDate) -> OracleResult<()> {
        if date < self.earliest_price_date {
            return Err(OracleError::OutOfRangeDate {
                date,
                reason: DateRange::BeforeEarliest(self.earliest_price_date),
            });
        }
        if date >= self.tip_date() {
            return Err(OracleError::OutOfRangeDate {
                date,
                reason: DateRange::NotFinal(self.latest_price_date),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceEstimate {
    pub date: NaiveDate,
    pub price_usd: u64,
    pub first_height: u64,
    pub resolved: ResolvedPrice,
    pub matched: SlideMatch,
    pub stats: ScanStats,
}

pub struct PriceOracle<'a, S: NodeDataSource + ?Sized> {
    source: &'a S,
    calibration: &'a Calibration,
    stencils: Cow<'a, Stencils>,
    bins: &'static BinTable,
    earliest_date: NaiveDate,
}

impl<'a, S: NodeDataSource + ?Sized> PriceOracle<'a, S> {
    pub fn new(source: &'a S, calibration: &'a Calibration, earliest_date: NaiveDate) -> Self {
        Self {
            source,
            calibration,
            stencils: Self::stencils_for(calibration),
            bins: BinTable::shared(),
            earliest_date,
        }
    }

    /// Shares the process-wide stencils unless the matching section was overridden
    fn stencils_for(calibration: &Calibration) -> Cow<'a, Stencils> {
        if calibration.matching == Calibration::builtin().matching {
            Cow::Borrowed(Stencils::builtin())
        } else {
            Cow::Owned(Stencils::from_calibration(&calibration.matching))
        }
    }

    pub async fn chain_status(&self) -> OracleResult<ChainStatus> {
        let height = self.source.get_chain_height().await?;
        let header = self.source.header_at(height).await?;
        let tip_time = header.time_utc().ok_or(NodeError::InvalidTimestamp {
            height,
            timestamp: header.timestamp,
        })?;

        Ok(ChainStatus {
            tip: ChainTip {
                height,
                timestamp: header.timestamp,
            },
            tip_time,
            latest_price_date: (tip_time - Duration::days(1)).date_naive(),
            earliest_price_date: self.earliest_date,
        })
    }

    /// Turns operator input into a date the oracle can price. Blank input means
    /// the most recent complete day.
    pub fn resolve_date(&self, input: &str, status: &ChainStatus) -> OracleResult<NaiveDate> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(status.latest_price_date);
        }
        let date = NaiveDate::parse_from_str(input, DATE_FORMAT).map_err(|_| {
            OracleError::MalformedDateInput {
                input: input.to_string(),
            }
        })?;
        status.check_range(date)?;
        Ok(date)
    }

    #[instrument(skip(self, on_block))]
    pub async fn estimate<F>(&self, date: NaiveDate, on_block: F) -> OracleResult<PriceEstimate>
    where
        F: FnMut(&BlockProgress) + Send,
    {
        let status = self.chain_status().await?;
        status.check_range(date)?;

        let day_start = date.and_time(NaiveTime::MIN).and_utc().timestamp();
        let first_height = DayBlockLocator::new(self.source, &self.calibration.locator)
            .first_block_of_day(status.tip, day_start)
            .await?;

        let builder = OutputHistogramBuilder::new(
            self.source,
            &self.calibration.filter,
            self.bins,
            status.tip.height,
        );
        let (mut histogram, stats) = builder.build_day(first_height, date, on_block).await?;

        HistogramCleaner::new(&self.calibration.cleaning).clean(&mut histogram)?;
        let matched = StencilMatcher::new(&self.calibration.matching, self.stencils.as_ref()).best_match(&histogram)?;
        let resolved = PriceResolver::new(self.bins, self.calibration.matching.center_bin).resolve(&matched)?;

        info!(%date, price_usd = resolved.price_usd, best_slide = matched.best_slide, "price estimated");
        Ok(PriceEstimate {
            date,
            price_usd: resolved.price_usd,
            first_height,
            resolved,
            matched,
            stats,
        })
    }
}
