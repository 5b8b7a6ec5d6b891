//! Finds the first block of a UTC day by estimate-and-jump followed by a short walk

use chrono::DateTime;
use tracing::{debug, info, instrument, warn};

use crate::config::calibration::LocatorCalibration;
use crate::core::{DateRange, OracleError, OracleResult};
use crate::ingest::NodeDataSource;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Chain height and timestamp of the current tip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTip {
    pub height: u64,
    pub timestamp: i64,
}

pub struct DayBlockLocator<'a, S: NodeDataSource + ?Sized> {
    source: &'a S,
    calibration: &'a LocatorCalibration,
}

impl<'a, S: NodeDataSource + ?Sized> DayBlockLocator<'a, S> {
    pub fn new(source: &'a S, calibration: &'a LocatorCalibration) -> Self {
        Self { source, calibration }
    }

    /// Signed number of blocks between a block at `time` and `target`
    fn blocks_between(&self, time: i64, target: i64) -> i64 {
        (self.calibration.blocks_per_day * (time - target) as f64 / SECONDS_PER_DAY as f64).round() as i64
    }

    async fn timestamp_at(&self, height: i64) -> OracleResult<i64> {
        let header = self.source.header_at(height as u64).await?;
        Ok(header.timestamp)
    }

    /// Height `H` of the first block with `timestamp(H) >= day_start` and
    /// `timestamp(H - 1) < day_start` (or `H == 0`).
    #[instrument(skip(self))]
    pub async fn first_block_of_day(&self, tip: ChainTip, day_start: i64) -> OracleResult<u64> {
        let tip_height = tip.height as i64;
        let clamp = |height: i64| height.clamp(0, tip_height);

        let blocks_ago = self.blocks_between(tip.timestamp, day_start);
        let mut candidate = clamp(tip_height - blocks_ago);
        let mut time = self.timestamp_at(candidate).await?;
        let mut jump = self.blocks_between(time, day_start);

        let mut last_jump = 0i64;
        let mut jump_before_last = 0i64;
        let mut rounds = 0u32;
        while jump.abs() > self.calibration.jump_tolerance && jump != jump_before_last {
            if rounds >= self.calibration.max_jump_iterations {
                warn!(candidate, jump, rounds, "block jump search did not settle, walking from here");
                break;
            }
            rounds += 1;
            jump_before_last = last_jump;
            last_jump = jump;
            candidate = clamp(candidate - jump);
            time = self.timestamp_at(candidate).await?;
            jump = self.blocks_between(time, day_start);
            debug!(candidate, time, jump, "block jump");
        }

        let mut steps = 0u64;
        if time >= day_start {
            while time >= day_start && candidate > 0 {
                candidate -= 1;
                time = self.timestamp_at(candidate).await?;
                steps += 1;
            }
            // Stopped on the last block of the previous day
            if time < day_start {
                candidate += 1;
            }
        } else {
            while time < day_start {
                if candidate >= tip_height {
                    let date = DateTime::from_timestamp(day_start, 0)
                        .map(|t| t.date_naive())
                        .unwrap_or_default();
                    let latest = DateTime::from_timestamp(tip.timestamp - SECONDS_PER_DAY, 0)
                        .map(|t| t.date_naive())
                        .unwrap_or_default();
                    return Err(OracleError::OutOfRangeDate {
                        date,
                        reason: DateRange::NotFinal(latest),
                    });
                }
                candidate += 1;
                time = self.timestamp_at(candidate).await?;
                steps += 1;
            }
        }

        info!(height = candidate, jump_rounds = rounds, walk_steps = steps, "located first block of day");
        Ok(candidate as u64)
    }
}
