//! Scans one UTC day of blocks into an output-amount histogram

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::source::NodeDataSource;
use crate::algo::bins::BinTable;
use crate::algo::histogram::Histogram;
use crate::config::calibration::FilterRules;
use crate::core::{Block, OracleResult, Transaction};

/// Why a transaction was left out of the histogram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Coinbase,
    TooManyInputs,
    OutputCount,
    NullData,
    SameDayInput,
    LargeWitness,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkipCounts {
    pub coinbase: u64,
    pub too_many_inputs: u64,
    pub output_count: u64,
    pub null_data: u64,
    pub same_day_input: u64,
    pub large_witness: u64,
}

impl SkipCounts {
    fn record(&mut self, reason: SkipReason) {
        let slot = match reason {
            SkipReason::Coinbase => &mut self.coinbase,
            SkipReason::TooManyInputs => &mut self.too_many_inputs,
            SkipReason::OutputCount => &mut self.output_count,
            SkipReason::NullData => &mut self.null_data,
            SkipReason::SameDayInput => &mut self.same_day_input,
            SkipReason::LargeWitness => &mut self.large_witness,
        };
        *slot += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub first_height: u64,
    pub blocks: u64,
    pub transactions: u64,
    pub kept: u64,
    pub outputs_counted: u64,
    pub skipped: SkipCounts,
}

/// Operator feedback emitted before each block is folded in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockProgress {
    pub height: u64,
    pub time: DateTime<Utc>,
    /// Share of the UTC day elapsed at the block's timestamp, 0-100
    pub day_percent: f64,
}

impl BlockProgress {
    fn new(height: u64, time: DateTime<Utc>) -> Self {
        let hours = time.hour() as f64 + time.minute() as f64 / 60.0;
        Self {
            height,
            time,
            day_percent: 100.0 * hours / 24.0,
        }
    }
}

/// Heuristics that keep only ordinary two-output payments
pub struct TransactionFilter<'a> {
    rules: &'a FilterRules,
}

impl<'a> TransactionFilter<'a> {
    pub fn new(rules: &'a FilterRules) -> Self {
        Self { rules }
    }

    /// `None` if the transaction should be counted
    pub fn skip_reason(&self, tx: &Transaction, seen_today: &HashSet<String>) -> Option<SkipReason> {
        if tx.is_coinbase() {
            return Some(SkipReason::Coinbase);
        }
        if tx.inputs.len() > self.rules.max_inputs {
            return Some(SkipReason::TooManyInputs);
        }
        if tx.outputs.len() != self.rules.required_outputs {
            return Some(SkipReason::OutputCount);
        }
        if tx.outputs.iter().any(|output| output.is_null_data()) {
            return Some(SkipReason::NullData);
        }
        for input in &tx.inputs {
            if input.prev_txid_suffix().map_or(false, |suffix| seen_today.contains(suffix)) {
                return Some(SkipReason::SameDayInput);
            }
            if input.max_witness_len() > self.rules.max_witness_hex_len {
                return Some(SkipReason::LargeWitness);
            }
        }
        None
    }

    pub fn counts_amount(&self, value: f64) -> bool {
        value > self.rules.min_output_btc && value < self.rules.max_output_btc
    }
}

/// Histogram and same-day txid set for one day, owned by one scan
pub struct DayAccumulator<'a> {
    filter: TransactionFilter<'a>,
    bins: &'a BinTable,
    histogram: Histogram,
    seen_txids: HashSet<String>,
    stats: ScanStats,
}

impl<'a> DayAccumulator<'a> {
    pub fn new(rules: &'a FilterRules, bins: &'a BinTable) -> Self {
        Self {
            filter: TransactionFilter::new(rules),
            bins,
            histogram: Histogram::new(),
            seen_txids: HashSet::new(),
            stats: ScanStats::default(),
        }
    }

    pub fn fold_block(&mut self, block: &Block) {
        if self.stats.blocks == 0 {
            self.stats.first_height = block.height;
        }
        self.stats.blocks += 1;

        for tx in &block.transactions {
            self.stats.transactions += 1;
            self.seen_txids.insert(tx.txid_suffix().to_string());

            if let Some(reason) = self.filter.skip_reason(tx, &self.seen_txids) {
                self.stats.skipped.record(reason);
                continue;
            }
            self.stats.kept += 1;

            for output in &tx.outputs {
                if !self.filter.counts_amount(output.value) {
                    continue;
                }
                if let Some(bin) = self.bins.locate(output.value) {
                    self.histogram.increment(bin);
                    self.stats.outputs_counted += 1;
                }
            }
        }
    }

    pub fn finish(self) -> (Histogram, ScanStats) {
        (self.histogram, self.stats)
    }
}

pub struct OutputHistogramBuilder<'a, S: NodeDataSource + ?Sized> {
    source: &'a S,
    rules: &'a FilterRules,
    bins: &'a BinTable,
    /// Highest height known to exist when the run started
    chain_height: u64,
}

impl<'a, S: NodeDataSource + ?Sized> OutputHistogramBuilder<'a, S> {
    pub fn new(source: &'a S, rules: &'a FilterRules, bins: &'a BinTable, chain_height: u64) -> Self {
        Self {
            source,
            rules,
            bins,
            chain_height,
        }
    }

    /// Folds every block from `start_height` whose UTC date is `date`.
    ///
    /// The first block of the following day is fetched to detect the boundary
    /// but contributes nothing.
    #[instrument(skip(self, on_block))]
    pub async fn build_day<F>(
        &self,
        start_height: u64,
        date: NaiveDate,
        mut on_block: F,
    ) -> OracleResult<(Histogram, ScanStats)>
    where
        F: FnMut(&BlockProgress) + Send,
    {
        let mut accumulator = DayAccumulator::new(self.rules, self.bins);
        let mut height = start_height;
        let mut block = self.source.block_at(height).await?;

        loop {
            let Some(time) = block.time_utc() else {
                warn!(height, timestamp = block.timestamp, "block timestamp out of range, ending scan");
                break;
            };
            if time.date_naive() != date {
                debug!(height, %time, "reached next day");
                break;
            }

            let progress = BlockProgress::new(height, time);
            on_block(&progress);
            debug!(height, %time, txs = block.transactions.len(), "folding block");
            accumulator.fold_block(&block);

            height += 1;
            if height > self.chain_height {
                warn!(height, chain_height = self.chain_height, "scan reached the chain tip before the day ended");
                break;
            }
            block = self.source.block_at(height).await?;
        }

        let (histogram, stats) = accumulator.finish();
        info!(
            blocks = stats.blocks,
            transactions = stats.transactions,
            kept = stats.kept,
            outputs = stats.outputs_counted,
            "day scan complete"
        );
        Ok((histogram, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Calibration;
    use crate::core::{ScriptPubKey, TxInput, TxOutput};
    use crate::ingest::InMemoryChain;

    const DAY: i64 = 1_702_598_400; // 2023-12-15 00:00:00 UTC

    fn p2wpkh(value: f64) -> TxOutput {
        TxOutput::new(value, ScriptPubKey::new("witness_v0_keyhash", "0 89abcdef"))
    }

    fn payment(txid: &str, spends: &str, values: &[f64]) -> Transaction {
        Transaction {
            txid: txid.to_string(),
            inputs: vec![TxInput::spending(spends)],
            outputs: values.iter().map(|&v| p2wpkh(v)).collect(),
        }
    }

    fn scan(block: &Block) -> (Histogram, ScanStats) {
        let calibration = Calibration::builtin();
        let mut accumulator = DayAccumulator::new(&calibration.filter, BinTable::shared());
        accumulator.fold_block(block);
        accumulator.finish()
    }

    fn block_of(transactions: Vec<Transaction>) -> Block {
        Block {
            hash: "00".repeat(32),
            height: 1,
            timestamp: DAY + 60,
            transactions,
        }
    }

    #[test]
    fn test_counts_ordinary_payment() {
        let (histogram, stats) = scan(&block_of(vec![payment("aaaa0001", "ffff0001", &[0.01, 0.5])]));
        let bins = BinTable::shared();
        assert_eq!(histogram.counts()[bins.locate(0.01).unwrap()], 1.0);
        assert_eq!(histogram.counts()[bins.locate(0.5).unwrap()], 1.0);
        assert_eq!(histogram.total(), 2.0);
        assert_eq!(stats.kept, 1);
        assert_eq!(stats.outputs_counted, 2);
    }

    #[test]
    fn test_coinbase_never_counted() {
        let coinbase = Transaction {
            txid: "cb000001".to_string(),
            inputs: vec![TxInput::coinbase()],
            outputs: vec![p2wpkh(3.125), p2wpkh(0.0001)],
        };
        let (histogram, stats) = scan(&block_of(vec![coinbase]));
        assert_eq!(histogram.total(), 0.0);
        assert_eq!(stats.skipped.coinbase, 1);
    }

    #[test]
    fn test_three_outputs_never_counted() {
        let (histogram, stats) = scan(&block_of(vec![payment("aaaa0002", "ffff0002", &[0.1, 0.2, 0.3])]));
        assert_eq!(histogram.total(), 0.0);
        assert_eq!(stats.skipped.output_count, 1);

        let (histogram, _) = scan(&block_of(vec![payment("aaaa0003", "ffff0003", &[0.1])]));
        assert_eq!(histogram.total(), 0.0);
    }

    #[test]
    fn test_out_of_range_amounts_contribute_nothing() {
        let (histogram, stats) = scan(&block_of(vec![payment("aaaa0004", "ffff0004", &[150_000.0, 0.000005])]));
        assert_eq!(histogram.total(), 0.0);
        assert_eq!(stats.kept, 1);
        assert_eq!(stats.outputs_counted, 0);
    }

    #[test]
    fn test_op_return_and_input_filters() {
        let op_return = Transaction {
            txid: "aaaa0005".to_string(),
            inputs: vec![TxInput::spending("ffff0005")],
            outputs: vec![
                p2wpkh(0.02),
                TxOutput::new(0.0, ScriptPubKey::new("nulldata", "OP_RETURN 0102")),
            ],
        };
        let many_inputs = Transaction {
            txid: "aaaa0006".to_string(),
            inputs: (0..6).map(|i| TxInput::spending(format!("eeee000{}", i))).collect(),
            outputs: vec![p2wpkh(0.02), p2wpkh(0.03)],
        };
        let big_witness = Transaction {
            txid: "aaaa0007".to_string(),
            inputs: vec![TxInput::spending("ffff0007").with_witness(vec!["ab".repeat(251)])],
            outputs: vec![p2wpkh(0.02), p2wpkh(0.03)],
        };
        let small_witness = Transaction {
            txid: "aaaa0008".to_string(),
            inputs: vec![TxInput::spending("ffff0008").with_witness(vec!["ab".repeat(250)])],
            outputs: vec![p2wpkh(0.02), p2wpkh(0.03)],
        };

        let (histogram, stats) = scan(&block_of(vec![op_return, many_inputs, big_witness, small_witness]));
        assert_eq!(stats.skipped.null_data, 1);
        assert_eq!(stats.skipped.too_many_inputs, 1);
        assert_eq!(stats.skipped.large_witness, 1);
        assert_eq!(stats.kept, 1);
        assert_eq!(histogram.total(), 2.0);
    }

    #[test]
    fn test_same_day_chained_input_skipped() {
        // The parent is itself filtered out but still marks its txid as seen.
        let parent = payment("1111111122223333", "ffff0009", &[0.1, 0.2, 0.3]);
        let child = payment("4444444455556666", "9999999922223333", &[0.05, 0.04]);
        let unrelated = payment("7777777788889999", "aaaaaaaabbbbcccc", &[0.05, 0.04]);

        let (histogram, stats) = scan(&block_of(vec![parent, child, unrelated]));
        assert_eq!(stats.skipped.same_day_input, 1);
        assert_eq!(stats.kept, 1);
        assert_eq!(histogram.total(), 2.0);
    }

    #[tokio::test]
    async fn test_build_day_stops_at_next_day() {
        let mut chain = InMemoryChain::new();
        chain.push_block(DAY - 300, vec![payment("0000aaaa", "0000ffff", &[0.3, 0.4])]);
        let first = chain.push_block(DAY + 100, vec![payment("1000aaaa", "1000ffff", &[0.01, 0.02])]);
        chain.push_block(DAY + 43_200, vec![payment("2000aaaa", "2000ffff", &[0.01, 0.02])]);
        chain.push_block(DAY + 86_400, vec![payment("3000aaaa", "3000ffff", &[7.0, 8.0])]);
        chain.push_block(DAY + 87_000, vec![]);

        let calibration = Calibration::builtin();
        let builder = OutputHistogramBuilder::new(&chain, &calibration.filter, BinTable::shared(), 4);
        let date = NaiveDate::from_ymd_opt(2023, 12, 15).unwrap();

        let mut seen = Vec::new();
        let (histogram, stats) = builder
            .build_day(first, date, |progress| seen.push((progress.height, progress.day_percent)))
            .await
            .unwrap();

        assert_eq!(stats.first_height, 1);
        assert_eq!(stats.blocks, 2);
        assert_eq!(histogram.total(), 4.0);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].0, 2);
        assert!((seen[1].1 - 50.0).abs() < 1e-9);
        // Boundary block fetched, block after it never requested
        assert_eq!(chain.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_build_day_with_no_payments_is_empty() {
        let mut chain = InMemoryChain::new();
        let first = chain.push_block(DAY + 10, vec![]);
        chain.push_block(DAY + 600, vec![]);
        chain.push_block(DAY + 90_000, vec![]);

        let calibration = Calibration::builtin();
        let builder = OutputHistogramBuilder::new(&chain, &calibration.filter, BinTable::shared(), 2);
        let date = NaiveDate::from_ymd_opt(2023, 12, 15).unwrap();
        let (histogram, stats) = builder.build_day(first, date, |_| {}).await.unwrap();

        assert_eq!(stats.blocks, 2);
        assert!(histogram.counts().iter().all(|&c| c == 0.0));
    }
}
