//! Terminal output for the operator

use colored::Colorize;

use crate::algo::{ChainStatus, PriceEstimate};
use crate::core::OracleError;
use crate::ingest::BlockProgress;

pub fn print_banner() {
    println!("\n{}", "UTXOracle: BTC/USD from on-chain data only".bold());
    println!("{}", "=".repeat(60));
}

pub fn print_chain_status(status: &ChainStatus) {
    println!("{} {}", "Connected node height:", status.tip.height.to_string().bold());
    println!(
        "{} {}",
        "Node tip time:",
        status.tip_time.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "{} {}",
        "Latest price date:",
        status.latest_price_date.to_string().bright_green()
    );
    println!("{} {}", "Earliest price date:", status.earliest_price_date);
}

pub fn print_prompt_help() {
    println!(
        "\nEnter a date as {} ({} for the latest day, {} to quit)",
        "YYYY-MM-DD".bold(),
        "enter".cyan(),
        "q".cyan()
    );
}

pub fn print_block_progress(progress: &BlockProgress) {
    println!(
        "   {} {} {} {}",
        "block".dimmed(),
        progress.height,
        progress.time.format("%H:%M:%S"),
        format!("{:5.1}% of day", progress.day_percent).dimmed()
    );
}

pub fn print_estimate(estimate: &PriceEstimate) {
    println!("\n{}", "=".repeat(60));
    println!(
        "{} {} {}",
        estimate.date,
        "price estimate:".bold(),
        format_usd(estimate.price_usd).bright_green().bold()
    );
    println!(
        "   Candidates: {} (weight {:.2}), {} (weight {:.2})",
        format_usd(estimate.resolved.best.btc_in_usd as u64),
        estimate.resolved.best.weight,
        format_usd(estimate.resolved.neighbor.btc_in_usd as u64),
        estimate.resolved.neighbor.weight
    );
    println!(
        "   Scanned {} blocks from height {}: {} of {} transactions kept, {} outputs counted",
        estimate.stats.blocks,
        estimate.first_height,
        estimate.stats.kept,
        estimate.stats.transactions,
        estimate.stats.outputs_counted
    );
    println!("{}", "=".repeat(60));
}

pub fn print_recoverable(error: &OracleError) {
    println!("{} {}", "Cannot estimate:".bright_yellow(), error);
}

pub fn print_fatal(error: &OracleError) {
    eprintln!("{} {}", "Node error, stopping:".red().bold(), error);
}

/// Troubleshooting steps shown when the node cannot be reached or refuses a call
pub fn node_hint_lines(rpc_url: &str) -> Vec<String> {
    vec![
        format!("Check that bitcoind is running and its RPC port answers at {}", rpc_url),
        "Check --rpc-user/--rpc-password, or point --cookie-file at the node's .cookie".to_string(),
        "The node must be fully synced and started with server=1".to_string(),
    ]
}

pub fn print_node_hint(rpc_url: &str) {
    for line in node_hint_lines(rpc_url) {
        eprintln!("   {} {}", "-".yellow(), line);
    }
}

pub fn estimate_json(estimate: &PriceEstimate) -> serde_json::Result<String> {
    serde_json::to_string_pretty(estimate)
}

/// `$12,345` style formatting
pub fn format_usd(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("${}", grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::{PriceCandidate, ResolvedPrice, SlideMatch};
    use crate::ingest::ScanStats;
    use chrono::NaiveDate;

    #[test]
    fn test_format_usd() {
        assert_eq!(format_usd(0), "$0");
        assert_eq!(format_usd(999), "$999");
        assert_eq!(format_usd(1_000), "$1,000");
        assert_eq!(format_usd(59_808), "$59,808");
        assert_eq!(format_usd(1_234_567), "$1,234,567");
    }

    #[test]
    fn test_node_hint_names_endpoint() {
        let lines = node_hint_lines("http://10.0.0.5:8332");
        assert!(lines[0].contains("http://10.0.0.5:8332"));
        assert!(lines.iter().any(|line| line.contains("--cookie-file")));
    }

    #[test]
    fn test_estimate_json_fields() {
        let candidate = |slide, weight| PriceCandidate {
            slide,
            usd100_in_btc: 0.0016,
            btc_in_usd: 62_500.0,
            weight,
        };
        let estimate = PriceEstimate {
            date: NaiveDate::from_ymd_opt(2023, 12, 20).unwrap(),
            price_usd: 59_808,
            first_height: 288,
            resolved: ResolvedPrice {
                price_usd: 59_808,
                best: candidate(45, 0.75),
                neighbor: candidate(44, 0.25),
            },
            matched: SlideMatch {
                best_slide: 45,
                best_score: 0.5,
                neighbor_slide: 44,
                neighbor_score: 0.2,
                avg_score: 0.1,
            },
            stats: ScanStats {
                blocks: 144,
                ..Default::default()
            },
        };

        let value: serde_json::Value = serde_json::from_str(&estimate_json(&estimate).unwrap()).unwrap();
        assert_eq!(value["date"], "2023-12-20");
        assert_eq!(value["price_usd"], 59_808);
        assert_eq!(value["resolved"]["neighbor"]["slide"], 44);
        assert_eq!(value["matched"]["best_slide"], 45);
        assert_eq!(value["stats"]["blocks"], 144);
        assert_eq!(value["stats"]["skipped"]["coinbase"], 0);
    }
}
