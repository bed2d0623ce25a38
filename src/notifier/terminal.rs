use std::sync::Mutex;

use crate::model::ScanResult;
use crate::notifier::Notifier;
use crate::scanner::ScanEvent;

/// Logs progress through `tracing` and prints the match table on completion.
#[derive(Default)]
pub struct TerminalNotifier {
    matches: Mutex<Vec<ScanResult>>,
}

impl TerminalNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Notifier for TerminalNotifier {
    fn notify(&self, event: &ScanEvent) {
        match event {
            ScanEvent::Started { total } => {
                tracing::info!(total, "scanning watchlist");
            }
            ScanEvent::Progress {
                symbol,
                scanned,
                total,
                matches,
            } => {
                tracing::info!(symbol = %symbol, scanned, total, matches, "scanned");
            }
            ScanEvent::Match(result) => {
                tracing::warn!(
                    symbol = %result.symbol,
                    price = result.current_price,
                    rsi = ?result.rsi,
                    volume_x = ?result.volume_x,
                    "MATCH: {} breakout",
                    result.symbol,
                );
                if let Ok(mut matches) = self.matches.lock() {
                    matches.push(result.clone());
                }
            }
            ScanEvent::Skipped { symbol, reason } => {
                tracing::debug!(symbol = %symbol, reason = %reason, "skipped");
            }
            ScanEvent::Completed(summary) => {
                let matches = self
                    .matches
                    .lock()
                    .map(|m| m.clone())
                    .unwrap_or_default();
                println!("{}", render_table(&matches));
                println!(
                    "scanned {} | matches {} | skipped {}{}",
                    summary.scanned,
                    summary.matches,
                    summary.skipped,
                    if summary.cancelled { " | cancelled" } else { "" },
                );
            }
        }
    }
}

fn render_table(results: &[ScanResult]) -> String {
    if results.is_empty() {
        return "no matches".to_owned();
    }

    let mut out = format!(
        "{:<16} {:>12} {:>8} {:>8}  {}",
        "SYMBOL", "PRICE", "RSI", "VOL x", "VERDICT"
    );
    for r in results {
        let rsi = r.rsi.map_or_else(|| "-".to_owned(), |v| format!("{v:.1}"));
        let volume_x = r.volume_x.map_or_else(|| "-".to_owned(), |v| format!("{v:.2}"));
        out.push_str(&format!(
            "\n{:<16} {:>12.2} {:>8} {:>8}  {}",
            r.symbol, r.current_price, rsi, volume_x, r.verdict
        ));
    }
    out
}
