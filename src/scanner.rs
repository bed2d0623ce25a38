use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::frame::{IndicatorFrame, IndicatorSettings};
use crate::model::{Interval, ScanResult, ScanVerdict};
use crate::provider::{PriceProvider, PriceRequest};
use crate::series::PriceSeries;
use crate::strategy::BreakoutRule;
use crate::strategy::condition::evaluate;
use crate::watchlist::Watchlist;

/// Incremental notification emitted while a scan runs.
///
/// For any symbol, `Progress` is always sent before its `Match` or `Skipped`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    Started {
        total: usize,
    },
    Progress {
        symbol: String,
        scanned: usize,
        total: usize,
        matches: usize,
    },
    Match(ScanResult),
    Skipped {
        symbol: String,
        reason: String,
    },
    Completed(ScanSummary),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub scanned: usize,
    pub matches: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

/// Parameters fixed for the lifetime of one scanner.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub settings: IndicatorSettings,
    pub rule: BreakoutRule,
    pub interval: Interval,
    pub range: String,
    /// Series shorter than this are reported as no data.
    pub min_bars: usize,
    pub concurrency: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            settings: IndicatorSettings::default(),
            rule: BreakoutRule::default(),
            interval: Interval::Day1,
            range: Interval::Day1.default_range().to_owned(),
            min_bars: 50,
            concurrency: 4,
        }
    }
}

impl ScanOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        let interval = config.provider.interval();
        Self {
            settings: config.scanner.indicator_settings(),
            rule: config.scanner.breakout_rule(),
            interval,
            range: config.provider.range_for(interval),
            min_bars: config.provider.min_bars,
            concurrency: config.scanner.concurrency,
        }
    }
}

enum SymbolOutcome {
    Evaluated(ScanResult),
    NoData { bars: usize },
    Failed { reason: String },
}

pub struct Scanner {
    provider: Arc<dyn PriceProvider>,
    options: ScanOptions,
}

impl Scanner {
    pub fn new(provider: Arc<dyn PriceProvider>, options: ScanOptions) -> Self {
        Self { provider, options }
    }

    /// Scan every symbol of `watchlist`, streaming events into `tx`.
    ///
    /// Symbols are fetched by a bounded pool while counters and events are
    /// driven from this single loop. Cancelling `cancel` or dropping the
    /// receiver stops the scan and drops any in-flight fetches.
    pub async fn run(
        &self,
        watchlist: &Watchlist,
        tx: mpsc::Sender<ScanEvent>,
        cancel: CancellationToken,
    ) -> ScanSummary {
        let total = watchlist.len();
        let mut summary = ScanSummary::default();

        info!(total, provider = self.provider.name(), "scan started");

        if tx.send(ScanEvent::Started { total }).await.is_err() {
            summary.cancelled = true;
            return summary;
        }

        let mut outcomes = stream::iter(watchlist.symbols().iter().cloned())
            .map(|symbol| async move {
                let outcome = self.scan_symbol(&symbol).await;
                (symbol, outcome)
            })
            .buffer_unordered(self.options.concurrency.max(1));

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(scanned = summary.scanned, total, "scan cancelled");
                    summary.cancelled = true;
                    break;
                }
                next = outcomes.next() => next,
            };

            let Some((symbol, outcome)) = next else {
                break;
            };

            summary.scanned += 1;
            let detail = match outcome {
                SymbolOutcome::Evaluated(result) if result.verdict == ScanVerdict::Buy => {
                    summary.matches += 1;
                    info!(symbol = %symbol, price = result.current_price, "scan match");
                    Some(ScanEvent::Match(result))
                }
                SymbolOutcome::Evaluated(_) => None,
                SymbolOutcome::NoData { bars } => {
                    summary.skipped += 1;
                    Some(ScanEvent::Skipped {
                        symbol: symbol.clone(),
                        reason: format!("no data ({bars} bars)"),
                    })
                }
                SymbolOutcome::Failed { reason } => {
                    summary.skipped += 1;
                    Some(ScanEvent::Skipped {
                        symbol: symbol.clone(),
                        reason,
                    })
                }
            };

            let progress = ScanEvent::Progress {
                symbol,
                scanned: summary.scanned,
                total,
                matches: summary.matches,
            };

            if tx.send(progress).await.is_err() {
                summary.cancelled = true;
                break;
            }
            if let Some(event) = detail
                && tx.send(event).await.is_err()
            {
                summary.cancelled = true;
                break;
            }
        }

        info!(
            scanned = summary.scanned,
            total,
            matches = summary.matches,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            "scan finished"
        );

        // Receiver may already be gone; the summary is also returned.
        let _ = tx.send(ScanEvent::Completed(summary.clone())).await;
        summary
    }

    async fn scan_symbol(&self, symbol: &str) -> SymbolOutcome {
        let request = PriceRequest {
            symbol: symbol.to_owned(),
            interval: self.options.interval,
            range: self.options.range.clone(),
        };

        let raw = match self.provider.fetch(&request).await {
            Ok(raw) => raw,
            Err(report) => {
                warn!(symbol, error = ?report, "fetch failed, skipping symbol");
                return SymbolOutcome::Failed {
                    reason: report.current_context().to_string(),
                };
            }
        };

        let series = PriceSeries::from_raw(raw);
        if series.len() < self.options.min_bars {
            debug!(
                symbol,
                bars = series.len(),
                min_bars = self.options.min_bars,
                "not enough bars"
            );
            return SymbolOutcome::NoData { bars: series.len() };
        }

        let frame = match IndicatorFrame::compute(&series, &self.options.settings) {
            Ok(frame) => frame,
            Err(report) => {
                warn!(symbol, error = ?report, "indicator computation failed, skipping symbol");
                return SymbolOutcome::Failed {
                    reason: report.current_context().to_string(),
                };
            }
        };

        match evaluate(&self.options.rule, frame.rows()) {
            Some(evaluation) => {
                debug!(symbol, checks = ?evaluation.checks, "evaluated");
                SymbolOutcome::Evaluated(evaluation.to_scan_result(symbol))
            }
            None => SymbolOutcome::NoData { bars: series.len() },
        }
    }
}
