use serde::Serialize;

use crate::frame::FrameRow;
use crate::model::{ScanResult, ScanVerdict};
use crate::strategy::BreakoutRule;

/// Outcome of each rule component on the latest bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RuleChecks {
    pub trend: bool,
    pub momentum: bool,
    pub volume: bool,
    pub breakout: bool,
}

impl RuleChecks {
    pub fn all(&self) -> bool {
        self.trend && self.momentum && self.volume && self.breakout
    }
}

/// Values the decision was made on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalMetrics {
    pub current_price: f64,
    pub rsi: Option<f64>,
    pub volume_x: Option<f64>,
    pub prev_high: Option<f64>,
}

/// Result of evaluating the breakout rule against one symbol's frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub matched: bool,
    pub checks: RuleChecks,
    pub metrics: SignalMetrics,
}

impl Evaluation {
    pub fn verdict(&self) -> ScanVerdict {
        if self.matched {
            ScanVerdict::Buy
        } else {
            ScanVerdict::Wait
        }
    }

    pub fn to_scan_result(&self, symbol: &str) -> ScanResult {
        ScanResult {
            symbol: symbol.to_owned(),
            current_price: self.metrics.current_price,
            rsi: self.metrics.rsi,
            volume_x: self.metrics.volume_x,
            verdict: self.verdict(),
        }
    }
}

/// Evaluate the rule on the most recent row.
///
/// Returns `None` for an empty frame. A missing indicator value or a missing
/// previous bar fails the component that needs it.
pub fn evaluate(rule: &BreakoutRule, rows: &[FrameRow]) -> Option<Evaluation> {
    let current = rows.last()?;
    let previous = rows.len().checked_sub(2).map(|i| &rows[i]);
    let close = current.bar.close;

    let trend = match (current.ema_fast, current.ema_slow) {
        (Some(fast), Some(slow)) => close > fast && fast > slow,
        _ => false,
    };

    let momentum = current
        .rsi
        .is_some_and(|rsi| rsi >= rule.rsi_low && rsi <= rule.rsi_high);

    let avg_volume = current.avg_volume.filter(|avg| *avg > 0.0);
    let volume = avg_volume.is_some_and(|avg| current.bar.volume > avg * rule.volume_multiplier);
    let volume_x = avg_volume.map(|avg| current.bar.volume / avg);

    let prev_high = previous.map(|p| p.bar.high);
    let breakout = prev_high.is_some_and(|high| close > high);

    let checks = RuleChecks {
        trend,
        momentum,
        volume,
        breakout,
    };

    Some(Evaluation {
        matched: checks.all(),
        checks,
        metrics: SignalMetrics {
            current_price: close,
            rsi: current.rsi,
            volume_x,
            prev_high,
        },
    })
}
