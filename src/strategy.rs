pub mod condition;
pub mod structure;

use crate::frame::FrameRow;
use crate::model::TrendState;

/// Thresholds of the momentum-breakout rule.
///
/// Loaded once from configuration; a scan never changes them.
#[derive(Debug, Clone, PartialEq)]
pub struct BreakoutRule {
    /// Inclusive lower RSI bound.
    pub rsi_low: f64,
    /// Inclusive upper RSI bound.
    pub rsi_high: f64,
    /// Current volume must exceed `volume_multiplier * avg_volume`.
    pub volume_multiplier: f64,
}

impl Default for BreakoutRule {
    fn default() -> Self {
        Self {
            rsi_low: 50.0,
            rsi_high: 75.0,
            volume_multiplier: 1.5,
        }
    }
}

/// Classify the close against the fast and slow EMAs of one row.
pub fn trend_state(row: &FrameRow) -> TrendState {
    let (Some(fast), Some(slow)) = (row.ema_fast, row.ema_slow) else {
        return TrendState::Unknown;
    };
    let close = row.bar.close;
    if close > fast && fast > slow {
        TrendState::Uptrend
    } else if close < fast && fast < slow {
        TrendState::Downtrend
    } else {
        TrendState::Mixed
    }
}
