use crate::model::PriceBar;

/// Well-formed bars in strictly increasing timestamp order.
#[derive(Debug, Clone, Default)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series from provider output.
    ///
    /// Drops malformed bars, sorts ascending and keeps the first bar seen for
    /// each timestamp.
    pub fn from_raw(raw: Vec<PriceBar>) -> Self {
        let mut bars: Vec<PriceBar> = raw.into_iter().filter(PriceBar::is_well_formed).collect();
        // stable: equal timestamps keep arrival order
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);
        Self { bars }
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(day: i64, close: f64) -> PriceBar {
        PriceBar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn sorts_and_keeps_first_duplicate() {
        let series = PriceSeries::from_raw(vec![bar(2, 12.0), bar(0, 10.0), bar(2, 99.0), bar(1, 11.0)]);
        let closes: Vec<f64> = series.bars().iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn drops_malformed_bars() {
        let mut broken = bar(1, 11.0);
        broken.open = f64::NAN;
        let series = PriceSeries::from_raw(vec![bar(0, 10.0), broken, bar(2, 0.0)]);
        assert_eq!(series.len(), 1);
        assert_eq!(series.bars().last().map(|b| b.close), Some(10.0));
    }

    #[test]
    fn empty_input_is_empty_series() {
        assert!(PriceSeries::from_raw(Vec::new()).is_empty());
    }
}
