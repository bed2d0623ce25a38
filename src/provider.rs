pub mod yahoo;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::ProviderError;
use crate::model::{Interval, PriceBar};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRequest {
    pub symbol: String,
    pub interval: Interval,
    /// Provider lookback, e.g. `"6mo"` or `"max"`.
    pub range: String,
}

/// Abstraction over a historical OHLCV source.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn PriceProvider`).
pub trait PriceProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch bars oldest-first as delivered by the source.
    ///
    /// An empty Vec means the source has no data for the request; rows may
    /// still contain NaN or zero fields for the cleaners downstream to drop.
    fn fetch(&self, request: &PriceRequest)
    -> BoxFuture<'_, Result<Vec<PriceBar>, Report<ProviderError>>>;
}
