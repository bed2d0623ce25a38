use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::model::PriceBar;
use crate::provider::{PriceProvider, PriceRequest};

const PROVIDER_NAME: &str = "yahoo";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const INITIAL_BACKOFF_MILLIS: u64 = 1000;

/// Yahoo Finance v8 chart API client.
pub struct YahooProvider {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl YahooProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, Report<ProviderError>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .change_context(ProviderError::Request {
                provider: PROVIDER_NAME.into(),
            })?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(nonzero!(1u32));

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            max_retries: config.max_retries,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
        })
    }

    async fn fetch_once(
        &self,
        request: &PriceRequest,
    ) -> Result<Vec<PriceBar>, Report<ProviderError>> {
        // Wait for rate limiter before making the request
        self.rate_limiter.until_ready().await;

        let url = format!("{}/{}", self.base_url, request.symbol);
        let params = [
            ("range", request.range.as_str()),
            ("interval", request.interval.yahoo_interval()),
            ("includeAdjustedClose", "true"),
        ];

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .change_context(ProviderError::Request {
                provider: PROVIDER_NAME.into(),
            })
            .attach_with(|| format!("symbol: {}", request.symbol))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Report::new(ProviderError::NotFound {
                symbol: request.symbol.clone(),
            }));
        }
        if !status.is_success() {
            return Err(Report::new(ProviderError::Status {
                provider: PROVIDER_NAME.into(),
                status: status.as_u16(),
            })
            .attach(format!("symbol: {}", request.symbol)));
        }

        let chart: ChartResponse =
            response
                .json()
                .await
                .change_context(ProviderError::ResponseParse {
                    provider: PROVIDER_NAME.into(),
                })?;

        let bars = parse_chart(&request.symbol, chart)?;

        info!(
            symbol = %request.symbol,
            interval = %request.interval,
            range = %request.range,
            fetched = bars.len(),
            "yahoo chart fetch complete"
        );

        Ok(bars)
    }
}

impl PriceProvider for YahooProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn fetch(
        &self,
        request: &PriceRequest,
    ) -> BoxFuture<'_, Result<Vec<PriceBar>, Report<ProviderError>>> {
        let request = request.clone();
        Box::pin(async move {
            let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MILLIS);
            let mut attempt = 0;

            loop {
                match self.fetch_once(&request).await {
                    Ok(bars) => return Ok(bars),
                    Err(report) if attempt < self.max_retries && is_retryable(&report) => {
                        attempt += 1;
                        warn!(
                            symbol = %request.symbol,
                            attempt,
                            error = %report.current_context(),
                            "yahoo fetch failed, retrying..."
                        );
                        sleep(backoff).await;
                        backoff *= 2;
                    }
                    Err(report) => return Err(report),
                }
            }
        })
    }
}

fn is_retryable(report: &Report<ProviderError>) -> bool {
    match report.current_context() {
        ProviderError::Request { .. } => true,
        ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
        ProviderError::ResponseParse { .. } | ProviderError::NotFound { .. } => false,
    }
}

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Convert a chart response into bars with split/dividend-adjusted prices.
///
/// Rows where every field is null (exchange holidays) are skipped; partially
/// null rows keep NaN in the missing fields.
fn parse_chart(
    symbol: &str,
    response: ChartResponse,
) -> Result<Vec<PriceBar>, Report<ProviderError>> {
    let Some(results) = response.chart.result else {
        return match response.chart.error {
            Some(err) if err.code == "Not Found" => Err(Report::new(ProviderError::NotFound {
                symbol: symbol.to_owned(),
            })),
            Some(err) => Err(Report::new(ProviderError::ResponseParse {
                provider: PROVIDER_NAME.into(),
            })
            .attach(format!("{}: {}", err.code, err.description))),
            None => Ok(Vec::new()),
        };
    };

    let Some(data) = results.into_iter().next() else {
        return Ok(Vec::new());
    };
    let Some(timestamps) = data.timestamp else {
        debug!(symbol, "yahoo chart has no timestamps");
        return Ok(Vec::new());
    };

    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
    let adj_closes = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose);

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let Some(timestamp) = DateTime::from_timestamp(ts, 0) else {
            continue;
        };

        let open = quote.open.get(i).copied().flatten();
        let high = quote.high.get(i).copied().flatten();
        let low = quote.low.get(i).copied().flatten();
        let close = quote.close.get(i).copied().flatten();
        let volume = quote.volume.get(i).copied().flatten();

        if open.is_none() && high.is_none() && low.is_none() && close.is_none() && volume.is_none()
        {
            continue;
        }

        let adj_close = adj_closes
            .as_ref()
            .and_then(|v| v.get(i).copied().flatten());
        let factor = match (adj_close, close) {
            (Some(adj), Some(c)) if c > 0.0 && adj > 0.0 => adj / c,
            _ => 1.0,
        };

        bars.push(PriceBar {
            timestamp,
            open: open.unwrap_or(f64::NAN) * factor,
            high: high.unwrap_or(f64::NAN) * factor,
            low: low.unwrap_or(f64::NAN) * factor,
            close: close.unwrap_or(f64::NAN) * factor,
            volume: volume.unwrap_or(0.0),
        });
    }

    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Interval;

    fn parse(json: &str) -> Result<Vec<PriceBar>, Report<ProviderError>> {
        let response: ChartResponse = serde_json::from_str(json).unwrap();
        parse_chart("TCS.NS", response)
    }

    #[test]
    fn parses_bars_and_skips_empty_rows() {
        let json = r#"{"chart":{"result":[{
            "timestamp":[1704166200,1704252600,1704339000],
            "indicators":{"quote":[{
                "open":[100.0,null,102.0],
                "high":[101.0,null,103.0],
                "low":[99.0,null,101.0],
                "close":[100.5,null,102.5],
                "volume":[1000,null,1200]
            }]}
        }],"error":null}}"#;
        let bars = parse(json).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 100.5);
        assert_eq!(bars[1].volume, 1200.0);
        assert_eq!(bars[0].timestamp.timestamp(), 1704166200);
    }

    #[test]
    fn partially_null_row_keeps_nan() {
        let json = r#"{"chart":{"result":[{
            "timestamp":[1704166200],
            "indicators":{"quote":[{
                "open":[null],"high":[101.0],"low":[99.0],"close":[100.5],"volume":[10]
            }]}
        }],"error":null}}"#;
        let bars = parse(json).unwrap();
        assert!(bars[0].open.is_nan());
        assert!(!bars[0].is_well_formed());
    }

    #[test]
    fn adjusted_close_scales_prices() {
        let json = r#"{"chart":{"result":[{
            "timestamp":[1704166200],
            "indicators":{
                "quote":[{"open":[200.0],"high":[210.0],"low":[190.0],"close":[200.0],"volume":[5]}],
                "adjclose":[{"adjclose":[100.0]}]
            }
        }],"error":null}}"#;
        let bars = parse(json).unwrap();
        assert!((bars[0].close - 100.0).abs() < 1e-9);
        assert!((bars[0].high - 105.0).abs() < 1e-9);
        assert_eq!(bars[0].volume, 5.0);
    }

    #[test]
    fn missing_timestamps_is_empty_not_error() {
        let json = r#"{"chart":{"result":[{"indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(parse(json).unwrap().is_empty());
    }

    #[test]
    fn not_found_error_maps_to_not_found() {
        let json = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse(json).unwrap_err();
        assert!(matches!(
            err.current_context(),
            ProviderError::NotFound { .. }
        ));
    }

    #[test]
    fn other_chart_error_is_parse_error() {
        let json = r#"{"chart":{"result":null,"error":{"code":"Bad Request","description":"Invalid range"}}}"#;
        let err = parse(json).unwrap_err();
        assert!(matches!(
            err.current_context(),
            ProviderError::ResponseParse { .. }
        ));
    }

    #[test]
    fn retry_policy_by_error_kind() {
        let status = |code| {
            Report::new(ProviderError::Status {
                provider: "yahoo".into(),
                status: code,
            })
        };
        assert!(is_retryable(&status(503)));
        assert!(is_retryable(&status(429)));
        assert!(!is_retryable(&status(401)));
        assert!(!is_retryable(&Report::new(ProviderError::NotFound {
            symbol: "X".into()
        })));
    }

    /// Integration test: requires network access. Run with `cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn integration_fetch_daily_bars() {
        let provider = YahooProvider::new(&ProviderConfig::default()).unwrap();
        let bars = provider
            .fetch(&PriceRequest {
                symbol: "RELIANCE.NS".into(),
                interval: Interval::Day1,
                range: "6mo".into(),
            })
            .await
            .unwrap();
        assert!(bars.len() > 50);
    }
}
