use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum WatchlistError {
    #[display("failed to read watchlist file")]
    ReadFile,
}

#[derive(Debug, Display, Error)]
pub enum ProviderError {
    #[display("request to {provider} failed")]
    Request { provider: String },
    #[display("{provider} answered with HTTP {status}")]
    Status { provider: String, status: u16 },
    #[display("failed to parse response from {provider}")]
    ResponseParse { provider: String },
    #[display("symbol not found: {symbol}")]
    NotFound { symbol: String },
}

#[derive(Debug, Display, Error)]
pub enum StorageError {
    #[display("database migration failed")]
    Migration,
    #[display("failed to insert data")]
    Insert,
    #[display("failed to query data")]
    Query,
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum LlmError {
    #[display("environment variable {var} is not set")]
    MissingApiKey { var: String },
    #[display("request to {provider} failed")]
    Request { provider: String },
    #[display("failed to parse response from {provider}")]
    ResponseParse { provider: String },
    #[display("{provider} returned an empty reply")]
    EmptyReply { provider: String },
}
