mod audit;
mod chart;
mod config;
mod error;
mod frame;
mod history;
mod indicator;
mod llm;
mod model;
mod notifier;
mod provider;
mod scanner;
mod series;
mod strategy;
mod watchlist;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use audit::{AuditGateway, MetricsSnapshot};
use chart::Overlay;
use config::AppConfig;
use frame::IndicatorFrame;
use history::ChatStore;
use history::memory::MemoryChatStore;
use history::sqlite::SqliteChatStore;
use llm::ChatChunk;
use llm::gemini::GeminiClient;
use model::{AuditVerdict, Feedback, Interval};
use notifier::Notifier;
use notifier::json::JsonNotifier;
use notifier::terminal::TerminalNotifier;
use provider::yahoo::YahooProvider;
use provider::{PriceProvider, PriceRequest};
use scanner::{ScanOptions, Scanner};
use series::PriceSeries;
use watchlist::{Watchlist, normalize_symbol};

/// Upper bound on messages printed by `history`.
const HISTORY_PRINT_LIMIT: usize = 500;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("watchlist error")]
    Watchlist,
    #[display("data provider error")]
    Provider,
    #[display("no price data available")]
    NoData,
    #[display("storage error")]
    Storage,
    #[display("language model error")]
    Llm,
    #[display("failed to write output")]
    Output,
}

#[derive(Parser)]
#[command(name = "titan-screener", about = "NSE momentum-breakout screener")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the watchlist for momentum breakouts
    Scan {
        /// Watchlist file (defaults to `general.watchlist`)
        #[arg(long)]
        watchlist: Option<String>,
        /// Print one JSON object per scan event
        #[arg(long)]
        json: bool,
    },
    /// Print chart data for a symbol as JSON
    Chart {
        symbol: String,
        /// Bar interval, e.g. 1d, 1h, 15m
        #[arg(long, value_parser = parse_interval)]
        interval: Option<Interval>,
        /// Keep only the most recent N bars
        #[arg(long)]
        bars: Option<usize>,
        /// Skip supply/demand zone detection
        #[arg(long)]
        no_zones: bool,
        /// Comma-separated overlays to include (default: all)
        #[arg(long, value_enum, value_delimiter = ',')]
        overlays: Option<Vec<Overlay>>,
    },
    /// Ask the language model for a swing-trade verdict
    Audit { symbol: String },
    /// Ask a free-text question about a symbol
    Ask {
        symbol: String,
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
        /// Print the reply as it arrives
        #[arg(long)]
        stream: bool,
    },
    /// Show or clear the stored chat history of a symbol
    History {
        symbol: String,
        #[arg(long)]
        clear: bool,
    },
    /// Rate an assistant reply
    Feedback {
        id: Uuid,
        #[arg(value_parser = parse_feedback)]
        rating: Feedback,
    },
}

fn parse_interval(s: &str) -> Result<Interval, String> {
    Interval::from_str(s).ok_or_else(|| format!("unknown interval: {s}"))
}

fn parse_feedback(s: &str) -> Result<Feedback, String> {
    Feedback::from_str(s).ok_or_else(|| format!("expected `up` or `down`, got {s}"))
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    match cli.command {
        Command::Scan { watchlist, json } => scan(&config, watchlist, json).await,
        Command::Chart {
            symbol,
            interval,
            bars,
            no_zones,
            overlays,
        } => {
            let interval = interval.unwrap_or_else(|| config.provider.interval());
            let mut options = config.chart.options();
            if let Some(bars) = bars {
                options.max_bars = bars;
            }
            if no_zones {
                options.zones = false;
            }
            if let Some(overlays) = overlays {
                options = options.with_overlays(&overlays);
            }

            let symbol = normalize_symbol(&symbol);
            let frame = load_frame(&config, &symbol, interval).await?;
            let chart_spec = chart::prepare(&symbol, frame.into_rows(), interval, &options);
            print_json(&chart_spec)
        }
        Command::Audit { symbol } => {
            let verdict = match load_snapshot(&config, &symbol).await {
                Ok(snapshot) => build_gateway(&config).await?.audit(&snapshot).await,
                Err(report) => {
                    warn!(symbol, error = ?report, "no live data, audit skipped");
                    AuditVerdict::no_data()
                }
            };
            print_json(&verdict)
        }
        Command::Ask {
            symbol,
            question,
            stream,
        } => {
            let snapshot = match load_snapshot(&config, &symbol).await {
                Ok(snapshot) => snapshot,
                Err(report) => {
                    warn!(symbol, error = ?report, "no live data, question not sent");
                    println!("{}", AuditVerdict::no_data().reason);
                    return Ok(());
                }
            };
            let gateway = build_gateway(&config).await?;
            let question = question.join(" ");
            if stream {
                ask_streaming(&gateway, &snapshot, &question).await
            } else {
                let reply = gateway.ask(&snapshot, &question).await;
                info!(id = %reply.id, "chat reply");
                println!("{}", reply.content);
                Ok(())
            }
        }
        Command::History { symbol, clear } => {
            let symbol = normalize_symbol(&symbol);
            let store = open_store(&config).await?;
            if clear {
                let removed = store.clear(&symbol).await.change_context(AppError::Storage)?;
                println!("cleared {removed} messages for {symbol}");
                return Ok(());
            }
            let messages = store
                .messages(&symbol, HISTORY_PRINT_LIMIT)
                .await
                .change_context(AppError::Storage)?;
            if messages.is_empty() {
                println!("no chat history for {symbol}");
            }
            for m in messages {
                let feedback = m.feedback.map_or("", |f| f.as_str());
                println!(
                    "{} {:<9} {} {}\n    {}",
                    m.created_at.format("%Y-%m-%d %H:%M"),
                    m.role.as_str(),
                    m.id,
                    feedback,
                    m.content
                );
            }
            Ok(())
        }
        Command::Feedback { id, rating } => {
            let store = open_store(&config).await?;
            let found = store
                .set_feedback(id, rating)
                .await
                .change_context(AppError::Storage)?;
            if found {
                println!("recorded {} for {id}", rating.as_str());
            } else {
                println!("no message with id {id}");
            }
            Ok(())
        }
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

/// Token cancelled on the first Ctrl+C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl+c received, cancelling");
            token.cancel();
        }
    });
    cancel
}

async fn scan(
    config: &AppConfig,
    watchlist: Option<String>,
    json: bool,
) -> Result<(), Report<AppError>> {
    let path = watchlist.unwrap_or_else(|| config.general.watchlist.clone());
    let watchlist = Watchlist::load(Path::new(&path)).change_context(AppError::Watchlist)?;
    if watchlist.is_empty() {
        warn!(path = %path, "watchlist is empty; nothing to scan");
        return Ok(());
    }

    let provider: Arc<dyn PriceProvider> =
        Arc::new(YahooProvider::new(&config.provider).change_context(AppError::Provider)?);
    let scanner = Scanner::new(provider, ScanOptions::from_config(config));
    let notifier: Box<dyn Notifier> = if json {
        Box::new(JsonNotifier)
    } else {
        Box::new(TerminalNotifier::new())
    };

    let cancel = cancel_on_ctrl_c();
    let (tx, mut rx) = mpsc::channel(64);

    // The scanner drops `tx` when it returns, which ends the consumer loop
    tokio::join!(scanner.run(&watchlist, tx, cancel), async {
        while let Some(event) = rx.recv().await {
            notifier.notify(&event);
        }
    });

    Ok(())
}

async fn load_frame(
    config: &AppConfig,
    symbol: &str,
    interval: Interval,
) -> Result<IndicatorFrame, Report<AppError>> {
    let provider = YahooProvider::new(&config.provider).change_context(AppError::Provider)?;
    let request = PriceRequest {
        symbol: symbol.to_owned(),
        interval,
        range: config.provider.range_for(interval),
    };
    let raw = provider
        .fetch(&request)
        .await
        .change_context(AppError::Provider)?;

    let series = PriceSeries::from_raw(raw);
    if series.is_empty() {
        return Err(Report::new(AppError::NoData).attach(format!("symbol: {symbol}")));
    }
    info!(symbol, interval = %interval, bars = series.len(), "price series loaded");

    IndicatorFrame::compute(&series, &config.scanner.indicator_settings())
        .change_context(AppError::Config)
}

async fn load_snapshot(
    config: &AppConfig,
    symbol: &str,
) -> Result<MetricsSnapshot, Report<AppError>> {
    let symbol = normalize_symbol(symbol);
    let frame = load_frame(config, &symbol, config.provider.interval()).await?;
    MetricsSnapshot::from_frame(&symbol, &frame)
        .ok_or_else(|| Report::new(AppError::NoData).attach(format!("symbol: {symbol}")))
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn ChatStore>, Report<AppError>> {
    if !config.llm.persist_history {
        return Ok(Arc::new(MemoryChatStore::new()));
    }
    let db_path = Path::new(&config.general.data_dir).join("chat-history.db");
    let store = SqliteChatStore::open(&db_path)
        .await
        .change_context(AppError::Storage)?;
    Ok(Arc::new(store))
}

async fn build_gateway(config: &AppConfig) -> Result<AuditGateway, Report<AppError>> {
    let llm = GeminiClient::new(&config.llm).change_context(AppError::Llm)?;
    let store = open_store(config).await?;
    Ok(AuditGateway::new(
        Arc::new(llm),
        store,
        config.llm.history_turns,
    ))
}

async fn ask_streaming(
    gateway: &AuditGateway,
    snapshot: &MetricsSnapshot,
    question: &str,
) -> Result<(), Report<AppError>> {
    let cancel = cancel_on_ctrl_c();
    let (tx, mut rx) = mpsc::channel(32);

    let (reply, printed) = tokio::join!(gateway.ask_stream(snapshot, question, tx, cancel), async {
        let mut stdout = std::io::stdout();
        while let Some(chunk) = rx.recv().await {
            match chunk {
                ChatChunk::Text(text) => {
                    write!(stdout, "{text}").change_context(AppError::Output)?;
                    stdout.flush().change_context(AppError::Output)?;
                }
                ChatChunk::End => writeln!(stdout).change_context(AppError::Output)?,
                ChatChunk::Error(message) => {
                    writeln!(stdout, "{message}").change_context(AppError::Output)?
                }
            }
        }
        Ok::<(), Report<AppError>>(())
    });
    printed?;

    if let Some(reply) = reply {
        info!(id = %reply.id, "reply stored");
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Report<AppError>> {
    let json = serde_json::to_string_pretty(value).change_context(AppError::Output)?;
    println!("{json}");
    Ok(())
}
