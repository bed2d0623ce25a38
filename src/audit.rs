pub mod prompt;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::frame::IndicatorFrame;
use crate::history::ChatStore;
use crate::llm::{ChatChunk, LlmProvider};
use crate::model::{AuditVerdict, ChatMessage, MarketStructure, Role, TrendState};
use crate::strategy::structure::market_structure;
use crate::strategy::trend_state;

/// Reply shown in place of an answer when the model cannot be reached.
pub const CHAT_ERROR_REPLY: &str = "AI connection failed. Please try again.";
const RECENT_CLOSES: usize = 5;

/// Latest metrics of one symbol, handed to the language model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub symbol: String,
    pub price: f64,
    pub rsi: Option<f64>,
    pub volume_x: Option<f64>,
    pub trend: TrendState,
    pub structure: MarketStructure,
    pub recent_closes: Vec<f64>,
}

impl MetricsSnapshot {
    /// Snapshot of the last row; `None` for an empty frame.
    pub fn from_frame(symbol: &str, frame: &IndicatorFrame) -> Option<Self> {
        let last = frame.last()?;
        let bars: Vec<_> = frame.bars().cloned().collect();
        let recent_closes = bars[bars.len().saturating_sub(RECENT_CLOSES)..]
            .iter()
            .map(|b| b.close)
            .collect();

        Some(Self {
            symbol: symbol.to_owned(),
            price: last.bar.close,
            rsi: last.rsi,
            volume_x: last
                .avg_volume
                .filter(|avg| *avg > 0.0)
                .map(|avg| last.bar.volume / avg),
            trend: trend_state(last),
            structure: market_structure(&bars),
            recent_closes,
        })
    }
}

/// Drop markdown code fences and any prose around the outermost JSON object.
pub fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim(),
    }
}

pub fn parse_verdict(reply: &str) -> Result<AuditVerdict, serde_json::Error> {
    serde_json::from_str(strip_code_fences(reply))
}

/// Adapter between a symbol's metrics, the language model and chat history.
///
/// Model and storage failures never escape: audits degrade to an `ERROR`
/// verdict and chat to a visible error reply.
pub struct AuditGateway {
    llm: Arc<dyn LlmProvider>,
    store: Arc<dyn ChatStore>,
    history_turns: usize,
}

impl AuditGateway {
    pub fn new(llm: Arc<dyn LlmProvider>, store: Arc<dyn ChatStore>, history_turns: usize) -> Self {
        Self {
            llm,
            store,
            history_turns,
        }
    }

    pub async fn audit(&self, snapshot: &MetricsSnapshot) -> AuditVerdict {
        let prompt = prompt::audit_prompt(snapshot);

        let reply = match self.llm.complete(&prompt).await {
            Ok(reply) => reply,
            Err(report) => {
                warn!(symbol = %snapshot.symbol, error = ?report, "audit request failed");
                return AuditVerdict::error();
            }
        };

        match parse_verdict(&reply) {
            Ok(verdict) => {
                info!(symbol = %snapshot.symbol, verdict = %verdict.verdict, "audit complete");
                verdict
            }
            Err(e) => {
                warn!(symbol = %snapshot.symbol, error = %e, reply = %reply, "unparseable audit reply");
                AuditVerdict::error()
            }
        }
    }

    /// Answer `question` in one piece.
    pub async fn ask(&self, snapshot: &MetricsSnapshot, question: &str) -> ChatMessage {
        let prompt = self.begin_turn(snapshot, question).await;

        match self.llm.complete(&prompt).await {
            Ok(reply) => self.finish_turn(&snapshot.symbol, reply).await,
            Err(report) => {
                warn!(symbol = %snapshot.symbol, error = ?report, "chat request failed");
                ChatMessage::new(&snapshot.symbol, Role::Assistant, CHAT_ERROR_REPLY)
            }
        }
    }

    /// Answer `question` as a stream of chunks terminated by `End` or `Error`.
    ///
    /// Returns the stored reply, or `None` when nothing was produced.
    pub async fn ask_stream(
        &self,
        snapshot: &MetricsSnapshot,
        question: &str,
        tx: mpsc::Sender<ChatChunk>,
        cancel: CancellationToken,
    ) -> Option<ChatMessage> {
        let prompt = self.begin_turn(snapshot, question).await;

        match self.llm.stream(&prompt, tx.clone(), cancel).await {
            Ok(reply) => {
                let _ = tx.send(ChatChunk::End).await;
                if reply.trim().is_empty() {
                    return None;
                }
                Some(self.finish_turn(&snapshot.symbol, reply).await)
            }
            Err(report) => {
                warn!(symbol = %snapshot.symbol, error = ?report, "chat stream failed");
                let _ = tx.send(ChatChunk::Error(CHAT_ERROR_REPLY.to_owned())).await;
                None
            }
        }
    }

    /// Build the prompt from prior history, then record the question.
    async fn begin_turn(&self, snapshot: &MetricsSnapshot, question: &str) -> String {
        let history = match self.store.messages(&snapshot.symbol, self.history_turns).await {
            Ok(history) => history,
            Err(report) => {
                warn!(symbol = %snapshot.symbol, error = ?report, "failed to load chat history");
                Vec::new()
            }
        };
        let prompt = prompt::chat_prompt(snapshot, &history, question);

        let message = ChatMessage::new(&snapshot.symbol, Role::User, question);
        if let Err(report) = self.store.append(&message).await {
            warn!(symbol = %snapshot.symbol, error = ?report, "failed to store question");
        }
        prompt
    }

    async fn finish_turn(&self, symbol: &str, reply: String) -> ChatMessage {
        let message = ChatMessage::new(symbol, Role::Assistant, reply);
        if let Err(report) = self.store.append(&message).await {
            warn!(symbol, error = ?report, "failed to store reply");
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use error_stack::Report;
    use futures::future::BoxFuture;

    use super::*;
    use crate::error::LlmError;
    use crate::frame::{FrameRow, IndicatorSettings};
    use crate::history::memory::MemoryChatStore;
    use crate::indicator::test_support::bars_from_closes;
    use crate::model::Verdict;
    use crate::series::PriceSeries;

    /// Replies with a canned text split into words, or fails.
    struct FakeLlm {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeLlm {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_owned()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn result(&self, prompt: &str) -> Result<String, Report<LlmError>> {
            self.prompts.lock().unwrap().push(prompt.to_owned());
            self.reply.clone().ok_or_else(|| {
                Report::new(LlmError::Request {
                    provider: "fake".into(),
                })
            })
        }
    }

    impl LlmProvider for FakeLlm {
        fn name(&self) -> &str {
            "fake"
        }

        fn complete(&self, prompt: &str) -> BoxFuture<'_, Result<String, Report<LlmError>>> {
            let result = self.result(prompt);
            Box::pin(async move { result })
        }

        fn stream(
            &self,
            prompt: &str,
            tx: mpsc::Sender<ChatChunk>,
            _cancel: CancellationToken,
        ) -> BoxFuture<'_, Result<String, Report<LlmError>>> {
            let result = self.result(prompt);
            Box::pin(async move {
                let reply = result?;
                for word in reply.split_inclusive(' ') {
                    let _ = tx.send(ChatChunk::Text(word.to_owned())).await;
                }
                Ok(reply)
            })
        }
    }

    fn snapshot() -> MetricsSnapshot {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let series = PriceSeries::from_raw(bars_from_closes(&closes));
        let frame = IndicatorFrame::compute(&series, &IndicatorSettings::default()).unwrap();
        MetricsSnapshot::from_frame("TCS.NS", &frame).unwrap()
    }

    fn build_gateway(llm: FakeLlm) -> (AuditGateway, Arc<FakeLlm>, Arc<MemoryChatStore>) {
        let llm = Arc::new(llm);
        let store = Arc::new(MemoryChatStore::new());
        let gateway = AuditGateway::new(llm.clone(), store.clone(), 4);
        (gateway, llm, store)
    }

    #[test]
    fn snapshot_uses_last_row() {
        let snapshot = snapshot();
        assert_eq!(snapshot.price, 159.0);
        assert_eq!(snapshot.recent_closes, vec![155.0, 156.0, 157.0, 158.0, 159.0]);
        assert_eq!(snapshot.volume_x, Some(1.0));
        assert_eq!(snapshot.trend, TrendState::Unknown);
        assert_eq!(snapshot.structure, MarketStructure::Bullish);
    }

    #[test]
    fn snapshot_of_empty_frame_is_none() {
        assert!(MetricsSnapshot::from_frame("X", &IndicatorFrame::from_rows(Vec::new())).is_none());
        let single = IndicatorFrame::from_rows(vec![FrameRow::bare(bars_from_closes(&[5.0]).remove(0))]);
        assert_eq!(MetricsSnapshot::from_frame("X", &single).unwrap().rsi, None);
    }

    #[test]
    fn fences_and_prose_are_stripped() {
        let reply = "Here you go:\n```json\n{\"verdict\":\"WAIT\"}\n```";
        assert_eq!(strip_code_fences(reply), "{\"verdict\":\"WAIT\"}");
        assert_eq!(strip_code_fences("```\nplain\n```"), "plain");
    }

    #[tokio::test]
    async fn audit_parses_fenced_verdict() {
        let (gateway, llm, _) = build_gateway(FakeLlm::replying(
            "```json\n{\"verdict\": \"STRONG BUY\", \"reason\": \"Tight base.\", \
             \"stopLoss\": \"₹148\", \"target\": 185.5}\n```",
        ));
        let verdict = gateway.audit(&snapshot()).await;
        assert_eq!(verdict.verdict, Verdict::StrongBuy);
        assert_eq!(verdict.stop_loss, 148.0);
        assert_eq!(verdict.target, 185.5);
        assert!(llm.prompts.lock().unwrap()[0].contains("TCS.NS"));
    }

    #[tokio::test]
    async fn audit_degrades_to_error_verdict() {
        let (gateway, _, _) = build_gateway(FakeLlm::failing());
        assert_eq!(gateway.audit(&snapshot()).await, AuditVerdict::error());

        let (gateway, _, _) = build_gateway(FakeLlm::replying("I think it looks fine"));
        assert_eq!(gateway.audit(&snapshot()).await.verdict, Verdict::Error);
    }

    #[tokio::test]
    async fn ask_records_both_turns_and_feeds_history_back() {
        let (gateway, llm, store) = build_gateway(FakeLlm::replying("Hold above 150."));
        let snapshot = snapshot();

        let reply = gateway.ask(&snapshot, "Where is support?").await;
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.content, "Hold above 150.");

        gateway.ask(&snapshot, "And resistance?").await;
        let prompts = llm.prompts.lock().unwrap();
        assert!(!prompts[0].contains("CONVERSATION"));
        assert!(prompts[1].contains("User: Where is support?"));
        assert!(prompts[1].contains("Assistant: Hold above 150."));
        drop(prompts);

        let history = store.messages("TCS.NS", 10).await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "Where is support?");
    }

    #[tokio::test]
    async fn ask_failure_is_a_visible_unstored_reply() {
        let (gateway, _, store) = build_gateway(FakeLlm::failing());
        let reply = gateway.ask(&snapshot(), "Buy?").await;
        assert_eq!(reply.content, CHAT_ERROR_REPLY);

        let history = store.messages("TCS.NS", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
    }

    #[tokio::test]
    async fn ask_stream_delivers_chunks_then_end() {
        let (gateway, _, store) = build_gateway(FakeLlm::replying("Momentum is intact."));
        let snapshot = snapshot();
        let (tx, mut rx) = mpsc::channel(8);

        let (reply, chunks) = tokio::join!(
            gateway.ask_stream(&snapshot, "Trend?", tx, CancellationToken::new()),
            async {
                let mut chunks = Vec::new();
                while let Some(chunk) = rx.recv().await {
                    chunks.push(chunk);
                }
                chunks
            }
        );

        let text: String = chunks
            .iter()
            .filter_map(|c| match c {
                ChatChunk::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Momentum is intact.");
        assert_eq!(chunks.last(), Some(&ChatChunk::End));
        assert_eq!(reply.unwrap().content, "Momentum is intact.");
        assert_eq!(store.messages("TCS.NS", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn ask_stream_failure_ends_with_error_chunk() {
        let (gateway, _, _) = build_gateway(FakeLlm::failing());
        let (tx, mut rx) = mpsc::channel(8);

        let reply = gateway
            .ask_stream(&snapshot(), "Trend?", tx, CancellationToken::new())
            .await;
        assert!(reply.is_none());
        assert_eq!(
            rx.recv().await,
            Some(ChatChunk::Error(CHAT_ERROR_REPLY.to_owned()))
        );
        assert_eq!(rx.recv().await, None);
    }
}
