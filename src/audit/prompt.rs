use std::fmt::Write;

use crate::audit::MetricsSnapshot;
use crate::model::{ChatMessage, Role};

fn or_na(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "n/a".to_owned(), |v| format!("{v:.decimals$}"))
}

fn technical_block(snapshot: &MetricsSnapshot) -> String {
    let closes: Vec<String> = snapshot
        .recent_closes
        .iter()
        .map(|c| format!("{c:.2}"))
        .collect();

    format!(
        "- Current Price: ₹{price:.2}\n\
         - RSI (14): {rsi} (momentum sweet spot 55-70, overbought above 75)\n\
         - Volume Spike: {volume_x}x average (conviction needs more than 1.5x)\n\
         - Trend: {trend}\n\
         - Market Structure: {structure}\n\
         - Recent Closes (last {n}): [{closes}]",
        price = snapshot.price,
        rsi = or_na(snapshot.rsi, 2),
        volume_x = or_na(snapshot.volume_x, 2),
        trend = snapshot.trend,
        structure = snapshot.structure,
        n = closes.len(),
        closes = closes.join(", "),
    )
}

/// Swing-trading audit request that asks for a strict JSON verdict.
pub fn audit_prompt(snapshot: &MetricsSnapshot) -> String {
    format!(
        "Act as a strict hedge fund manager trading the Indian stock market (NSE).\n\
         Review this swing trading setup for {symbol}.\n\n\
         ### TECHNICAL DATA\n\
         {technical}\n\n\
         ### YOUR JOB\n\
         Judge the setup against Mark Minervini's VCP (Volatility Contraction Pattern) \
         and momentum rules.\n\n\
         ### OUTPUT FORMAT (strict JSON)\n\
         Return ONLY a JSON object with these exact keys. Do not use markdown code blocks.\n\
         {{\n\
         \x20   \"verdict\": \"STRONG BUY\" or \"WAIT\" or \"AVOID\",\n\
         \x20   \"reason\": \"A sharp, professional 2-sentence analysis of the setup.\",\n\
         \x20   \"stopLoss\": suggested stop loss price (about 5-7% below current),\n\
         \x20   \"target\": suggested target price (about 15-20% above current)\n\
         }}",
        symbol = snapshot.symbol,
        technical = technical_block(snapshot),
    )
}

/// Free-text question about `snapshot`, preceded by the recent conversation.
pub fn chat_prompt(snapshot: &MetricsSnapshot, history: &[ChatMessage], question: &str) -> String {
    let mut prompt = format!(
        "You are a concise trading assistant for the Indian stock market (NSE). \
         Answer questions about {symbol} using the latest technical data below. \
         Do not invent numbers that are not given.\n\n\
         ### TECHNICAL DATA\n\
         {technical}\n",
        symbol = snapshot.symbol,
        technical = technical_block(snapshot),
    );

    if !history.is_empty() {
        prompt.push_str("\n### CONVERSATION SO FAR\n");
        for message in history {
            let speaker = match message.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            let _ = writeln!(prompt, "{speaker}: {}", message.content);
        }
    }

    let _ = write!(prompt, "\n### QUESTION\n{question}");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MarketStructure, TrendState};

    fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            symbol: "TCS.NS".into(),
            price: 3520.456,
            rsi: Some(61.237),
            volume_x: None,
            trend: TrendState::Uptrend,
            structure: MarketStructure::Bullish,
            recent_closes: vec![3500.0, 3510.5, 3520.456],
        }
    }

    #[test]
    fn audit_prompt_carries_metrics_and_format() {
        let prompt = audit_prompt(&snapshot());
        assert!(prompt.contains("TCS.NS"));
        assert!(prompt.contains("₹3520.46"));
        assert!(prompt.contains("RSI (14): 61.24"));
        assert!(prompt.contains("Volume Spike: n/a"));
        assert!(prompt.contains("[3500.00, 3510.50, 3520.46]"));
        assert!(prompt.contains("\"stopLoss\""));
        assert!(prompt.contains("    \"verdict\""));
    }

    #[test]
    fn chat_prompt_includes_history_then_question() {
        let history = vec![
            ChatMessage::new("TCS.NS", Role::User, "Entry?"),
            ChatMessage::new("TCS.NS", Role::Assistant, "Above 3530."),
        ];
        let prompt = chat_prompt(&snapshot(), &history, "And the stop?");
        let user = prompt.find("User: Entry?").unwrap();
        let assistant = prompt.find("Assistant: Above 3530.").unwrap();
        let question = prompt.find("And the stop?").unwrap();
        assert!(user < assistant && assistant < question);
    }

    #[test]
    fn chat_prompt_without_history_has_no_conversation_block() {
        let prompt = chat_prompt(&snapshot(), &[], "Why?");
        assert!(!prompt.contains("CONVERSATION"));
        assert!(prompt.ends_with("Why?"));
    }
}
