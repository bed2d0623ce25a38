use std::time::Duration;

use error_stack::{Report, ResultExt};
use futures::StreamExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::llm::{ChatChunk, LlmProvider};

const PROVIDER_NAME: &str = "gemini";

/// Google Gemini REST client (`generateContent` / `streamGenerateContent`).
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key_env: String,
    /// Resolved from the environment at construction; requests fail without it.
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> Result<Self, Report<LlmError>> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .change_context(LlmError::Request {
                provider: PROVIDER_NAME.into(),
            })?;

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
            api_key,
        })
    }

    fn api_key(&self) -> Result<&str, Report<LlmError>> {
        self.api_key.as_deref().ok_or_else(|| {
            Report::new(LlmError::MissingApiKey {
                var: self.api_key_env.clone(),
            })
        })
    }

    async fn post(
        &self,
        method: &str,
        query: &[(&str, &str)],
        prompt: &str,
    ) -> Result<reqwest::Response, Report<LlmError>> {
        let api_key = self.api_key()?;
        let url = format!("{}/models/{}:{}", self.base_url, self.model, method);
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .query(query)
            .json(&body)
            .send()
            .await
            .change_context(LlmError::Request {
                provider: PROVIDER_NAME.into(),
            })
            .attach_with(|| format!("model: {}", self.model))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Report::new(LlmError::Request {
                provider: PROVIDER_NAME.into(),
            })
            .attach(format!("HTTP {status}"))
            .attach(detail));
        }

        Ok(response)
    }
}

impl LlmProvider for GeminiClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn complete(&self, prompt: &str) -> BoxFuture<'_, Result<String, Report<LlmError>>> {
        let prompt = prompt.to_owned();
        Box::pin(async move {
            let response = self.post("generateContent", &[], &prompt).await?;
            let reply: GenerateResponse =
                response
                    .json()
                    .await
                    .change_context(LlmError::ResponseParse {
                        provider: PROVIDER_NAME.into(),
                    })?;

            let text = reply.text();
            if text.trim().is_empty() {
                return Err(Report::new(LlmError::EmptyReply {
                    provider: PROVIDER_NAME.into(),
                }));
            }

            info!(model = %self.model, chars = text.len(), "gemini reply received");
            Ok(text)
        })
    }

    fn stream(
        &self,
        prompt: &str,
        tx: mpsc::Sender<ChatChunk>,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<String, Report<LlmError>>> {
        let prompt = prompt.to_owned();
        Box::pin(async move {
            let response = self
                .post("streamGenerateContent", &[("alt", "sse")], &prompt)
                .await?;

            let mut body = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut reply = String::new();

            let mut finished = false;
            while !finished {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(model = %self.model, "gemini stream cancelled");
                        return Ok(reply);
                    }
                    next = body.next() => next,
                };

                let payloads = match next {
                    Some(bytes) => {
                        let bytes = bytes.change_context(LlmError::Request {
                            provider: PROVIDER_NAME.into(),
                        })?;
                        buffer.extend_from_slice(&bytes);
                        drain_data_lines(&mut buffer)
                    }
                    None => {
                        finished = true;
                        flush_data_lines(&mut buffer)
                    }
                };

                for payload in payloads {
                    let text = parse_event(&payload)?;
                    if text.is_empty() {
                        continue;
                    }
                    reply.push_str(&text);
                    if tx.send(ChatChunk::Text(text)).await.is_err() {
                        debug!(model = %self.model, "stream receiver dropped");
                        return Ok(reply);
                    }
                }
            }

            if reply.trim().is_empty() {
                return Err(Report::new(LlmError::EmptyReply {
                    provider: PROVIDER_NAME.into(),
                }));
            }

            info!(model = %self.model, chars = reply.len(), "gemini stream complete");
            Ok(reply)
        })
    }
}

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text parts of the first candidate, concatenated.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Remove every complete line from `buffer` and return the SSE `data:` payloads.
///
/// A trailing partial line stays buffered until its newline arrives.
fn drain_data_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut payloads = Vec::new();
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&line);
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim_start();
            if !data.is_empty() {
                payloads.push(data.to_owned());
            }
        }
    }
    payloads
}

/// Drain `buffer` at end of stream, including a last line without its newline.
fn flush_data_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    if !buffer.is_empty() && !buffer.ends_with(b"\n") {
        buffer.push(b'\n');
    }
    drain_data_lines(buffer)
}

fn parse_event(payload: &str) -> Result<String, Report<LlmError>> {
    let event: GenerateResponse =
        serde_json::from_str(payload).change_context(LlmError::ResponseParse {
            provider: PROVIDER_NAME.into(),
        })?;
    Ok(event.text())
}
