use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opsai_core::ConversationEntry;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::warn;

use crate::extract::extract_json_object;
use crate::rotator::ModelRotator;

const DEFAULT_COOLDOWN: Duration = Duration::from_secs(600);

/// Operations the orchestrator needs from a chat-completion backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str, history: &[ConversationEntry]) -> Result<String>;

    async fn generate_json(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        history: &[ConversationEntry],
    ) -> Result<Option<Value>> {
        let content = self.generate(system_prompt, user_prompt, history).await?;
        Ok(extract_json_object(&content))
    }
}

/// OpenAI-compatible `/v1/chat/completions` client with comma-separated
/// model failover.
#[derive(Debug)]
pub struct ApiClient {
    base_url: String,
    api_key: String,
    timeout: Duration,
    max_tokens: u32,
    client: reqwest::Client,
    rotator: Mutex<ModelRotator>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, models_csv: &str, timeout_secs: u64, max_tokens: u32) -> Result<Self> {
        let models: Vec<String> = models_csv
            .split(',')
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        if models.is_empty() {
            bail!("at least one model is required for ApiClient");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(timeout_secs),
            max_tokens,
            client,
            rotator: Mutex::new(ModelRotator::new(models)),
        })
    }

    fn build_messages(&self, system_prompt: &str, user_prompt: &str, history: &[ConversationEntry]) -> Vec<Value> {
        let mut messages = vec![json!({"role": "system", "content": system_prompt})];

        for entry in history {
            if let Some(user_input) = &entry.user_input {
                messages.push(json!({"role": "user", "content": user_input}));
            }

            let mut assistant_content = entry.result.message.clone();
            if let Some(raw_output) = &entry.result.raw_output {
                let note = if raw_output.truncated { " [OUTPUT TRUNCATED]" } else { "" };
                assistant_content.push_str(&format!("\n\nRaw Output{note}:\n{}", raw_output.content));
            }
            messages.push(json!({"role": "assistant", "content": assistant_content}));
        }

        messages.push(json!({"role": "user", "content": user_prompt}));
        messages
    }
}

#[async_trait]
impl LlmClient for ApiClient {
    async fn generate(&self, system_prompt: &str, user_prompt: &str, history: &[ConversationEntry]) -> Result<String> {
        let messages = self.build_messages(system_prompt, user_prompt, history);

        loop {
            let model = {
                let mut rotator = self.rotator.lock().map_err(|_| anyhow!("model rotator poisoned"))?;
                if rotator.all_exhausted() {
                    bail!("all llm models are currently in cooldown");
                }
                rotator.next_available().to_string()
            };

            let url = format!("{}/chat/completions", self.base_url);
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .timeout(self.timeout)
                .json(&json!({
                    "model": model,
                    "messages": messages,
                    "max_tokens": self.max_tokens,
                    "temperature": 0.1,
                }))
                .send()
                .await
                .with_context(|| format!("llm request failed for model {model}"))?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .text()
                .await
                .with_context(|| format!("failed to read response body for model {model}"))?;

            if status.is_success() {
                return parse_completion_content(&body);
            }

            if is_rate_or_quota_error(status, &body) {
                let cooldown = parse_retry_after(&headers).unwrap_or(DEFAULT_COOLDOWN);
                let (has_next, next_model) = {
                    let mut rotator = self.rotator.lock().map_err(|_| anyhow!("model rotator poisoned"))?;
                    rotator.mark_exhausted(&model, cooldown);
                    let has_next = !rotator.all_exhausted();
                    let next_model = has_next.then(|| rotator.peek_next_available().to_string());
                    (has_next, next_model)
                };

                if has_next {
                    if let Some(new_model) = next_model {
                        warn!("llm failover: {} -> {} (cooldown {}s)", model, new_model, cooldown.as_secs());
                    }
                    continue;
                }

                bail!("all llm models exhausted after rate/quota limit; last model: {model}, status: {status}");
            }

            return Err(anyhow!("llm request failed for model {model}: status {status}, body {body}"));
        }
    }
}

fn is_rate_or_quota_error(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    let body_lower = body.to_ascii_lowercase();
    body_lower.contains("rate_limit") || body_lower.contains("quota") || body_lower.contains("insufficient_quota")
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let seconds = (retry_at - Utc::now()).num_seconds().max(0) as u64;
    Some(Duration::from_secs(seconds))
}

fn parse_completion_content(body: &str) -> Result<String> {
    let value: Value = serde_json::from_str(body).context("failed to parse completion response JSON")?;
    value
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("missing choices[0].message.content in completion response"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsai_core::{Instruction, RiskLevel, WorkerResult};
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retry_after_parsing_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_parse_completion_content() {
        let body = r#"{"choices": [{"message": {"content": "hello"}}]}"#;
        assert_eq!(parse_completion_content(body).unwrap(), "hello");
    }

    #[test]
    fn test_parse_completion_content_missing_field() {
        let body = r#"{"choices": []}"#;
        assert!(parse_completion_content(body).is_err());
    }

    #[test]
    fn test_build_messages_includes_raw_output_note() {
        let client = ApiClient::new("https://example.test/v1", "key", "gpt-4o-mini", 60, 2048).unwrap();
        let instruction = Instruction::new("shell", "run", RiskLevel::Low);
        let mut result = WorkerResult::ok("ran it");
        result.raw_output = Some(opsai_core::RawOutput {
            content: "stdout here".to_string(),
            truncated: true,
        });
        let entry = ConversationEntry::new(Some("do it".to_string()), instruction, result);

        let messages = client.build_messages("sys", "next", std::slice::from_ref(&entry));
        let assistant_message = messages.iter().find(|m| m["role"] == "assistant").unwrap();
        assert!(assistant_message["content"].as_str().unwrap().contains("[OUTPUT TRUNCATED]"));
    }
}
