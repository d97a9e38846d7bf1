use std::time::Duration;

use anyhow::Context as _;

#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: chat_completions_endpoint(base_url),
            api_key,
            model,
        })
    }

    pub async fn complete_json(&self, prompt: &str) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.0,
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .context("read chat completion response body")?;
        if !status.is_success() {
            let message = parse_error_message(&raw).unwrap_or_else(|| raw.clone());
            anyhow::bail!("chat completion API error ({status}): {message}");
        }
        tracing::debug!(model = %self.model, bytes = raw.len(), "chat completion response");

        let value: serde_json::Value =
            serde_json::from_str(&raw).context("parse chat completion response")?;
        extract_message_content(&value).context("extract message content")
    }
}

pub fn chat_completions_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/chat/completions")
}

fn parse_error_message(raw_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw_json).ok()?;
    let message = value.get("error")?.get("message")?.as_str()?.to_owned();
    Some(message)
}

fn extract_message_content(value: &serde_json::Value) -> anyhow::Result<String> {
    // Some gateways report upstream failures with a 200 and an `error` object.
    if let Some(message) = value.pointer("/error/message").and_then(|v| v.as_str()) {
        anyhow::bail!("chat completion API error: {message}");
    }

    let content = value
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing `choices[0].message.content` in response"))?;

    if content.trim().is_empty() {
        anyhow::bail!("chat completion content is empty");
    }
    Ok(content.to_owned())
}
