use super::{BackendClient, InvokeRequest, InvokeResponse};
use crate::config::BackendConfig;
use crate::fragments::ContentFragments;
use async_trait::async_trait;
use conclave_core::{ConclaveError, ConclaveResult};
use futures_util::StreamExt;
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible API backend.
///
/// Works with OpenAI, vLLM, Ollama and any other server that implements the
/// chat completions API. Connections are pooled per endpoint by the held
/// `reqwest::Client`.
pub struct HttpBackend {
    config: BackendConfig,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> ConclaveResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .pool_max_idle_per_host(config.max_concurrency.max(1))
            .build()
            .map_err(|e| {
                ConclaveError::Config(format!("failed to build HTTP client for '{}': {e}", config.id))
            })?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn build_messages(&self, request: &InvokeRequest) -> Vec<serde_json::Value> {
        let mut api_messages = Vec::with_capacity(2);
        if let Some(sys) = &request.system_prompt {
            api_messages.push(serde_json::json!({
                "role": "system",
                "content": sys
            }));
        }
        api_messages.push(serde_json::json!({
            "role": "user",
            "content": request.prompt
        }));
        api_messages
    }

    fn add_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Content-Type", "application/json");
        if self.config.api_key.is_empty() {
            request
        } else {
            request.header("Authorization", format!("Bearer {}", self.config.api_key))
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> ConclaveError {
        if e.is_timeout() {
            ConclaveError::BackendTimeout {
                backend: self.config.id.clone(),
                timeout_ms: self.config.timeout_ms,
            }
        } else {
            ConclaveError::Backend {
                backend: self.config.id.clone(),
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            }
        }
    }

    async fn collect_stream(&self, resp: reqwest::Response) -> ConclaveResult<InvokeResponse> {
        let mut stream = resp.bytes_stream();
        let mut decoder = SseDecoder::new(&self.config.id);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.transport_error(e))?;
            decoder.feed(&chunk)?;
        }
        decoder.finish()
    }
}

/// Incremental `text/event-stream` decoder for chat-completion chunks.
///
/// Bytes are buffered until a full line is available, so a UTF-8 sequence
/// split across network chunks is decoded intact.
struct SseDecoder<'a> {
    backend: &'a str,
    buffer: Vec<u8>,
    content: ContentFragments,
    usage_tokens: Option<u32>,
}

impl<'a> SseDecoder<'a> {
    fn new(backend: &'a str) -> Self {
        Self {
            backend,
            buffer: Vec::new(),
            content: ContentFragments::default(),
            usage_tokens: None,
        }
    }

    fn feed(&mut self, chunk: &[u8]) -> ConclaveResult<()> {
        self.buffer.extend_from_slice(chunk);
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            self.handle_line(&line[..line_end])?;
        }
        Ok(())
    }

    /// Flush a trailing line without newline and build the response.
    fn finish(mut self) -> ConclaveResult<InvokeResponse> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.handle_line(&rest)?;
        }
        // Servers that omit usage in streamed responses: one token per chunk.
        let tokens = self
            .usage_tokens
            .unwrap_or(self.content.fragment_count() as u32);
        Ok(InvokeResponse {
            content: self.content,
            tokens,
        })
    }

    fn handle_line(&mut self, raw: &[u8]) -> ConclaveResult<()> {
        let line = std::str::from_utf8(raw).map_err(|e| ConclaveError::Backend {
            backend: self.backend.to_string(),
            status: None,
            message: format!("stream line is not valid UTF-8: {e}"),
        })?;
        let Some(data) = line.trim().strip_prefix("data:").map(str::trim) else {
            return Ok(());
        };
        if data == "[DONE]" {
            return Ok(());
        }
        let Ok(event) = serde_json::from_str::<serde_json::Value>(data) else {
            return Ok(());
        };
        if let Some(delta) = event["choices"][0]["delta"]["content"].as_str() {
            if !delta.is_empty() {
                self.content.push(delta);
            }
        }
        if let Some(tokens) = event["usage"]["completion_tokens"].as_u64() {
            self.usage_tokens = Some(tokens as u32);
        }
        Ok(())
    }
}

#[async_trait]
impl BackendClient for HttpBackend {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn timeout(&self) -> Option<Duration> {
        Some(Duration::from_millis(self.config.timeout_ms))
    }

    async fn invoke(&self, request: &InvokeRequest) -> ConclaveResult<InvokeResponse> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());
        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": self.build_messages(request),
            "stream": self.config.stream,
        });

        debug!(backend = %self.config.id, url = %url, "Invoking backend");

        let resp = self
            .add_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ConclaveError::Backend {
                backend: self.config.id.clone(),
                status: Some(status.as_u16()),
                message: format!("{status}: {error_body}"),
            });
        }

        if self.config.stream {
            return self.collect_stream(resp).await;
        }

        let resp_body: serde_json::Value = resp.json().await.map_err(|e| self.transport_error(e))?;
        parse_completion(&self.config.id, &resp_body)
    }

    async fn health(&self) -> bool {
        let url = format!("{}{}", self.config.base_url(), self.config.health_path);
        match self.add_headers(self.http.get(&url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(backend = %self.config.id, error = %e, "Health check failed");
                false
            }
        }
    }
}

/// Extract content and token usage from a non-streaming completion body.
pub fn parse_completion(backend: &str, body: &serde_json::Value) -> ConclaveResult<InvokeResponse> {
    let Some(content) = body["choices"][0]["message"]["content"].as_str() else {
        return Err(ConclaveError::Backend {
            backend: backend.to_string(),
            status: None,
            message: format!("malformed completion: {body}"),
        });
    };
    let tokens = body["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32;
    Ok(InvokeResponse {
        content: ContentFragments::from_text(content),
        tokens,
    })
}
