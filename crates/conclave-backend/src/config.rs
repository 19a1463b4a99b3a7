use serde::{Deserialize, Serialize};

/// Wire dialect and default endpoint of a model server.
///
/// All supported providers speak the OpenAI chat-completions API; they only
/// differ in their default base URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    OpenAi,
    /// Self-hosted vLLM server.
    Vllm,
    /// Local Ollama daemon (OpenAI-compatible endpoint).
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Identifier referenced by routes and reported as `model_used`.
    pub id: String,
    pub provider: BackendProvider,
    pub model_id: String,
    #[serde(default)]
    pub api_key: String,
    pub api_base_url: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Ceiling on concurrent calls to this endpoint.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Request SSE streaming and collect the chunks as fragments.
    #[serde(default)]
    pub stream: bool,
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_max_concurrency() -> usize {
    4
}

fn default_health_path() -> String {
    "/health".to_string()
}

impl BackendConfig {
    pub fn new(id: impl Into<String>, provider: BackendProvider, model_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider,
            model_id: model_id.into(),
            api_key: String::new(),
            api_base_url: None,
            timeout_ms: default_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            stream: false,
            health_path: default_health_path(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url.trim_end_matches('/')
        } else {
            match self.provider {
                BackendProvider::OpenAi => "https://api.openai.com",
                BackendProvider::Vllm => "http://127.0.0.1:8000",
                BackendProvider::Ollama => "http://127.0.0.1:11434",
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_from_toml_like_json() {
        let cfg: BackendConfig = serde_json::from_str(
            r#"{"id":"general-8b","provider":"vllm","model_id":"llama3-8b","api_base_url":null}"#,
        )
        .unwrap();
        assert_eq!(cfg.timeout_ms, 60_000);
        assert_eq!(cfg.max_concurrency, 4);
        assert!(!cfg.stream);
        assert_eq!(cfg.health_path, "/health");
        assert_eq!(cfg.base_url(), "http://127.0.0.1:8000");
    }

    #[test]
    fn base_url_override_strips_trailing_slash() {
        let cfg = BackendConfig::new("x", BackendProvider::OpenAi, "gpt")
            .with_base_url("http://gpu-3:9000/");
        assert_eq!(cfg.base_url(), "http://gpu-3:9000");
    }
}
