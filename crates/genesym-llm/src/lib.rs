//! LLM Client implementation
//!
//! Provides an OpenAI-compatible chat-completion client. The same client
//! works against Azure or any other endpoint that speaks the
//! `/chat/completions` protocol when `base_url` is overridden.
//!
//! Author: hephaex@gmail.com

use std::time::Duration;

use async_trait::async_trait;
use genesym_core::{ChatMessage, GenesymError, LlmClient, LlmConfig, Result, RetryPolicy};
use reqwest::Client;
use serde::{Deserialize, Serialize};

// ============================================================================
// OpenAI Client
// ============================================================================

/// OpenAI API client
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiClient {
    /// Create a new OpenAI client with API-default sampling
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            max_tokens: None,
            temperature: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| {
                GenesymError::ConfigError(
                    "OpenAI API key required (set OPENAI_API_KEY)".to_string(),
                )
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenesymError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    /// Set custom base URL (for Azure or compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn request<'a>(&'a self, messages: &'a [ChatMessage]) -> OpenAiRequest<'a> {
        OpenAiRequest {
            model: &self.model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: false,
        }
    }

    async fn send_once(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request(messages))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenesymError::LlmStatus {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(map_transport_error)?;
        first_choice_content(&body)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let answer = self
            .retry
            .run("LLM chat completion", move || self.send_once(messages))
            .await?;
        tracing::debug!("LLM response received: {} chars", answer.len());
        Ok(answer)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Extract the first completion's message text from a response body
fn first_choice_content(body: &str) -> Result<String> {
    let parsed: OpenAiResponse = serde_json::from_str(body)
        .map_err(|e| GenesymError::LlmError(format!("Failed to parse response: {e}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content.unwrap_or_default())
        .ok_or_else(|| GenesymError::LlmError("No response generated".to_string()))
}

fn map_transport_error(e: reqwest::Error) -> GenesymError {
    if e.is_timeout() {
        GenesymError::Timeout(format!("LLM request: {e}"))
    } else {
        GenesymError::Transport(format!("LLM request failed: {e}"))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const SCA12_COMPLETION: &str =
        r#"{"choices": [{"index": 0, "message": {"role": "assistant", "content": "SCA12"}}]}"#;

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
        }
    }

    /// Answer one connection per canned `(status, body)` pair, in order,
    /// and return the raw requests received
    async fn serve_sequence(
        responses: Vec<(&'static str, &'static str)>,
    ) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut socket).await);

                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
            requests
        });

        (format!("http://{addr}/v1"), handle)
    }

    /// Read headers plus a `Content-Length` body
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut request: Vec<u8> = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + body_len {
                    break;
                }
            }
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        String::from_utf8_lossy(&request).to_string()
    }

    fn messages() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("sys"),
            ChatMessage::user("Caused by mutation in SCA12 gene."),
        ]
    }

    #[tokio::test]
    async fn test_chat_posts_with_bearer_auth() {
        let (base_url, server) = serve_sequence(vec![("200 OK", SCA12_COMPLETION)]).await;
        let client = OpenAiClient::new("sk-test", "gpt-4-turbo")
            .with_base_url(base_url)
            .with_retry(RetryPolicy::none());

        let answer = client.chat(&messages()).await.unwrap();
        assert_eq!(answer, "SCA12");

        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("POST /v1/chat/completions HTTP/1.1"));
        assert!(requests[0]
            .to_lowercase()
            .contains("authorization: bearer sk-test"));
        assert!(requests[0].contains(r#""model":"gpt-4-turbo""#));
        assert!(requests[0].contains("Caused by mutation in SCA12 gene."));
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let (base_url, server) =
            serve_sequence(vec![("401 Unauthorized", r#"{"error": "bad key"}"#)]).await;
        let client = OpenAiClient::new("sk-wrong", "gpt-4-turbo")
            .with_base_url(base_url)
            .with_retry(fast_retry(2));

        // a retry would hit the closed listener and surface as a transport error
        let err = client.chat(&messages()).await.unwrap_err();
        assert!(matches!(err, GenesymError::LlmStatus { status: 401, .. }));
        assert!(!err.is_transient());
        assert_eq!(server.await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_service_unavailable_is_retried() {
        let (base_url, server) = serve_sequence(vec![
            ("503 Service Unavailable", r#"{"error": "overloaded"}"#),
            ("429 Too Many Requests", r#"{"error": "slow down"}"#),
            ("200 OK", SCA12_COMPLETION),
        ])
        .await;
        let client = OpenAiClient::new("sk-test", "gpt-4-turbo")
            .with_base_url(base_url)
            .with_retry(fast_retry(2));

        let answer = client.chat(&messages()).await.unwrap();
        assert_eq!(answer, "SCA12");
        assert_eq!(server.await.unwrap().len(), 3);
    }

    #[test]
    fn test_openai_client_creation() {
        let client = OpenAiClient::new("test-key", "gpt-4-turbo")
            .with_base_url("http://localhost:8080/v1/");
        assert_eq!(client.model(), "gpt-4-turbo");
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = LlmConfig::default();
        let err = OpenAiClient::from_config(&config).err().unwrap();
        assert!(matches!(err, GenesymError::ConfigError(_)));

        let config = LlmConfig {
            openai_api_key: Some("sk-test".to_string()),
            temperature: Some(0.0),
            ..LlmConfig::default()
        };
        let client = OpenAiClient::from_config(&config).unwrap();
        assert_eq!(client.temperature, Some(0.0));
        assert_eq!(client.retry.max_retries, config.retry.max_retries);
    }

    #[test]
    fn test_request_omits_unset_sampling() {
        let client = OpenAiClient::new("k", "gpt-4-turbo");
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hi")];
        let json = serde_json::to_value(client.request(&messages)).unwrap();

        assert_eq!(json["model"], "gpt-4-turbo");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_first_choice_content() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "SCA12"}, "finish_reason": "stop"},
                {"index": 1, "message": {"role": "assistant", "content": "ignored"}, "finish_reason": "stop"}
            ]
        }"#;
        assert_eq!(first_choice_content(body).unwrap(), "SCA12");

        let empty = r#"{"choices": []}"#;
        assert!(matches!(
            first_choice_content(empty),
            Err(GenesymError::LlmError(_))
        ));

        assert!(first_choice_content("not json").is_err());
    }
}
