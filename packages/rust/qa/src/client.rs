//! Model endpoint client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use chorekit_shared::{ChoreError, QaConfig, Result, RetryPolicy, with_retry};

/// User-Agent string for model requests.
const USER_AGENT: &str = concat!("chorekit/", env!("CARGO_PKG_VERSION"));

/// Answers a single question.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Return the model's answer text for `question`.
    async fn answer(&self, question: &str) -> Result<String>;

    /// Fail fast when the model cannot be reached at all.
    async fn preflight(&self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

// ---------------------------------------------------------------------------
// ChatClient
// ---------------------------------------------------------------------------

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct ChatClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    system_prompt: Option<String>,
    preflight: bool,
    retry: RetryPolicy,
}

impl ChatClient {
    /// Build a client from the `[qa]` config and the resolved API key.
    pub fn new(config: &QaConfig, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChoreError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            preflight: config.preflight,
            retry: RetryPolicy::with_retries(config.max_retries),
        })
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn messages(&self, question: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage {
                role: "system".into(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".into(),
            content: question.to_string(),
        });
        messages
    }

    async fn request_once(&self, question: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.endpoint);
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: self.messages(question),
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChoreError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChoreError::Http {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ChoreError::Network(format!("{url}: body read failed: {e}")))?;

        let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            ChoreError::parse(format!(
                "malformed model response: {e} (got: {})",
                body.chars().take(200).collect::<String>()
            ))
        })?;

        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default();

        if answer.is_empty() {
            return Err(ChoreError::parse("model returned an empty answer"));
        }

        debug!(chars = answer.len(), "received answer");
        Ok(answer)
    }
}

#[async_trait]
impl ModelClient for ChatClient {
    async fn answer(&self, question: &str) -> Result<String> {
        with_retry(&self.retry, "chat completion", || self.request_once(question)).await
    }

    /// Check that the endpoint answers at all. Any HTTP status counts;
    /// only connection-level failures are reported, as a config error.
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    async fn preflight(&self) -> Result<()> {
        if !self.preflight {
            debug!("endpoint check disabled");
            return Ok(());
        }
        match self.client.get(&self.endpoint).send().await {
            Ok(response) => {
                info!(status = response.status().as_u16(), "model endpoint reachable");
                Ok(())
            }
            Err(e) => Err(ChoreError::config(format!(
                "model endpoint {} is unreachable: {e}",
                self.endpoint
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> QaConfig {
        QaConfig {
            endpoint: format!("{}/v1/", server.uri()),
            model: "test-model".into(),
            system_prompt: Some("Answer briefly.".into()),
            timeout_secs: 5,
            ..QaConfig::default()
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn completion(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "cmpl-1",
            "model": "test-model",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": text }, "finish_reason": "stop" }
            ]
        })
    }

    #[tokio::test]
    async fn answer_sends_prompt_and_reads_first_choice() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "messages": [
                    { "role": "system", "content": "Answer briefly." },
                    { "role": "user", "content": "What is the capital of France?" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("  Paris \n")))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(&config_for(&server), "secret".into()).unwrap();
        let answer = client.answer("What is the capital of France?").await.unwrap();
        assert_eq!(answer, "Paris");
    }

    #[tokio::test]
    async fn transient_server_errors_are_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("42")))
            .mount(&server)
            .await;

        let client = ChatClient::new(&config_for(&server), "k".into())
            .unwrap()
            .with_retry_policy(fast_retry());
        assert_eq!(client.answer("meaning of life?").await.unwrap(), "42");
    }

    #[tokio::test]
    async fn client_errors_fail_without_retry() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = ChatClient::new(&config_for(&server), "bad".into())
            .unwrap()
            .with_retry_policy(fast_retry());
        let err = client.answer("hello?").await.unwrap_err();
        assert!(matches!(err, ChoreError::Http { status: 401, .. }));
    }

    #[tokio::test]
    async fn malformed_and_empty_responses_are_parse_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = ChatClient::new(&config_for(&server), "k".into())
            .unwrap()
            .with_retry_policy(fast_retry());

        let first = client.answer("q1").await.unwrap_err();
        assert!(matches!(first, ChoreError::Parse { .. }));
        assert!(first.to_string().contains("malformed"));

        let second = client.answer("q2").await.unwrap_err();
        assert!(second.to_string().contains("empty answer"));
    }

    #[tokio::test]
    async fn preflight_accepts_any_status_and_rejects_dead_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = ChatClient::new(&config_for(&server), "k".into()).unwrap();
        client.preflight().await.unwrap();

        // Bind then drop a listener to get a port nobody listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let dead = QaConfig {
            endpoint: format!("http://127.0.0.1:{port}/v1"),
            timeout_secs: 2,
            ..QaConfig::default()
        };
        let client = ChatClient::new(&dead, "k".into()).unwrap();
        let err = client.preflight().await.unwrap_err();
        assert!(matches!(err, ChoreError::Config { .. }));
    }

    #[tokio::test]
    async fn disabled_preflight_never_connects() {
        let config = QaConfig {
            endpoint: "http://127.0.0.1:9/v1".into(),
            preflight: false,
            ..QaConfig::default()
        };
        let client = ChatClient::new(&config, "k".into()).unwrap();
        client.preflight().await.unwrap();
    }
}
