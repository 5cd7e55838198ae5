//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};
use websearch_shared::{LlmConfig, Result, WebSearchError};

use crate::llm::{Completion, LLM_REQUEST_FAILED, LanguageModel, OutputSchema, unavailable_message};

/// Client for `POST {base_url}/chat/completions`.
///
/// Without an API key every call degrades immediately and no request is sent.
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    auth: Option<HeaderValue>,
    api_key_env: String,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WebSearchError::Network(format!("failed to build LLM client: {e}")))?;

        let auth = match api_key {
            Some(key) => {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", key.trim()))
                    .map_err(|_| WebSearchError::config("API key contains invalid characters"))?;
                value.set_sensitive(true);
                Some(value)
            }
            None => {
                warn!(env = %config.api_key_env, "LLM client has no API key; calls will degrade");
                None
            }
        };

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            auth,
            api_key_env: config.api_key_env.clone(),
        })
    }

    /// Send one chat request and return the assistant message content.
    async fn complete(
        &self,
        auth: &HeaderValue,
        prompt: &str,
        max_tokens: u32,
        response_format: Option<ResponseFormat<'_>>,
    ) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            response_format,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(AUTHORIZATION, auth.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| WebSearchError::Network(format!("LLM request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(WebSearchError::Provider(format!(
                "HTTP {status}: {}",
                truncate_for_log(&text)
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| WebSearchError::parse(format!("invalid LLM response body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| WebSearchError::Provider("response contained no choices".into()))
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.model, max_tokens = max_tokens))]
    async fn call_text(&self, prompt: &str, max_tokens: u32) -> Completion {
        let Some(auth) = &self.auth else {
            warn!("LLM unavailable");
            return Completion::Degraded(unavailable_message(&self.api_key_env));
        };

        match self.complete(auth, prompt, max_tokens, None).await {
            Ok(text) => {
                debug!(chars = text.len(), "LLM call successful");
                Completion::Text(text.trim().to_string())
            }
            Err(e) => {
                warn!(error = %e, "LLM call failed");
                Completion::Degraded(LLM_REQUEST_FAILED.to_string())
            }
        }
    }

    #[instrument(skip_all, fields(model = %self.model, schema = %schema.name, max_tokens = max_tokens))]
    async fn call_structured(
        &self,
        prompt: &str,
        schema: &OutputSchema,
        max_tokens: u32,
    ) -> Option<Value> {
        let Some(auth) = &self.auth else {
            warn!("LLM unavailable");
            return None;
        };

        let format = ResponseFormat {
            kind: "json_schema",
            json_schema: JsonSchemaFormat {
                name: &schema.name,
                schema: &schema.schema,
                strict: true,
            },
        };

        let content = match self.complete(auth, prompt, max_tokens, Some(format)).await {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "structured LLM call failed");
                return None;
            }
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(value) => {
                debug!("LLM structured call successful");
                Some(value)
            }
            Err(e) => {
                warn!(error = %e, "structured output is not valid JSON");
                None
            }
        }
    }
}

fn truncate_for_log(text: &str) -> String {
    text.chars().take(200).collect()
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> LlmConfig {
        LlmConfig {
            base_url: format!("{}/v1", server.uri()),
            timeout_secs: 5,
            ..LlmConfig::default()
        }
    }

    fn chat_reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        }))
    }

    #[tokio::test]
    async fn test_call_text_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4.1-nano",
                "max_tokens": 100,
                "messages": [{ "role": "user", "content": "Rate this" }]
            })))
            .respond_with(chat_reply("  4\n"))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config(&server), Some("sk-test".into())).unwrap();
        let completion = client.call_text("Rate this", 100).await;
        assert_eq!(completion, Completion::Text("4".into()));
    }

    #[tokio::test]
    async fn test_call_text_http_error_degrades() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config(&server), Some("sk-test".into())).unwrap();
        let completion = client.call_text("hello", 10).await;
        assert_eq!(completion, Completion::Degraded(LLM_REQUEST_FAILED.into()));
    }

    #[tokio::test]
    async fn test_call_text_malformed_body_degrades() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config(&server), Some("sk-test".into())).unwrap();
        assert!(client.call_text("hello", 10).await.is_degraded());
    }

    #[tokio::test]
    async fn test_complete_errors_are_typed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "max_tokens": 1 })))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "max_tokens": 2 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "max_tokens": 3 })))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config(&server), Some("sk-test".into())).unwrap();
        let auth = client.auth.clone().unwrap();

        let err = client.complete(&auth, "hi", 1, None).await.unwrap_err();
        assert!(matches!(&err, WebSearchError::Provider(msg) if msg.contains("429")));

        let err = client.complete(&auth, "hi", 2, None).await.unwrap_err();
        assert!(matches!(&err, WebSearchError::Provider(msg) if msg.contains("no choices")));

        let err = client.complete(&auth, "hi", 3, None).await.unwrap_err();
        assert!(matches!(err, WebSearchError::Parse { .. }));

        let unreachable = LlmConfig {
            base_url: "http://127.0.0.1:9/v1".into(),
            timeout_secs: 2,
            ..LlmConfig::default()
        };
        let client = OpenAiClient::new(&unreachable, Some("sk-test".into())).unwrap();
        let err = client.complete(&auth, "hi", 1, None).await.unwrap_err();
        assert!(matches!(err, WebSearchError::Network(_)));
    }

    #[tokio::test]
    async fn test_missing_key_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(chat_reply("unused"))
            .expect(0)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config(&server), None).unwrap();
        let completion = client.call_text("hello", 10).await;
        assert_eq!(
            completion,
            Completion::Degraded("LLM unavailable (missing OPENAI_API_KEY).".into())
        );

        let schema = OutputSchema::new("s", json!({ "type": "object" }));
        assert!(client.call_structured("hello", &schema, 10).await.is_none());
    }

    #[tokio::test]
    async fn test_call_structured_parses_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "response_format": {
                    "type": "json_schema",
                    "json_schema": { "name": "expanded_queries", "strict": true }
                }
            })))
            .respond_with(chat_reply(r#"{"queries":["a","b"]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config(&server), Some("sk-test".into())).unwrap();
        let schema = OutputSchema::new(
            "expanded_queries",
            websearch_shared::ExpandedQueries::json_schema(),
        );
        let value = client.call_structured("expand", &schema, 512).await.unwrap();
        assert_eq!(value, json!({ "queries": ["a", "b"] }));
    }

    #[tokio::test]
    async fn test_call_structured_invalid_json_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(chat_reply("Sure! Here are some queries: a, b"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config(&server), Some("sk-test".into())).unwrap();
        let schema = OutputSchema::new("s", json!({ "type": "object" }));
        assert!(client.call_structured("expand", &schema, 512).await.is_none());
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let config = LlmConfig {
            base_url: "https://api.example.com/v1/".into(),
            ..LlmConfig::default()
        };
        let client = OpenAiClient::new(&config, None).unwrap();
        assert_eq!(client.endpoint, "https://api.example.com/v1/chat/completions");
    }
}
