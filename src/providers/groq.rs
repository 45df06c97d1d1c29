use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, trace};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::{Error, ErrorCategory, TransportError};
use crate::providers::{RawCompletion, Transport, TransportFactory};
use crate::request::PromptPair;
use crate::BackendDescriptor;

// ===== Message Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: String
  , pub content: String
}

#[derive(Debug, Clone, Serialize)]
pub struct GroqChatRequest
{   pub model: String
  , pub messages: Vec<ChatMessage>
  , pub temperature: f32
  , pub top_p: f32
  , #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>
  , pub stream: bool
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroqChatResponse
{   pub choices: Vec<Choice>
  , #[serde(default)]
    pub usage: Option<serde_json::Map<String, serde_json::Value>>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice
{   pub message: ResponseMessage
  , pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage
{   #[serde(default)]
    pub content: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorEnvelope
{   error: ErrorBody
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ErrorBody
{   #[serde(default)]
    message: String
  , #[serde(default)]
    code: Option<String>
}

// ===== Classification =====

/// Map an HTTP failure onto the closed category set. Total over
/// every status/code pair.
pub fn classify(status: u16, code: Option<&str>) -> ErrorCategory
{   match (status, code)
    {   (_, Some("rate_limit_exceeded")) | (429, _) => {
          ErrorCategory::RateLimited
        }
      , (_, Some("model_decommissioned")) | (_, Some("model_not_found")) => {
          ErrorCategory::Decommissioned
        }
      , (401, _) | (403, _) | (_, Some("invalid_api_key")) => {
          ErrorCategory::Unauthorized
        }
      , (408, _) => ErrorCategory::Timeout
      , (400..=499, _) => ErrorCategory::BadRequest
      , _ => ErrorCategory::Transport
    }
}

static RETRY_HINT: OnceLock<Regex> = OnceLock::new();

/// Parse "try again in 1m30.5s" / "try again in 7.2s" from a provider message.
pub fn retry_hint_from_message(message: &str) -> Option<Duration>
{   let re = RETRY_HINT.get_or_init(|| {
      Regex::new(r"(?i)try again in (?:(\d+)m)?(\d+(?:\.\d+)?)s")
        .expect("static pattern compiles")
    });
    let caps = re.captures(message)?;
    let minutes: f64 = caps
      .get(1)
      .and_then(|m| m.as_str().parse().ok())
      .unwrap_or(0.0);
    let seconds: f64 = caps.get(2)?.as_str().parse().ok()?;
    Duration::try_from_secs_f64(minutes * 60.0 + seconds).ok()
}

fn retry_hint_from_header(headers: &reqwest::header::HeaderMap) -> Option<Duration>
{   let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;
    let secs: f64 = raw.trim().parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

fn transport_failure(e: reqwest::Error) -> TransportError
{   let category = if e.is_timeout()
    {   ErrorCategory::Timeout
    } else
    {   ErrorCategory::Transport
    };
    TransportError::new(category, e.to_string())
}

// ===== Groq Client =====

/// OpenAI-compatible chat completion client bound to one model.
pub struct GroqClient
{   http_client: reqwest::Client
  , api_base: String
  , api_key: String
  , model: String
  , temperature: f32
  , top_p: f32
  , max_tokens: Option<usize>
}

impl GroqClient
{   pub fn new(
      http_client: reqwest::Client
    , config: &ProviderConfig
    , api_key: String
    , model: impl Into<String>
    ) -> Self
    {   let model = model.into();
        debug!("Creating GroqClient for {}", model);
        GroqClient
        {   http_client
          , api_base: config.api_base.trim_end_matches('/').to_string()
          , api_key
          , model
          , temperature: config.temperature
          , top_p: config.top_p
          , max_tokens: config.max_tokens
        }
    }

    pub fn model(&self) -> &str
    {   &self.model
    }

    fn build_request(&self, prompt: &PromptPair) -> GroqChatRequest
    {   GroqChatRequest
        {   model: self.model.clone()
          , messages: vec![
              ChatMessage
              {   role: "system".to_string()
                , content: prompt.system.clone()
              }
            , ChatMessage
              {   role: "user".to_string()
                , content: prompt.task.clone()
              }
            ]
          , temperature: self.temperature
          , top_p: self.top_p
          , max_tokens: self.max_tokens
          , stream: false
        }
    }
}

#[async_trait]
impl Transport for GroqClient
{   async fn dispatch(
      &self
    , prompt: &PromptPair
    ) -> Result<RawCompletion, TransportError>
    {   debug!("Dispatching to {}", self.model);
        let request = self.build_request(prompt);
        trace!("Groq request for {}: {} messages", self.model, request.messages.len());

        let response = self.http_client
          .post(format!("{}/chat/completions", self.api_base))
          .header("Authorization", format!("Bearer {}", self.api_key))
          .header("Content-Type", "application/json")
          .json(&request)
          .send()
          .await
          .map_err(|e| {
            error!("HTTP error from {}: {}", self.model, e);
            transport_failure(e)
          })?;

        let status = response.status();
        trace!("Groq response status: {}", status);

        if !status.is_success()
        {   let header_hint = retry_hint_from_header(response.headers());
            let error_text = response.text().await
              .unwrap_or_else(|_| "Unknown error".to_string());
            let body = serde_json::from_str::<ErrorEnvelope>(&error_text)
              .map(|e| e.error)
              .unwrap_or_else(|_| ErrorBody
              {   message: error_text.clone()
                , code: None
              });
            let category = classify(status.as_u16(), body.code.as_deref());
            let retry_after = header_hint
              .or_else(|| retry_hint_from_message(&body.message));
            error!(
              "Groq API error from {} ({}, {}): {}",
              self.model, status, category, body.message
            );
            return Err(
              TransportError::new(category, body.message)
                .with_retry_after(retry_after)
            );
        }

        let chat_response: GroqChatResponse
          = response.json().await.map_err(|e| {
            error!("Parse error: {}", e);
            TransportError::new(ErrorCategory::Transport, e.to_string())
          })?;

        let choice = chat_response.choices.first()
          .ok_or_else(|| {
            error!("No choices in response");
            TransportError::new(
              ErrorCategory::Transport,
              "API response contained no choices"
            )
          })?;
        if let Some(reason) = &choice.finish_reason
        {   trace!("{} finished with {}", self.model, reason);
        }

        Ok(RawCompletion
        {   text: choice.message.content.clone().unwrap_or_default()
          , token_usage: chat_response.usage
        })
    }
}

/// Builds one `GroqClient` per backend over a shared HTTP client.
pub struct GroqFactory
{   http_client: reqwest::Client
  , config: ProviderConfig
  , api_key: String
}

impl GroqFactory
{   pub fn new(config: ProviderConfig) -> Result<Self, Error>
    {   let api_key = config.resolve_api_key()?;
        let http_client = reqwest::Client::builder()
          .build()
          .map_err(|e| Error::Http(e.to_string()))?;
        Ok(GroqFactory { http_client, config, api_key })
    }
}

impl TransportFactory for GroqFactory
{   fn connect(
      &self
    , backend: &BackendDescriptor
    ) -> Result<Arc<dyn Transport>, TransportError>
    {   Ok(Arc::new(GroqClient::new(
          self.http_client.clone(),
          &self.config,
          self.api_key.clone(),
          backend.id.clone()
        )))
    }
}
