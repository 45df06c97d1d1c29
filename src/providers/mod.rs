//! LLM provider implementations and the transport seam the
//! orchestrator dispatches through

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::request::PromptPair;
use crate::BackendDescriptor;

pub mod groq;

// Re-export for convenience
pub use groq::{GroqClient, GroqFactory};

/// Raw model reply before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCompletion
{   pub text: String
  , /// Provider usage block, passed through untouched
    pub token_usage: Option<serde_json::Map<String, serde_json::Value>>
}

impl RawCompletion
{   pub fn text(text: impl Into<String>) -> Self
    {   RawCompletion
        {   text: text.into()
          , token_usage: None
        }
    }
}

/// A connection to one backend.
#[async_trait]
pub trait Transport: Send + Sync
{   async fn dispatch(
      &self
    , prompt: &PromptPair
    ) -> Result<RawCompletion, TransportError>;
}

/// Builds the transport bound to a backend. The registry caches the
/// result for the current backend and drops it on rotation.
pub trait TransportFactory: Send + Sync
{   fn connect(
      &self
    , backend: &BackendDescriptor
    ) -> Result<Arc<dyn Transport>, TransportError>;
}
