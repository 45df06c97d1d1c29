//! Configuration for backends, the provider transport and the
//! regeneration budget

use std::path::Path;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::BackendDescriptor;

const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig
{   /// API base URL
    pub api_base: String
  , /// Explicit API key; takes precedence over `api_key_env`
    pub api_key: Option<String>
  , /// Environment variable holding the API key
    pub api_key_env: String
  , /// Sampling temperature
    pub temperature: f32
  , /// Nucleus sampling
    pub top_p: f32
  , /// Max tokens to generate; provider default when None
    pub max_tokens: Option<usize>
}

impl ProviderConfig
{   /// Resolve the API key from config, then the environment.
    pub fn resolve_api_key(&self) -> Result<String, Error>
    {   if let Some(key) = &self.api_key
        {   return Ok(key.clone());
        }
        std::env::var(&self.api_key_env)
          .map_err(|_| Error::MissingApiKey(self.api_key_env.clone()))
    }
}

impl Default for ProviderConfig
{   fn default() -> Self
    {   ProviderConfig
        {   api_base: GROQ_API_BASE.to_string()
          , api_key: None
          , api_key_env: "GROQ_API_KEY".to_string()
          , temperature: 0.0
          , top_p: 0.95
          , max_tokens: None
        }
    }
}

/// Regeneration configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegenerationConfig
{   /// Extra attempts after the first one
    pub max_retries: usize
  , /// Backoff multiplier between attempts
    pub backoff_multiplier: f32
  , /// Initial backoff duration in milliseconds; 0 disables backoff
    pub initial_backoff_ms: u64
}

impl Default for RegenerationConfig
{   fn default() -> Self
    {   RegenerationConfig
        {   max_retries: 1
          , backoff_multiplier: 2.0
          , initial_backoff_ms: 0
        }
    }
}

/// quizgen configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizgenConfig
{   /// Backends in initial preference order
    pub backends: Vec<BackendDescriptor>
  , pub provider: ProviderConfig
  , pub regeneration: RegenerationConfig
  , /// Deadline for a single dispatch, in seconds
    pub dispatch_timeout_secs: u64
}

impl Default for QuizgenConfig
{   fn default() -> Self
    {   QuizgenConfig
        {   backends: crate::default_backends()
          , provider: ProviderConfig::default()
          , regeneration: RegenerationConfig::default()
          , dispatch_timeout_secs: 60
        }
    }
}

impl QuizgenConfig
{   /// Load a JSON config file; missing fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error>
    {   let path = path.as_ref();
        debug!("Loading config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        let config: QuizgenConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply MAX_RETRIES, GROQ_API_BASE and DISPATCH_TIMEOUT_SECS
    pub fn with_env_overrides(mut self) -> Self
    {   if let Some(retries) = env_parse::<usize>("MAX_RETRIES")
        {   self.regeneration.max_retries = retries;
        }
        if let Ok(base) = std::env::var("GROQ_API_BASE")
        {   self.provider.api_base = base;
        }
        if let Some(secs) = env_parse::<u64>("DISPATCH_TIMEOUT_SECS")
        {   self.dispatch_timeout_secs = secs;
        }
        self
    }

    pub fn validate(&self) -> Result<(), Error>
    {   if self.backends.is_empty()
        {   return Err(Error::EmptyPool);
        }
        if self.dispatch_timeout_secs == 0
        {   return Err(Error::InvalidConfiguration(
              "dispatch_timeout_secs must be positive".to_string()
            ));
        }
        if let Some(dup) = first_duplicate(&self.backends)
        {   return Err(Error::InvalidConfiguration(
              format!("backend '{}' is listed twice", dup)
            ));
        }
        Ok(())
    }

    pub fn dispatch_timeout(&self) -> Duration
    {   Duration::from_secs(self.dispatch_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T>
{   let raw = std::env::var(var).ok()?;
    match raw.parse()
    {   Ok(v) => Some(v)
      , Err(_) => {
          warn!("Ignoring {}={:?}: not a valid number", var, raw);
          None
        }
    }
}

fn first_duplicate(backends: &[BackendDescriptor]) -> Option<&str>
{   backends.iter().enumerate().find_map(|(i, b)| {
      backends[..i].iter().any(|o| o.id == b.id).then_some(b.id.as_str())
    })
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn defaults_match_deployment()
    {   let config = QuizgenConfig::default();
        assert_eq!(config.backends.len(), 11);
        assert_eq!(config.regeneration.max_retries, 1);
        assert_eq!(config.provider.top_p, 0.95);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults()
    {   let config: QuizgenConfig = serde_json::from_str(r#"{
          "backends": [{"id": "a"}, {"id": "b"}],
          "regeneration": {"max_retries": 3}
        }"#).unwrap();
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.regeneration.max_retries, 3);
        assert_eq!(config.regeneration.initial_backoff_ms, 0);
        assert_eq!(config.dispatch_timeout_secs, 60);
    }

    #[test]
    fn validate_rejects_bad_configs()
    {   let mut config = QuizgenConfig::default();
        config.backends.clear();
        assert_eq!(config.validate(), Err(Error::EmptyPool));

        let mut config = QuizgenConfig::default();
        config.backends = vec![BackendDescriptor::new("a"), BackendDescriptor::new("a")];
        assert!(matches!(config.validate(), Err(Error::InvalidConfiguration(_))));

        let mut config = QuizgenConfig::default();
        config.dispatch_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_key_wins()
    {   let provider = ProviderConfig
        {   api_key: Some("k".to_string())
          , api_key_env: "QUIZGEN_TEST_UNSET_KEY".to_string()
          , ..ProviderConfig::default()
        };
        assert_eq!(provider.resolve_api_key().unwrap(), "k");

        let provider = ProviderConfig
        {   api_key: None
          , ..provider
        };
        assert_eq!(
          provider.resolve_api_key(),
          Err(Error::MissingApiKey("QUIZGEN_TEST_UNSET_KEY".to_string()))
        );
    }
}
