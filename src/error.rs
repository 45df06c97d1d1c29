use std::fmt;
use std::time::Duration;

use crate::validate::Violation;

/// Crate-level error for setup, configuration and registry plumbing.
/// Implements Clone for sending through channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// API key is missing for a provider
    MissingApiKey(String)
  , /// Invalid configuration
    InvalidConfiguration(String)
  , /// Backend pool was built with no descriptors
    EmptyPool
  , /// The registry task is no longer running
    RegistryClosed
  , /// Reading a config file failed
    Io(String)
  , /// Failed to parse a config file
    Parse(String)
  , /// Building the HTTP client failed
    Http(String)
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::MissingApiKey(provider) => {
              write!(f, "Missing API key for: {}", provider)
            }
          , Error::InvalidConfiguration(msg) => {
              write!(f, "Invalid configuration: {}", msg)
            }
          , Error::EmptyPool => {
              write!(f, "Backend pool must hold at least one backend")
            }
          , Error::RegistryClosed => {
              write!(f, "Backend registry is no longer running")
            }
          , Error::Io(msg) => {
              write!(f, "I/O error: {}", msg)
            }
          , Error::Parse(msg) => {
              write!(f, "Parse error: {}", msg)
            }
          , Error::Http(msg) => {
              write!(f, "HTTP error: {}", msg)
            }
        }
    }
}

impl std::error::Error for Error {}

// ===== Transport classification =====

/// Closed set of transport failure kinds produced at the provider boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory
{   /// Quota or rate limit exceeded
    RateLimited
  , /// Model permanently retired by the provider
    Decommissioned
  , /// Bad or missing credentials
    Unauthorized
  , /// Provider rejected the request shape
    BadRequest
  , /// Dispatch did not finish within its deadline
    Timeout
  , /// Any other transport failure
    Transport
}

impl ErrorCategory
{   /// Transient-capacity errors are absorbed by rotating backends.
    pub fn is_transient(&self) -> bool
    {   matches!(
          self,
          ErrorCategory::RateLimited | ErrorCategory::Decommissioned
        )
    }

    pub fn as_str(&self) -> &'static str
    {   match self
        {   ErrorCategory::RateLimited => "rate_limited"
          , ErrorCategory::Decommissioned => "decommissioned"
          , ErrorCategory::Unauthorized => "unauthorized"
          , ErrorCategory::BadRequest => "bad_request"
          , ErrorCategory::Timeout => "timeout"
          , ErrorCategory::Transport => "transport"
        }
    }
}

impl fmt::Display for ErrorCategory
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.write_str(self.as_str())
    }
}

/// Error returned by a single dispatch to one backend.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportError
{   pub category: ErrorCategory
  , pub message: String
  , pub retry_after: Option<Duration>
}

impl TransportError
{   pub fn new(
      category: ErrorCategory
    , message: impl Into<String>
    ) -> Self
    {   TransportError
        {   category
          , message: message.into()
          , retry_after: None
        }
    }

    pub fn with_retry_after(
      mut self
    , retry_after: Option<Duration>
    ) -> Self
    {   self.retry_after = retry_after;
        self
    }

    pub fn is_transient(&self) -> bool
    {   self.category.is_transient()
    }
}

impl fmt::Display for TransportError
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   write!(f, "{}: {}", self.category, self.message)?;
        if let Some(wait) = self.retry_after
        {   write!(f, " (retry after {:.1}s)", wait.as_secs_f64())?;
        }
        Ok(())
    }
}

impl std::error::Error for TransportError {}

// ===== Normalization =====

/// Model output could not be parsed as JSON, even after repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationError
{   pub message: String
  , /// Text after annotation and fence stripping
    pub cleaned: String
}

impl fmt::Display for NormalizationError
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   write!(f, "Unparseable model output: {}", self.message)
    }
}

impl std::error::Error for NormalizationError {}

// ===== Orchestrator failures =====

/// Machine-readable category of a failed `generate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory
{   /// Every backend rejected the request within one regeneration attempt
    PoolExhausted
  , /// Output never parsed within the regeneration budget
    Normalization
  , /// Output never satisfied the quiz schema within the budget
    SchemaViolation
  , /// Non-retryable backend failure
    FatalBackend
  , /// Registry task unavailable
    Unavailable
}

impl FailureCategory
{   pub fn as_str(&self) -> &'static str
    {   match self
        {   FailureCategory::PoolExhausted => "pool_exhausted"
          , FailureCategory::Normalization => "normalization"
          , FailureCategory::SchemaViolation => "schema_violation"
          , FailureCategory::FatalBackend => "fatal_backend"
          , FailureCategory::Unavailable => "unavailable"
        }
    }
}

impl fmt::Display for FailureCategory
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.write_str(self.as_str())
    }
}

/// Classified failure surfaced by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationFailure
{   pub category: FailureCategory
  , pub message: String
  , pub retry_after: Option<Duration>
  , /// Backend that produced the last failure, when known
    pub backend: Option<String>
  , /// Transport category behind a fatal or exhausted failure
    pub transport: Option<ErrorCategory>
  , /// Last cleaned model output, for parse and schema failures
    pub last_raw: Option<String>
  , pub violations: Vec<Violation>
}

impl GenerationFailure
{   pub fn new(
      category: FailureCategory
    , message: impl Into<String>
    ) -> Self
    {   GenerationFailure
        {   category
          , message: message.into()
          , retry_after: None
          , backend: None
          , transport: None
          , last_raw: None
          , violations: vec![]
        }
    }

    pub(crate) fn from_transport(
      category: FailureCategory
    , backend: &str
    , err: &TransportError
    ) -> Self
    {   GenerationFailure
        {   retry_after: err.retry_after
          , backend: Some(backend.to_string())
          , transport: Some(err.category)
          , ..GenerationFailure::new(category, err.message.clone())
        }
    }

    /// Whether calling again later may succeed.
    pub fn is_retryable(&self) -> bool
    {   match self.category
        {   FailureCategory::PoolExhausted
          | FailureCategory::Normalization
          | FailureCategory::SchemaViolation => true
          , FailureCategory::FatalBackend => {
              self.transport == Some(ErrorCategory::Timeout)
            }
          , FailureCategory::Unavailable => false
        }
    }

    /// HTTP status a front end would map this failure to.
    pub fn status_hint(&self) -> u16
    {   match (self.category, self.transport)
        {   (FailureCategory::PoolExhausted, _) => 503
          , (FailureCategory::FatalBackend, Some(ErrorCategory::BadRequest))
          | (FailureCategory::FatalBackend, Some(ErrorCategory::Unauthorized))
              => 400
          , (FailureCategory::FatalBackend, Some(ErrorCategory::Timeout))
              => 504
          , (FailureCategory::Unavailable, _) => 503
          , _ => 502
        }
    }
}

impl fmt::Display for GenerationFailure
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   write!(f, "[{}] {}", self.category, self.message)?;
        if let Some(backend) = &self.backend
        {   write!(f, " (backend: {})", backend)?;
        }
        if !self.violations.is_empty()
        {   write!(f, "; {} schema violation(s)", self.violations.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for GenerationFailure {}

// ===== Evaluator input errors =====

/// Rejected evaluation input. The evaluator never retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError
{   /// Question type is not essay or fitb
    UnsupportedType(String)
  , /// A text field held a non-string value
    NotAString(String)
  , /// Question text empty after cleaning
    MissingQuestion
  , /// `keywords` is not a list of strings
    KeywordsNotAList
  , /// fitb questions need at least one keyword
    MissingKeywords
}

impl fmt::Display for EvaluationError
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   match self
        {   EvaluationError::UnsupportedType(kind) => {
              write!(f, "Unsupported question type: '{}'", kind)
            }
          , EvaluationError::NotAString(field) => {
              write!(f, "Expected a string for `{}`", field)
            }
          , EvaluationError::MissingQuestion => {
              write!(f, "Question text is required")
            }
          , EvaluationError::KeywordsNotAList => {
              write!(f, "`keywords` must be a list of strings")
            }
          , EvaluationError::MissingKeywords => {
              write!(f, "fitb questions require a non-empty `keywords` list")
            }
        }
    }
}

impl std::error::Error for EvaluationError {}

impl From<std::io::Error> for Error
{   fn from(e: std::io::Error) -> Self
    {   Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error
{   fn from(e: serde_json::Error) -> Self
    {   Error::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn only_capacity_errors_are_transient()
    {   assert!(ErrorCategory::RateLimited.is_transient());
        assert!(ErrorCategory::Decommissioned.is_transient());
        assert!(!ErrorCategory::Unauthorized.is_transient());
        assert!(!ErrorCategory::BadRequest.is_transient());
        assert!(!ErrorCategory::Timeout.is_transient());
        assert!(!ErrorCategory::Transport.is_transient());
    }

    #[test]
    fn failure_status_hints()
    {   let exhausted = GenerationFailure::new(
          FailureCategory::PoolExhausted, "all gone"
        );
        assert_eq!(exhausted.status_hint(), 503);
        assert!(exhausted.is_retryable());

        let err = TransportError::new(ErrorCategory::Unauthorized, "bad key");
        let fatal = GenerationFailure::from_transport(
          FailureCategory::FatalBackend, "m1", &err
        );
        assert_eq!(fatal.status_hint(), 400);
        assert!(!fatal.is_retryable());
        assert_eq!(fatal.backend.as_deref(), Some("m1"));
    }

    #[test]
    fn transport_error_display_includes_hint()
    {   let err = TransportError::new(ErrorCategory::RateLimited, "slow down")
          .with_retry_after(Some(Duration::from_secs(90)));
        assert_eq!(
          err.to_string(),
          "rate_limited: slow down (retry after 90.0s)"
        );
    }
}
