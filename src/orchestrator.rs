//! Dispatch / normalize / validate loop with two budgets: rotations
//! absorb backend capacity errors, regenerations absorb bad output.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};

use crate::config::QuizgenConfig;
use crate::error::{
  Error
, ErrorCategory
, FailureCategory
, GenerationFailure
, TransportError
};
use crate::failover::{RegenerationPolicy, RotationBudget};
use crate::normalize::normalize;
use crate::providers::{RawCompletion, TransportFactory};
use crate::registry::BackendRegistry;
use crate::request::{GenerationRequest, GenerationResult, PromptBuilder, PromptPair};
use crate::validate::validate;

const PREVIEW_CHARS: usize = 200;

/// A successful dispatch
struct Dispatched
{   backend: String
  , completion: RawCompletion
  , elapsed: Duration
}

/// Turns generation requests into validated quiz items. Cheap to share:
/// every clone of the registry handle sees the same pool.
pub struct Orchestrator
{   registry: BackendRegistry
  , prompts: Arc<dyn PromptBuilder>
  , policy: RegenerationPolicy
  , dispatch_timeout: Duration
}

impl Orchestrator
{   pub fn new(
      registry: BackendRegistry
    , prompts: Arc<dyn PromptBuilder>
    , policy: RegenerationPolicy
    , dispatch_timeout: Duration
    ) -> Self
    {   Orchestrator
        {   registry
          , prompts
          , policy
          , dispatch_timeout
        }
    }

    /// Validate `config` and spawn a registry over its backends.
    /// Must be called inside a tokio runtime.
    pub fn from_config(
      config: &QuizgenConfig
    , factory: Arc<dyn TransportFactory>
    , prompts: Arc<dyn PromptBuilder>
    ) -> Result<Self, Error>
    {   config.validate()?;
        let registry = BackendRegistry::new(config.backends.clone(), factory)?;
        Ok(Orchestrator::new(
          registry,
          prompts,
          RegenerationPolicy::from(&config.regeneration),
          config.dispatch_timeout()
        ))
    }

    pub fn registry(&self) -> &BackendRegistry
    {   &self.registry
    }

    pub fn policy(&self) -> &RegenerationPolicy
    {   &self.policy
    }

    /// Generate quiz items for `request`.
    pub async fn generate(
      &self
    , request: &GenerationRequest
    ) -> Result<GenerationResult, GenerationFailure>
    {   let req = if request.request_id.is_empty()
        {   "-"
        } else
        {   request.request_id.as_str()
        };
        info!(
          "[req={}] Generating quiz: topic={:?} types={:?} num_questions={:?}",
          req, request.topic, request.quiz_types, request.num_questions
        );

        let prompt = self.prompts.build(request);
        let attempts = self.policy.attempts();
        let mut rotation_count = 0;
        let mut last_failure = None;

        for attempt in 1..=attempts
        {   let wait = self.policy.backoff_for_attempt(attempt);
            if !wait.is_zero()
            {   debug!("[req={}] Waiting {:?} before attempt {}", req, wait, attempt);
                tokio::time::sleep(wait).await;
            }
            debug!("[req={}] Regeneration attempt {}/{}", req, attempt, attempts);

            let dispatched = self
              .dispatch_with_rotation(req, &prompt, &mut rotation_count)
              .await?;
            trace!(
              "[req={}] Raw output from {}: {}",
              req, dispatched.backend, preview(&dispatched.completion.text)
            );

            let normalized = match normalize(&dispatched.completion.text)
            {   Ok(n) => n
              , Err(e) => {
                  warn!(
                    "[req={}] Attempt {} from {} did not parse: {}",
                    req, attempt, dispatched.backend, e.message
                  );
                  last_failure = Some(GenerationFailure
                  {   backend: Some(dispatched.backend)
                    , last_raw: Some(e.cleaned)
                    , ..GenerationFailure::new(
                        FailureCategory::Normalization, e.message
                      )
                  });
                  continue;
                }
            };
            if let Some(pass) = normalized.repaired_by
            {   debug!("[req={}] Output repaired by {}", req, pass);
            }

            match validate(&normalized.payload)
            {   Ok(items) => {
                  if let Some(wanted) = request.num_questions
                  {   if wanted != items.len()
                      {   debug!(
                            "[req={}] Asked for {} questions, got {}",
                            req, wanted, items.len()
                          );
                      }
                  }
                  info!(
                    "[req={}] Generated {} items with {} on attempt {} in {:?} ({} rotations)",
                    req, items.len(), dispatched.backend, attempt,
                    dispatched.elapsed, rotation_count
                  );
                  return Ok(GenerationResult
                  {   backend_used: dispatched.backend
                    , elapsed: dispatched.elapsed
                    , attempt_number: attempt
                    , rotation_count
                    , token_usage: dispatched.completion.token_usage
                    , items
                  });
                }
              , Err(violations) => {
                  warn!(
                    "[req={}] Attempt {} from {} failed validation with {} violation(s)",
                    req, attempt, dispatched.backend, violations.len()
                  );
                  for v in &violations
                  {   debug!("[req={}]   {}", req, v);
                  }
                  last_failure = Some(GenerationFailure
                  {   backend: Some(dispatched.backend)
                    , last_raw: Some(normalized.cleaned)
                    , violations
                    , ..GenerationFailure::new(
                        FailureCategory::SchemaViolation,
                        "model output does not match the quiz schema"
                      )
                  });
                }
            }
        }

        let mut failure = last_failure.unwrap_or_else(|| {
          GenerationFailure::new(
            FailureCategory::Normalization,
            "no regeneration attempts were allowed"
          )
        });
        failure.message = format!(
          "gave up after {} attempt(s): {}",
          attempts, failure.message
        );
        error!("[req={}] {}", req, failure);
        Err(failure)
    }

    /// Dispatch to the current backend, rotating on capacity errors
    /// until one backend answers or every backend has refused.
    async fn dispatch_with_rotation(
      &self
    , req: &str
    , prompt: &PromptPair
    , rotation_count: &mut usize
    ) -> Result<Dispatched, GenerationFailure>
    {   let mut budget = RotationBudget::new(self.registry.len());
        let mut last_hint = None;
        loop
        {   let lease = self.registry.current().await
              .map_err(|e| unavailable(req, e))?;
            debug!("[req={}] Dispatching to {}", req, lease.id());

            let started = Instant::now();
            let outcome = match tokio::time::timeout(
              self.dispatch_timeout,
              lease.dispatch(prompt)
            ).await
            {   Ok(outcome) => outcome
              , Err(_) => Err(TransportError::new(
                  ErrorCategory::Timeout,
                  format!("dispatch exceeded {:?}", self.dispatch_timeout)
                ))
            };
            let elapsed = started.elapsed();

            match outcome
            {   Ok(completion) => {
                  debug!("[req={}] {} answered in {:?}", req, lease.id(), elapsed);
                  return Ok(Dispatched
                  {   backend: lease.descriptor.id
                    , completion
                    , elapsed
                  });
                }
              , Err(e) if e.is_transient() => {
                  warn!("[req={}] {} unavailable: {}", req, lease.id(), e);
                  last_hint = e.retry_after.or(last_hint);
                  let next = self.registry
                    .rotate_from(lease.id(), e.category.as_str())
                    .await
                    .map_err(|e| unavailable(req, e))?;
                  *rotation_count += 1;
                  if !budget.consume()
                  {   let mut failure = GenerationFailure::from_transport(
                        FailureCategory::PoolExhausted, lease.id(), &e
                      );
                      failure.message = format!(
                        "all {} backends rejected the request; last: {}",
                        budget.limit(), e.message
                      );
                      failure.retry_after = last_hint;
                      error!("[req={}] {}", req, failure);
                      return Err(failure);
                  }
                  info!(
                    "[req={}] Rotated to {} ({}/{} rotations)",
                    req, next.id, budget.used(), budget.limit()
                  );
                }
              , Err(e) => {
                  error!("[req={}] Fatal error from {}: {}", req, lease.id(), e);
                  return Err(GenerationFailure::from_transport(
                    FailureCategory::FatalBackend, lease.id(), &e
                  ));
                }
            }
        }
    }
}

fn unavailable(req: &str, e: Error) -> GenerationFailure
{   error!("[req={}] {}", req, e);
    GenerationFailure::new(FailureCategory::Unavailable, e.to_string())
}

fn preview(text: &str) -> String
{   match text.char_indices().nth(PREVIEW_CHARS)
    {   Some((cut, _)) => format!("{}...", &text[..cut])
      , None => text.to_string()
    }
}

#[cfg(test)]
mod tests
{   use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use async_trait::async_trait;
    use crate::providers::Transport;
    use crate::BackendDescriptor;

    type Script = Arc<Mutex<VecDeque<Result<RawCompletion, TransportError>>>>;

    /// Replays one shared script regardless of which backend is current
    struct Scripted(Script);

    #[async_trait]
    impl Transport for Scripted
    {   async fn dispatch(
          &self
        , _prompt: &PromptPair
        ) -> Result<RawCompletion, TransportError>
        {   self.0.lock().unwrap().pop_front().unwrap_or_else(|| {
              Err(TransportError::new(ErrorCategory::Transport, "script ran out"))
            })
        }
    }

    struct ScriptedFactory(Script);

    impl TransportFactory for ScriptedFactory
    {   fn connect(
          &self
        , _backend: &BackendDescriptor
        ) -> Result<Arc<dyn Transport>, TransportError>
        {   Ok(Arc::new(Scripted(self.0.clone())))
        }
    }

    fn orchestrator(
      ids: &[&str]
    , script: Vec<Result<RawCompletion, TransportError>>
    ) -> Orchestrator
    {   let factory = Arc::new(ScriptedFactory(Arc::new(Mutex::new(script.into()))));
        let registry = BackendRegistry::new(
          ids.iter().map(|id| BackendDescriptor::new(*id)).collect(),
          factory
        ).unwrap();
        let prompts = |_: &GenerationRequest| PromptPair
        {   system: "schema".to_string()
          , task: "task".to_string()
        };
        Orchestrator::new(
          registry,
          Arc::new(prompts),
          RegenerationPolicy::default(),
          Duration::from_secs(5)
        )
    }

    const GOOD: &str = r#"{"quizzes":[{"type":"tf","question":"Water is wet.","answer":true}]}"#;

    #[tokio::test]
    async fn rate_limit_rotates_without_consuming_an_attempt()
    {   let orch = orchestrator(&["a", "b"], vec![
          Err(TransportError::new(ErrorCategory::RateLimited, "slow down"))
        , Ok(RawCompletion::text(GOOD))
        ]);
        let result = orch.generate(&GenerationRequest::new("t1")).await.unwrap();
        assert_eq!(result.backend_used, "b");
        assert_eq!(result.attempt_number, 1);
        assert_eq!(result.rotation_count, 1);
        assert_eq!(result.question_count(), 1);
    }

    #[tokio::test]
    async fn bad_request_is_fatal()
    {   let orch = orchestrator(&["a", "b"], vec![
          Err(TransportError::new(ErrorCategory::BadRequest, "nope"))
        , Ok(RawCompletion::text(GOOD))
        ]);
        let failure = orch.generate(&GenerationRequest::new("t2")).await.unwrap_err();
        assert_eq!(failure.category, FailureCategory::FatalBackend);
        assert_eq!(failure.backend.as_deref(), Some("a"));
        assert_eq!(orch.registry().rotations().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unparseable_output_keeps_the_cleaned_text()
    {   let orch = orchestrator(&["a"], vec![
          Ok(RawCompletion::text("not json"))
        , Ok(RawCompletion::text("<think>hmm</think>still not json"))
        ]);
        let failure = orch.generate(&GenerationRequest::new("t3")).await.unwrap_err();
        assert_eq!(failure.category, FailureCategory::Normalization);
        assert_eq!(failure.last_raw.as_deref(), Some("still not json"));
        assert!(failure.message.starts_with("gave up after 2 attempt(s)"));
    }

    #[test]
    fn preview_truncates_on_char_boundaries()
    {   let long = "é".repeat(PREVIEW_CHARS + 10);
        let short = preview(&long);
        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
