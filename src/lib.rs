pub mod error;
pub mod config;
pub mod providers;
pub mod request;
pub mod quiz;
pub mod normalize;
pub mod validate;
pub mod pool;
pub mod registry;
pub mod failover;
pub mod orchestrator;
pub mod evaluator;
use serde::{Deserialize, Serialize};

/*

quizgen turns study material (or an existing quiz) into validated
quiz items through a rotating set of interchangeable LLM backends,
and grades free-text answers against a rubric.

quizgen/
├── Cargo.toml
├── src/
│   ├── lib.rs           # Re-exports, backend descriptors
│   ├── error.rs         # Error types and classification
│   ├── config.rs        # Backends, provider and retry configuration
│   ├── request.rs       # Generation request/result, prompt builder seam
│   ├── quiz.rs          # Quiz item variants with checked constructors
│   ├── normalize.rs     # Raw model text -> JSON payload
│   ├── validate.rs      # JSON payload -> quiz items or violations
│   ├── pool.rs          # Round-robin backend ordering
│   ├── registry.rs      # Task that owns the pool + cached transport
│   ├── failover.rs      # Regeneration and rotation budgets
│   ├── orchestrator.rs  # Dispatch / normalize / validate loop
│   ├── providers/       # Transport trait + HTTP providers
│   └── evaluator/       # Subjective answer scoring
└── tests/

*/

pub use config::QuizgenConfig;
pub use error::
{   Error
  , ErrorCategory
  , EvaluationError
  , FailureCategory
  , GenerationFailure
  , NormalizationError
  , TransportError
};
pub use evaluator::{evaluate, evaluate_json, EvaluationResult, SubjectiveQuestion};
pub use orchestrator::Orchestrator;
pub use pool::BackendPool;
pub use quiz::QuizItem;
pub use registry::{BackendRegistry, Lease};
pub use request::
{   FileIntent
  , GenerationRequest
  , GenerationResult
  , PromptBuilder
  , PromptPair
  , QuizType
};
pub use validate::Violation;

/// One interchangeable LLM backend, identified by its model id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Hash)]
pub struct BackendDescriptor
{   /// Model identifier sent to the provider
    pub id: String
  , /// Informational limits, only used for logging
    #[serde(default)]
    pub capabilities: BackendCapabilities
}

impl BackendDescriptor
{   pub fn new(id: impl Into<String>) -> Self
    {   BackendDescriptor
        {   id: id.into()
          , capabilities: BackendCapabilities::default()
        }
    }
}

/// Capacity of a backend. Never consulted for selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, Hash)]
pub struct BackendCapabilities
{   /// Maximum context window (in tokens)
    pub context_tokens: Option<usize>
  , /// Provider token budget per minute
    pub tokens_per_minute: Option<usize>
  , /// Provider token budget per day; None when unlimited
    pub tokens_per_day: Option<usize>
  , /// Largest quiz that reliably fits the context window
    pub recommended_max_questions: Option<usize>
}

fn groq_model(
  id: &str
, context_tokens: usize
, tokens_per_minute: usize
, tokens_per_day: Option<usize>
, recommended_max_questions: usize
) -> BackendDescriptor
{   BackendDescriptor
    {   id: id.to_string()
      , capabilities: BackendCapabilities
        {   context_tokens: Some(context_tokens)
          , tokens_per_minute: Some(tokens_per_minute)
          , tokens_per_day
          , recommended_max_questions: Some(recommended_max_questions)
        }
    }
}

/// Groq models in descending order of recommended quiz size.
pub fn default_backends() -> Vec<BackendDescriptor>
{   vec![
      groq_model(
        "meta-llama/llama-4-maverick-17b-128e-instruct",
        16_384, 15_000, Some(500_000), 35
      )
    , groq_model(
        "meta-llama/llama-4-scout-17b-16e-instruct",
        16_384, 30_000, Some(500_000), 35
      )
    , groq_model("qwen/qwen3-32b", 32_768, 6_000, Some(500_000), 30)
    , groq_model("llama3-8b-8192", 8_192, 6_000, Some(500_000), 25)
    , groq_model("llama3-70b-8192", 8_192, 6_000, Some(500_000), 25)
    , groq_model("llama-3.1-8b-instant", 4_096, 6_000, Some(500_000), 20)
    , groq_model(
        "meta-llama/llama-guard-4-12b",
        4_096, 15_000, Some(500_000), 20
      )
    , groq_model("gemma2-9b-it", 4_096, 15_000, Some(500_000), 15)
    , groq_model(
        "deepseek-r1-distill-llama-70b",
        4_096, 6_000, Some(100_000), 15
      )
    , groq_model("compound-beta", 4_096, 70_000, None, 25)
    , groq_model("compound-beta-mini", 4_096, 70_000, None, 25)
    ]
}

/// Install `env_logger` with an `info` default, overridable by RUST_LOG.
/// Safe to call more than once.
pub fn init_logging()
{   let _ = env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    ).try_init();
}
