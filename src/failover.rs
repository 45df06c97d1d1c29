//! Regeneration and rotation budgets for the orchestrator

use std::time::Duration;
use log::debug;

use crate::config::RegenerationConfig;

/// Outer budget: how many times the model output may be regenerated
#[derive(Debug, Clone)]
pub struct RegenerationPolicy
{   pub max_retries: usize
  , pub backoff_multiplier: f32
  , pub initial_backoff: Duration
}

impl RegenerationPolicy
{   /// Create a new regeneration policy
    pub fn new(
      max_retries: usize
    , backoff_multiplier: f32
    , initial_backoff_ms: u64
    ) -> Self
    {   RegenerationPolicy
        {   max_retries
          , backoff_multiplier
          , initial_backoff: Duration::from_millis(
              initial_backoff_ms
            )
        }
    }

    /// Total attempts: the first one plus every retry
    pub fn attempts(&self) -> usize
    {   self.max_retries + 1
    }

    /// Pause before 1-based `attempt`; zero for the first attempt
    pub fn backoff_for_attempt(
      &self
    , attempt: usize
    ) -> Duration
    {   if attempt <= 1 || self.initial_backoff.is_zero()
        {   return Duration::ZERO;
        }
        debug!("Calculating backoff for attempt {}", attempt);
        let multiplier
          = self.backoff_multiplier.powi(attempt as i32 - 2);
        Duration::from_millis(
          (self.initial_backoff.as_millis() as f32
            * multiplier) as u64
        )
    }
}

impl Default for RegenerationPolicy
{   fn default() -> Self
    {   RegenerationPolicy::new(1, 2.0, 0)
    }
}

impl From<&RegenerationConfig> for RegenerationPolicy
{   fn from(config: &RegenerationConfig) -> Self
    {   RegenerationPolicy::new(
          config.max_retries,
          config.backoff_multiplier,
          config.initial_backoff_ms
        )
    }
}

/// Inner budget: transient-capacity failures tolerated within one
/// regeneration attempt, one per backend in the pool.
#[derive(Debug, Clone)]
pub struct RotationBudget
{   limit: usize
  , used: usize
}

impl RotationBudget
{   pub fn new(pool_size: usize) -> Self
    {   RotationBudget
        {   limit: pool_size
          , used: 0
        }
    }

    /// Record one transient failure. Returns false once every backend
    /// has been tried and rejected.
    pub fn consume(&mut self) -> bool
    {   self.used += 1;
        self.used < self.limit
    }

    pub fn used(&self) -> usize
    {   self.used
    }

    pub fn limit(&self) -> usize
    {   self.limit
    }
}
