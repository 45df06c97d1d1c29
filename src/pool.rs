//! Round-robin ordering of interchangeable backends

use std::collections::VecDeque;

use log::{debug, info};

use crate::error::Error;
use crate::BackendDescriptor;

/// Ordered backends; the front one is current. Rotation moves the
/// front to the back and never drops a descriptor.
#[derive(Debug, Clone)]
pub struct BackendPool
{   backends: VecDeque<BackendDescriptor>
}

impl BackendPool
{   /// Create a pool; at least one backend is required
    pub fn new(
      backends: Vec<BackendDescriptor>
    ) -> Result<Self, Error>
    {   if backends.is_empty()
        {   return Err(Error::EmptyPool);
        }
        debug!(
          "Creating backend pool with {} backends",
          backends.len()
        );
        Ok(BackendPool
        {   backends: backends.into()
        })
    }

    /// The current backend
    pub fn current(&self) -> &BackendDescriptor
    {   // non-empty by construction
        &self.backends[0]
    }

    /// Move the current backend to the back and return the new current
    pub fn rotate(&mut self, reason: &str) -> &BackendDescriptor
    {   if let Some(front) = self.backends.pop_front()
        {   info!("Rotating away from {}: {}", front.id, reason);
            self.backends.push_back(front);
        }
        self.current()
    }

    /// Rotate only if `observed` is still current. Returns whether a
    /// rotation happened.
    pub fn rotate_if_current(
      &mut self
    , observed: &str
    , reason: &str
    ) -> bool
    {   if self.current().id != observed
        {   debug!(
              "Skipping rotation from {}: current is already {}",
              observed, self.current().id
            );
            return false;
        }
        self.rotate(reason);
        true
    }

    pub fn len(&self) -> usize
    {   self.backends.len()
    }

    pub fn is_empty(&self) -> bool
    {   self.backends.is_empty()
    }

    /// Current ordering, front first
    pub fn snapshot(&self) -> Vec<BackendDescriptor>
    {   self.backends.iter().cloned().collect()
    }
}
