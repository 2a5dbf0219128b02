//! Execution limits.
//!
//! The single-threaded tree walker only needs one hard guard: call-frame
//! depth, so runaway recursion surfaces as a catchable language error instead
//! of blowing the host stack. Wall-clock and memory budgets belong to the
//! embedding host.

use std::fmt;

use crate::exceptions::{ExcType, RaisedException, RunError};

/// Default maximum depth of the language-level call stack.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

/// Limits enforced while executing user code.
#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    pub max_recursion_depth: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

impl ResourceLimits {
    /// Checks the call depth before a new function frame is pushed.
    pub fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if current_depth >= self.max_recursion_depth {
            return Err(ResourceError::Recursion {
                limit: self.max_recursion_depth,
                depth: current_depth,
            });
        }
        Ok(())
    }
}

/// Error returned when a resource limit is exceeded during execution.
#[derive(Debug, Clone)]
pub enum ResourceError {
    /// Maximum recursion depth exceeded.
    Recursion { limit: usize, depth: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recursion { .. } => write!(f, "maximum recursion depth exceeded"),
        }
    }
}

impl std::error::Error for ResourceError {}

impl From<ResourceError> for RunError {
    // Recursion errors stay catchable so user code can recover, matching the
    // language's ResourceError taxonomy.
    fn from(err: ResourceError) -> Self {
        RaisedException::new(ExcType::ResourceError, err.to_string()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_check_trips_at_the_limit() {
        let limits = ResourceLimits {
            max_recursion_depth: 4,
        };
        assert!(limits.check_recursion_depth(3).is_ok());
        assert!(limits.check_recursion_depth(4).is_err());
    }
}
