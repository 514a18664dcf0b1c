//! Resource limits for script execution.
//!
//! These map onto the engine's runtime limits and stop runaway scripts
//! (infinite loops, unbounded recursion) from hanging the host thread.

/// Resource limits applied to a [`Vm`](crate::Vm) when it is created.
///
/// Every limit is optional; `None` keeps the engine default.
///
/// # Example
///
/// ```
/// use jsbridge::ResourceLimits;
///
/// let limits = ResourceLimits::new()
///     .with_loop_iteration_limit(1_000_000)
///     .with_recursion_limit(256);
/// assert!(limits.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum iterations of a single loop before the engine throws
    pub loop_iteration_limit: Option<u64>,
    /// Maximum call depth
    pub recursion_limit: Option<usize>,
    /// Maximum size of the engine's value stack
    pub stack_size_limit: Option<usize>,
}

impl ResourceLimits {
    /// Creates limits that keep every engine default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-loop iteration limit.
    pub fn with_loop_iteration_limit(mut self, limit: u64) -> Self {
        self.loop_iteration_limit = Some(limit);
        self
    }

    /// Sets the maximum call depth.
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = Some(limit);
        self
    }

    /// Sets the maximum value stack size.
    pub fn with_stack_size_limit(mut self, limit: usize) -> Self {
        self.stack_size_limit = Some(limit);
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a description of the first limit set to zero. A zero limit
    /// would make every script fail immediately.
    pub fn validate(&self) -> Result<(), String> {
        if self.loop_iteration_limit == Some(0) {
            return Err("loop iteration limit must be greater than zero".to_string());
        }
        if self.recursion_limit == Some(0) {
            return Err("recursion limit must be greater than zero".to_string());
        }
        if self.stack_size_limit == Some(0) {
            return Err("stack size limit must be greater than zero".to_string());
        }
        Ok(())
    }

    pub(crate) fn apply(&self, engine: &mut boa_engine::Context) {
        let limits = engine.runtime_limits_mut();
        if let Some(limit) = self.loop_iteration_limit {
            limits.set_loop_iteration_limit(limit);
        }
        if let Some(limit) = self.recursion_limit {
            limits.set_recursion_limit(limit);
        }
        if let Some(limit) = self.stack_size_limit {
            limits.set_stack_size_limit(limit);
        }
    }
}
