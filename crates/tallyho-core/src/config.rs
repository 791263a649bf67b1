//! Registry, async queue and collector configuration.

use crate::error::{Error, Result};

/// What a histogram-backed metric does with a negative observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegativeValuePolicy {
    /// Drop the value silently; the count is unchanged.
    #[default]
    Ignore,
    /// Fail the call with [`Error::NegativeObservation`].
    Reject,
}

/// What a bounded async queue does when it is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Block the caller until the consumer frees a slot.
    #[default]
    Block,
    /// Drop the command and count it.
    Drop,
}

/// Synchronous registry configuration.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// Policy applied by every metric the registry creates.
    pub negative_values: NegativeValuePolicy,
}

impl RegistryConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the negative value policy.
    pub fn with_negative_values(mut self, policy: NegativeValuePolicy) -> Self {
        self.negative_values = policy;
        self
    }
}

/// Async registry queue configuration.
#[derive(Debug, Clone, Default)]
pub struct AsyncRegistryConfig {
    /// Queue capacity. `None` means unbounded.
    pub capacity: Option<usize>,
    /// Behaviour of a full bounded queue.
    pub overflow: OverflowPolicy,
}

impl AsyncRegistryConfig {
    /// Create an unbounded queue configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the queue to `capacity` commands.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Remove the queue bound.
    pub fn unbounded(mut self) -> Self {
        self.capacity = None;
        self
    }

    /// Set the overflow policy of a bounded queue.
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == Some(0) {
            return Err(Error::Config("async queue capacity must be non-zero".into()));
        }
        Ok(())
    }
}

/// Collector configuration.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Seed the baseline from the registry at construction, so the first
    /// tick only reports activity that happened after it.
    pub start_clean: bool,
}

impl CollectorConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether the baseline is seeded at construction.
    pub fn with_start_clean(mut self, start_clean: bool) -> Self {
        self.start_clean = start_clean;
        self
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self { start_clean: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let registry = RegistryConfig::default();
        assert_eq!(registry.negative_values, NegativeValuePolicy::Ignore);

        let queue = AsyncRegistryConfig::default();
        assert!(queue.capacity.is_none());
        assert!(queue.validate().is_ok());

        assert!(CollectorConfig::default().start_clean);
    }

    #[test]
    fn test_config_builder() {
        let queue = AsyncRegistryConfig::new()
            .with_capacity(128)
            .with_overflow(OverflowPolicy::Drop);
        assert_eq!(queue.capacity, Some(128));
        assert_eq!(queue.overflow, OverflowPolicy::Drop);

        let registry = RegistryConfig::new().with_negative_values(NegativeValuePolicy::Reject);
        assert_eq!(registry.negative_values, NegativeValuePolicy::Reject);

        assert!(!CollectorConfig::new().with_start_clean(false).start_clean);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let queue = AsyncRegistryConfig::new().with_capacity(0);
        assert!(matches!(queue.validate(), Err(Error::Config(_))));
        assert!(AsyncRegistryConfig::new().with_capacity(0).unbounded().validate().is_ok());
    }
}
