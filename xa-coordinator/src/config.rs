//! Transaction manager configuration and builder.

use std::time::Duration;

/// Default timeout for new root transactions.
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(120);
/// Default number of status events buffered per subscriber.
pub const DEFAULT_EVENT_BUFFER_CAPACITY: usize = 1024;

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Settings applied by a [`TransactionManager`](crate::TransactionManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionManagerConfig {
    default_timeout: Duration,
    event_buffer_capacity: usize,
}

impl TransactionManagerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> TransactionManagerConfigBuilder {
        TransactionManagerConfigBuilder::new()
    }

    /// Returns the timeout applied to new root transactions.
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Returns how many status events a subscriber may fall behind before
    /// the oldest are dropped.
    pub fn event_buffer_capacity(&self) -> usize {
        self.event_buffer_capacity
    }
}

impl Default for TransactionManagerConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            event_buffer_capacity: DEFAULT_EVENT_BUFFER_CAPACITY,
        }
    }
}

/// Builder for [`TransactionManagerConfig`].
#[derive(Debug, Clone, Default)]
pub struct TransactionManagerConfigBuilder {
    default_timeout: Option<Duration>,
    event_buffer_capacity: Option<usize>,
}

impl TransactionManagerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout applied to new root transactions.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Sets the per-subscriber event buffer capacity.
    pub fn event_buffer_capacity(mut self, capacity: usize) -> Self {
        self.event_buffer_capacity = Some(capacity);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the timeout or the buffer capacity is zero.
    pub fn build(self) -> Result<TransactionManagerConfig, ConfigError> {
        let default_timeout = self.default_timeout.unwrap_or(DEFAULT_TRANSACTION_TIMEOUT);
        let event_buffer_capacity = self
            .event_buffer_capacity
            .unwrap_or(DEFAULT_EVENT_BUFFER_CAPACITY);

        if default_timeout.is_zero() {
            return Err(ConfigError::new("default_timeout must be positive"));
        }
        if event_buffer_capacity == 0 {
            return Err(ConfigError::new("event_buffer_capacity must be positive"));
        }

        Ok(TransactionManagerConfig {
            default_timeout,
            event_buffer_capacity,
        })
    }
}
