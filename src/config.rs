//! Configuration types for the routing and resilience layer.

use std::time::Duration;

/// Top-level configuration for the routing client.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Retry policy configuration.
    pub retry: RetryConfig,

    /// Routing metadata cache configuration.
    pub routing: RoutingConfig,

    /// Encryption key-properties cache configuration.
    pub key_properties: KeyPropertiesConfig,
}

impl ClientConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set retry configuration.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set routing cache configuration.
    pub fn with_routing_config(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    /// Set key-properties cache configuration.
    pub fn with_key_properties_config(mut self, key_properties: KeyPropertiesConfig) -> Self {
        self.key_properties = key_properties;
        self
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts retried due to throttling.
    pub max_throttle_attempts: u32,

    /// Base delay for exponential backoff when the service supplies no
    /// retry-after hint. Doubles each throttled attempt.
    pub backoff_base: Duration,

    /// Upper bound on a single backoff delay.
    pub backoff_cap: Duration,

    /// Maximum number of attempts retried due to stale routing metadata.
    ///
    /// Splits and migrations normally converge within a few refreshes; the
    /// ceiling keeps a permanently broken container from looping forever.
    pub max_stale_routing_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_throttle_attempts: 9,
            backoff_base: Duration::from_millis(100),
            backoff_cap: Duration::from_secs(5),
            max_stale_routing_attempts: 15,
        }
    }
}

impl RetryConfig {
    /// Set the maximum throttle attempt count.
    pub fn with_max_throttle_attempts(mut self, attempts: u32) -> Self {
        self.max_throttle_attempts = attempts;
        self
    }

    /// Set the exponential backoff base delay.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Set the backoff delay cap.
    pub fn with_backoff_cap(mut self, cap: Duration) -> Self {
        self.backoff_cap = cap;
        self
    }

    /// Set the maximum stale-routing attempt count.
    pub fn with_max_stale_routing_attempts(mut self, attempts: u32) -> Self {
        self.max_stale_routing_attempts = attempts;
        self
    }
}

/// Routing metadata cache configuration.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    /// TTL for the cached overlapping-range set per container.
    ///
    /// `None` means the range set never expires on its own; it is replaced
    /// only on a forced refresh after a stale-routing signal.
    pub routing_ttl: Option<Duration>,

    /// TTL for the cached partition key schema per container.
    pub schema_ttl: Option<Duration>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            routing_ttl: None,
            schema_ttl: Some(Duration::from_secs(300)),
        }
    }
}

impl RoutingConfig {
    /// Set the overlapping-range set TTL.
    pub fn with_routing_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.routing_ttl = ttl;
        self
    }

    /// Set the partition key schema TTL.
    pub fn with_schema_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.schema_ttl = ttl;
        self
    }
}

/// Encryption key-properties cache configuration.
#[derive(Debug, Clone)]
pub struct KeyPropertiesConfig {
    /// TTL for cached key properties.
    pub ttl: Duration,
}

impl Default for KeyPropertiesConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600), // 60 minutes
        }
    }
}

impl KeyPropertiesConfig {
    /// Set the key-properties TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}
