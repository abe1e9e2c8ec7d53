//! Discovery quality-of-service policy.

use std::sync::Arc;
use std::time::Duration;

use crate::entry::DiscoveredEntry;

/// Which directories a lookup consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryScope {
    /// Only the local registration table.
    LocalOnly,

    /// Local results if any; otherwise the global cache, then the remote
    /// directory.
    LocalThenGlobal,

    /// Local results combined with global results.
    LocalAndGlobal,

    /// Only the global cache / remote directory.
    GlobalOnly,
}

/// A pure selection function applied to arbitration candidates.
///
/// Strategies never perform I/O and never mutate entries; they return the
/// subset (possibly reordered) of candidates the consumer should use.
/// Parameterized strategies take their parameter at construction.
pub trait ArbitrationStrategy: Send + Sync {
    /// Select from the candidate list.
    fn select(&self, candidates: Vec<DiscoveredEntry>) -> Vec<DiscoveredEntry>;

    /// Name of the strategy, for logs and debug output.
    fn name(&self) -> &str;
}

/// Policy for one discovery / arbitration request.
#[derive(Clone)]
pub struct DiscoveryQos {
    /// Which directories to consult.
    pub discovery_scope: DiscoveryScope,

    /// Maximum acceptable age of cached global entries.
    pub cache_max_age: Duration,

    /// Bound on the whole arbitration attempt sequence.
    pub discovery_timeout: Duration,

    /// Delay between arbitration attempts.
    pub discovery_retry_delay: Duration,

    /// Only accept providers that support on-change subscriptions.
    pub provider_must_support_on_change: bool,

    /// Candidate selection strategy; `None` keeps all candidates.
    pub arbitration_strategy: Option<Arc<dyn ArbitrationStrategy>>,
}

impl Default for DiscoveryQos {
    fn default() -> Self {
        Self {
            discovery_scope: DiscoveryScope::LocalThenGlobal,
            cache_max_age: Duration::ZERO,
            discovery_timeout: Duration::from_secs(600),
            discovery_retry_delay: Duration::from_secs(10),
            provider_must_support_on_change: false,
            arbitration_strategy: None,
        }
    }
}

impl DiscoveryQos {
    /// Create a discovery qos with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the discovery scope.
    #[must_use]
    pub fn discovery_scope(mut self, scope: DiscoveryScope) -> Self {
        self.discovery_scope = scope;
        self
    }

    /// Set the maximum acceptable cache age.
    #[must_use]
    pub fn cache_max_age(mut self, max_age: Duration) -> Self {
        self.cache_max_age = max_age;
        self
    }

    /// Set the overall discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the delay between discovery attempts.
    #[must_use]
    pub fn discovery_retry_delay(mut self, delay: Duration) -> Self {
        self.discovery_retry_delay = delay;
        self
    }

    /// Require on-change subscription support from providers.
    #[must_use]
    pub fn provider_must_support_on_change(mut self, required: bool) -> Self {
        self.provider_must_support_on_change = required;
        self
    }

    /// Set the arbitration strategy.
    #[must_use]
    pub fn arbitration_strategy(mut self, strategy: Arc<dyn ArbitrationStrategy>) -> Self {
        self.arbitration_strategy = Some(strategy);
        self
    }
}

impl std::fmt::Debug for DiscoveryQos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryQos")
            .field("discovery_scope", &self.discovery_scope)
            .field("cache_max_age", &self.cache_max_age)
            .field("discovery_timeout", &self.discovery_timeout)
            .field("discovery_retry_delay", &self.discovery_retry_delay)
            .field(
                "provider_must_support_on_change",
                &self.provider_must_support_on_change,
            )
            .field(
                "arbitration_strategy",
                &self.arbitration_strategy.as_ref().map(|s| s.name()),
            )
            .finish()
    }
}
