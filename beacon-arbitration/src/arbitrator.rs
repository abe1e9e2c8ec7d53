//! Provider arbitration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use beacon_core::{
    DiscoveredEntry, DiscoveryEntry, DiscoveryError, DiscoveryLookup, DiscoveryQos, Version,
};

use crate::error::ArbitrationError;

/// Settings for one arbitration request.
#[derive(Debug, Clone)]
pub struct ArbitrationSettings {
    /// Domains to discover providers in.
    pub domains: Vec<String>,

    /// Interface the provider must implement.
    pub interface_name: String,

    /// Discovery policy (scope, timeout, retry delay, strategy).
    pub discovery_qos: DiscoveryQos,

    /// Version of the consuming proxy; providers must be compatible.
    pub proxy_version: Version,

    /// Resolve against the configured static capability list instead of
    /// the discovery layer.
    pub static_arbitration: bool,
}

impl ArbitrationSettings {
    /// Create settings for a dynamic arbitration.
    #[must_use]
    pub fn new(
        domains: Vec<String>,
        interface_name: impl Into<String>,
        discovery_qos: DiscoveryQos,
        proxy_version: Version,
    ) -> Self {
        Self {
            domains,
            interface_name: interface_name.into(),
            discovery_qos,
            proxy_version,
            static_arbitration: false,
        }
    }

    /// Request static arbitration.
    #[must_use]
    pub fn static_arbitration(mut self, enabled: bool) -> Self {
        self.static_arbitration = enabled;
        self
    }
}

fn supports_on_change(entry: &DiscoveryEntry, required: bool) -> bool {
    !required || entry.qos.supports_on_change_subscriptions
}

/// Dynamic-mode compatibility: equal major version, candidate minor not
/// below the proxy's, and on-change support when required.
fn is_compatible(entry: &DiscoveryEntry, proxy_version: Version, must_support_on_change: bool) -> bool {
    entry.provider_version.major_version == proxy_version.major_version
        && entry.provider_version.minor_version >= proxy_version.minor_version
        && supports_on_change(entry, must_support_on_change)
}

fn record_version(versions: &mut Vec<Version>, version: Version) {
    if !versions.contains(&version) {
        versions.push(version);
    }
}

fn apply_strategy(qos: &DiscoveryQos, candidates: Vec<DiscoveredEntry>) -> Vec<DiscoveredEntry> {
    match &qos.arbitration_strategy {
        Some(strategy) => strategy.select(candidates),
        None => candidates,
    }
}

/// Resolves provider entries for a consumer, retrying discovery until a
/// version-compatible, strategy-selected result is available or the
/// discovery timeout expires.
///
/// Every arbitration is one cancellable unit: its retry delay and its
/// overall timeout live in the same future, raced with `select!`, so
/// reaching a terminal state (resolve, reject, shutdown) drops both
/// timers at once. [`shutdown`](Self::shutdown) cancels all pending
/// arbitrations in bulk and refuses subsequent requests.
pub struct Arbitrator<D> {
    discovery: Arc<D>,
    static_capabilities: Option<Vec<DiscoveredEntry>>,
    pending: DashMap<u64, CancellationToken>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl<D: DiscoveryLookup> Arbitrator<D> {
    /// Create an arbitrator over the given discovery layer.
    #[must_use]
    pub fn new(discovery: Arc<D>) -> Self {
        Self {
            discovery,
            static_capabilities: None,
            pending: DashMap::new(),
            next_id: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        }
    }

    /// Create an arbitrator with a static capability list for static
    /// arbitration requests.
    #[must_use]
    pub fn with_static_capabilities(
        discovery: Arc<D>,
        static_capabilities: Vec<DiscoveredEntry>,
    ) -> Self {
        Self {
            static_capabilities: Some(static_capabilities),
            ..Self::new(discovery)
        }
    }

    /// Number of arbitrations currently pending.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Resolve provider entries for the given settings.
    ///
    /// Resolves with the strategy-selected, version-compatible entries, or
    /// rejects when the discovery timeout expires or the arbitrator shuts
    /// down.
    pub async fn start_arbitration(
        &self,
        settings: ArbitrationSettings,
    ) -> Result<Vec<DiscoveredEntry>, ArbitrationError> {
        if self.shutdown.is_cancelled() {
            return Err(ArbitrationError::Shutdown);
        }

        if settings.static_arbitration {
            return self.arbitrate_static(&settings);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = self.shutdown.child_token();
        self.pending.insert(id, cancelled.clone());

        tracing::debug!(
            arbitration = id,
            domains = ?settings.domains,
            interface = %settings.interface_name,
            "starting arbitration"
        );

        let result = tokio::select! {
            biased;
            _ = cancelled.cancelled() => Err(ArbitrationError::Shutdown),
            result = self.discover(&settings) => result,
        };

        self.pending.remove(&id);
        result
    }

    /// Shut down the arbitrator.
    ///
    /// Rejects every pending arbitration with [`ArbitrationError::Shutdown`]
    /// and refuses new requests. Safe to call at any time, any number of
    /// times, including concurrently with completing arbitrations.
    pub fn shutdown(&self) {
        // Child tokens observe the root cancellation; arbitrations racing
        // with this call land on the cancelled select! arm.
        self.shutdown.cancel();
        self.pending.clear();
    }

    fn arbitrate_static(
        &self,
        settings: &ArbitrationSettings,
    ) -> Result<Vec<DiscoveredEntry>, ArbitrationError> {
        let capabilities = self
            .static_capabilities
            .as_ref()
            .ok_or(ArbitrationError::NoStaticCapabilities)?;

        let matching = capabilities
            .iter()
            .filter(|capability| {
                settings.domains.contains(&capability.entry.domain)
                    && capability.entry.interface_name == settings.interface_name
                    && capability.entry.provider_version == settings.proxy_version
                    && supports_on_change(
                        &capability.entry,
                        settings.discovery_qos.provider_must_support_on_change,
                    )
            })
            .cloned()
            .collect();

        Ok(apply_strategy(&settings.discovery_qos, matching))
    }

    /// One arbitration's whole attempt sequence: sequential discovery
    /// attempts raced against the overall deadline.
    async fn discover(
        &self,
        settings: &ArbitrationSettings,
    ) -> Result<Vec<DiscoveredEntry>, ArbitrationError> {
        let qos = &settings.discovery_qos;
        let deadline = Instant::now() + qos.discovery_timeout;
        let timeout = sleep_until(deadline);
        tokio::pin!(timeout);

        let mut discovered_versions: Vec<Version> = Vec::new();
        let mut last_error: Option<String> = None;

        loop {
            tokio::select! {
                biased;
                _ = &mut timeout => {
                    return Err(timeout_error(settings, &discovered_versions, last_error));
                }
                result = self.discovery.lookup(&settings.domains, &settings.interface_name, qos) => {
                    match result {
                        Ok(found) => {
                            let selected = apply_strategy(qos, found);
                            let mut compatible = Vec::new();
                            for candidate in selected {
                                if is_compatible(
                                    &candidate.entry,
                                    settings.proxy_version,
                                    qos.provider_must_support_on_change,
                                ) {
                                    compatible.push(candidate);
                                } else {
                                    record_version(
                                        &mut discovered_versions,
                                        candidate.entry.provider_version,
                                    );
                                }
                            }
                            if !compatible.is_empty() {
                                return Ok(compatible);
                            }
                        }
                        Err(error @ DiscoveryError::InvalidArgument(_)) => {
                            return Err(error.into());
                        }
                        Err(error) => {
                            tracing::debug!(%error, "discovery attempt failed, retrying");
                            last_error = Some(error.to_string());
                        }
                    }
                }
            }

            tokio::select! {
                biased;
                _ = &mut timeout => {
                    return Err(timeout_error(settings, &discovered_versions, last_error));
                }
                () = sleep(qos.discovery_retry_delay) => {}
            }
        }
    }
}

fn timeout_error(
    settings: &ArbitrationSettings,
    discovered_versions: &[Version],
    last_error: Option<String>,
) -> ArbitrationError {
    if discovered_versions.is_empty() {
        ArbitrationError::NoProviderFound {
            domains: settings.domains.clone(),
            interface_name: settings.interface_name.clone(),
            last_error,
        }
    } else {
        ArbitrationError::NoCompatibleProvider {
            domains: settings.domains.clone(),
            interface_name: settings.interface_name.clone(),
            discovered_versions: discovered_versions.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::{FixedParticipant, HighestPriority};
    use beacon_core::{DirectoryError, ProviderQos};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use std::time::Duration;

    struct StubDiscovery {
        script: Mutex<VecDeque<Result<Vec<DiscoveredEntry>, DiscoveryError>>>,
        fallback: Result<Vec<DiscoveredEntry>, DiscoveryError>,
        calls: AtomicUsize,
    }

    impl StubDiscovery {
        fn always(fallback: Result<Vec<DiscoveredEntry>, DiscoveryError>) -> Arc<Self> {
            Self::scripted(Vec::new(), fallback)
        }

        fn scripted(
            script: Vec<Result<Vec<DiscoveredEntry>, DiscoveryError>>,
            fallback: Result<Vec<DiscoveredEntry>, DiscoveryError>,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DiscoveryLookup for StubDiscovery {
        async fn lookup(
            &self,
            _domains: &[String],
            _interface_name: &str,
            _qos: &DiscoveryQos,
        ) -> Result<Vec<DiscoveredEntry>, DiscoveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.script.lock().unwrap().pop_front() {
                Some(result) => result,
                None => self.fallback.clone(),
            }
        }
    }

    fn provider(participant: &str, version: Version) -> DiscoveredEntry {
        DiscoveredEntry::new(
            false,
            DiscoveryEntry::new("d1", "i1", participant, version),
        )
    }

    fn fast_qos() -> DiscoveryQos {
        DiscoveryQos::new()
            .discovery_timeout(Duration::from_millis(200))
            .discovery_retry_delay(Duration::from_millis(50))
    }

    /// Settings with proxy version 1.1.
    fn settings(qos: DiscoveryQos) -> ArbitrationSettings {
        ArbitrationSettings::new(vec!["d1".to_string()], "i1", qos, Version::new(1, 1))
    }

    #[tokio::test]
    async fn test_static_arbitration_selects_matching_capability() {
        let discovery = StubDiscovery::always(Ok(Vec::new()));
        let capabilities = vec![
            provider("match", Version::new(1, 1)),
            DiscoveredEntry::new(
                false,
                DiscoveryEntry::new("other-domain", "i1", "p2", Version::new(1, 1)),
            ),
            DiscoveredEntry::new(
                false,
                DiscoveryEntry::new("d1", "other-interface", "p3", Version::new(1, 1)),
            ),
            provider("newer-minor", Version::new(1, 2)),
            provider("other-major", Version::new(2, 1)),
        ];
        let arbitrator = Arbitrator::with_static_capabilities(Arc::clone(&discovery), capabilities);

        let result = arbitrator
            .start_arbitration(settings(fast_qos()).static_arbitration(true))
            .await
            .unwrap();

        // static mode requires the exact proxy version
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].entry.participant_id, "match");
        assert_eq!(discovery.calls(), 0);
    }

    #[tokio::test]
    async fn test_static_arbitration_requires_capability_list() {
        let arbitrator = Arbitrator::new(StubDiscovery::always(Ok(Vec::new())));

        let result = arbitrator
            .start_arbitration(settings(fast_qos()).static_arbitration(true))
            .await;
        assert!(matches!(result, Err(ArbitrationError::NoStaticCapabilities)));
    }

    #[tokio::test]
    async fn test_static_arbitration_on_change_filter() {
        let with_on_change = DiscoveredEntry::new(
            false,
            DiscoveryEntry::new("d1", "i1", "subscribable", Version::new(1, 1))
                .qos(ProviderQos::new().supports_on_change_subscriptions(true)),
        );
        let arbitrator = Arbitrator::with_static_capabilities(
            StubDiscovery::always(Ok(Vec::new())),
            vec![provider("plain", Version::new(1, 1)), with_on_change],
        );

        let qos = fast_qos().provider_must_support_on_change(true);
        let result = arbitrator
            .start_arbitration(settings(qos).static_arbitration(true))
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].entry.participant_id, "subscribable");
    }

    #[tokio::test]
    async fn test_static_arbitration_applies_strategy() {
        let arbitrator = Arbitrator::with_static_capabilities(
            StubDiscovery::always(Ok(Vec::new())),
            vec![
                provider("p1", Version::new(1, 1)),
                provider("p2", Version::new(1, 1)),
            ],
        );

        let qos = fast_qos().arbitration_strategy(Arc::new(FixedParticipant::new("p2")));
        let result = arbitrator
            .start_arbitration(settings(qos).static_arbitration(true))
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].entry.participant_id, "p2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dynamic_resolves_compatible_provider() {
        let discovery = StubDiscovery::always(Ok(vec![provider("p1", Version::new(1, 1))]));
        let arbitrator = Arbitrator::new(Arc::clone(&discovery));

        let result = arbitrator.start_arbitration(settings(fast_qos())).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].entry.participant_id, "p1");
        assert_eq!(discovery.calls(), 1);
        assert_eq!(arbitrator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dynamic_accepts_higher_minor_version() {
        let discovery = StubDiscovery::always(Ok(vec![
            provider("too-old", Version::new(1, 0)),
            provider("newer-minor", Version::new(1, 2)),
        ]));
        let arbitrator = Arbitrator::new(discovery);

        let result = arbitrator.start_arbitration(settings(fast_qos())).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].entry.participant_id, "newer-minor");
    }

    #[tokio::test(start_paused = true)]
    async fn test_incompatible_providers_reject_at_timeout() {
        let discovery = StubDiscovery::always(Ok(vec![
            provider("p1", Version::new(1, 0)),
            provider("p2", Version::new(2, 0)),
        ]));
        let arbitrator = Arbitrator::new(Arc::clone(&discovery));

        let started = Instant::now();
        let error = arbitrator
            .start_arbitration(settings(fast_qos()))
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        // rejects at the 200ms timeout, never earlier
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(250));

        match error {
            ArbitrationError::NoCompatibleProvider {
                interface_name,
                discovered_versions,
                ..
            } => {
                assert_eq!(interface_name, "i1");
                // versions deduplicated across all four attempts
                assert_eq!(
                    discovered_versions,
                    vec![Version::new(1, 0), Version::new(2, 0)]
                );
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(discovery.calls(), 4);
        assert_eq!(arbitrator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_failures_retried_until_timeout() {
        let discovery = StubDiscovery::always(Err(DiscoveryError::directory(
            "lookup",
            DirectoryError::Unavailable("network down".to_string()),
        )));
        let arbitrator = Arbitrator::new(Arc::clone(&discovery));

        let error = arbitrator
            .start_arbitration(settings(fast_qos()))
            .await
            .unwrap_err();

        match error {
            ArbitrationError::NoProviderFound { last_error, .. } => {
                assert!(last_error.unwrap().contains("network down"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(discovery.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_then_success_resolves() {
        let discovery = StubDiscovery::scripted(
            vec![Err(DiscoveryError::directory(
                "lookup",
                DirectoryError::Timeout,
            ))],
            Ok(vec![provider("p1", Version::new(1, 1))]),
        );
        let arbitrator = Arbitrator::new(Arc::clone(&discovery));

        let started = Instant::now();
        let result = arbitrator.start_arbitration(settings(fast_qos())).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(discovery.calls(), 2);
        // one retry delay passed before the successful attempt
        assert_eq!(started.elapsed(), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_results_reject_with_no_provider_found() {
        let discovery = StubDiscovery::always(Ok(Vec::new()));
        let arbitrator = Arbitrator::new(discovery);

        let error = arbitrator
            .start_arbitration(settings(fast_qos()))
            .await
            .unwrap_err();
        match error {
            ArbitrationError::NoProviderFound { last_error, .. } => {
                assert!(last_error.is_none());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_argument_is_not_retried() {
        let discovery = StubDiscovery::always(Err(DiscoveryError::InvalidArgument(
            "multi-domain lookups are not supported".to_string(),
        )));
        let arbitrator = Arbitrator::new(Arc::clone(&discovery));

        let started = Instant::now();
        let error = arbitrator
            .start_arbitration(settings(fast_qos()))
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            ArbitrationError::Discovery(DiscoveryError::InvalidArgument(_))
        ));
        assert_eq!(discovery.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_strategy_orders_results() {
        let low = DiscoveredEntry::new(
            false,
            DiscoveryEntry::new("d1", "i1", "low", Version::new(1, 1))
                .qos(ProviderQos::new().priority(1)),
        );
        let high = DiscoveredEntry::new(
            false,
            DiscoveryEntry::new("d1", "i1", "high", Version::new(1, 1))
                .qos(ProviderQos::new().priority(5)),
        );
        let discovery = StubDiscovery::always(Ok(vec![low, high]));
        let arbitrator = Arbitrator::new(discovery);

        let qos = fast_qos().arbitration_strategy(Arc::new(HighestPriority));
        let result = arbitrator.start_arbitration(settings(qos)).await.unwrap();
        assert_eq!(result[0].entry.participant_id, "high");
        assert_eq!(result[1].entry.participant_id, "low");
    }

    #[tokio::test(start_paused = true)]
    async fn test_strategy_runs_before_version_filter() {
        // the strategy narrows to an incompatible provider even though a
        // compatible one was discovered
        let discovery = StubDiscovery::always(Ok(vec![
            provider("compatible", Version::new(1, 1)),
            provider("outdated", Version::new(1, 0)),
        ]));
        let arbitrator = Arbitrator::new(discovery);

        let qos = fast_qos().arbitration_strategy(Arc::new(FixedParticipant::new("outdated")));
        let error = arbitrator.start_arbitration(settings(qos)).await.unwrap_err();
        match error {
            ArbitrationError::NoCompatibleProvider {
                discovered_versions, ..
            } => assert_eq!(discovered_versions, vec![Version::new(1, 0)]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_pending_arbitrations() {
        let discovery = StubDiscovery::always(Ok(vec![provider("p1", Version::new(1, 0))]));
        let arbitrator = Arc::new(Arbitrator::new(discovery));

        let qos = DiscoveryQos::new()
            .discovery_timeout(Duration::from_secs(60))
            .discovery_retry_delay(Duration::from_millis(50));
        let handle = tokio::spawn({
            let arbitrator = Arc::clone(&arbitrator);
            let settings = settings(qos);
            async move { arbitrator.start_arbitration(settings).await }
        });

        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(arbitrator.pending_count(), 1);

        arbitrator.shutdown();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ArbitrationError::Shutdown)));
        assert_eq!(arbitrator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_refuses_new_arbitrations() {
        let discovery = StubDiscovery::always(Ok(vec![provider("p1", Version::new(1, 1))]));
        let arbitrator = Arbitrator::new(Arc::clone(&discovery));

        arbitrator.shutdown();

        let result = arbitrator.start_arbitration(settings(fast_qos())).await;
        assert!(matches!(result, Err(ArbitrationError::Shutdown)));
        assert_eq!(discovery.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_idempotent() {
        let arbitrator = Arbitrator::new(StubDiscovery::always(Ok(Vec::new())));
        arbitrator.shutdown();
        arbitrator.shutdown();
        assert_eq!(arbitrator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_arbitrations_are_independent() {
        let discovery = StubDiscovery::always(Ok(vec![provider("p1", Version::new(1, 1))]));
        let arbitrator = Arc::new(Arbitrator::new(discovery));

        let spawn_one = |arbitrator: Arc<Arbitrator<StubDiscovery>>| {
            tokio::spawn(async move { arbitrator.start_arbitration(settings(fast_qos())).await })
        };
        let first = spawn_one(Arc::clone(&arbitrator));
        let second = spawn_one(Arc::clone(&arbitrator));

        assert_eq!(first.await.unwrap().unwrap().len(), 1);
        assert_eq!(second.await.unwrap().unwrap().len(), 1);
        assert_eq!(arbitrator.pending_count(), 0);
    }
}
