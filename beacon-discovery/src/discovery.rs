//! Capability discovery over the local store and the global directory.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::future::try_join_all;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use beacon_core::{
    DirectoryProxyBuilder, DiscoveredEntry, DiscoveryEntry, DiscoveryError, DiscoveryLookup,
    DiscoveryQos, DiscoveryScope, GlobalDirectory, ProviderScope, RoutingTable, TransportAddress,
};
use beacon_store::CapabilityStore;

/// Message TTL for calls to the global directory.
///
/// Directory registrations must survive long broker downtimes, so the
/// directory proxy uses a 30-day TTL rather than the transport default.
pub const GLOBAL_DIRECTORY_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Wall-clock now in milliseconds since the epoch.
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn queue_dropped(operation: &'static str) -> DiscoveryError {
    DiscoveryError::directory(
        operation,
        beacon_core::DirectoryError::Unavailable("queued operation dropped".to_string()),
    )
}

/// A global-bound operation captured while no local transport address
/// exists yet.
enum QueuedOperation {
    Add {
        entry: DiscoveryEntry,
        tx: oneshot::Sender<Result<(), DiscoveryError>>,
    },
    Lookup {
        domains: Vec<String>,
        interface_name: String,
        ttl: Duration,
        base: Vec<DiscoveredEntry>,
        tx: oneshot::Sender<Result<Vec<DiscoveredEntry>, DiscoveryError>>,
    },
}

/// Address readiness. Global operations queue while `NotReady`; the single
/// transition to `Ready` drains the queue exactly once, in FIFO order.
enum AddressState {
    NotReady { queued: Vec<QueuedOperation> },
    Ready { serialized: String },
}

/// Outcome of the queue-or-execute decision made under the state lock.
enum Dispatch<P, T> {
    Direct { own_address: String, payload: P },
    Queued(oneshot::Receiver<Result<T, DiscoveryError>>),
}

struct Inner<R, B> {
    local_store: Arc<CapabilityStore>,
    global_cache: Arc<CapabilityStore>,
    routing_table: R,
    proxy_builder: B,
    address_state: Mutex<AddressState>,
}

/// Orchestrates lookups and registrations across the local capability
/// store and the remote global directory.
///
/// Dispatch is driven by the request's [`DiscoveryScope`]. Remote results
/// are merged into a dedicated global-cache store and registered with the
/// routing table before they are handed back to the caller. Operations
/// that need the global directory before the local transport address is
/// known are queued and executed, in order, when
/// [`global_address_ready`](Self::global_address_ready) fires.
pub struct CapabilityDiscovery<R, B> {
    inner: Arc<Inner<R, B>>,
}

impl<R, B> Clone for CapabilityDiscovery<R, B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, B> CapabilityDiscovery<R, B>
where
    R: RoutingTable + 'static,
    B: DirectoryProxyBuilder + 'static,
{
    /// Create a capability discovery over the given stores and
    /// collaborators. The proxy builder is expected to be bound to the
    /// global directory's domain.
    #[must_use]
    pub fn new(
        local_store: Arc<CapabilityStore>,
        global_cache: Arc<CapabilityStore>,
        routing_table: R,
        proxy_builder: B,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                local_store,
                global_cache,
                routing_table,
                proxy_builder,
                address_state: Mutex::new(AddressState::NotReady { queued: Vec::new() }),
            }),
        }
    }

    /// The local registration table.
    #[must_use]
    pub fn local_store(&self) -> &Arc<CapabilityStore> {
        &self.inner.local_store
    }

    /// The cache of remotely discovered entries.
    #[must_use]
    pub fn global_cache(&self) -> &Arc<CapabilityStore> {
        &self.inner.global_cache
    }

    /// Signal that the local transport address is available.
    ///
    /// The first call performs the one-shot `NotReady → Ready` transition
    /// and drains every queued global operation sequentially, in the order
    /// it was queued. Later calls only refresh the stored address.
    pub fn global_address_ready(&self, address: &TransportAddress) -> Result<(), DiscoveryError> {
        let serialized = address.to_json()?;

        let queued = {
            let mut state = self.inner.address_state.lock();
            match &mut *state {
                AddressState::Ready {
                    serialized: current,
                } => {
                    tracing::debug!("global address refreshed after readiness");
                    *current = serialized;
                    return Ok(());
                }
                AddressState::NotReady { queued } => {
                    let drained = std::mem::take(queued);
                    *state = AddressState::Ready {
                        serialized: serialized.clone(),
                    };
                    drained
                }
            }
        };

        if queued.is_empty() {
            return Ok(());
        }

        tracing::info!(
            queued = queued.len(),
            "global address ready, draining queued operations"
        );

        let this = self.clone();
        tokio::spawn(async move {
            for operation in queued {
                match operation {
                    QueuedOperation::Add { entry, tx } => {
                        let result = this.add_global(entry, serialized.clone()).await;
                        let _ = tx.send(result);
                    }
                    QueuedOperation::Lookup {
                        domains,
                        interface_name,
                        ttl,
                        base,
                        tx,
                    } => {
                        let result = this
                            .lookup_global(&domains, &interface_name, ttl, base, &serialized)
                            .await;
                        let _ = tx.send(result);
                    }
                }
            }
        });

        Ok(())
    }

    /// Resolve provider entries for one domain and interface according to
    /// the discovery scope.
    ///
    /// Exactly one domain is supported per call; multi-domain lookups are
    /// rejected with [`DiscoveryError::InvalidArgument`].
    pub async fn lookup(
        &self,
        domains: &[String],
        interface_name: &str,
        qos: &DiscoveryQos,
    ) -> Result<Vec<DiscoveredEntry>, DiscoveryError> {
        if domains.len() != 1 {
            return Err(DiscoveryError::InvalidArgument(format!(
                "multi-domain lookups are not supported (got {} domains)",
                domains.len()
            )));
        }

        match qos.discovery_scope {
            DiscoveryScope::LocalOnly => {
                let local = self
                    .inner
                    .local_store
                    .lookup_by_interface(domains, interface_name, None);
                Ok(DiscoveredEntry::annotate_all(true, local))
            }

            DiscoveryScope::LocalThenGlobal => {
                let local = self
                    .inner
                    .local_store
                    .lookup_by_interface(domains, interface_name, None);
                if !local.is_empty() {
                    return Ok(DiscoveredEntry::annotate_all(true, local));
                }

                let cached = self.inner.global_cache.lookup_by_interface(
                    domains,
                    interface_name,
                    Some(qos.cache_max_age),
                );
                if !cached.is_empty() {
                    return Ok(DiscoveredEntry::annotate_all(false, cached));
                }

                self.lookup_global_or_queue(
                    domains.to_vec(),
                    interface_name.to_string(),
                    GLOBAL_DIRECTORY_TTL,
                    Vec::new(),
                )
                .await
            }

            DiscoveryScope::LocalAndGlobal => {
                let local = DiscoveredEntry::annotate_all(
                    true,
                    self.inner
                        .local_store
                        .lookup_by_interface(domains, interface_name, None),
                );

                let cached = self.inner.global_cache.lookup_by_interface(
                    domains,
                    interface_name,
                    Some(qos.cache_max_age),
                );
                if cached.is_empty() {
                    return self
                        .lookup_global_or_queue(
                            domains.to_vec(),
                            interface_name.to_string(),
                            GLOBAL_DIRECTORY_TTL,
                            local,
                        )
                        .await;
                }

                let mut combined = local;
                combined.extend(DiscoveredEntry::annotate_all(false, cached));
                Ok(combined)
            }

            DiscoveryScope::GlobalOnly => {
                let cached = self.inner.global_cache.lookup_by_interface(
                    domains,
                    interface_name,
                    Some(qos.cache_max_age),
                );
                if !cached.is_empty() {
                    return Ok(DiscoveredEntry::annotate_all(false, cached));
                }

                self.lookup_global_or_queue(
                    domains.to_vec(),
                    interface_name.to_string(),
                    GLOBAL_DIRECTORY_TTL,
                    Vec::new(),
                )
                .await
            }
        }
    }

    /// Register a provider entry.
    ///
    /// The entry is always stored locally first, stamped with the current
    /// wall-clock time. Globally scoped entries are additionally forwarded
    /// to the global directory, carrying the serialized local address —
    /// queued until the address is ready.
    pub async fn add(&self, mut entry: DiscoveryEntry) -> Result<(), DiscoveryError> {
        entry.last_seen_date_ms = now_ms();
        self.inner.local_store.add(entry.clone());

        match entry.qos.scope {
            ProviderScope::Local => Ok(()),
            ProviderScope::Global => {
                // Decide under the lock, execute outside it.
                let dispatch = {
                    let mut state = self.inner.address_state.lock();
                    match &mut *state {
                        AddressState::NotReady { queued } => {
                            let (tx, rx) = oneshot::channel();
                            queued.push(QueuedOperation::Add { entry, tx });
                            Dispatch::Queued(rx)
                        }
                        AddressState::Ready { serialized } => Dispatch::Direct {
                            own_address: serialized.clone(),
                            payload: entry,
                        },
                    }
                };

                match dispatch {
                    Dispatch::Direct {
                        own_address,
                        payload,
                    } => self.add_global(payload, own_address).await,
                    Dispatch::Queued(rx) => rx.await.map_err(|_| queue_dropped("add"))?,
                }
            }
        }
    }

    /// Unregister the provider entry with the given participant id.
    ///
    /// Removes from the local store; if no local entry was found the
    /// removal is conservatively forwarded to the global directory as well
    /// (the registration may stem from a previous process incarnation).
    /// Otherwise the global directory is only involved for globally scoped
    /// entries.
    pub async fn remove(&self, participant_id: &str) -> Result<(), DiscoveryError> {
        let local = self
            .inner
            .local_store
            .lookup_by_participant(participant_id, None);
        self.inner.local_store.remove(participant_id);

        match local {
            None => {
                tracing::warn!(
                    participant = participant_id,
                    "remove: no entry in local capability store, removing from global directory"
                );
                self.remove_global(participant_id).await
            }
            Some(entry) if entry.qos.scope == ProviderScope::Global => {
                self.remove_global(participant_id).await
            }
            Some(_) => Ok(()),
        }
    }

    /// Forward a freshness refresh for all entries registered by the given
    /// controller to the global directory.
    pub async fn touch(&self, controller_id: &str, ttl: Duration) -> Result<(), DiscoveryError> {
        let proxy = self.build_proxy(ttl).await?;
        proxy
            .touch(controller_id)
            .await
            .map_err(|e| DiscoveryError::directory("touch", e))
    }

    async fn build_proxy(&self, ttl: Duration) -> Result<B::Proxy, DiscoveryError> {
        self.inner
            .proxy_builder
            .build(ttl)
            .await
            .map_err(DiscoveryError::ProxyBuild)
    }

    async fn add_global(
        &self,
        mut entry: DiscoveryEntry,
        own_address: String,
    ) -> Result<(), DiscoveryError> {
        entry.address = Some(own_address);
        let proxy = self.build_proxy(GLOBAL_DIRECTORY_TTL).await?;
        proxy
            .add(entry)
            .await
            .map_err(|e| DiscoveryError::directory("add", e))
    }

    async fn remove_global(&self, participant_id: &str) -> Result<(), DiscoveryError> {
        let proxy = self.build_proxy(GLOBAL_DIRECTORY_TTL).await?;
        proxy
            .remove(participant_id)
            .await
            .map_err(|e| DiscoveryError::directory("remove", e))
    }

    /// Perform a remote lookup, or queue it while the address is not ready.
    async fn lookup_global_or_queue(
        &self,
        domains: Vec<String>,
        interface_name: String,
        ttl: Duration,
        base: Vec<DiscoveredEntry>,
    ) -> Result<Vec<DiscoveredEntry>, DiscoveryError> {
        let dispatch = {
            let mut state = self.inner.address_state.lock();
            match &mut *state {
                AddressState::NotReady { queued } => {
                    let (tx, rx) = oneshot::channel();
                    queued.push(QueuedOperation::Lookup {
                        domains,
                        interface_name,
                        ttl,
                        base,
                        tx,
                    });
                    Dispatch::Queued(rx)
                }
                AddressState::Ready { serialized } => Dispatch::Direct {
                    own_address: serialized.clone(),
                    payload: (domains, interface_name, base),
                },
            }
        };

        match dispatch {
            Dispatch::Direct {
                own_address,
                payload: (domains, interface_name, base),
            } => {
                self.lookup_global(&domains, &interface_name, ttl, base, &own_address)
                    .await
            }
            Dispatch::Queued(rx) => rx.await.map_err(|_| queue_dropped("lookup"))?,
        }
    }

    /// Query the global directory and integrate the results.
    ///
    /// Entries carrying the caller's own global address are excluded.
    /// Every surviving entry has its transport address parsed and a next
    /// hop registered with the routing table; all registrations complete
    /// before the lookup resolves. Surviving entries are merged into the
    /// global cache and appended to `base`, annotated as non-local.
    async fn lookup_global(
        &self,
        domains: &[String],
        interface_name: &str,
        ttl: Duration,
        mut base: Vec<DiscoveredEntry>,
        own_address: &str,
    ) -> Result<Vec<DiscoveredEntry>, DiscoveryError> {
        let proxy = self.build_proxy(ttl).await?;
        let found = proxy
            .lookup(domains, interface_name)
            .await
            .map_err(|e| DiscoveryError::directory("lookup", e))?;

        let mut discovered = Vec::new();
        let mut next_hops = Vec::new();

        for entry in found {
            if entry.address.as_deref() == Some(own_address) {
                continue;
            }

            let Some(serialized) = entry.address.as_deref() else {
                tracing::error!(
                    participant = %entry.participant_id,
                    "skipping global entry without transport address"
                );
                continue;
            };

            match TransportAddress::from_json(serialized) {
                Ok(address) => {
                    let is_globally_visible = entry.qos.scope == ProviderScope::Global;
                    next_hops.push((entry.participant_id.clone(), address, is_globally_visible));
                    discovered.push(entry);
                }
                Err(error) => {
                    tracing::error!(
                        participant = %entry.participant_id,
                        %error,
                        "skipping global entry with unparsable transport address"
                    );
                }
            }
        }

        let routing_table = &self.inner.routing_table;
        try_join_all(next_hops.iter().map(
            |(participant_id, address, is_globally_visible)| async move {
                routing_table
                    .add_next_hop(participant_id, address, *is_globally_visible)
                    .await
                    .map_err(|e| DiscoveryError::Routing {
                        participant_id: participant_id.clone(),
                        source: e,
                    })
            },
        ))
        .await?;

        self.inner.global_cache.add_all(discovered.clone());

        base.extend(DiscoveredEntry::annotate_all(false, discovered));
        Ok(base)
    }
}

impl<R, B> DiscoveryLookup for CapabilityDiscovery<R, B>
where
    R: RoutingTable + 'static,
    B: DirectoryProxyBuilder + 'static,
{
    async fn lookup(
        &self,
        domains: &[String],
        interface_name: &str,
        qos: &DiscoveryQos,
    ) -> Result<Vec<DiscoveredEntry>, DiscoveryError> {
        CapabilityDiscovery::lookup(self, domains, interface_name, qos).await
    }
}
