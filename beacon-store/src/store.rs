//! In-memory capability index.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use beacon_core::{DiscoveryEntry, DiscoveryEntryKey};

/// An entry together with its registration time.
///
/// Entries provisioned statically carry no registration time and always
/// pass the age filter.
struct StoredEntry {
    entry: DiscoveryEntry,
    registered_at: Option<Instant>,
}

impl StoredEntry {
    fn is_fresh(&self, max_age: Option<Duration>) -> bool {
        match (self.registered_at, max_age) {
            (Some(registered_at), Some(max_age)) => registered_at.elapsed() <= max_age,
            _ => true,
        }
    }
}

/// The three index views. Secondary views hold identity keys, not entry
/// copies, so they can never point at an object the authoritative view has
/// already dropped. Every mutation updates all views under one write guard.
#[derive(Default)]
struct Inner {
    by_key: HashMap<DiscoveryEntryKey, StoredEntry>,
    by_participant: HashMap<String, DiscoveryEntryKey>,
    by_domain_interface: HashMap<(String, String), Vec<DiscoveryEntryKey>>,
}

impl Inner {
    fn insert(&mut self, entry: DiscoveryEntry, registered_at: Option<Instant>) {
        // A participant holds at most one registration. Evicting by
        // participant id also covers replacement by identity key, since the
        // key contains the participant id.
        if let Some(old_key) = self.by_participant.get(&entry.participant_id).cloned() {
            self.remove_key(&old_key);
        }

        let key = entry.key();
        self.by_participant
            .insert(entry.participant_id.clone(), key.clone());
        self.by_domain_interface
            .entry((entry.domain.clone(), entry.interface_name.clone()))
            .or_default()
            .push(key.clone());
        self.by_key.insert(
            key,
            StoredEntry {
                entry,
                registered_at,
            },
        );
    }

    fn remove_key(&mut self, key: &DiscoveryEntryKey) {
        self.by_key.remove(key);
        self.by_participant.remove(&key.participant_id);

        let bucket_key = (key.domain.clone(), key.interface_name.clone());
        if let Some(bucket) = self.by_domain_interface.get_mut(&bucket_key) {
            bucket.retain(|k| k != key);
            if bucket.is_empty() {
                self.by_domain_interface.remove(&bucket_key);
            }
        }
    }

    fn remove_participant(&mut self, participant_id: &str) -> bool {
        match self.by_participant.get(participant_id).cloned() {
            Some(key) => {
                self.remove_key(&key);
                true
            }
            None => false,
        }
    }
}

/// In-memory index of discovery entries.
///
/// Serves both as the authoritative local registration table and as a
/// time-bounded cache of remote entries. Entries are indexed three ways:
/// by identity key, by participant id, and by `(domain, interface)`.
/// Re-registering under an existing identity key (or participant id)
/// replaces the prior entry in all views atomically.
///
/// ## Example
///
/// ```rust
/// use beacon_core::{DiscoveryEntry, Version};
/// use beacon_store::CapabilityStore;
///
/// let store = CapabilityStore::new();
/// store.add(DiscoveryEntry::new("d1", "i1", "p1", Version::new(1, 0)));
///
/// let found = store.lookup_by_interface(&["d1".to_string()], "i1", None);
/// assert_eq!(found.len(), 1);
/// ```
#[derive(Default)]
pub struct CapabilityStore {
    inner: RwLock<Inner>,
}

impl CapabilityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with statically-provisioned entries.
    ///
    /// Initial entries carry no registration time and are therefore never
    /// filtered out by age.
    #[must_use]
    pub fn with_initial(entries: Vec<DiscoveryEntry>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            for entry in entries {
                inner.insert(entry, None);
            }
        }
        store
    }

    /// Insert an entry, replacing any prior registration with the same
    /// identity key or participant id.
    pub fn add(&self, entry: DiscoveryEntry) {
        tracing::debug!(
            participant = %entry.participant_id,
            domain = %entry.domain,
            interface = %entry.interface_name,
            "storing discovery entry"
        );
        self.inner.write().insert(entry, Some(Instant::now()));
    }

    /// Insert a batch of entries.
    pub fn add_all(&self, entries: Vec<DiscoveryEntry>) {
        let now = Instant::now();
        let mut inner = self.inner.write();
        for entry in entries {
            inner.insert(entry, Some(now));
        }
    }

    /// Remove the entry registered under the given participant id from all
    /// views. Removing an unknown id is a silent no-op.
    ///
    /// Returns whether an entry was removed.
    pub fn remove(&self, participant_id: &str) -> bool {
        let removed = self.inner.write().remove_participant(participant_id);
        if !removed {
            tracing::debug!(participant = participant_id, "remove: no entry found");
        }
        removed
    }

    /// Remove a batch of participants; unknown ids are skipped.
    ///
    /// Returns the number of entries removed.
    pub fn remove_all(&self, participant_ids: &[String]) -> usize {
        let mut inner = self.inner.write();
        participant_ids
            .iter()
            .filter(|id| inner.remove_participant(id))
            .count()
    }

    /// Look up all entries matching the interface across the given domains.
    ///
    /// Results are the union over the domains, each entry subject to the age
    /// filter; `max_age = None` disables age filtering. Order is stable for
    /// identical store state (per-domain insertion order).
    #[must_use]
    pub fn lookup_by_interface(
        &self,
        domains: &[String],
        interface_name: &str,
        max_age: Option<Duration>,
    ) -> Vec<DiscoveryEntry> {
        let inner = self.inner.read();
        let mut result = Vec::new();
        for domain in domains {
            let Some(bucket) = inner
                .by_domain_interface
                .get(&(domain.clone(), interface_name.to_string()))
            else {
                continue;
            };
            for key in bucket {
                if let Some(stored) = inner.by_key.get(key) {
                    if stored.is_fresh(max_age) {
                        result.push(stored.entry.clone());
                    }
                }
            }
        }
        result
    }

    /// Look up the entry registered under the given participant id, subject
    /// to the age filter.
    #[must_use]
    pub fn lookup_by_participant(
        &self,
        participant_id: &str,
        max_age: Option<Duration>,
    ) -> Option<DiscoveryEntry> {
        let inner = self.inner.read();
        let key = inner.by_participant.get(participant_id)?;
        let stored = inner.by_key.get(key)?;
        if stored.is_fresh(max_age) {
            Some(stored.entry.clone())
        } else {
            None
        }
    }

    /// Number of entries in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_key.len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::Version;

    fn entry(domain: &str, interface: &str, participant: &str, version: Version) -> DiscoveryEntry {
        DiscoveryEntry::new(domain, interface, participant, version)
    }

    fn domains(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_add_and_lookup_by_interface() {
        let store = CapabilityStore::new();
        store.add(entry("d1", "i1", "p1", Version::new(1, 0)));
        store.add(entry("d1", "i1", "p2", Version::new(1, 0)));
        store.add(entry("d1", "i2", "p3", Version::new(1, 0)));

        let found = store.lookup_by_interface(&domains(&["d1"]), "i1", None);
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_lookup_is_union_across_domains() {
        let store = CapabilityStore::new();
        store.add(entry("d1", "i1", "p1", Version::new(1, 0)));
        store.add(entry("d2", "i1", "p2", Version::new(1, 0)));
        store.add(entry("d3", "i1", "p3", Version::new(1, 0)));

        let found = store.lookup_by_interface(&domains(&["d1", "d2"]), "i1", None);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|e| e.domain != "d3"));
    }

    #[test]
    fn test_same_key_replaces_in_all_views() {
        let store = CapabilityStore::new();
        store.add(entry("d1", "i1", "p1", Version::new(1, 0)).last_seen_date_ms(1));
        store.add(entry("d1", "i1", "p1", Version::new(1, 0)).last_seen_date_ms(2));

        assert_eq!(store.len(), 1);
        let by_interface = store.lookup_by_interface(&domains(&["d1"]), "i1", None);
        assert_eq!(by_interface.len(), 1);
        assert_eq!(by_interface[0].last_seen_date_ms, 2);

        let by_participant = store.lookup_by_participant("p1", None).unwrap();
        assert_eq!(by_participant.last_seen_date_ms, 2);
    }

    #[test]
    fn test_participant_reregistration_evicts_old_version() {
        let store = CapabilityStore::new();
        store.add(entry("d1", "i1", "p1", Version::new(1, 0)));
        store.add(entry("d1", "i1", "p1", Version::new(1, 1)));

        // the 1.0 registration must be gone from every view
        assert_eq!(store.len(), 1);
        let found = store.lookup_by_interface(&domains(&["d1"]), "i1", None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].provider_version, Version::new(1, 1));
        assert_eq!(
            store.lookup_by_participant("p1", None).unwrap().provider_version,
            Version::new(1, 1)
        );
    }

    #[test]
    fn test_lookup_by_participant_never_more_than_one() {
        let store = CapabilityStore::new();
        store.add(entry("d1", "i1", "p1", Version::new(1, 0)));
        store.add(entry("d2", "i2", "p1", Version::new(2, 0)));

        // only the latest registration for the participant survives
        assert_eq!(store.len(), 1);
        let found = store.lookup_by_participant("p1", None).unwrap();
        assert_eq!(found.domain, "d2");
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let store = CapabilityStore::new();
        store.add(entry("d1", "i1", "p1", Version::new(1, 0)));
        assert!(!store.remove("unknown"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_clears_all_views() {
        let store = CapabilityStore::new();
        store.add(entry("d1", "i1", "p1", Version::new(1, 0)));
        assert!(store.remove("p1"));

        assert!(store.is_empty());
        assert!(store
            .lookup_by_interface(&domains(&["d1"]), "i1", None)
            .is_empty());
        assert!(store.lookup_by_participant("p1", None).is_none());
    }

    #[test]
    fn test_bulk_add_and_remove() {
        let store = CapabilityStore::new();
        store.add_all(vec![
            entry("d1", "i1", "p1", Version::new(1, 0)),
            entry("d1", "i1", "p2", Version::new(1, 0)),
            entry("d1", "i1", "p3", Version::new(1, 0)),
        ]);
        assert_eq!(store.len(), 3);

        let removed = store.remove_all(&domains(&["p1", "p3", "unknown"]));
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_age_filter_expires_entries() {
        let store = CapabilityStore::new();
        store.add(entry("d1", "i1", "p1", Version::new(1, 0)));

        std::thread::sleep(Duration::from_millis(10));

        let fresh = store.lookup_by_interface(&domains(&["d1"]), "i1", Some(Duration::from_secs(60)));
        assert_eq!(fresh.len(), 1);

        let stale = store.lookup_by_interface(&domains(&["d1"]), "i1", Some(Duration::from_millis(1)));
        assert!(stale.is_empty());
        assert!(store
            .lookup_by_participant("p1", Some(Duration::from_millis(1)))
            .is_none());
    }

    #[test]
    fn test_initial_entries_are_always_fresh() {
        let store =
            CapabilityStore::with_initial(vec![entry("d1", "i1", "p1", Version::new(1, 0))]);

        std::thread::sleep(Duration::from_millis(10));

        let found =
            store.lookup_by_interface(&domains(&["d1"]), "i1", Some(Duration::from_millis(1)));
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_lookup_order_is_stable() {
        let store = CapabilityStore::new();
        store.add(entry("d1", "i1", "p1", Version::new(1, 0)));
        store.add(entry("d1", "i1", "p2", Version::new(1, 0)));
        store.add(entry("d1", "i1", "p3", Version::new(1, 0)));

        let first = store.lookup_by_interface(&domains(&["d1"]), "i1", None);
        let second = store.lookup_by_interface(&domains(&["d1"]), "i1", None);
        assert_eq!(first, second);
    }
}
