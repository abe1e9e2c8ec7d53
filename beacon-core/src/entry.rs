//! Discovery entry types.
//!
//! A [`DiscoveryEntry`] describes one registered provider instance. Entries
//! are created when a local provider registers or when a remote lookup
//! returns results, and are replaced wholesale on re-registration.

use serde::{Deserialize, Serialize};

/// Provider or proxy interface version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    /// Incompatible interface revisions bump the major version.
    pub major_version: u32,

    /// Backward-compatible additions bump the minor version.
    pub minor_version: u32,
}

impl Version {
    /// Create a new version.
    #[must_use]
    pub const fn new(major_version: u32, minor_version: u32) -> Self {
        Self {
            major_version,
            minor_version,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major_version, self.minor_version)
    }
}

/// Visibility of a registered provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderScope {
    /// Visible only to consumers on the same runtime.
    Local,

    /// Registered with the global directory, visible deployment-wide.
    Global,
}

/// Free-form key/value parameter attached to a provider registration.
///
/// Custom parameters feed parameterized arbitration strategies (e.g. the
/// keyword strategy matches against a parameter named `keyword`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomParameter {
    /// Parameter name.
    pub name: String,

    /// Parameter value.
    pub value: String,
}

impl CustomParameter {
    /// Create a new custom parameter.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Quality-of-service attributes a provider registers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderQos {
    /// Custom parameters consulted by parameterized arbitration strategies.
    pub custom_parameters: Vec<CustomParameter>,

    /// Provider priority; higher values win under priority arbitration.
    pub priority: i64,

    /// Local or global visibility.
    pub scope: ProviderScope,

    /// Whether the provider can serve on-change subscriptions.
    pub supports_on_change_subscriptions: bool,
}

impl Default for ProviderQos {
    fn default() -> Self {
        Self {
            custom_parameters: Vec::new(),
            priority: 0,
            scope: ProviderScope::Local,
            supports_on_change_subscriptions: false,
        }
    }
}

impl ProviderQos {
    /// Create provider qos with defaults (local scope, priority 0).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider priority.
    #[must_use]
    pub fn priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Set the provider scope.
    #[must_use]
    pub fn scope(mut self, scope: ProviderScope) -> Self {
        self.scope = scope;
        self
    }

    /// Enable or disable on-change subscription support.
    #[must_use]
    pub fn supports_on_change_subscriptions(mut self, enabled: bool) -> Self {
        self.supports_on_change_subscriptions = enabled;
        self
    }

    /// Add a custom parameter.
    #[must_use]
    pub fn custom_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_parameters.push(CustomParameter::new(name, value));
        self
    }
}

/// Composite identity key of a discovery entry.
///
/// Two entries with equal keys describe the same registration and replace
/// each other in the capability store. The key is a field-wise struct, so
/// variable-length fields can never collide the way a concatenated string
/// key could (`"ab" + "c"` vs `"a" + "bc"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveryEntryKey {
    /// Registration domain.
    pub domain: String,

    /// Fully-qualified interface name.
    pub interface_name: String,

    /// Globally unique provider instance id.
    pub participant_id: String,

    /// Provider interface version.
    pub provider_version: Version,

    /// Id of the public key the registration was signed with.
    pub public_key_id: String,
}

/// A record describing one registered provider instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryEntry {
    /// Registration domain.
    pub domain: String,

    /// Fully-qualified interface name.
    pub interface_name: String,

    /// Globally unique provider instance id.
    pub participant_id: String,

    /// Provider interface version.
    pub provider_version: Version,

    /// Provider quality-of-service attributes.
    pub qos: ProviderQos,

    /// Wall-clock timestamp (ms since epoch) of the last registration or
    /// freshness refresh.
    pub last_seen_date_ms: u64,

    /// Wall-clock timestamp (ms since epoch) after which the registration
    /// is no longer valid. Carried on the wire; not evaluated locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date_ms: Option<u64>,

    /// Id of the public key the registration was signed with.
    pub public_key_id: String,

    /// Serialized transport address. Present on globally registered and
    /// remotely discovered entries; `None` for purely local registrations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl DiscoveryEntry {
    /// Create an entry with default qos and empty public key id.
    #[must_use]
    pub fn new(
        domain: impl Into<String>,
        interface_name: impl Into<String>,
        participant_id: impl Into<String>,
        provider_version: Version,
    ) -> Self {
        Self {
            domain: domain.into(),
            interface_name: interface_name.into(),
            participant_id: participant_id.into(),
            provider_version,
            qos: ProviderQos::default(),
            last_seen_date_ms: 0,
            expiry_date_ms: None,
            public_key_id: String::new(),
            address: None,
        }
    }

    /// Set the provider qos.
    #[must_use]
    pub fn qos(mut self, qos: ProviderQos) -> Self {
        self.qos = qos;
        self
    }

    /// Set the last-seen timestamp.
    #[must_use]
    pub fn last_seen_date_ms(mut self, timestamp_ms: u64) -> Self {
        self.last_seen_date_ms = timestamp_ms;
        self
    }

    /// Set the expiry timestamp.
    #[must_use]
    pub fn expiry_date_ms(mut self, timestamp_ms: u64) -> Self {
        self.expiry_date_ms = Some(timestamp_ms);
        self
    }

    /// Set the public key id.
    #[must_use]
    pub fn public_key_id(mut self, public_key_id: impl Into<String>) -> Self {
        self.public_key_id = public_key_id.into();
        self
    }

    /// Set the serialized transport address.
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// The composite identity key of this entry.
    #[must_use]
    pub fn key(&self) -> DiscoveryEntryKey {
        DiscoveryEntryKey {
            domain: self.domain.clone(),
            interface_name: self.interface_name.clone(),
            participant_id: self.participant_id.clone(),
            provider_version: self.provider_version,
            public_key_id: self.public_key_id.clone(),
        }
    }
}

/// A discovery entry annotated with its provenance.
///
/// Lookup results carry whether the entry came from the local registration
/// table (`is_local = true`) or from the global directory / cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEntry {
    /// The underlying discovery entry.
    pub entry: DiscoveryEntry,

    /// True when the entry originates from the local capability store.
    pub is_local: bool,
}

impl DiscoveredEntry {
    /// Annotate an entry with its provenance.
    #[must_use]
    pub fn new(is_local: bool, entry: DiscoveryEntry) -> Self {
        Self { entry, is_local }
    }

    /// Annotate a batch of entries with the same provenance.
    #[must_use]
    pub fn annotate_all(is_local: bool, entries: Vec<DiscoveryEntry>) -> Vec<Self> {
        entries.into_iter().map(|e| Self::new(is_local, e)).collect()
    }
}
