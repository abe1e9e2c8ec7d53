//! # Beacon
//!
//! Client-side service discovery and arbitration for a distributed RPC
//! middleware.
//!
//! Beacon resolves version-compatible provider endpoints for a consumer by
//! combining three sources: the local registration table, a time-bounded
//! cache of the remote global directory, and on-demand remote lookups —
//! with bounded retry and timeout semantics and a user-selectable
//! discovery scope and arbitration strategy.
//!
//! ## Quick start
//!
//! ```rust
//! use beacon::{CapabilityStore, DiscoveryEntry, DiscoveryQos, Version};
//!
//! // the local registration table
//! let store = CapabilityStore::new();
//! store.add(DiscoveryEntry::new("on-board", "vehicle/Gps", "gps-1", Version::new(1, 0)));
//!
//! let found = store.lookup_by_interface(&["on-board".to_string()], "vehicle/Gps", None);
//! assert_eq!(found.len(), 1);
//!
//! // policy for a discovery request
//! let qos = DiscoveryQos::new()
//!     .discovery_timeout(std::time::Duration::from_secs(30));
//! assert!(qos.arbitration_strategy.is_none());
//! ```
//!
//! ## Architecture
//!
//! Beacon is composed of several crates:
//!
//! - [`beacon-core`](beacon_core) - data model, policy, collaborator traits,
//!   errors
//! - [`beacon-store`](beacon_store) - the in-memory capability index
//! - [`beacon-discovery`](beacon_discovery) - scope dispatch, global cache,
//!   remote directory access
//! - [`beacon-arbitration`](beacon_arbitration) - retrying arbitration and
//!   the strategy collection

// Re-export core types
pub use beacon_core::{
    CustomParameter, DirectoryError, DiscoveredEntry, DiscoveryEntry, DiscoveryEntryKey,
    DiscoveryError, ProviderQos, ProviderScope, TransportAddress, Version,
};

// Re-export policy
pub use beacon_core::{ArbitrationStrategy, DiscoveryQos, DiscoveryScope};

// Re-export collaborator traits
pub use beacon_core::{DirectoryProxyBuilder, DiscoveryLookup, GlobalDirectory, RoutingTable};

// Re-export store
pub use beacon_store::CapabilityStore;

// Re-export discovery
pub use beacon_discovery::{CapabilityDiscovery, GLOBAL_DIRECTORY_TTL};

// Re-export arbitration
pub use beacon_arbitration::{strategies, ArbitrationError, ArbitrationSettings, Arbitrator};

/// Prelude module for convenient imports.
///
/// ```rust
/// use beacon::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ArbitrationSettings, Arbitrator, CapabilityDiscovery, CapabilityStore, DiscoveredEntry,
        DiscoveryEntry, DiscoveryQos, DiscoveryScope, ProviderQos, ProviderScope, Version,
    };

    pub use beacon_core::DiscoveryLookup;
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
