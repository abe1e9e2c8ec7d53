//! Collaborator trait definitions.
//!
//! The discovery core talks to three external collaborators: the remote
//! global directory (through short-lived proxies), the proxy builder that
//! constructs those proxies, and the local routing table. All calls are
//! asynchronous and may fail; the discovery layer wraps failures with the
//! failing operation's name before propagating them.

use std::future::Future;
use std::time::Duration;

use crate::address::TransportAddress;
use crate::entry::{DiscoveredEntry, DiscoveryEntry};
use crate::error::{DirectoryError, DiscoveryError};
use crate::qos::DiscoveryQos;

/// Client interface of the remote global capabilities directory.
pub trait GlobalDirectory: Send + Sync {
    /// Look up all entries registered for the given domains and interface.
    fn lookup(
        &self,
        domains: &[String],
        interface_name: &str,
    ) -> impl Future<Output = Result<Vec<DiscoveryEntry>, DirectoryError>> + Send;

    /// Register an entry (carrying its serialized transport address).
    fn add(
        &self,
        entry: DiscoveryEntry,
    ) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// Remove the entry registered under the given participant id.
    fn remove(
        &self,
        participant_id: &str,
    ) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// Refresh the last-seen timestamp of every entry registered by the
    /// given controller.
    fn touch(
        &self,
        controller_id: &str,
    ) -> impl Future<Output = Result<(), DirectoryError>> + Send;
}

/// Builds short-lived global directory proxies bound to a message TTL.
pub trait DirectoryProxyBuilder: Send + Sync {
    /// Proxy type produced by this builder.
    type Proxy: GlobalDirectory;

    /// Build a proxy whose messages carry the given TTL.
    fn build(
        &self,
        message_ttl: Duration,
    ) -> impl Future<Output = Result<Self::Proxy, DirectoryError>> + Send;
}

/// Lookup seam between the arbitrator and the discovery layer.
///
/// Implemented by the capability discovery; arbitration consumes it
/// generically so tests can substitute a stub.
pub trait DiscoveryLookup: Send + Sync {
    /// Resolve provider entries for the given domains and interface
    /// according to the discovery qos.
    fn lookup(
        &self,
        domains: &[String],
        interface_name: &str,
        qos: &DiscoveryQos,
    ) -> impl Future<Output = Result<Vec<DiscoveredEntry>, DiscoveryError>> + Send;
}

/// Local routing table.
///
/// Discovery registers a next hop for every remotely discovered entry
/// before handing the entry back to the caller.
pub trait RoutingTable: Send + Sync {
    /// Register the transport address to reach a participant through.
    fn add_next_hop(
        &self,
        participant_id: &str,
        address: &TransportAddress,
        is_globally_visible: bool,
    ) -> impl Future<Output = Result<(), DirectoryError>> + Send;
}
