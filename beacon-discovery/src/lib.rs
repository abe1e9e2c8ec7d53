//! # beacon-discovery
//!
//! Capability discovery for the Beacon RPC middleware.
//!
//! This crate provides:
//! - [`CapabilityDiscovery`] — lookup and registration across the local
//!   capability store, the global-entry cache, and the remote directory
//! - Discovery-scope dispatch (`LOCAL_ONLY`, `LOCAL_THEN_GLOBAL`,
//!   `LOCAL_AND_GLOBAL`, `GLOBAL_ONLY`)
//! - Queueing of global operations until the local transport address is
//!   known, drained exactly once in FIFO order

mod discovery;

pub use discovery::{CapabilityDiscovery, GLOBAL_DIRECTORY_TTL};
