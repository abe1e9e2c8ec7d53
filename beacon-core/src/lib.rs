//! # beacon-core
//!
//! Core types, traits, and error definitions for the Beacon discovery layer.
//!
//! This crate provides:
//! - The discovery data model (`DiscoveryEntry`, `Version`, `ProviderQos`)
//! - Discovery policy (`DiscoveryQos`, `DiscoveryScope`, `ArbitrationStrategy`)
//! - Transport addresses and their wire representation (`TransportAddress`)
//! - Collaborator traits (`GlobalDirectory`, `DirectoryProxyBuilder`,
//!   `RoutingTable`)
//! - Error types (`DiscoveryError`, `DirectoryError`)

mod address;
mod directory;
mod entry;
mod error;
mod qos;

pub use address::TransportAddress;
pub use directory::{DirectoryProxyBuilder, DiscoveryLookup, GlobalDirectory, RoutingTable};
pub use entry::{
    CustomParameter, DiscoveredEntry, DiscoveryEntry, DiscoveryEntryKey, ProviderQos,
    ProviderScope, Version,
};
pub use error::{DirectoryError, DiscoveryError};
pub use qos::{ArbitrationStrategy, DiscoveryQos, DiscoveryScope};
