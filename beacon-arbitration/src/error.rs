//! Arbitration error types.

use beacon_core::{DiscoveryError, Version};

fn format_versions(versions: &[Version]) -> String {
    versions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure of an arbitration request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ArbitrationError {
    /// No provider at all was found before the discovery timeout expired.
    #[error(
        "no provider found within discovery timeout for domains {domains:?}, interface \"{interface_name}\"{}",
        .last_error.as_ref().map(|e| format!(" (last error: {e})")).unwrap_or_default()
    )]
    NoProviderFound {
        /// Domains the arbitration searched.
        domains: Vec<String>,
        /// Interface the arbitration searched for.
        interface_name: String,
        /// Message of the last failed discovery attempt, if any failed.
        last_error: Option<String>,
    },

    /// Providers were found, but none matched the proxy's version and
    /// capability requirements before the discovery timeout expired.
    #[error(
        "no compatible provider found within discovery timeout for domains {domains:?}, interface \"{interface_name}\" (discovered versions: [{}])",
        format_versions(.discovered_versions)
    )]
    NoCompatibleProvider {
        /// Domains the arbitration searched.
        domains: Vec<String>,
        /// Interface the arbitration searched for.
        interface_name: String,
        /// Incompatible provider versions observed, deduplicated across
        /// all attempts.
        discovered_versions: Vec<Version>,
    },

    /// Static arbitration was requested but no static capability list is
    /// configured.
    #[error("no static capabilities configured for static arbitration")]
    NoStaticCapabilities,

    /// The arbitrator has been shut down.
    #[error("arbitrator is already shut down")]
    Shutdown,

    /// A non-retryable discovery error.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_compatible_provider_display() {
        let error = ArbitrationError::NoCompatibleProvider {
            domains: vec!["d1".to_string()],
            interface_name: "i1".to_string(),
            discovered_versions: vec![Version::new(1, 0), Version::new(2, 3)],
        };
        let message = error.to_string();
        assert!(message.contains("no compatible provider"));
        assert!(message.contains("1.0, 2.3"));
    }

    #[test]
    fn test_no_provider_found_carries_last_error() {
        let error = ArbitrationError::NoProviderFound {
            domains: vec!["d1".to_string()],
            interface_name: "i1".to_string(),
            last_error: Some("directory unavailable: network down".to_string()),
        };
        assert!(error.to_string().contains("network down"));
    }
}
