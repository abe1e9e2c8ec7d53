//! Error types for the discovery layer.

/// Failure reported by a directory, routing-table, or proxy-builder
/// collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DirectoryError {
    /// The remote directory could not be reached.
    #[error("directory unavailable: {0}")]
    Unavailable(String),

    /// The remote directory rejected the request.
    #[error("directory rejected request: {0}")]
    Rejected(String),

    /// The call did not complete in time.
    #[error("directory call timed out")]
    Timeout,
}

/// Main error type for discovery operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DiscoveryError {
    /// Malformed call; never retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A serialized transport address could not be parsed or produced.
    #[error("invalid transport address: {0}")]
    InvalidAddress(String),

    /// Construction of the directory proxy failed.
    #[error("failed to create global directory proxy: {0}")]
    ProxyBuild(DirectoryError),

    /// A directory operation failed; carries the failing operation's name.
    #[error("error calling operation \"{operation}\" of the global directory: {source}")]
    Directory {
        /// Name of the directory operation that failed.
        operation: &'static str,
        /// The underlying collaborator failure.
        source: DirectoryError,
    },

    /// Registration of a next hop with the routing table failed.
    #[error("failed to register next hop for participant {participant_id}: {source}")]
    Routing {
        /// Participant whose next hop could not be registered.
        participant_id: String,
        /// The underlying collaborator failure.
        source: DirectoryError,
    },
}

impl DiscoveryError {
    /// Wrap a collaborator failure with the failing operation's name.
    #[must_use]
    pub fn directory(operation: &'static str, source: DirectoryError) -> Self {
        Self::Directory { operation, source }
    }
}
