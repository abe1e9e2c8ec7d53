//! Arbitration strategy collection.
//!
//! Every strategy is a pure selection function over annotated discovery
//! entries. Parameterized strategies (keyword, fixed participant) take
//! their parameter at construction and are handed to [`DiscoveryQos`]
//! by the caller.
//!
//! [`DiscoveryQos`]: beacon_core::DiscoveryQos

use beacon_core::{ArbitrationStrategy, DiscoveredEntry};

/// Name of the custom parameter the keyword strategy matches against.
const KEYWORD_PARAMETER: &str = "keyword";

/// Keeps all candidates, unordered.
pub struct Nothing;

impl ArbitrationStrategy for Nothing {
    fn select(&self, candidates: Vec<DiscoveredEntry>) -> Vec<DiscoveredEntry> {
        candidates
    }

    fn name(&self) -> &str {
        "nothing"
    }
}

/// Orders candidates by provider priority, highest first.
pub struct HighestPriority;

impl ArbitrationStrategy for HighestPriority {
    fn select(&self, mut candidates: Vec<DiscoveredEntry>) -> Vec<DiscoveredEntry> {
        candidates.sort_by(|a, b| b.entry.qos.priority.cmp(&a.entry.qos.priority));
        candidates
    }

    fn name(&self) -> &str {
        "highest-priority"
    }
}

/// Orders candidates by their last-seen timestamp, most recent first.
pub struct LastSeen;

impl ArbitrationStrategy for LastSeen {
    fn select(&self, mut candidates: Vec<DiscoveredEntry>) -> Vec<DiscoveredEntry> {
        candidates.sort_by(|a, b| b.entry.last_seen_date_ms.cmp(&a.entry.last_seen_date_ms));
        candidates
    }

    fn name(&self) -> &str {
        "last-seen"
    }
}

/// Keeps candidates registered with a matching `keyword` custom parameter.
pub struct Keyword {
    keyword: String,
}

impl Keyword {
    /// Create a keyword strategy matching the given keyword.
    #[must_use]
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
        }
    }
}

impl ArbitrationStrategy for Keyword {
    fn select(&self, candidates: Vec<DiscoveredEntry>) -> Vec<DiscoveredEntry> {
        candidates
            .into_iter()
            .filter(|candidate| {
                candidate
                    .entry
                    .qos
                    .custom_parameters
                    .iter()
                    .any(|p| p.name == KEYWORD_PARAMETER && p.value == self.keyword)
            })
            .collect()
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// Keeps the candidate registered under a fixed participant id.
pub struct FixedParticipant {
    participant_id: String,
}

impl FixedParticipant {
    /// Create a strategy selecting the given participant.
    #[must_use]
    pub fn new(participant_id: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
        }
    }
}

impl ArbitrationStrategy for FixedParticipant {
    fn select(&self, candidates: Vec<DiscoveredEntry>) -> Vec<DiscoveredEntry> {
        candidates
            .into_iter()
            .filter(|candidate| candidate.entry.participant_id == self.participant_id)
            .collect()
    }

    fn name(&self) -> &str {
        "fixed-participant"
    }
}
