//! Conflict strategy model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Named strategy used to reconcile a local/remote divergence.
///
/// Tables can override the configured default with a custom handler; these
/// variants cover the built-in policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictStrategy {
    /// The remote copy replaces the local one
    ServerWins,
    /// The local copy overwrites the remote one
    ClientWins,
    /// The copy with the newer `updated_at` wins; ties go to the server
    TimestampBased,
}

impl ConflictStrategy {
    /// Strategy name as recorded in events and logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ServerWins => "SERVER_WINS",
            Self::ClientWins => "CLIENT_WINS",
            Self::TimestampBased => "TIMESTAMP_BASED",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_serde_representation() {
        for strategy in [
            ConflictStrategy::ServerWins,
            ConflictStrategy::ClientWins,
            ConflictStrategy::TimestampBased,
        ] {
            let as_json = serde_json::to_value(strategy).unwrap();
            assert_eq!(as_json, serde_json::Value::String(strategy.to_string()));
        }
    }
}
