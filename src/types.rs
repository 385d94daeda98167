//! Core wire-level types and the attempt classification boundary.
//!
//! The mapping from raw `(status, sub_status)` pairs to [`AttemptOutcome`]
//! variants is the seam between the transport and the retry policy chain.
//! It is a pure function kept as an explicit table so the policy decision
//! logic never has to look at raw status codes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Container identifier (the unit of partition key space).
pub type ContainerId = String;

/// HTTP-style status codes this client classifies.
pub mod status {
    /// Request rate too large; carries an optional retry-after hint.
    pub const TOO_MANY_REQUESTS: u16 = 429;
    /// The request payload exceeded the service limit.
    pub const ENTITY_TOO_LARGE: u16 = 413;
    /// The addressed partition key range no longer exists in its old form.
    pub const GONE: u16 = 410;
    /// Client-side request error; sub-status disambiguates.
    pub const BAD_REQUEST: u16 = 400;
}

/// Sub-status codes refining a status code.
pub mod sub_status {
    /// No sub-status supplied.
    pub const NONE: u32 = 0;
    /// A partition split is in progress for the addressed range.
    pub const SPLIT_IN_PROGRESS: u32 = 1000;
    /// The supplied partition key does not match the document body.
    pub const PARTITION_KEY_MISMATCH: u32 = 1001;
    /// The addressed partition key range is gone (children exist).
    pub const RANGE_GONE: u32 = 1002;
    /// A partition split is completing for the addressed range.
    pub const COMPLETING_SPLIT: u32 = 1007;
    /// A partition migration is completing for the addressed range.
    pub const COMPLETING_MIGRATION: u32 = 1008;
}

/// Sub-class of a stale-routing outcome.
///
/// All kinds are handled identically by the policy chain (full route cache
/// refresh); the distinction exists only for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StaleKind {
    /// A split is in progress for the addressed range.
    SplitInProgress,
    /// A split is completing for the addressed range.
    SplitCompleting,
    /// A migration is completing for the addressed range.
    MigrationCompleting,
    /// The range is gone outright.
    RangeGone,
}

impl std::fmt::Display for StaleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StaleKind::SplitInProgress => write!(f, "split_in_progress"),
            StaleKind::SplitCompleting => write!(f, "split_completing"),
            StaleKind::MigrationCompleting => write!(f, "migration_completing"),
            StaleKind::RangeGone => write!(f, "range_gone"),
        }
    }
}

/// The kind of resource a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    /// A document within a container.
    Document,
    /// Container metadata itself.
    Container,
}

/// The operation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Read,
    Create,
    Replace,
    Upsert,
    Delete,
    Query,
}

/// Classified result of one send attempt.
///
/// This classification, not the raw status code, drives retry decisions.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// The attempt succeeded; carries the response payload.
    Success(Bytes),
    /// The service throttled the request, optionally saying how long to wait.
    Throttled { retry_after: Option<Duration> },
    /// The request payload exceeded the service limit.
    EntityTooLarge,
    /// The cached routing metadata is stale.
    StaleRouting(StaleKind),
    /// The supplied partition key does not match the document.
    PartitionKeyMismatch,
    /// Any other failure, kept with its raw codes for diagnostics.
    OtherFailure {
        status: u16,
        sub_status: u32,
        message: String,
    },
}

impl AttemptOutcome {
    /// Classify a raw response into an outcome.
    ///
    /// This is the single place raw status codes are interpreted; everything
    /// above this boundary works on [`AttemptOutcome`] values.
    pub fn classify(
        status_code: u16,
        sub: u32,
        retry_after: Option<Duration>,
        body: Bytes,
    ) -> Self {
        match status_code {
            200..=299 => AttemptOutcome::Success(body),
            status::TOO_MANY_REQUESTS => AttemptOutcome::Throttled { retry_after },
            status::ENTITY_TOO_LARGE => AttemptOutcome::EntityTooLarge,
            status::GONE => AttemptOutcome::StaleRouting(match sub {
                sub_status::SPLIT_IN_PROGRESS => StaleKind::SplitInProgress,
                sub_status::COMPLETING_SPLIT => StaleKind::SplitCompleting,
                sub_status::COMPLETING_MIGRATION => StaleKind::MigrationCompleting,
                _ => StaleKind::RangeGone,
            }),
            status::BAD_REQUEST if sub == sub_status::PARTITION_KEY_MISMATCH => {
                AttemptOutcome::PartitionKeyMismatch
            }
            _ => AttemptOutcome::OtherFailure {
                status: status_code,
                sub_status: sub,
                message: String::from_utf8_lossy(&body).into_owned(),
            },
        }
    }

    /// Whether this outcome is terminal success.
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success(_))
    }
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptOutcome::Success(_) => write!(f, "success"),
            AttemptOutcome::Throttled { retry_after } => {
                write!(f, "throttled (retry_after: {:?})", retry_after)
            }
            AttemptOutcome::EntityTooLarge => write!(f, "entity too large"),
            AttemptOutcome::StaleRouting(kind) => write!(f, "stale routing ({})", kind),
            AttemptOutcome::PartitionKeyMismatch => write!(f, "partition key mismatch"),
            AttemptOutcome::OtherFailure {
                status, sub_status, ..
            } => write!(f, "failure (status {}, sub-status {})", status, sub_status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(status_code: u16, sub: u32) -> AttemptOutcome {
        AttemptOutcome::classify(status_code, sub, None, Bytes::new())
    }

    #[test]
    fn test_success_range() {
        assert!(classify(200, 0).is_success());
        assert!(classify(201, 0).is_success());
        assert!(classify(299, 0).is_success());
        assert!(!classify(300, 0).is_success());
    }

    #[test]
    fn test_throttled_carries_retry_after() {
        let outcome = AttemptOutcome::classify(
            429,
            0,
            Some(Duration::from_millis(200)),
            Bytes::new(),
        );
        match outcome {
            AttemptOutcome::Throttled { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_millis(200)));
            }
            other => panic!("expected Throttled, got {}", other),
        }
    }

    #[test]
    fn test_entity_too_large() {
        assert!(matches!(classify(413, 0), AttemptOutcome::EntityTooLarge));
    }

    #[test]
    fn test_gone_sub_status_table() {
        let cases = [
            (sub_status::SPLIT_IN_PROGRESS, StaleKind::SplitInProgress),
            (sub_status::COMPLETING_SPLIT, StaleKind::SplitCompleting),
            (sub_status::COMPLETING_MIGRATION, StaleKind::MigrationCompleting),
            (sub_status::RANGE_GONE, StaleKind::RangeGone),
            // Unknown sub-status on a Gone still means the route is stale.
            (9999, StaleKind::RangeGone),
            (sub_status::NONE, StaleKind::RangeGone),
        ];
        for (sub, expected) in cases {
            match classify(410, sub) {
                AttemptOutcome::StaleRouting(kind) => assert_eq!(kind, expected),
                other => panic!("expected StaleRouting for sub {}, got {}", sub, other),
            }
        }
    }

    #[test]
    fn test_partition_key_mismatch() {
        assert!(matches!(
            classify(400, sub_status::PARTITION_KEY_MISMATCH),
            AttemptOutcome::PartitionKeyMismatch
        ));
        // A plain 400 is not a mismatch.
        assert!(matches!(
            classify(400, 0),
            AttemptOutcome::OtherFailure { status: 400, .. }
        ));
    }

    #[test]
    fn test_other_failure_keeps_codes() {
        match classify(503, 21) {
            AttemptOutcome::OtherFailure {
                status, sub_status, ..
            } => {
                assert_eq!(status, 503);
                assert_eq!(sub_status, 21);
            }
            other => panic!("expected OtherFailure, got {}", other),
        }
    }
}
