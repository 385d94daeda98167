//! Error types for the routing and resilience layer.

use crate::types::AttemptOutcome;
use thiserror::Error;

/// Result type alias for routing layer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the routing and resilience layer.
///
/// The type is `Clone` so a single failed cache population can be handed to
/// every caller coalesced onto that population round.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation's deadline elapsed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    /// Partition key resolution or route lookup errors.
    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    /// Transport-level fault (timeout, connection failure).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Metadata fetch failed.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// A retryable failure class whose attempt budget expired.
    /// Carries the last observed outcome for diagnostics.
    #[error("retries exhausted after {attempts} attempts, last outcome: {last}")]
    RetriesExhausted { attempts: u32, last: AttemptOutcome },

    /// The service rejected the request with a non-retryable status.
    #[error("service error: status {status}, sub-status {sub_status}: {message}")]
    Service {
        status: u16,
        sub_status: u32,
        message: String,
    },

    /// The request is malformed on the client side.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Partition key resolution and route lookup errors.
///
/// These are fatal client errors; none of them is retried by the policy
/// chain.
#[derive(Error, Debug, Clone)]
pub enum RoutingError {
    /// A partition key path resolved to a value kind that cannot be part of
    /// a partition key (array or object).
    #[error("unsupported partition key component at {path}: {kind}")]
    UnsupportedComponent { path: String, kind: &'static str },

    /// The partition key schema read from container metadata is unusable.
    #[error("malformed partition key schema: {0}")]
    MalformedSchema(String),

    /// No cached range covers the effective partition key, even after a
    /// forced refresh.
    #[error("no partition key range for key {effective_key} in container {container}")]
    NoRangeForKey {
        container: String,
        effective_key: String,
    },

    /// The service reported a partition key mismatch again after the routing
    /// metadata was already force-refreshed this operation. This indicates a
    /// wrong schema or a corrupt payload, not stale routing.
    #[error("partition key mismatch persisted after routing refresh")]
    MismatchAfterRefresh,
}

/// Transport-level faults raised below the classification boundary.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// The request timed out before a response arrived.
    #[error("request timed out")]
    Timeout,

    /// The connection to the service could not be established or was lost.
    #[error("connection failed: {reason}")]
    ConnectionFailed { reason: String },

    /// The response could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Whether this error is a caller-initiated termination (cancellation or
    /// deadline) rather than a failure of the operation itself.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }

    /// Whether this error is a fatal client-side error that no amount of
    /// retrying can fix.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Routing(_) | Error::InvalidRequest(_) | Error::Config(_)
        )
    }
}
