//! Client-side request routing and resilience for a partitioned database.
//!
//! This crate decides which physical partition a logical key maps to,
//! coalesces and caches metadata lookups against the remote service, and
//! retries failed operations according to their failure class. It stays
//! correct while the server-side partition topology changes underneath it
//! (splits, merges, migrations) and while many callers race for the same
//! cache entries.
//!
//! # Components
//!
//! - [`cache::SingleFlightCache`] — generic keyed cache guaranteeing at most
//!   one in-flight population per key.
//! - [`routing`] — partition key extraction from documents and range lookup
//!   over the hashed key space.
//! - [`retry`] — composable policies deciding whether and how a failed
//!   attempt is retried (throttling, stale routing, oversized requests,
//!   partition key mismatches).
//! - [`orchestrator::RequestOrchestrator`] — the attempt loop tying it all
//!   together over a narrow [`orchestrator::Transport`] interface.
//!
//! The wire transport, document serialization, and query execution are
//! external collaborators behind traits; this crate only decides where to
//! send a request, what to trust from cache, and whether to retry.
//!
//! # Example
//!
//! ```rust,no_run
//! use helmsman::{
//!     ClientConfig, OperationContext, OperationType, Request, RequestOrchestrator,
//!     ResourceType, RouteResolver,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run(
//! #     transport: Arc<dyn helmsman::Transport>,
//! #     metadata: Arc<dyn helmsman::MetadataProvider>,
//! # ) -> helmsman::Result<()> {
//! let config = ClientConfig::new();
//! let resolver = Arc::new(RouteResolver::new(metadata, &config.routing));
//! let orchestrator = RequestOrchestrator::new(transport, resolver, &config);
//!
//! let ctx = OperationContext::new().with_timeout(std::time::Duration::from_secs(10));
//! let request = Request::new("orders", ResourceType::Document, OperationType::Create)
//!     .with_document(json!({"tenant": "acme", "id": "o-1"}));
//! let _body = orchestrator.execute(&ctx, request).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod metadata;
pub mod orchestrator;
pub mod retry;
pub mod routing;
pub mod types;

pub use cache::SingleFlightCache;
pub use config::{ClientConfig, KeyPropertiesConfig, RetryConfig, RoutingConfig};
pub use context::OperationContext;
pub use error::{Error, Result, RoutingError, TransportError};
pub use metadata::{KeyProperties, KeyPropertiesCache, KeyPropertiesProvider, MetadataProvider};
pub use orchestrator::{
    Request, RequestOrchestrator, Transport, TransportRequest, TransportResponse,
};
pub use retry::{RetryAction, RetryContext, RetryDecision, RetryPolicy};
pub use routing::{
    effective_partition_key, resolve_partition_key, PartitionKeyComponent, PartitionKeyPath,
    PartitionKeyRange, PartitionKeySchema, PartitionKeyValue, RangeMap, RouteResolver,
};
pub use types::{AttemptOutcome, ContainerId, OperationType, ResourceType, StaleKind};
