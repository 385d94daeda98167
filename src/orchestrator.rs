//! The request orchestrator: drives the attempt loop for one logical
//! operation.
//!
//! Per operation the orchestrator resolves the route, sends through the
//! transport, classifies the outcome, consults the retry chain, applies the
//! decided side effects (route refresh, key re-extraction, page shrink),
//! waits, and resends until terminal success, terminal failure, or
//! cancellation. The transport is a narrow capability interface wrapped by
//! composition; the orchestrator never re-implements a broad client API.

use crate::config::ClientConfig;
use crate::context::OperationContext;
use crate::error::{Error, Result, RoutingError, TransportError};
use crate::retry::{
    default_chain, MismatchPolicy, PayloadSizePolicy, RetryContext, RetryDecision, RetryPolicy,
    StaleRoutingPolicy, ThrottlePolicy,
};
use crate::retry::FallbackPolicy;
use crate::routing::schema::{resolve_partition_key, PartitionKeyValue};
use crate::routing::RouteResolver;
use crate::types::{AttemptOutcome, ContainerId, OperationType, ResourceType};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Page size assumed when an oversized request carries no explicit page
/// size to shrink.
const DEFAULT_PAGE_SIZE: usize = 100;

/// A logical request against the partitioned store.
#[derive(Debug, Clone)]
pub struct Request {
    /// Target container.
    pub container: ContainerId,

    /// Resource URI handed to the transport.
    pub resource_uri: String,

    /// Kind of resource addressed.
    pub resource_type: ResourceType,

    /// Operation performed.
    pub operation_type: OperationType,

    /// Document body, used for partition key extraction when no explicit
    /// key is supplied.
    pub document: Option<Value>,

    /// Explicit partition key; overrides extraction from the document.
    pub partition_key: Option<PartitionKeyValue>,

    /// Serialized request payload.
    pub payload: Bytes,

    /// Page/batch size hint, shrunk on an oversize rejection.
    pub page_size: Option<usize>,
}

impl Request {
    /// Create a request against `container`.
    pub fn new(
        container: impl Into<ContainerId>,
        resource_type: ResourceType,
        operation_type: OperationType,
    ) -> Self {
        let container = container.into();
        let resource_uri = format!("/{}/docs", container);
        Self {
            container,
            resource_uri,
            resource_type,
            operation_type,
            document: None,
            partition_key: None,
            payload: Bytes::new(),
            page_size: None,
        }
    }

    /// Attach the document body.
    pub fn with_document(mut self, document: Value) -> Self {
        self.document = Some(document);
        self
    }

    /// Supply the partition key explicitly.
    pub fn with_partition_key(mut self, partition_key: PartitionKeyValue) -> Self {
        self.partition_key = Some(partition_key);
        self
    }

    /// Attach the serialized payload.
    pub fn with_payload(mut self, payload: Bytes) -> Self {
        self.payload = payload;
        self
    }

    /// Set the page/batch size hint.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Override the derived resource URI.
    pub fn with_resource_uri(mut self, uri: impl Into<String>) -> Self {
        self.resource_uri = uri.into();
        self
    }
}

/// One routed send handed to the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub resource_uri: String,
    pub resource_type: ResourceType,
    pub operation_type: OperationType,
    pub partition_key: PartitionKeyValue,
    /// Identifier of the physical partition the route resolved to.
    pub range_id: String,
    pub payload: Bytes,
    pub page_size: Option<usize>,
}

/// Raw response from the transport, not yet classified.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub sub_status: u32,
    pub retry_after: Option<Duration>,
    pub body: Bytes,
}

impl TransportResponse {
    /// A successful response carrying `body`.
    pub fn ok(body: Bytes) -> Self {
        Self {
            status: 200,
            sub_status: 0,
            retry_after: None,
            body,
        }
    }

    /// A failure response with the given codes.
    pub fn failure(status: u16, sub_status: u32) -> Self {
        Self {
            status,
            sub_status,
            retry_after: None,
            body: Bytes::new(),
        }
    }

    /// Set the retry-after hint.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// Narrow transport capability the orchestrator wraps.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one routed request and return the raw response, or a
    /// transport-level fault.
    async fn send(
        &self,
        request: &TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

type DefaultChain =
    StaleRoutingPolicy<MismatchPolicy<PayloadSizePolicy<ThrottlePolicy<FallbackPolicy>>>>;

/// Drives the attempt loop for logical operations.
pub struct RequestOrchestrator {
    transport: Arc<dyn Transport>,
    resolver: Arc<RouteResolver>,
    chain: DefaultChain,
}

impl RequestOrchestrator {
    /// Create an orchestrator over `transport` and `resolver`.
    pub fn new(
        transport: Arc<dyn Transport>,
        resolver: Arc<RouteResolver>,
        config: &ClientConfig,
    ) -> Self {
        Self {
            transport,
            resolver,
            chain: default_chain(&config.retry),
        }
    }

    /// Execute one logical operation to a terminal state.
    ///
    /// Returns the response payload on terminal success; a terminal failure
    /// carries the last classified outcome. Cancellation and the deadline
    /// are checked before every send and before every backoff wait.
    pub async fn execute(&self, ctx: &OperationContext, request: Request) -> Result<Bytes> {
        let mut retry_ctx = RetryContext::new(ctx.id());
        let mut partition_key = self.initial_partition_key(ctx, &request).await?;
        let mut page_size = request.page_size;
        let mut force_route_refresh = false;
        let mut last_fault: Option<TransportError> = None;

        loop {
            ctx.check()?;
            let route = self
                .resolver
                .resolve_route(ctx, &request.container, &partition_key, force_route_refresh)
                .await?;
            force_route_refresh = false;

            ctx.check()?;
            let send = TransportRequest {
                resource_uri: request.resource_uri.clone(),
                resource_type: request.resource_type,
                operation_type: request.operation_type,
                partition_key: partition_key.clone(),
                range_id: route.id.clone(),
                payload: request.payload.clone(),
                page_size,
            };
            let outcome = match self.transport.send(&send).await {
                Ok(response) => {
                    last_fault = None;
                    AttemptOutcome::classify(
                        response.status,
                        response.sub_status,
                        response.retry_after,
                        response.body,
                    )
                }
                Err(fault) => {
                    let outcome = AttemptOutcome::OtherFailure {
                        status: 0,
                        sub_status: 0,
                        message: fault.to_string(),
                    };
                    last_fault = Some(fault);
                    outcome
                }
            };
            retry_ctx.record_attempt(&outcome);

            let outcome = match outcome {
                AttemptOutcome::Success(body) => {
                    debug!(
                        operation_id = %ctx.id(),
                        attempts = retry_ctx.attempts,
                        range_id = %route.id,
                        "operation succeeded"
                    );
                    return Ok(body);
                }
                failure => failure,
            };

            match self.chain.should_retry(&outcome, &mut retry_ctx) {
                RetryDecision::Retry { delay, action } => {
                    if action.refresh_routing {
                        force_route_refresh = true;
                    }
                    if action.re_extract_key {
                        partition_key =
                            self.re_extract_partition_key(ctx, &request, partition_key).await?;
                    }
                    if action.shrink_page {
                        let current = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
                        page_size = Some((current / 2).max(1));
                    }
                    if !delay.is_zero() {
                        ctx.wait(delay).await?;
                        retry_ctx.record_delay(delay);
                    }
                }
                RetryDecision::DoNotRetry => {
                    return Err(terminal_failure(outcome, &retry_ctx, last_fault));
                }
            }
        }
    }

    async fn initial_partition_key(
        &self,
        ctx: &OperationContext,
        request: &Request,
    ) -> Result<PartitionKeyValue> {
        if let Some(pk) = &request.partition_key {
            return Ok(pk.clone());
        }
        let document = request.document.as_ref().ok_or_else(|| {
            Error::InvalidRequest(
                "request carries neither a partition key nor a document".into(),
            )
        })?;
        let schema = self
            .resolver
            .partition_key_schema(ctx, &request.container, false)
            .await?;
        resolve_partition_key(document, &schema)
    }

    /// Re-resolve the partition key after a mismatch: refresh the schema,
    /// then extract again. An explicitly supplied key is kept as-is.
    async fn re_extract_partition_key(
        &self,
        ctx: &OperationContext,
        request: &Request,
        current: PartitionKeyValue,
    ) -> Result<PartitionKeyValue> {
        let schema = self
            .resolver
            .partition_key_schema(ctx, &request.container, true)
            .await?;
        match (&request.partition_key, &request.document) {
            (Some(_), _) | (None, None) => Ok(current),
            (None, Some(document)) => resolve_partition_key(document, &schema),
        }
    }
}

fn terminal_failure(
    outcome: AttemptOutcome,
    retry_ctx: &RetryContext,
    last_fault: Option<TransportError>,
) -> Error {
    match outcome {
        AttemptOutcome::PartitionKeyMismatch => RoutingError::MismatchAfterRefresh.into(),
        AttemptOutcome::Throttled { .. }
        | AttemptOutcome::StaleRouting(_)
        | AttemptOutcome::EntityTooLarge => Error::RetriesExhausted {
            attempts: retry_ctx.attempts,
            last: outcome,
        },
        AttemptOutcome::OtherFailure {
            status,
            sub_status,
            message,
        } => match last_fault {
            Some(fault) => Error::Transport(fault),
            None => Error::Service {
                status,
                sub_status,
                message,
            },
        },
        AttemptOutcome::Success(_) => Error::Internal("success is not a failure".into()),
    }
}
