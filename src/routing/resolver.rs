//! Route resolution over the single-flight metadata caches.
//!
//! The resolver owns two independent cache instances: one for partition key
//! schemas and one for overlapping-range sets, both keyed by container
//! identity. They deliberately share no coordination state, so a schema
//! fetch never serializes against a range fetch.

use crate::cache::SingleFlightCache;
use crate::config::RoutingConfig;
use crate::context::OperationContext;
use crate::error::{Result, RoutingError};
use crate::metadata::MetadataProvider;
use crate::routing::range::{effective_partition_key, PartitionKeyRange, RangeMap};
use crate::routing::schema::{PartitionKeySchema, PartitionKeyValue};
use crate::types::ContainerId;
use std::sync::Arc;
use tracing::debug;

/// Resolves logical partition keys to the physical partition owning them.
pub struct RouteResolver {
    metadata: Arc<dyn MetadataProvider>,
    schema_cache: SingleFlightCache<ContainerId, PartitionKeySchema>,
    range_cache: SingleFlightCache<ContainerId, RangeMap>,
}

impl RouteResolver {
    /// Create a resolver backed by `metadata`.
    pub fn new(metadata: Arc<dyn MetadataProvider>, config: &RoutingConfig) -> Self {
        Self {
            metadata,
            schema_cache: SingleFlightCache::new(config.schema_ttl),
            range_cache: SingleFlightCache::new(config.routing_ttl),
        }
    }

    /// The partition key schema for `container`, from cache or metadata.
    pub async fn partition_key_schema(
        &self,
        ctx: &OperationContext,
        container: &ContainerId,
        force_refresh: bool,
    ) -> Result<Arc<PartitionKeySchema>> {
        let metadata = self.metadata.clone();
        let id = container.clone();
        self.schema_cache
            .get_or_add(
                ctx,
                container,
                move || async move { metadata.fetch_partition_key_schema(&id).await },
                force_refresh,
            )
            .await
    }

    /// The full overlapping-range set for `container`, from cache or
    /// metadata. `force_refresh` replaces the whole set.
    pub async fn range_map(
        &self,
        ctx: &OperationContext,
        container: &ContainerId,
        force_refresh: bool,
    ) -> Result<Arc<RangeMap>> {
        let metadata = self.metadata.clone();
        let id = container.clone();
        self.range_cache
            .get_or_add(
                ctx,
                container,
                move || async move {
                    let ranges = metadata.fetch_overlapping_ranges(&id).await?;
                    RangeMap::new(ranges)
                },
                force_refresh,
            )
            .await
    }

    /// Find the physical partition owning `partition_key`.
    ///
    /// On a cache miss against a set that was not just fetched, the range
    /// set is re-fetched once before giving up: the cached set may simply
    /// predate a topology change.
    pub async fn resolve_route(
        &self,
        ctx: &OperationContext,
        container: &ContainerId,
        partition_key: &PartitionKeyValue,
        force_refresh: bool,
    ) -> Result<PartitionKeyRange> {
        let effective_key = effective_partition_key(partition_key);
        let map = self.range_map(ctx, container, force_refresh).await?;

        if let Some(range) = map.range_for(&effective_key) {
            return Ok(range.clone());
        }

        if !force_refresh {
            debug!(
                container = %container,
                effective_key = %effective_key,
                "no cached range for key, re-fetching range set"
            );
            let map = self.range_map(ctx, container, true).await?;
            if let Some(range) = map.range_for(&effective_key) {
                return Ok(range.clone());
            }
        }

        Err(RoutingError::NoRangeForKey {
            container: container.clone(),
            effective_key,
        }
        .into())
    }

    /// Drop the cached range set for `container`. The next lookup re-fetches.
    pub fn invalidate_routing(&self, container: &ContainerId) {
        self.range_cache.remove(container);
    }

    /// Drop the cached schema for `container`.
    pub fn invalidate_schema(&self, container: &ContainerId) {
        self.schema_cache.remove(container);
    }
}
