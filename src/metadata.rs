//! Collaborator interfaces for container metadata and encryption key
//! properties, plus the key-properties cache.
//!
//! Both collaborators are black boxes behind narrow async traits; the core
//! only wraps them in single-flight caches and interprets their errors.

use crate::cache::SingleFlightCache;
use crate::config::KeyPropertiesConfig;
use crate::context::OperationContext;
use crate::error::Result;
use crate::routing::range::PartitionKeyRange;
use crate::routing::schema::PartitionKeySchema;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

/// Container metadata collaborator.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fetch the partition key schema for a container.
    async fn fetch_partition_key_schema(&self, container: &str) -> Result<PartitionKeySchema>;

    /// Fetch the full overlapping-range set for a container's key space.
    async fn fetch_overlapping_ranges(&self, container: &str) -> Result<Vec<PartitionKeyRange>>;
}

/// Encryption key metadata collaborator.
#[async_trait]
pub trait KeyPropertiesProvider: Send + Sync {
    /// Fetch the properties of one encryption key.
    async fn fetch_key_properties(&self, container: &str, key_id: &str) -> Result<KeyProperties>;
}

/// Properties of a client encryption key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyProperties {
    /// Key identifier.
    pub key_id: String,

    /// Wrapping algorithm name.
    pub algorithm: String,

    /// The wrapped (encrypted) key material.
    pub wrapped_key: Bytes,
}

/// Cache for encryption key properties.
///
/// A fixed-TTL instance of the generic single-flight mechanism, independent
/// of the routing caches so key lookups never serialize against route
/// lookups. Force-refreshed on an external rotation signal or when a
/// decryption failure suggests the cached metadata went stale.
pub struct KeyPropertiesCache {
    provider: Arc<dyn KeyPropertiesProvider>,
    cache: SingleFlightCache<(String, String), KeyProperties>,
}

impl KeyPropertiesCache {
    /// Create a cache backed by `provider`.
    pub fn new(provider: Arc<dyn KeyPropertiesProvider>, config: &KeyPropertiesConfig) -> Self {
        Self {
            provider,
            cache: SingleFlightCache::new(Some(config.ttl)),
        }
    }

    /// Get key properties from cache, fetching on a miss or after expiry.
    pub async fn get(
        &self,
        ctx: &OperationContext,
        container: &str,
        key_id: &str,
    ) -> Result<Arc<KeyProperties>> {
        self.get_inner(ctx, container, key_id, false).await
    }

    /// Re-fetch key properties unconditionally, e.g. after a decryption
    /// failure classified as possibly-stale key metadata.
    pub async fn refresh(
        &self,
        ctx: &OperationContext,
        container: &str,
        key_id: &str,
    ) -> Result<Arc<KeyProperties>> {
        debug!(container, key_id, "force-refreshing key properties");
        self.get_inner(ctx, container, key_id, true).await
    }

    /// Drop the cached properties for one key, e.g. on a rotation
    /// notification. The next `get` re-fetches.
    pub fn invalidate(&self, container: &str, key_id: &str) {
        self.cache
            .remove(&(container.to_owned(), key_id.to_owned()));
    }

    async fn get_inner(
        &self,
        ctx: &OperationContext,
        container: &str,
        key_id: &str,
        force_refresh: bool,
    ) -> Result<Arc<KeyProperties>> {
        let provider = self.provider.clone();
        let container_owned = container.to_owned();
        let key_owned = key_id.to_owned();
        self.cache
            .get_or_add(
                ctx,
                &(container.to_owned(), key_id.to_owned()),
                move || async move {
                    provider
                        .fetch_key_properties(&container_owned, &key_owned)
                        .await
                },
                force_refresh,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeKeys {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl KeyPropertiesProvider for FakeKeys {
        async fn fetch_key_properties(
            &self,
            _container: &str,
            key_id: &str,
        ) -> Result<KeyProperties> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(KeyProperties {
                key_id: key_id.to_owned(),
                algorithm: "AEAD_AES_256_CBC_HMAC_SHA256".to_owned(),
                wrapped_key: Bytes::from(format!("material-{}", n)),
            })
        }
    }

    fn cache_with_ttl(ttl: Duration) -> (KeyPropertiesCache, Arc<FakeKeys>) {
        let provider = Arc::new(FakeKeys {
            fetches: AtomicUsize::new(0),
        });
        let cache = KeyPropertiesCache::new(
            provider.clone(),
            &KeyPropertiesConfig::default().with_ttl(ttl),
        );
        (cache, provider)
    }

    #[tokio::test]
    async fn test_key_properties_cached_within_ttl() {
        let (cache, provider) = cache_with_ttl(Duration::from_secs(3600));
        let ctx = OperationContext::new();

        let first = cache.get(&ctx, "orders", "key-1").await.unwrap();
        let second = cache.get(&ctx, "orders", "key-1").await.unwrap();
        assert_eq!(first.wrapped_key, second.wrapped_key);
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_properties_expire_after_ttl() {
        let (cache, provider) = cache_with_ttl(Duration::from_secs(3600));
        let ctx = OperationContext::new();

        cache.get(&ctx, "orders", "key-1").await.unwrap();
        tokio::time::advance(Duration::from_secs(3601)).await;
        cache.get(&ctx, "orders", "key-1").await.unwrap();
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache() {
        let (cache, provider) = cache_with_ttl(Duration::from_secs(3600));
        let ctx = OperationContext::new();

        let first = cache.get(&ctx, "orders", "key-1").await.unwrap();
        let refreshed = cache.refresh(&ctx, "orders", "key-1").await.unwrap();
        assert_ne!(first.wrapped_key, refreshed.wrapped_key);
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rotation_signal_invalidates_one_key() {
        let (cache, provider) = cache_with_ttl(Duration::from_secs(3600));
        let ctx = OperationContext::new();

        cache.get(&ctx, "orders", "key-1").await.unwrap();
        cache.get(&ctx, "orders", "key-2").await.unwrap();
        cache.invalidate("orders", "key-1");

        cache.get(&ctx, "orders", "key-1").await.unwrap(); // re-fetches
        cache.get(&ctx, "orders", "key-2").await.unwrap(); // still cached
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 3);
    }
}
