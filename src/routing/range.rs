//! Partition key ranges and effective-key hashing.
//!
//! The service owns the key space as a set of half-open ranges
//! `[min_inclusive, max_exclusive)` over hex-encoded hash positions. The
//! client hashes a resolved partition key into the same space and walks the
//! cached range set to find the owning physical partition.

use crate::error::{Result, RoutingError};
use crate::routing::schema::{PartitionKeyComponent, PartitionKeyValue};
use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Inclusive lower bound of the full key space.
pub const FULL_RANGE_MIN: &str = "";

/// Exclusive upper bound of the full key space. Longer than any effective
/// key, so every key sorts strictly below it.
pub const FULL_RANGE_MAX: &str = "FFFFFFFFFFFFFFFFFF";

/// A half-open interval of the hashed key space owned by one physical
/// partition at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionKeyRange {
    /// Service-assigned range identifier.
    pub id: String,

    /// Inclusive lower bound (hex position).
    pub min_inclusive: String,

    /// Exclusive upper bound (hex position).
    pub max_exclusive: String,

    /// Identifiers of the ranges this one replaced, present during and after
    /// a split or merge. A cached range whose children exist is stale.
    #[serde(default)]
    pub parents: Vec<String>,
}

impl PartitionKeyRange {
    /// Create a range covering `[min_inclusive, max_exclusive)`.
    pub fn new(
        id: impl Into<String>,
        min_inclusive: impl Into<String>,
        max_exclusive: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            min_inclusive: min_inclusive.into(),
            max_exclusive: max_exclusive.into(),
            parents: Vec::new(),
        }
    }

    /// A range covering the entire key space.
    pub fn full(id: impl Into<String>) -> Self {
        Self::new(id, FULL_RANGE_MIN, FULL_RANGE_MAX)
    }

    /// Whether `effective_key` falls inside this range.
    pub fn contains(&self, effective_key: &str) -> bool {
        self.min_inclusive.as_str() <= effective_key
            && effective_key < self.max_exclusive.as_str()
    }
}

/// Hash a partition key value into its effective (routable) form.
///
/// The components are folded into one XxHash64 position over a canonical
/// byte encoding, rendered as fixed-width uppercase hex so positions order
/// the same way as the range bounds.
pub fn effective_partition_key(value: &PartitionKeyValue) -> String {
    let mut hasher = XxHash64::with_seed(0);
    for component in value.components() {
        match component {
            PartitionKeyComponent::String(s) => {
                hasher.write_u8(0x01);
                hasher.write(s.as_bytes());
                // Terminator keeps ("a","b") distinct from ("ab","").
                hasher.write_u8(0xFF);
            }
            PartitionKeyComponent::Number(n) => {
                hasher.write_u8(0x02);
                hasher.write(&n.to_be_bytes());
            }
            PartitionKeyComponent::Bool(b) => {
                hasher.write_u8(if *b { 0x03 } else { 0x04 });
            }
            PartitionKeyComponent::Null => hasher.write_u8(0x05),
            PartitionKeyComponent::None => hasher.write_u8(0x06),
        }
    }
    format!("{:016X}", hasher.finish())
}

/// The full overlapping-range set for one container's key space.
///
/// Invalidated wholesale on a stale-routing signal: overlap recomputation
/// requires a full re-fetch, so partial invalidation is never attempted.
#[derive(Debug, Clone)]
pub struct RangeMap {
    /// Ranges sorted by `min_inclusive`.
    ranges: Vec<PartitionKeyRange>,
}

impl RangeMap {
    /// Build a map from a fetched range set. Ranges are sorted; overlapping
    /// bounds are rejected as malformed metadata.
    pub fn new(mut ranges: Vec<PartitionKeyRange>) -> Result<Self> {
        if ranges.is_empty() {
            return Err(RoutingError::MalformedSchema("empty range set".into()).into());
        }
        ranges.sort_by(|a, b| a.min_inclusive.cmp(&b.min_inclusive));
        for pair in ranges.windows(2) {
            if pair[1].min_inclusive < pair[0].max_exclusive {
                return Err(RoutingError::MalformedSchema(format!(
                    "ranges {} and {} overlap",
                    pair[0].id, pair[1].id
                ))
                .into());
            }
        }
        Ok(Self { ranges })
    }

    /// Find the range containing `effective_key`, if any.
    pub fn range_for(&self, effective_key: &str) -> Option<&PartitionKeyRange> {
        // Last range whose min is <= key, then a containment check against
        // its max.
        let idx = self
            .ranges
            .partition_point(|r| r.min_inclusive.as_str() <= effective_key);
        idx.checked_sub(1)
            .map(|i| &self.ranges[i])
            .filter(|r| r.contains(effective_key))
    }

    /// Look up a range by its identifier.
    pub fn by_id(&self, id: &str) -> Option<&PartitionKeyRange> {
        self.ranges.iter().find(|r| r.id == id)
    }

    /// All ranges, ordered by their lower bound.
    pub fn ranges(&self) -> &[PartitionKeyRange] {
        &self.ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn split_map() -> RangeMap {
        RangeMap::new(vec![
            PartitionKeyRange::new("1", "8000000000000000", FULL_RANGE_MAX),
            PartitionKeyRange::new("0", FULL_RANGE_MIN, "8000000000000000"),
        ])
        .unwrap()
    }

    #[test]
    fn test_range_containment_is_half_open() {
        let range = PartitionKeyRange::new("0", "40", "80");
        assert!(range.contains("40"));
        assert!(range.contains("7F"));
        assert!(!range.contains("80"));
        assert!(!range.contains("3F"));
    }

    #[test]
    fn test_full_range_covers_every_key() {
        let range = PartitionKeyRange::full("0");
        let key = effective_partition_key(&PartitionKeyValue::string("anything"));
        assert!(range.contains(&key));
        assert!(range.contains("0000000000000000"));
        assert!(range.contains("FFFFFFFFFFFFFFFF"));
    }

    #[test]
    fn test_range_map_sorts_and_looks_up() {
        let map = split_map();
        assert_eq!(map.ranges()[0].id, "0");
        assert_eq!(map.range_for("0000000000000001").unwrap().id, "0");
        assert_eq!(map.range_for("8000000000000000").unwrap().id, "1");
        assert_eq!(map.range_for("FFFFFFFFFFFFFFFF").unwrap().id, "1");
    }

    #[test]
    fn test_range_map_miss_outside_coverage() {
        let map = RangeMap::new(vec![PartitionKeyRange::new("0", "40", "80")]).unwrap();
        assert!(map.range_for("30").is_none());
        assert!(map.range_for("80").is_none());
    }

    #[test]
    fn test_overlapping_ranges_rejected() {
        let result = RangeMap::new(vec![
            PartitionKeyRange::new("0", "00", "50"),
            PartitionKeyRange::new("1", "40", "80"),
        ]);
        assert!(matches!(
            result,
            Err(Error::Routing(RoutingError::MalformedSchema(_)))
        ));
    }

    #[test]
    fn test_empty_range_set_rejected() {
        assert!(RangeMap::new(Vec::new()).is_err());
    }

    #[test]
    fn test_effective_key_is_deterministic_and_fixed_width() {
        let a = effective_partition_key(&PartitionKeyValue::string("acme"));
        let b = effective_partition_key(&PartitionKeyValue::string("acme"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_effective_key_distinguishes_components() {
        use crate::routing::schema::PartitionKeyComponent as C;
        let ab = effective_partition_key(&PartitionKeyValue::new(vec![
            C::String("a".into()),
            C::String("b".into()),
        ]));
        let ab_joined =
            effective_partition_key(&PartitionKeyValue::new(vec![C::String("ab".into())]));
        assert_ne!(ab, ab_joined);

        let none = effective_partition_key(&PartitionKeyValue::new(vec![C::None]));
        let null = effective_partition_key(&PartitionKeyValue::new(vec![C::Null]));
        assert_ne!(none, null);
    }

    #[test]
    fn test_every_key_lands_in_a_split_map() {
        let map = split_map();
        for i in 0..200 {
            let key =
                effective_partition_key(&PartitionKeyValue::string(format!("tenant-{}", i)));
            assert!(map.range_for(&key).is_some(), "key {} not covered", key);
        }
    }
}
