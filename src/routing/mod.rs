//! Partition routing: key extraction, range math and route resolution.

pub mod range;
pub mod resolver;
pub mod schema;

pub use range::{effective_partition_key, PartitionKeyRange, RangeMap};
pub use resolver::RouteResolver;
pub use schema::{
    resolve_partition_key, PartitionKeyComponent, PartitionKeyPath, PartitionKeySchema,
    PartitionKeyValue,
};
