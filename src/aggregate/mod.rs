//! Round-robin measurement aggregation.
//!
//! Each (entity, metric) pair owns a fixed number of buckets, one per calendar
//! period, reused cyclically. Updating is bounded by the bucket count whatever
//! the time elapsed since the previous measurement, and storage never grows.
//!
//! | Strategy      | Buckets | Period | Window   |
//! |---------------|---------|--------|----------|
//! | [`HOURLY_24`] | 24      | hour   | 24 hours |
//! | [`DAILY_30`]  | 30      | day    | 30 days  |

pub mod book;
pub mod round_robin;
pub mod strategy;

pub use book::AggregateBook;
pub use round_robin::{AggregateRow, ReadableBucket, RoundRobinAggregate};
pub use strategy::{BucketStrategy, DAILY_30, HOURLY_24, MAX_BUCKETS};
