//! Temporal storage model for a network observatory.
//!
//! This crate keeps the history of every observed network participant as a
//! chain of immutable, time-bounded snapshots, and keeps cheap historical
//! statistics in fixed-size round-robin buffers that are periodically rolled
//! up into day and month rows.
//!
//! It is `#![no_std]` with `extern crate alloc` so the same logic runs inside
//! the crawler service and in host-side tests. Persistence is left to the
//! caller through the repository traits in [`snapshot`], [`rollup`] and
//! [`scan`].

#![no_std]

extern crate alloc;

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod measurement;
pub mod observation;
pub mod rollup;
pub mod scan;
pub mod snapshot;
pub mod time;

pub use error::{HistoryError, HistoryResult};
pub use measurement::{EntityKind, Metric, ScanMeasurement};
pub use observation::Observed;
pub use time::{Timestamp, max_date};
