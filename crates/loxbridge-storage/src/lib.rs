//! Storage layer for Loxbridge.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`TimeSeriesStore`] | redb-backed samples keyed by `(series, timestamp)` |
//! | [`TimeSeriesClient`] | fire-and-forget [`loxbridge_core::SampleStore`] with optional retention |

pub mod client;
pub mod error;
pub mod timeseries;

pub use client::{StoreConfig, TimeSeriesClient, RETENTION_INTERVAL};
pub use error::{Error, Result};
pub use timeseries::{parse_value, series_key, Sample, TimeSeriesStore};
