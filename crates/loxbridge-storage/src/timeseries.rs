//! Time series storage of Miniserver status values using redb.
//!
//! Each status message becomes one [`Sample`] in the series named by its
//! `system/room/device/feature` path. Numeric values are stored as JSON
//! numbers, anything else as a string.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use loxbridge_core::StatusMessage;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// key = (series, timestamp in microseconds), value = Sample (JSON)
const SAMPLES_TABLE: TableDefinition<(&str, i64), &[u8]> = TableDefinition::new("samples");

/// A single stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Unix timestamp in microseconds.
    pub timestamp: i64,
    /// Number or string.
    pub value: serde_json::Value,
}

impl Sample {
    pub fn new(timestamp: i64, value: serde_json::Value) -> Self {
        Self { timestamp, value }
    }

    /// Build a sample from a raw Miniserver value.
    pub fn from_raw(timestamp: i64, raw: &str) -> Self {
        Self::new(timestamp, parse_value(raw))
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.value.as_f64()
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.timestamp).unwrap_or_default()
    }
}

/// Parse a Miniserver value: finite numbers become JSON numbers.
pub fn parse_value(raw: &str) -> serde_json::Value {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| serde_json::Value::String(raw.to_string()))
}

/// Series name of a status message.
pub fn series_key(message: &StatusMessage) -> String {
    message.path()
}

/// Time series store.
pub struct TimeSeriesStore {
    db: Database,
}

impl TimeSeriesStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = if path.exists() {
            Database::open(path)?
        } else {
            Database::create(path)?
        };
        Self::with_database(db)
    }

    /// Create an in-memory store.
    pub fn memory() -> Result<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::with_database(db)
    }

    fn with_database(db: Database) -> Result<Self> {
        let write_txn = db.begin_write()?;
        write_txn.open_table(SAMPLES_TABLE)?;
        write_txn.commit()?;
        Ok(Self { db })
    }

    /// Write a single sample.
    pub async fn write(&self, series: &str, sample: &Sample) -> Result<()> {
        self.write_batch(series, std::slice::from_ref(sample)).await
    }

    /// Write several samples of one series in a single transaction.
    pub async fn write_batch(&self, series: &str, samples: &[Sample]) -> Result<()> {
        if series.is_empty() {
            return Err(Error::InvalidInput("series must not be empty".to_string()));
        }

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SAMPLES_TABLE)?;
            for sample in samples {
                let value = serde_json::to_vec(sample)?;
                table.insert((series, sample.timestamp), value.as_slice())?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Write the value of a status message.
    pub async fn write_status(&self, message: &StatusMessage, timestamp: i64) -> Result<()> {
        let sample = Sample::from_raw(timestamp, &message.value);
        self.write(&series_key(message), &sample).await
    }

    /// Samples of a series with `start <= timestamp <= end`, oldest first.
    pub async fn query_range(&self, series: &str, start: i64, end: i64) -> Result<Vec<Sample>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SAMPLES_TABLE)?;

        let mut samples = Vec::new();
        for result in table.range((series, start)..=(series, end))? {
            let (_key, value) = result?;
            samples.push(serde_json::from_slice(value.value())?);
        }
        Ok(samples)
    }

    /// Most recent sample of a series.
    pub async fn latest(&self, series: &str) -> Result<Option<Sample>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SAMPLES_TABLE)?;

        let mut range = table.range((series, i64::MIN)..=(series, i64::MAX))?;
        match range.next_back() {
            Some(result) => {
                let (_key, value) = result?;
                Ok(Some(serde_json::from_slice(value.value())?))
            }
            None => Ok(None),
        }
    }

    /// Names of all series with at least one sample, sorted.
    pub async fn list_series(&self) -> Result<Vec<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SAMPLES_TABLE)?;

        let mut series = BTreeSet::new();
        for result in table.iter()? {
            let (key, _value) = result?;
            let (name, _) = key.value();
            if !series.contains(name) {
                series.insert(name.to_string());
            }
        }
        Ok(series.into_iter().collect())
    }

    /// Delete every sample older than `cutoff` (microseconds). Returns the count.
    pub async fn delete_before(&self, cutoff: i64) -> Result<usize> {
        let write_txn = self.db.begin_write()?;
        let mut count = 0;

        {
            let mut table = write_txn.open_table(SAMPLES_TABLE)?;

            let mut keys_to_delete: Vec<(String, i64)> = Vec::new();
            for result in table.iter()? {
                let (key, _value) = result?;
                let (series, timestamp) = key.value();
                if timestamp < cutoff {
                    keys_to_delete.push((series.to_string(), timestamp));
                }
            }

            for (series, timestamp) in &keys_to_delete {
                table.remove((series.as_str(), *timestamp))?;
                count += 1;
            }
        }

        write_txn.commit()?;
        Ok(count)
    }
}
