//! In-process telemetry for entronet services. Counters are wide enough to
//! accumulate wei amounts and every snapshot can be rendered as JSON, so tests
//! and the node binary can assert on instrumentation without an exporter.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;

#[cfg(any(
    all(feature = "dev", feature = "test"),
    all(feature = "dev", feature = "prod"),
    all(feature = "test", feature = "prod")
))]
compile_error!(
    "Only one of the `dev`, `test`, or `prod` features may be enabled for entronet-telemetry."
);

#[cfg(feature = "dev")]
const DEFAULT_FLUSH_MS: u64 = 1_000;
#[cfg(feature = "test")]
const DEFAULT_FLUSH_MS: u64 = 250;
#[cfg(any(feature = "prod", not(any(feature = "dev", feature = "test"))))]
const DEFAULT_FLUSH_MS: u64 = 10_000;

fn default_flush_interval_ms() -> u64 {
    DEFAULT_FLUSH_MS
}

fn default_service() -> String {
    "entronet".to_owned()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct TelemetryConfig {
    /// Name stamped on every snapshot.
    #[serde(default = "default_service")]
    pub service: String,
    /// Flush cadence in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
            flush_interval_ms: default_flush_interval_ms(),
            labels: BTreeMap::new(),
        }
    }
}

impl TelemetryConfig {
    pub fn sample(service: &str) -> Self {
        Self {
            service: service.to_owned(),
            flush_interval_ms: default_flush_interval_ms(),
            labels: BTreeMap::from([("component".into(), "oracle".into())]),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("counter overflow for metric {0}")]
    CounterOverflow(String),
    #[error("telemetry state poisoned by a panicking recorder")]
    Poisoned,
    #[error("snapshot encoding failed: {0}")]
    Encode(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    pub service: String,
    pub unix_ms: u128,
    pub labels: BTreeMap<String, String>,
    pub counters: BTreeMap<String, u128>,
    pub latencies_ms: BTreeMap<String, Vec<u64>>,
}

impl TelemetrySnapshot {
    pub fn to_json(&self) -> Result<String, TelemetryError> {
        serde_json::to_string(self).map_err(|err| TelemetryError::Encode(err.to_string()))
    }
}

#[derive(Default)]
struct TelemetryState {
    counters: BTreeMap<String, u128>,
    latencies_ms: BTreeMap<String, Vec<u64>>,
}

/// Cloneable recorder; clones share the same counters.
#[derive(Clone)]
pub struct TelemetryHandle {
    config: TelemetryConfig,
    state: Arc<Mutex<TelemetryState>>,
}

impl TelemetryHandle {
    pub fn from_config(config: TelemetryConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(TelemetryState::default())),
        }
    }

    pub fn record_counter(&self, name: &str, delta: u128) -> Result<(), TelemetryError> {
        let mut guard = self.lock()?;
        let entry = guard.counters.entry(name.to_owned()).or_default();
        *entry = entry
            .checked_add(delta)
            .ok_or_else(|| TelemetryError::CounterOverflow(name.to_owned()))?;
        Ok(())
    }

    pub fn record_latency_ms(&self, name: &str, value: u64) -> Result<(), TelemetryError> {
        self.lock()?
            .latencies_ms
            .entry(name.to_owned())
            .or_default()
            .push(value);
        Ok(())
    }

    /// Current value of `name` since the last flush.
    pub fn counter(&self, name: &str) -> Result<u128, TelemetryError> {
        Ok(self.lock()?.counters.get(name).copied().unwrap_or(0))
    }

    pub fn flush(&self) -> Result<TelemetrySnapshot, TelemetryError> {
        let mut guard = self.lock()?;
        let unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or(0);
        Ok(TelemetrySnapshot {
            service: self.config.service.clone(),
            unix_ms,
            labels: self.config.labels.clone(),
            counters: std::mem::take(&mut guard.counters),
            latencies_ms: std::mem::take(&mut guard.latencies_ms),
        })
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.config.flush_interval_ms)
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, TelemetryState>, TelemetryError> {
        self.state.lock().map_err(|_| TelemetryError::Poisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn handle() -> TelemetryHandle {
        TelemetryHandle::from_config(TelemetryConfig::sample("entronet-test"))
    }

    #[test]
    fn accumulates_wei_sized_counters() {
        let handle = handle();
        let fee = 10_000_000_000_000u128;
        for _ in 0..3 {
            handle.record_counter("oracle.fees_wei", fee).unwrap();
        }
        handle.record_latency_ms("oracle.request", 7).unwrap();
        assert_eq!(handle.counter("oracle.fees_wei").unwrap(), 3 * fee);

        let snapshot = handle.flush().unwrap();
        assert_eq!(snapshot.service, "entronet-test");
        assert_eq!(snapshot.counters["oracle.fees_wei"], 3 * fee);
        assert_eq!(snapshot.latencies_ms["oracle.request"], vec![7]);
    }

    #[test]
    fn detects_counter_overflow() {
        let handle = handle();
        handle.record_counter("oracle.requests", u128::MAX).unwrap();
        let err = handle.record_counter("oracle.requests", 1).unwrap_err();
        assert_eq!(err, TelemetryError::CounterOverflow("oracle.requests".into()));
    }

    #[test]
    fn flush_resets_and_clones_share_state() {
        let handle = handle();
        let clone = handle.clone();
        clone.record_counter("oracle.rejections", 2).unwrap();
        assert_eq!(handle.counter("oracle.rejections").unwrap(), 2);

        handle.flush().unwrap();
        let second = clone.flush().unwrap();
        assert!(second.counters.is_empty());
        assert_eq!(handle.counter("oracle.rejections").unwrap(), 0);
    }

    #[test]
    fn snapshot_renders_as_json() {
        let handle = handle();
        handle.record_counter("oracle.requests", 1).unwrap();
        let json = handle.flush().unwrap().to_json().unwrap();
        assert!(json.contains("\"oracle.requests\":1"));
        assert!(json.contains("\"component\":\"oracle\""));
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: TelemetryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.service, "entronet");
        assert_eq!(config.flush_interval_ms, DEFAULT_FLUSH_MS);
        assert!(config.labels.is_empty());
    }
}
