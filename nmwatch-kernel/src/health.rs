use crate::error::TelemetryError;
use crate::registry::DeviceRegistry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub devices_tracked: u32,
    pub memory_usage_mb: f32,
    pub datagrams_received: u64,
    pub datagrams_accepted: u64,
    pub rejected_malformed: u64,
    pub rejected_missing_field: u64,
    pub rejected_invalid_hash_rate: u64,
    pub socket_errors: u64,
    pub devices_evicted: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    accepted: AtomicU64,
    malformed: AtomicU64,
    missing_field: AtomicU64,
    invalid_hash_rate: AtomicU64,
    socket_errors: AtomicU64,
    evicted: AtomicU64,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    counters: Arc<Counters>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn record_received(&self) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, err: &TelemetryError) {
        let counter = match err {
            TelemetryError::MalformedPayload(_) => &self.counters.malformed,
            TelemetryError::MissingField(_) => &self.counters.missing_field,
            TelemetryError::InvalidHashRate(_) => &self.counters.invalid_hash_rate,
            TelemetryError::Socket(_) | TelemetryError::Bind { .. } => &self.counters.socket_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evicted(&self, count: usize) {
        self.counters.evicted.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn get_health(&self, registry: &DeviceRegistry) -> KernelHealth {
        let c = &self.counters;
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            devices_tracked: registry.len() as u32,
            memory_usage_mb: get_memory_usage_mb(),
            datagrams_received: c.received.load(Ordering::Relaxed),
            datagrams_accepted: c.accepted.load(Ordering::Relaxed),
            rejected_malformed: c.malformed.load(Ordering::Relaxed),
            rejected_missing_field: c.missing_field.load(Ordering::Relaxed),
            rejected_invalid_hash_rate: c.invalid_hash_rate.load(Ordering::Relaxed),
            socket_errors: c.socket_errors.load(Ordering::Relaxed),
            devices_evicted: c.evicted.load(Ordering::Relaxed),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let rss_kb = status
                .lines()
                .find(|line| line.starts_with("VmRSS:"))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok());
            if let Some(kb) = rss_kb {
                return kb as f32 / 1024.0;
            }
        }
    }

    // pas de /proc : valeur inconnue
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_by_error_kind() {
        let health = HealthTracker::new();
        let registry = DeviceRegistry::new();

        for _ in 0..4 {
            health.record_received();
        }
        health.record_accepted();
        health.record_error(&TelemetryError::MissingField("IP"));
        health.record_error(&TelemetryError::InvalidHashRate("bad".into()));
        health.record_error(&TelemetryError::MalformedPayload("nope".into()));
        health.record_evicted(3);

        let report = health.get_health(&registry);
        assert_eq!(report.datagrams_received, 4);
        assert_eq!(report.datagrams_accepted, 1);
        assert_eq!(report.rejected_missing_field, 1);
        assert_eq!(report.rejected_invalid_hash_rate, 1);
        assert_eq!(report.rejected_malformed, 1);
        assert_eq!(report.socket_errors, 0);
        assert_eq!(report.devices_evicted, 3);
        assert_eq!(report.devices_tracked, 0);
    }

    #[test]
    fn test_clones_share_counters() {
        let health = HealthTracker::new();
        let clone = health.clone();
        clone.record_received();
        assert_eq!(health.get_health(&DeviceRegistry::new()).datagrams_received, 1);
    }
}
