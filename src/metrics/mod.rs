use crate::logging::{LogEvent, LogFields, LogLevel};
use serde_json::json;
use std::time::Duration;

/// Counters accumulated across the bridge. One handle may be shared by every
/// instance of a registry, in which case the numbers are registry-wide.
#[derive(Debug, Default, Clone)]
pub struct BridgeMetrics {
    batches: u64,
    rejected_batches: u64,
    mutations: u64,
    commands_delivered: u64,
    commands_dropped: u64,
    bundles_loaded: u64,
    bundle_failures: u64,
    state_updates: u64,
}

impl BridgeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_batch(&mut self, mutation_count: usize) {
        self.batches = self.batches.saturating_add(1);
        self.mutations = self.mutations.saturating_add(mutation_count as u64);
    }

    pub fn record_rejected_batch(&mut self) {
        self.rejected_batches = self.rejected_batches.saturating_add(1);
    }

    pub fn record_command(&mut self, delivered: bool) {
        if delivered {
            self.commands_delivered = self.commands_delivered.saturating_add(1);
        } else {
            self.commands_dropped = self.commands_dropped.saturating_add(1);
        }
    }

    pub fn record_bundle(&mut self, success: bool) {
        if success {
            self.bundles_loaded = self.bundles_loaded.saturating_add(1);
        } else {
            self.bundle_failures = self.bundle_failures.saturating_add(1);
        }
    }

    pub fn record_state_update(&mut self) {
        self.state_updates = self.state_updates.saturating_add(1);
    }

    pub fn snapshot(&self, uptime: Duration) -> MetricSnapshot {
        MetricSnapshot {
            uptime_ms: uptime.as_millis() as u64,
            batches: self.batches,
            rejected_batches: self.rejected_batches,
            mutations: self.mutations,
            commands_delivered: self.commands_delivered,
            commands_dropped: self.commands_dropped,
            bundles_loaded: self.bundles_loaded,
            bundle_failures: self.bundle_failures,
            state_updates: self.state_updates,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSnapshot {
    pub uptime_ms: u64,
    pub batches: u64,
    pub rejected_batches: u64,
    pub mutations: u64,
    pub commands_delivered: u64,
    pub commands_dropped: u64,
    pub bundles_loaded: u64,
    pub bundle_failures: u64,
    pub state_updates: u64,
}

impl MetricSnapshot {
    pub fn to_log_event(&self, target: &str) -> LogEvent {
        LogEvent::with_fields(LogLevel::Info, target, "bridge_metrics", self.as_fields())
    }

    pub fn as_fields(&self) -> LogFields {
        let mut map = LogFields::new();
        map.insert("uptime_ms".to_string(), json!(self.uptime_ms));
        map.insert("batches".to_string(), json!(self.batches));
        map.insert("rejected_batches".to_string(), json!(self.rejected_batches));
        map.insert("mutations".to_string(), json!(self.mutations));
        map.insert(
            "commands_delivered".to_string(),
            json!(self.commands_delivered),
        );
        map.insert("commands_dropped".to_string(), json!(self.commands_dropped));
        map.insert("bundles_loaded".to_string(), json!(self.bundles_loaded));
        map.insert("bundle_failures".to_string(), json!(self.bundle_failures));
        map.insert("state_updates".to_string(), json!(self.state_updates));
        map
    }
}
