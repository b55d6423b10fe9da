//! Instance lifecycle audit hooks.
//!
//! Records capture a stage identifier plus structured details so hosts can log,
//! buffer, or assert on an instance's progression without touching the
//! controller itself.

use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use serde_json::Value;

use super::InstanceId;

/// Checkpoints emitted by `InstanceController` and its bundle runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceAuditStage {
    /// Controller constructed by the instance registry.
    InstanceCreated,
    /// Callbacks registered with the native boundary.
    Initialized,
    SurfaceCreated,
    /// A mutation batch was committed to the descriptor registry.
    BatchApplied,
    /// A mutation batch failed validation; nothing was committed.
    BatchRejected,
    /// A command arrived for a tag without handlers.
    CommandDropped,
    BundleStarted,
    BundleFinished,
    BundleFailed,
    /// Foreground, background or back-press notification handled.
    LifecycleChanged,
    /// Controller torn down; component managers destroyed.
    InstanceReleased,
}

#[derive(Debug, Clone)]
pub struct InstanceAuditEvent {
    pub timestamp: SystemTime,
    pub instance_id: InstanceId,
    pub stage: InstanceAuditStage,
    pub details: Vec<(String, Value)>,
}

impl InstanceAuditEvent {
    fn new(instance_id: InstanceId, stage: InstanceAuditStage) -> Self {
        Self {
            timestamp: SystemTime::now(),
            instance_id,
            stage,
            details: Vec::new(),
        }
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }
}

/// Builder helper to append fields ergonomically.
pub struct InstanceAuditEventBuilder {
    event: InstanceAuditEvent,
}

impl InstanceAuditEventBuilder {
    pub fn new(instance_id: InstanceId, stage: InstanceAuditStage) -> Self {
        Self {
            event: InstanceAuditEvent::new(instance_id, stage),
        }
    }

    pub fn detail(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.event.details.push((key.into(), value));
        self
    }

    pub fn finish(self) -> InstanceAuditEvent {
        self.event
    }
}

pub trait InstanceAudit: Send + Sync {
    fn record(&self, event: InstanceAuditEvent);
}

/// Default no-op sink used when auditing is disabled.
#[derive(Debug, Default)]
pub struct NullInstanceAudit;

impl InstanceAudit for NullInstanceAudit {
    fn record(&self, _event: InstanceAuditEvent) {}
}

/// Buffers every record in memory.
#[derive(Debug, Default)]
pub struct MemoryInstanceAudit {
    events: Mutex<Vec<InstanceAuditEvent>>,
}

impl MemoryInstanceAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<InstanceAuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stages(&self) -> Vec<InstanceAuditStage> {
        self.events().into_iter().map(|event| event.stage).collect()
    }

    pub fn stages_for(&self, instance_id: InstanceId) -> Vec<InstanceAuditStage> {
        self.events()
            .into_iter()
            .filter(|event| event.instance_id == instance_id)
            .map(|event| event.stage)
            .collect()
    }
}

impl InstanceAudit for MemoryInstanceAudit {
    fn record(&self, event: InstanceAuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_audit_keeps_order_and_details() {
        let audit = MemoryInstanceAudit::new();
        let mut builder = InstanceAuditEventBuilder::new(InstanceId(4), InstanceAuditStage::SurfaceCreated);
        builder.detail("tag", json!(11)).detail("app_key", json!("main"));
        audit.record(builder.finish());
        audit.record(InstanceAuditEventBuilder::new(InstanceId(5), InstanceAuditStage::Initialized).finish());

        assert_eq!(
            audit.stages(),
            vec![InstanceAuditStage::SurfaceCreated, InstanceAuditStage::Initialized]
        );
        assert_eq!(audit.stages_for(InstanceId(5)), vec![InstanceAuditStage::Initialized]);
        assert_eq!(audit.events()[0].detail("tag"), Some(&json!(11)));
    }
}
