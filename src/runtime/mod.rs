//! Instance runtime: identity, configuration, lifecycle and the two owners of
//! per-instance state (`InstanceController`, `InstanceRegistry`).

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde_json::{Value, json};

use crate::descriptor::{PropMap, Tag};
use crate::logging::Logger;
use crate::metrics::BridgeMetrics;

pub mod audit;
pub mod bundles;
pub mod diagnostics;
mod controller;
mod instances;

pub use controller::InstanceController;
pub use instances::InstanceRegistry;

use self::audit::{InstanceAudit, NullInstanceAudit};

/// Registry-assigned, monotonic instance identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    BeforeCreate,
    Ready,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Foreground,
    Background,
    BackPress,
}

/// Observer notified after the controller handled a lifecycle notification.
pub trait LifecycleListener: Send {
    fn name(&self) -> &str {
        "lifecycle_listener"
    }

    fn on_lifecycle(&mut self, _instance_id: InstanceId, _event: LifecycleEvent) {}
}

/// Configuration shared by every instance a registry creates.
#[derive(Clone)]
pub struct InstanceConfig {
    /// Optional structured logger; nothing is logged without one.
    pub logger: Option<Logger>,
    /// Metrics accumulator, shared across instances when cloned.
    pub metrics: Option<Arc<Mutex<BridgeMetrics>>>,
    /// Target field used when emitting metrics snapshots.
    pub metrics_target: String,
    pub audit: Arc<dyn InstanceAudit>,
    /// Initial props handed to every new surface.
    pub default_surface_props: PropMap,
    /// Props every CREATE mutation starts from.
    pub default_descriptor_props: PropMap,
    /// Bound of the queue the native boundary pushes shadow tree events into.
    pub shadow_tree_capacity: usize,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        let mut default_surface_props = PropMap::new();
        default_surface_props.insert("concurrentRoot".to_string(), json!(true));
        Self {
            logger: None,
            metrics: None,
            metrics_target: "rnoh::metrics".to_string(),
            audit: Arc::new(NullInstanceAudit),
            default_surface_props,
            default_descriptor_props: PropMap::new(),
            shadow_tree_capacity: 64,
        }
    }
}

impl InstanceConfig {
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn InstanceAudit>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_metrics_target(mut self, target: impl Into<String>) -> Self {
        self.metrics_target = target.into();
        self
    }

    pub fn with_default_surface_props(mut self, props: PropMap) -> Self {
        self.default_surface_props = props;
        self
    }

    pub fn with_default_descriptor_props(mut self, props: PropMap) -> Self {
        self.default_descriptor_props = props;
        self
    }

    pub fn with_shadow_tree_capacity(mut self, capacity: usize) -> Self {
        self.shadow_tree_capacity = capacity.max(1);
        self
    }

    /// Enable metrics collection if it has not already been configured.
    pub fn enable_metrics(&mut self) {
        if self.metrics.is_none() {
            self.metrics = Some(Arc::new(Mutex::new(BridgeMetrics::new())));
        }
    }

    pub fn disable_metrics(&mut self) {
        self.metrics = None;
    }

    /// Access the shared metrics handle if metrics are enabled.
    pub fn metrics_handle(&self) -> Option<Arc<Mutex<BridgeMetrics>>> {
        self.metrics.as_ref().map(Arc::clone)
    }
}

/// One mounted root view. Holds the owning instance's id, not the instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceHandle {
    instance_id: InstanceId,
    tag: Tag,
    app_key: String,
    initial_props: PropMap,
}

impl SurfaceHandle {
    pub(crate) fn new(instance_id: InstanceId, tag: Tag, app_key: String, initial_props: PropMap) -> Self {
        Self {
            instance_id,
            tag,
            app_key,
            initial_props,
        }
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn app_key(&self) -> &str {
        &self.app_key
    }

    pub fn initial_props(&self) -> &PropMap {
        &self.initial_props
    }

    /// Overlay `props` on the surface's initial props.
    pub fn with_initial_props(mut self, props: PropMap) -> Self {
        crate::descriptor::merge_props(&mut self.initial_props, &props);
        self
    }

    /// Initial props in the shape the scripting side expects when the app starts.
    pub fn app_parameters(&self) -> Value {
        json!({
            "rootTag": self.tag,
            "initialProps": self.initial_props,
        })
    }
}

pub(crate) fn record_metrics(
    metrics: Option<&Arc<Mutex<BridgeMetrics>>>,
    record: impl FnOnce(&mut BridgeMetrics),
) {
    if let Some(metrics) = metrics {
        let mut guard = metrics.lock().unwrap_or_else(PoisonError::into_inner);
        record(&mut guard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_surface_defaults() {
        let config = InstanceConfig::default();
        assert_eq!(config.default_surface_props.get("concurrentRoot"), Some(&json!(true)));
        assert_eq!(config.shadow_tree_capacity, 64);
        assert!(config.metrics_handle().is_none());
        assert_eq!(InstanceConfig::default().with_shadow_tree_capacity(0).shadow_tree_capacity, 1);
    }

    #[test]
    fn enable_metrics_keeps_existing_handle() {
        let mut config = InstanceConfig::default();
        config.enable_metrics();
        let first = config.metrics_handle().unwrap();
        config.enable_metrics();
        assert!(Arc::ptr_eq(&first, &config.metrics_handle().unwrap()));
        config.disable_metrics();
        assert!(config.metrics.is_none());
    }

    #[test]
    fn surface_props_overlay_defaults() {
        let mut extra = PropMap::new();
        extra.insert("theme".to_string(), json!("dark"));
        let surface = SurfaceHandle::new(InstanceId(0), 11, "main".to_string(), InstanceConfig::default().default_surface_props)
            .with_initial_props(extra);

        assert_eq!(surface.app_parameters()["rootTag"], json!(11));
        assert_eq!(surface.app_parameters()["initialProps"]["concurrentRoot"], json!(true));
        assert_eq!(surface.initial_props().get("theme"), Some(&json!("dark")));
    }
}
