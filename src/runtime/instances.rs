use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Value, json};

use crate::boundary::NativeBoundary;
use crate::error::{BridgeError, Result};
use crate::logging::{LogLevel, emit, json_kv};
use crate::turbo::{Package, PackageContext};

use super::{InstanceConfig, InstanceController, InstanceId};

/// Factory and directory of instance controllers, iterated in creation order.
pub struct InstanceRegistry {
    boundary: Arc<dyn NativeBoundary>,
    config: InstanceConfig,
    next_instance_id: u64,
    instances: IndexMap<InstanceId, InstanceController>,
}

impl InstanceRegistry {
    pub fn new(boundary: Arc<dyn NativeBoundary>, config: InstanceConfig) -> Self {
        Self {
            boundary,
            config,
            next_instance_id: 0,
            instances: IndexMap::new(),
        }
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    /// Build, initialize and register a new instance. `package_factory`
    /// receives the id the instance is about to get.
    pub fn create_instance<F>(&mut self, package_factory: F) -> Result<&mut InstanceController>
    where
        F: FnOnce(&PackageContext) -> Vec<Box<dyn Package>>,
    {
        let id = InstanceId(self.next_instance_id);
        self.next_instance_id += 1;

        let packages = package_factory(&PackageContext { instance_id: id });
        let mut controller =
            InstanceController::new(id, Arc::clone(&self.boundary), packages, self.config.clone());
        controller.initialize()?;

        emit(
            self.config.logger.as_ref(),
            LogLevel::Info,
            "rnoh::registry",
            "instance_created",
            [
                json_kv("instance", json!(id.0)),
                json_kv("live_instances", json!(self.instances.len() + 1)),
            ],
        );
        Ok(self.instances.entry(id).or_insert(controller))
    }

    pub fn get_instance(&self, id: InstanceId) -> Option<&InstanceController> {
        self.instances.get(&id)
    }

    pub fn get_instance_mut(&mut self, id: InstanceId) -> Option<&mut InstanceController> {
        self.instances.get_mut(&id)
    }

    /// Like [`get_instance_mut`](Self::get_instance_mut), with a miss as an error.
    pub fn instance_mut(&mut self, id: InstanceId) -> Result<&mut InstanceController> {
        self.instances
            .get_mut(&id)
            .ok_or(BridgeError::InstanceNotFound(id))
    }

    pub fn has_instance(&self, id: InstanceId) -> bool {
        self.instances.contains_key(&id)
    }

    /// Remove and release an instance; returns whether it existed.
    pub fn delete_instance(&mut self, id: InstanceId) -> bool {
        let Some(mut controller) = self.instances.shift_remove(&id) else {
            return false;
        };
        controller.release();
        emit(
            self.config.logger.as_ref(),
            LogLevel::Info,
            "rnoh::registry",
            "instance_deleted",
            [
                json_kv("instance", json!(id.0)),
                json_kv("live_instances", json!(self.instances.len())),
            ],
        );
        true
    }

    pub fn for_each<F>(&mut self, mut callback: F)
    where
        F: FnMut(&mut InstanceController),
    {
        for controller in self.instances.values_mut() {
            callback(controller);
        }
    }

    pub fn on_back_press(&mut self) {
        self.for_each(InstanceController::on_back_press);
    }

    pub fn on_foreground(&mut self) {
        self.for_each(InstanceController::on_foreground);
    }

    pub fn on_background(&mut self) {
        self.for_each(InstanceController::on_background);
    }

    pub fn emit_device_event_to_all(&mut self, event_name: &str, params: Value) {
        self.for_each(|controller| controller.emit_device_event(event_name, params.clone()));
    }

    pub fn toggle_element_inspector(&mut self) {
        self.emit_device_event_to_all("toggleElementInspector", json!({}));
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.instances.keys().copied()
    }
}
