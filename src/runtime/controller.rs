use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Value, json};

use crate::boundary::{NativeBoundary, ShadowTreeEvent, ShadowTreeReceiver, shadow_tree_channel};
use crate::commands::{CommandDispatcher, CommandOutcome};
use crate::components::{ComponentManager, ComponentManagerRegistry};
use crate::descriptor::{Descriptor, PropMap, Tag};
use crate::error::{BridgeError, Result};
use crate::logging::{LogLevel, emit, json_kv};
use crate::mutation::Mutation;
use crate::registry::{
    BatchReport, DescriptorChangeSet, DescriptorRegistry, StateUpdater, SubscriptionId,
};
use crate::turbo::{Package, TurboModuleContext, TurboModuleProvider};

use super::audit::{InstanceAuditEventBuilder, InstanceAuditStage};
use super::bundles::{BundleExecutionStatus, BundleRunner, JsBundleProvider};
use super::{
    InstanceConfig, InstanceId, LifecycleEvent, LifecycleListener, LifecycleState, SurfaceHandle,
    record_metrics,
};

const DEVICE_EVENT_MODULE: &str = "RCTDeviceEventEmitter";

/// Authoritative handle for one runtime instance: owns its descriptor tree,
/// command handlers, component managers and turbo modules, and talks to the
/// native boundary on its behalf.
pub struct InstanceController {
    id: InstanceId,
    boundary: Arc<dyn NativeBoundary>,
    config: InstanceConfig,
    lifecycle_state: LifecycleState,
    surface_counter: u32,
    descriptor_registry: DescriptorRegistry,
    command_dispatcher: CommandDispatcher,
    component_managers: ComponentManagerRegistry,
    turbo_modules: Arc<TurboModuleProvider>,
    bundle_runner: BundleRunner,
    shadow_tree: Option<ShadowTreeReceiver>,
    lifecycle_listeners: Vec<Box<dyn LifecycleListener>>,
    started_at: Instant,
    released: bool,
}

impl InstanceController {
    pub fn new(
        id: InstanceId,
        boundary: Arc<dyn NativeBoundary>,
        packages: Vec<Box<dyn Package>>,
        config: InstanceConfig,
    ) -> Self {
        let turbo_ctx = TurboModuleContext {
            instance_id: id,
            boundary: Arc::clone(&boundary),
            logger: config.logger.clone(),
        };
        let turbo_modules = Arc::new(TurboModuleProvider::from_packages(&packages, &turbo_ctx));

        let state_boundary = Arc::clone(&boundary);
        let updater: StateUpdater = Arc::new(move |component_name: &str, tag: Tag, state: &PropMap| {
            state_boundary.update_state(id, component_name, tag, state);
        });
        let descriptor_registry = DescriptorRegistry::new()
            .with_default_props(config.default_descriptor_props.clone())
            .with_logger(config.logger.clone())
            .with_state_updater(updater);

        let controller = Self {
            id,
            bundle_runner: BundleRunner::new(id, Arc::clone(&boundary), &config),
            boundary,
            lifecycle_state: LifecycleState::BeforeCreate,
            surface_counter: 0,
            descriptor_registry,
            command_dispatcher: CommandDispatcher::new().with_logger(config.logger.clone()),
            component_managers: ComponentManagerRegistry::new(),
            turbo_modules,
            shadow_tree: None,
            lifecycle_listeners: Vec::new(),
            started_at: Instant::now(),
            released: false,
            config,
        };
        controller.audit(
            InstanceAuditStage::InstanceCreated,
            [json_kv("packages", json!(packages.len()))],
        );
        controller
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle_state
    }

    pub fn is_initialized(&self) -> bool {
        self.shadow_tree.is_some()
    }

    /// Register this instance and its shadow tree entry point with the native
    /// boundary. Allowed exactly once.
    pub fn initialize(&mut self) -> Result<()> {
        if self.shadow_tree.is_some() {
            return Err(BridgeError::DuplicateInitialization { instance: self.id });
        }

        let (sender, receiver) = shadow_tree_channel(self.id, self.config.shadow_tree_capacity);
        self.boundary
            .initialize_react_native(self.id, Arc::clone(&self.turbo_modules));
        self.boundary.subscribe_to_shadow_tree_changes(self.id, sender);
        self.shadow_tree = Some(receiver);

        self.audit(InstanceAuditStage::Initialized, std::iter::empty());
        self.log(LogLevel::Info, "instance_initialized", std::iter::empty());
        Ok(())
    }

    /// Allocate the next surface. Tags follow `counter * 10 + 1`, so the first
    /// surface owns the pre-seeded root tag. Fails once the tag space is used up.
    pub fn create_surface(&mut self, app_key: impl Into<String>) -> Result<SurfaceHandle> {
        let tag = self
            .surface_counter
            .checked_mul(10)
            .and_then(|base| base.checked_add(1))
            .ok_or(BridgeError::SurfaceTagsExhausted { instance: self.id })?;
        self.surface_counter += 1;
        let app_key = app_key.into();

        let fields = [json_kv("tag", json!(tag)), json_kv("app_key", json!(app_key))];
        self.audit(InstanceAuditStage::SurfaceCreated, fields.clone());
        self.log(LogLevel::Info, "surface_created", fields);

        Ok(SurfaceHandle::new(
            self.id,
            tag,
            app_key,
            self.config.default_surface_props.clone(),
        ))
    }

    pub async fn run_js_bundle(&self, provider: &dyn JsBundleProvider) -> Result<()> {
        self.bundle_runner.run(provider).await?;
        Ok(())
    }

    /// Detached handle for running bundles from a spawned task.
    pub fn bundle_runner(&self) -> BundleRunner {
        self.bundle_runner.clone()
    }

    pub fn bundle_execution_status(&self, url: &str) -> Option<BundleExecutionStatus> {
        self.bundle_runner.status(url)
    }

    pub fn bundle_fingerprint(&self, url: &str) -> Option<blake3::Hash> {
        self.bundle_runner.fingerprint(url)
    }

    pub fn call_rn_function(&self, module_name: &str, function_name: &str, args: Vec<Value>) {
        self.boundary
            .call_rn_function(self.id, module_name, function_name, args);
    }

    pub fn emit_component_event(&self, tag: Tag, handler_name: &str, payload: Value) {
        self.boundary
            .emit_component_event(self.id, tag, handler_name, payload);
    }

    pub fn emit_device_event(&self, event_name: &str, params: Value) {
        self.call_rn_function(DEVICE_EVENT_MODULE, "emit", vec![json!(event_name), params]);
    }

    pub fn update_state(&self, component_name: &str, tag: Tag, state: &PropMap) {
        self.boundary.update_state(self.id, component_name, tag, state);
    }

    pub fn get_turbo_module<T>(&self, name: &str) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        Ok(self.turbo_modules.get_module::<T>(name)?)
    }

    pub fn turbo_modules(&self) -> &Arc<TurboModuleProvider> {
        &self.turbo_modules
    }

    pub fn on_foreground(&mut self) {
        self.lifecycle_state = LifecycleState::Ready;
        self.lifecycle_changed(LifecycleEvent::Foreground);
    }

    pub fn on_background(&mut self) {
        self.lifecycle_state = LifecycleState::Paused;
        self.lifecycle_changed(LifecycleEvent::Background);
    }

    /// Forwarded to the scripting side as a device event; the lifecycle state
    /// is left alone.
    pub fn on_back_press(&mut self) {
        self.emit_device_event("hardwareBackPress", json!({}));
        self.lifecycle_changed(LifecycleEvent::BackPress);
    }

    pub fn register_lifecycle_listener<L>(&mut self, listener: L)
    where
        L: LifecycleListener + 'static,
    {
        self.lifecycle_listeners.push(Box::new(listener));
    }

    /// Apply one mutation batch. Managers and command handlers of deleted tags
    /// are released after the batch commits.
    pub fn apply_mutations(&mut self, batch: &[Mutation]) -> Result<BatchReport> {
        match self.descriptor_registry.apply_mutations(batch) {
            Ok(report) => {
                for tag in &report.deleted {
                    self.component_managers.unregister(*tag);
                    self.command_dispatcher.unregister_tag(*tag);
                }
                record_metrics(self.config.metrics.as_ref(), |metrics| {
                    metrics.record_batch(report.applied)
                });
                let fields = [
                    json_kv("mutations", json!(report.applied)),
                    json_kv("affected", json!(report.affected.len())),
                    json_kv("deleted", json!(report.deleted.len())),
                    json_kv("clamped", json!(report.clamped.len())),
                ];
                self.audit(InstanceAuditStage::BatchApplied, fields.clone());
                self.log(LogLevel::Debug, "batch_applied", fields);
                Ok(report)
            }
            Err(err) => {
                record_metrics(self.config.metrics.as_ref(), |metrics| {
                    metrics.record_rejected_batch()
                });
                let fields = [
                    json_kv("index", json!(err.index())),
                    json_kv("error", json!(err.to_string())),
                ];
                self.audit(InstanceAuditStage::BatchRejected, fields.clone());
                self.log(LogLevel::Error, "batch_rejected", fields);
                Err(err.into())
            }
        }
    }

    pub fn dispatch_command(&mut self, tag: Tag, command_name: &str, args: &Value) -> CommandOutcome {
        let outcome = self.command_dispatcher.dispatch_command(tag, command_name, args);
        let delivered = matches!(outcome, CommandOutcome::Delivered(_));
        record_metrics(self.config.metrics.as_ref(), |metrics| {
            metrics.record_command(delivered)
        });
        if !delivered {
            self.audit(
                InstanceAuditStage::CommandDropped,
                [json_kv("tag", json!(tag)), json_kv("command", json!(command_name))],
            );
        }
        outcome
    }

    /// Drain everything the native boundary queued, in order. Stops at the
    /// first rejected batch; later events stay queued.
    pub fn process_shadow_tree_events(&mut self) -> Result<usize> {
        let mut processed = 0;
        while let Some(event) = self.next_shadow_tree_event() {
            match event {
                ShadowTreeEvent::Mutations(batch) => {
                    self.apply_mutations(&batch)?;
                }
                ShadowTreeEvent::Command { tag, name, args } => {
                    self.dispatch_command(tag, &name, &args);
                }
            }
            processed += 1;
        }
        Ok(processed)
    }

    /// Host-side state change for `tag`, forwarded to the native boundary.
    pub fn set_descriptor_state(&mut self, tag: Tag, delta: PropMap) -> Result<()> {
        self.descriptor_registry.set_state(tag, delta)?;
        record_metrics(self.config.metrics.as_ref(), |metrics| {
            metrics.record_state_update()
        });
        Ok(())
    }

    pub fn descriptor_registry(&self) -> &DescriptorRegistry {
        &self.descriptor_registry
    }

    /// Observe committed batches and host state changes. Mutations only go
    /// through [`apply_mutations`](Self::apply_mutations).
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&DescriptorChangeSet) + Send + 'static,
    {
        self.descriptor_registry.subscribe(listener)
    }

    pub fn subscribe_to_descriptor<F>(&mut self, tag: Tag, listener: F) -> SubscriptionId
    where
        F: FnMut(&Descriptor) + Send + 'static,
    {
        self.descriptor_registry.subscribe_to_descriptor(tag, listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.descriptor_registry.unsubscribe(id)
    }

    pub fn command_dispatcher_mut(&mut self) -> &mut CommandDispatcher {
        &mut self.command_dispatcher
    }

    pub fn component_managers(&self) -> &ComponentManagerRegistry {
        &self.component_managers
    }

    /// Attach a manager to a live descriptor; returns whether one was replaced.
    /// The manager is destroyed when a batch deletes the tag.
    pub fn register_component_manager<M>(&mut self, tag: Tag, manager: M) -> Result<bool>
    where
        M: ComponentManager + 'static,
    {
        if !self.descriptor_registry.contains(tag) {
            return Err(BridgeError::DescriptorNotFound(tag));
        }
        Ok(self.component_managers.register(tag, manager))
    }

    pub fn unregister_component_manager(&mut self, tag: Tag) -> bool {
        self.component_managers.unregister(tag)
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn log_metrics_snapshot(&self) {
        let (Some(logger), Some(metrics)) = (self.config.logger.as_ref(), self.config.metrics.as_ref()) else {
            return;
        };
        if let Ok(guard) = metrics.lock() {
            let event = guard
                .snapshot(self.started_at.elapsed())
                .to_log_event(&self.config.metrics_target);
            let _ = logger.log_event(event);
        }
    }

    /// Destroy every remaining component manager. Runs once; later calls and
    /// the drop that follows are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let managers = self.component_managers.release_all();
        let fields = [json_kv("managers", json!(managers))];
        self.audit(InstanceAuditStage::InstanceReleased, fields.clone());
        self.log(LogLevel::Info, "instance_released", fields);
    }

    fn next_shadow_tree_event(&self) -> Option<ShadowTreeEvent> {
        self.shadow_tree.as_ref().and_then(ShadowTreeReceiver::try_next)
    }

    fn lifecycle_changed(&mut self, event: LifecycleEvent) {
        let id = self.id;
        for listener in self.lifecycle_listeners.iter_mut() {
            listener.on_lifecycle(id, event);
        }
        let fields = [
            json_kv("event", json!(format!("{event:?}"))),
            json_kv("state", json!(self.lifecycle_state)),
        ];
        self.audit(InstanceAuditStage::LifecycleChanged, fields.clone());
        emit(
            self.config.logger.as_ref(),
            LogLevel::Info,
            "rnoh::lifecycle",
            "lifecycle_changed",
            [json_kv("instance", json!(self.id.0))].into_iter().chain(fields),
        );
    }

    fn audit<I>(&self, stage: InstanceAuditStage, details: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut builder = InstanceAuditEventBuilder::new(self.id, stage);
        for (key, value) in details {
            builder.detail(key, value);
        }
        self.config.audit.record(builder.finish());
    }

    fn log<I>(&self, level: LogLevel, message: &str, fields: I)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        emit(
            self.config.logger.as_ref(),
            level,
            "rnoh::instance",
            message,
            std::iter::once(json_kv("instance", json!(self.id.0))).chain(fields),
        );
    }
}

impl Drop for InstanceController {
    fn drop(&mut self) {
        self.release();
    }
}
