use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use super::{BoundaryError, NativeBoundary, ShadowTreeSendError, ShadowTreeSender};
use crate::descriptor::{PropMap, Tag};
use crate::mutation::Mutation;
use crate::runtime::InstanceId;
use crate::turbo::TurboModuleProvider;

/// One outbound call observed by [`RecordingBoundary`].
#[derive(Debug, Clone, PartialEq)]
pub enum BoundaryCall {
    Initialize {
        instance_id: InstanceId,
    },
    Subscribe {
        instance_id: InstanceId,
    },
    CallFunction {
        instance_id: InstanceId,
        module: String,
        function: String,
        args: Vec<Value>,
    },
    ComponentEvent {
        instance_id: InstanceId,
        tag: Tag,
        handler: String,
        payload: Value,
    },
    UpdateState {
        instance_id: InstanceId,
        component: String,
        tag: Tag,
        state: PropMap,
    },
    LoadScript {
        instance_id: InstanceId,
        url: String,
        len: usize,
    },
}

#[derive(Default)]
struct RecordingState {
    calls: Vec<BoundaryCall>,
    senders: HashMap<InstanceId, ShadowTreeSender>,
    failing_urls: HashSet<String>,
}

/// In-process boundary that records every outbound call and keeps the shadow
/// tree senders it was handed, so hosts and tests can push batches and
/// commands as the native engine would.
#[derive(Clone, Default)]
pub struct RecordingBoundary {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `load_script_from_string` fail for `url`.
    pub fn fail_script(&self, url: impl Into<String>) {
        self.with_state(|state| {
            state.failing_urls.insert(url.into());
        });
    }

    pub fn calls(&self) -> Vec<BoundaryCall> {
        self.with_state(|state| state.calls.clone())
    }

    pub fn calls_for(&self, instance_id: InstanceId) -> Vec<BoundaryCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.instance_id() == instance_id)
            .collect()
    }

    pub fn clear(&self) {
        self.with_state(|state| state.calls.clear());
    }

    pub fn sender(&self, instance_id: InstanceId) -> Option<ShadowTreeSender> {
        self.with_state(|state| state.senders.get(&instance_id).cloned())
    }

    pub fn push_mutations(
        &self,
        instance_id: InstanceId,
        batch: Vec<Mutation>,
    ) -> Option<Result<(), ShadowTreeSendError>> {
        self.sender(instance_id)
            .map(|sender| sender.send_mutations(batch))
    }

    pub fn push_command(
        &self,
        instance_id: InstanceId,
        tag: Tag,
        name: &str,
        args: Value,
    ) -> Option<Result<(), ShadowTreeSendError>> {
        self.sender(instance_id)
            .map(|sender| sender.send_command(tag, name, args))
    }

    fn record(&self, call: BoundaryCall) {
        self.with_state(|state| state.calls.push(call));
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut RecordingState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl BoundaryCall {
    pub fn instance_id(&self) -> InstanceId {
        match self {
            BoundaryCall::Initialize { instance_id }
            | BoundaryCall::Subscribe { instance_id }
            | BoundaryCall::CallFunction { instance_id, .. }
            | BoundaryCall::ComponentEvent { instance_id, .. }
            | BoundaryCall::UpdateState { instance_id, .. }
            | BoundaryCall::LoadScript { instance_id, .. } => *instance_id,
        }
    }
}

impl NativeBoundary for RecordingBoundary {
    fn initialize_react_native(&self, instance_id: InstanceId, _turbo_modules: Arc<TurboModuleProvider>) {
        self.record(BoundaryCall::Initialize { instance_id });
    }

    fn subscribe_to_shadow_tree_changes(&self, instance_id: InstanceId, sender: ShadowTreeSender) {
        self.with_state(|state| {
            state.senders.insert(instance_id, sender);
            state.calls.push(BoundaryCall::Subscribe { instance_id });
        });
    }

    fn call_rn_function(
        &self,
        instance_id: InstanceId,
        module_name: &str,
        function_name: &str,
        args: Vec<Value>,
    ) {
        self.record(BoundaryCall::CallFunction {
            instance_id,
            module: module_name.to_string(),
            function: function_name.to_string(),
            args,
        });
    }

    fn emit_component_event(&self, instance_id: InstanceId, tag: Tag, handler_name: &str, payload: Value) {
        self.record(BoundaryCall::ComponentEvent {
            instance_id,
            tag,
            handler: handler_name.to_string(),
            payload,
        });
    }

    fn update_state(&self, instance_id: InstanceId, component_name: &str, tag: Tag, state: &PropMap) {
        self.record(BoundaryCall::UpdateState {
            instance_id,
            component: component_name.to_string(),
            tag,
            state: state.clone(),
        });
    }

    fn load_script_from_string(
        &self,
        instance_id: InstanceId,
        bytes: &[u8],
        url: &str,
    ) -> Result<(), BoundaryError> {
        self.with_state(|state| {
            state.calls.push(BoundaryCall::LoadScript {
                instance_id,
                url: url.to_string(),
                len: bytes.len(),
            });
            if state.failing_urls.contains(url) {
                Err(BoundaryError(format!("script {url} threw during evaluation")))
            } else {
                Ok(())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{ShadowTreeEvent, shadow_tree_channel};
    use serde_json::json;

    #[test]
    fn records_calls_per_instance() {
        let boundary = RecordingBoundary::new();
        boundary.call_rn_function(InstanceId(0), "AppRegistry", "runApplication", vec![json!("app")]);
        boundary.emit_component_event(InstanceId(1), 11, "onPress", Value::Null);

        assert_eq!(boundary.calls().len(), 2);
        let first = boundary.calls_for(InstanceId(0));
        assert!(matches!(
            &first[..],
            [BoundaryCall::CallFunction { module, .. }] if module == "AppRegistry"
        ));
    }

    #[test]
    fn pushes_through_subscribed_sender() {
        let boundary = RecordingBoundary::new();
        let (tx, rx) = shadow_tree_channel(InstanceId(2), 8);
        boundary.subscribe_to_shadow_tree_changes(InstanceId(2), tx);

        let pushed = boundary.push_command(InstanceId(2), 4, "focus", Value::Null);
        assert!(matches!(pushed, Some(Ok(()))));
        assert!(matches!(rx.try_next(), Some(ShadowTreeEvent::Command { tag: 4, .. })));
        assert!(boundary.push_mutations(InstanceId(9), Vec::new()).is_none());
    }

    #[test]
    fn configured_script_failures() {
        let boundary = RecordingBoundary::new();
        boundary.fail_script("bad.bundle");

        assert!(boundary.load_script_from_string(InstanceId(0), b"ok", "good.bundle").is_ok());
        let err = boundary
            .load_script_from_string(InstanceId(0), b"boom", "bad.bundle")
            .unwrap_err();
        assert!(err.0.contains("bad.bundle"));
    }
}
