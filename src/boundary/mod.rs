//! Contract toward the native rendering/scripting engine.
//!
//! The engine is an opaque collaborator: instances receive it as an injected
//! `Arc<dyn NativeBoundary>`, call into it for outbound operations, and receive
//! mutation batches and commands through a bounded [`ShadowTreeSender`] they
//! hand over during initialization.

mod channel;
mod recording;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::descriptor::{PropMap, Tag};
use crate::runtime::InstanceId;
use crate::turbo::TurboModuleProvider;

pub use channel::{ShadowTreeEvent, ShadowTreeReceiver, ShadowTreeSendError, ShadowTreeSender, shadow_tree_channel};
pub use recording::{BoundaryCall, RecordingBoundary};

/// Failure reported by the native engine for an outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("native boundary error: {0}")]
pub struct BoundaryError(pub String);

pub trait NativeBoundary: Send + Sync {
    /// One-shot registration of an instance and the modules it exposes.
    fn initialize_react_native(&self, instance_id: InstanceId, turbo_modules: Arc<TurboModuleProvider>);

    /// Register the entry point mutation batches and commands are pushed into.
    fn subscribe_to_shadow_tree_changes(&self, instance_id: InstanceId, sender: ShadowTreeSender);

    fn call_rn_function(
        &self,
        instance_id: InstanceId,
        module_name: &str,
        function_name: &str,
        args: Vec<Value>,
    );

    fn emit_component_event(&self, instance_id: InstanceId, tag: Tag, handler_name: &str, payload: Value);

    fn update_state(&self, instance_id: InstanceId, component_name: &str, tag: Tag, state: &PropMap);

    fn load_script_from_string(
        &self,
        instance_id: InstanceId,
        bytes: &[u8],
        url: &str,
    ) -> Result<(), BoundaryError>;
}
