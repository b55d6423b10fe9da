//! Host-side bridge that keeps a tree of UI descriptors in sync with the
//! mutation batches a native rendering/scripting engine produces, and manages
//! the lifecycle of each independent runtime instance.
//!
//! Modules follow one directory per concern; the instance runtime sits on top
//! of the descriptor registry, command dispatcher, component manager registry
//! and turbo module provider.

pub mod boundary;
pub mod commands;
pub mod components;
pub mod descriptor;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod mutation;
pub mod registry;
pub mod runtime;
pub mod turbo;

pub use boundary::{
    BoundaryCall, BoundaryError, NativeBoundary, RecordingBoundary, ShadowTreeEvent,
    ShadowTreeReceiver, ShadowTreeSendError, ShadowTreeSender, shadow_tree_channel,
};
pub use commands::{CommandDispatcher, CommandHandler, CommandOutcome, HandlerId};
pub use components::{ComponentManager, ComponentManagerRegistry};
pub use descriptor::{Descriptor, LayoutDelta, LayoutMetrics, PropMap, ROOT_TAG, Tag};
pub use error::{BridgeError, Result};
pub use logging::{
    LogEvent, LogFields, LogLevel, LogSink, Logger, LoggingError, LoggingResult, MemorySink,
    WriterSink,
};
pub use metrics::{BridgeMetrics, MetricSnapshot};
pub use mutation::{Mutation, MutationError};
pub use registry::{
    BatchReport, ClampedInsert, DescriptorChangeSet, DescriptorRegistry, SeedError,
    StateUpdater, SubscriptionId,
};
pub use runtime::audit::{
    InstanceAudit, InstanceAuditEvent, InstanceAuditEventBuilder, InstanceAuditStage,
    MemoryInstanceAudit, NullInstanceAudit,
};
pub use runtime::bundles::{
    AnyJsBundleProvider, BundleExecutionStatus, BundleLoadError, BundleRunner,
    FileJsBundleProvider, JsBundleProvider, StaticJsBundleProvider,
};
pub use runtime::diagnostics::LifecycleLogger;
pub use runtime::{
    InstanceConfig, InstanceController, InstanceId, InstanceRegistry, LifecycleEvent,
    LifecycleListener, LifecycleState, SurfaceHandle,
};
pub use turbo::{
    Package, PackageContext, TurboModuleContext, TurboModuleError, TurboModuleProvider,
    TurboModuleRef, TurboModulesFactory,
};
