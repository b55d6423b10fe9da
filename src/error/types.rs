use thiserror::Error;

use crate::boundary::ShadowTreeSendError;
use crate::descriptor::Tag;
use crate::mutation::MutationError;
use crate::runtime::InstanceId;
use crate::runtime::bundles::BundleLoadError;
use crate::turbo::TurboModuleError;

/// Unified result type for the bridge crate.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors surfaced by the instance bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("instance {instance} has already been initialized")]
    DuplicateInitialization { instance: InstanceId },
    #[error("instance {0} not found")]
    InstanceNotFound(InstanceId),
    #[error("descriptor {0} not found")]
    DescriptorNotFound(Tag),
    #[error("instance {instance} has no surface tags left")]
    SurfaceTagsExhausted { instance: InstanceId },
    #[error("structural mutation error: {0}")]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Bundle(#[from] BundleLoadError),
    #[error("turbo module error: {0}")]
    TurboModule(#[from] TurboModuleError),
    #[error("shadow tree channel error: {0}")]
    ShadowTree(#[from] ShadowTreeSendError),
}
