mod core;

pub use self::core::{
    BatchReport, ChangeListener, ClampedInsert, DescriptorChangeSet, DescriptorListener,
    DescriptorRegistry, SeedError, StateUpdater, SubscriptionId,
};
