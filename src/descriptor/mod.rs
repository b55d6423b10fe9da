mod core;

pub use self::core::{
    Descriptor, LayoutDelta, LayoutMetrics, PropMap, ROOT_TAG, Tag, merge_props, root_descriptor,
};
