mod core;

pub use self::core::{ComponentManager, ComponentManagerRegistry};
