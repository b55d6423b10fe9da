mod core;

pub use self::core::{Mutation, MutationError};
