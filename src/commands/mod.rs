mod core;

pub use self::core::{CommandDispatcher, CommandHandler, CommandOutcome, HandlerId};
