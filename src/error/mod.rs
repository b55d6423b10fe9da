mod types;

pub use types::{BridgeError, Result};
