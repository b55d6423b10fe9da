use std::collections::HashMap;

use serde_json::{Value, json};

use crate::descriptor::Tag;
use crate::logging::{LogLevel, Logger, emit, json_kv};

/// Behavioural handler invoked with `(command_name, args)`.
pub type CommandHandler = Box<dyn FnMut(&str, &Value) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Number of handlers that received the command.
    Delivered(usize),
    /// Nobody listens on the tag; the command raced node removal or was never wired.
    Dropped,
}

/// Routes imperative commands from the native boundary to handlers keyed by tag.
/// Commands are processed in receipt order; nothing is queued.
#[derive(Default)]
pub struct CommandDispatcher {
    handlers: HashMap<Tag, Vec<(HandlerId, CommandHandler)>>,
    next_handler: u64,
    logger: Option<Logger>,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_logger(mut self, logger: Option<Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn register_command_handler<F>(&mut self, tag: Tag, handler: F) -> HandlerId
    where
        F: FnMut(&str, &Value) + Send + 'static,
    {
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        self.handlers
            .entry(tag)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    pub fn unregister_handler(&mut self, id: HandlerId) -> bool {
        let mut emptied = None;
        let mut found = false;
        for (tag, handlers) in self.handlers.iter_mut() {
            let before = handlers.len();
            handlers.retain(|(existing, _)| *existing != id);
            if handlers.len() != before {
                found = true;
                if handlers.is_empty() {
                    emptied = Some(*tag);
                }
                break;
            }
        }
        if let Some(tag) = emptied {
            self.handlers.remove(&tag);
        }
        found
    }

    /// Drop every handler attached to `tag`, returning how many were removed.
    pub fn unregister_tag(&mut self, tag: Tag) -> usize {
        self.handlers
            .remove(&tag)
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }

    pub fn has_handler(&self, tag: Tag) -> bool {
        self.handlers.contains_key(&tag)
    }

    pub fn dispatch_command(&mut self, tag: Tag, command_name: &str, args: &Value) -> CommandOutcome {
        let Some(handlers) = self.handlers.get_mut(&tag) else {
            emit(
                self.logger.as_ref(),
                LogLevel::Warn,
                "rnoh::commands",
                "command_dropped",
                [
                    json_kv("tag", json!(tag)),
                    json_kv("command", json!(command_name)),
                ],
            );
            return CommandOutcome::Dropped;
        };

        for (_, handler) in handlers.iter_mut() {
            handler(command_name, args);
        }
        CommandOutcome::Delivered(handlers.len())
    }
}
