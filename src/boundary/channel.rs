use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};

use serde_json::Value;
use thiserror::Error;

use crate::descriptor::Tag;
use crate::mutation::Mutation;
use crate::runtime::InstanceId;

/// Work pushed from the native engine to one instance.
#[derive(Debug, Clone, PartialEq)]
pub enum ShadowTreeEvent {
    Mutations(Vec<Mutation>),
    Command {
        tag: Tag,
        name: String,
        args: Value,
    },
}

#[derive(Debug, Error)]
pub enum ShadowTreeSendError {
    #[error("shadow tree queue for instance {instance} is full")]
    Full {
        instance: InstanceId,
        event: ShadowTreeEvent,
    },
    #[error("instance {instance} no longer receives shadow tree events")]
    Disconnected {
        instance: InstanceId,
        event: ShadowTreeEvent,
    },
}

impl ShadowTreeSendError {
    /// Recover the event that could not be delivered.
    pub fn into_event(self) -> ShadowTreeEvent {
        match self {
            ShadowTreeSendError::Full { event, .. } | ShadowTreeSendError::Disconnected { event, .. } => {
                event
            }
        }
    }
}

/// Producer half held by the native boundary. Never blocks: a full queue is
/// reported back to the producer.
#[derive(Clone)]
pub struct ShadowTreeSender {
    instance: InstanceId,
    tx: SyncSender<ShadowTreeEvent>,
}

impl ShadowTreeSender {
    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    pub fn send(&self, event: ShadowTreeEvent) -> Result<(), ShadowTreeSendError> {
        self.tx.try_send(event).map_err(|err| match err {
            TrySendError::Full(event) => ShadowTreeSendError::Full {
                instance: self.instance,
                event,
            },
            TrySendError::Disconnected(event) => ShadowTreeSendError::Disconnected {
                instance: self.instance,
                event,
            },
        })
    }

    pub fn send_mutations(&self, batch: Vec<Mutation>) -> Result<(), ShadowTreeSendError> {
        self.send(ShadowTreeEvent::Mutations(batch))
    }

    pub fn send_command(
        &self,
        tag: Tag,
        name: impl Into<String>,
        args: Value,
    ) -> Result<(), ShadowTreeSendError> {
        self.send(ShadowTreeEvent::Command {
            tag,
            name: name.into(),
            args,
        })
    }
}

/// Consumer half owned by the instance controller.
pub struct ShadowTreeReceiver {
    rx: Receiver<ShadowTreeEvent>,
}

impl ShadowTreeReceiver {
    /// Next queued event, if any, without waiting.
    pub fn try_next(&self) -> Option<ShadowTreeEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

/// Bounded, ordered queue between the native engine and one instance.
pub fn shadow_tree_channel(
    instance: InstanceId,
    capacity: usize,
) -> (ShadowTreeSender, ShadowTreeReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    (ShadowTreeSender { instance, tx }, ShadowTreeReceiver { rx })
}
