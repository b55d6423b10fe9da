use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::{LayoutDelta, PropMap, Tag};

/// One tree-edit instruction. Mutations only ever arrive in ordered batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mutation {
    Create {
        tag: Tag,
        #[serde(rename = "type")]
        kind: String,
        #[serde(default)]
        props: PropMap,
    },
    Update {
        tag: Tag,
        #[serde(default)]
        props: PropMap,
        #[serde(default)]
        state: PropMap,
        #[serde(default)]
        layout: LayoutDelta,
    },
    InsertChild {
        parent: Tag,
        child: Tag,
        index: usize,
    },
    RemoveChild {
        parent: Tag,
        child: Tag,
    },
    Delete {
        tag: Tag,
    },
}

impl Mutation {
    pub fn create(tag: Tag, kind: impl Into<String>) -> Self {
        Mutation::Create {
            tag,
            kind: kind.into(),
            props: PropMap::new(),
        }
    }

    pub fn update_props(tag: Tag, props: PropMap) -> Self {
        Mutation::Update {
            tag,
            props,
            state: PropMap::new(),
            layout: LayoutDelta::default(),
        }
    }

    pub fn insert(parent: Tag, child: Tag, index: usize) -> Self {
        Mutation::InsertChild {
            parent,
            child,
            index,
        }
    }

    pub fn remove(parent: Tag, child: Tag) -> Self {
        Mutation::RemoveChild { parent, child }
    }

    pub fn delete(tag: Tag) -> Self {
        Mutation::Delete { tag }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Create { .. } => "create",
            Mutation::Update { .. } => "update",
            Mutation::InsertChild { .. } => "insert_child",
            Mutation::RemoveChild { .. } => "remove_child",
            Mutation::Delete { .. } => "delete",
        }
    }
}

/// Structural violation that rejects a whole batch. `index` is the position of
/// the offending mutation inside its batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("mutation {index}: tag 0 is not a valid descriptor tag")]
    InvalidTag { index: usize },
    #[error("mutation {index}: descriptor {tag} does not exist")]
    UnknownTag { index: usize, tag: Tag },
    #[error("mutation {index}: descriptor {tag} already exists")]
    DuplicateTag { index: usize, tag: Tag },
    #[error("mutation {index}: descriptor {child} is not a child of {parent}")]
    ChildNotFound { index: usize, parent: Tag, child: Tag },
    #[error("mutation {index}: descriptor {child} is already attached to {parent}")]
    AlreadyAttached { index: usize, parent: Tag, child: Tag },
    #[error("mutation {index}: inserting {child} under {parent} would create a cycle")]
    Cycle { index: usize, parent: Tag, child: Tag },
    #[error("mutation {index}: descriptor {tag} is still a child of {parent}")]
    StillAttached { index: usize, tag: Tag, parent: Tag },
    #[error("mutation {index}: the root descriptor cannot be deleted")]
    RootDeletion { index: usize },
}

impl MutationError {
    pub fn index(&self) -> usize {
        match self {
            MutationError::InvalidTag { index }
            | MutationError::UnknownTag { index, .. }
            | MutationError::DuplicateTag { index, .. }
            | MutationError::ChildNotFound { index, .. }
            | MutationError::AlreadyAttached { index, .. }
            | MutationError::Cycle { index, .. }
            | MutationError::StillAttached { index, .. }
            | MutationError::RootDeletion { index } => *index,
        }
    }
}
