use std::collections::HashMap;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use serde_json::json;
use thiserror::Error;

use crate::descriptor::{Descriptor, PropMap, ROOT_TAG, Tag, merge_props, root_descriptor};
use crate::error::{BridgeError, Result};
use crate::logging::{LogLevel, Logger, emit, json_kv};
use crate::mutation::{Mutation, MutationError};

/// Forwards host-originated state changes to the native boundary:
/// `(component_name, tag, state_delta)`.
pub type StateUpdater = Arc<dyn Fn(&str, Tag, &PropMap) + Send + Sync>;

/// Receives the post-mutation snapshot of every tag touched by a batch.
pub type ChangeListener = Box<dyn FnMut(&DescriptorChangeSet) + Send>;

/// Receives the post-mutation snapshot of a single descriptor.
pub type DescriptorListener = Box<dyn FnMut(&Descriptor) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// What subscribers observe after a batch: the touched descriptors that still
/// exist, in first-touch order, and the previously committed tags the batch
/// deleted. A tag deleted and created again by the same batch appears in both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorChangeSet {
    pub updated: Vec<Descriptor>,
    pub deleted: Vec<Tag>,
}

impl DescriptorChangeSet {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn get(&self, tag: Tag) -> Option<&Descriptor> {
        self.updated.iter().find(|descriptor| descriptor.tag == tag)
    }
}

/// An INSERT_CHILD whose index exceeded the parent's child count and was
/// appended instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedInsert {
    pub parent: Tag,
    pub child: Tag,
    pub requested: usize,
    pub applied: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub applied: usize,
    pub affected: Vec<Tag>,
    pub deleted: Vec<Tag>,
    pub clamped: Vec<ClampedInsert>,
}

/// Rejected seed for [`DescriptorRegistry::from_descriptors`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeedError {
    #[error("seed contains tag 0")]
    InvalidTag,
    #[error("descriptor {parent} lists missing child {child}")]
    DanglingChild { parent: Tag, child: Tag },
    #[error("descriptor {child} is listed under both {first} and {second}")]
    MultipleParents { child: Tag, first: Tag, second: Tag },
    #[error("descriptor {tag} is its own ancestor")]
    Cycle { tag: Tag },
}

/// Copy-on-write view over the store used while a batch is validated.
/// `None` entries mark descriptors deleted by the batch.
struct Staging<'a> {
    store: &'a HashMap<Tag, Descriptor>,
    overlay: IndexMap<Tag, Option<Descriptor>>,
}

impl<'a> Staging<'a> {
    fn new(store: &'a HashMap<Tag, Descriptor>) -> Self {
        Self {
            store,
            overlay: IndexMap::new(),
        }
    }

    fn get(&self, tag: Tag) -> Option<&Descriptor> {
        match self.overlay.get(&tag) {
            Some(entry) => entry.as_ref(),
            None => self.store.get(&tag),
        }
    }

    fn contains(&self, tag: Tag) -> bool {
        self.get(tag).is_some()
    }

    fn get_mut(&mut self, tag: Tag) -> Option<&mut Descriptor> {
        if !self.overlay.contains_key(&tag) {
            let current = self.store.get(&tag)?.clone();
            self.overlay.insert(tag, Some(current));
        }
        self.overlay.get_mut(&tag).and_then(Option::as_mut)
    }

    fn insert(&mut self, descriptor: Descriptor) {
        self.overlay.insert(descriptor.tag, Some(descriptor));
    }

    fn remove(&mut self, tag: Tag) {
        self.overlay.insert(tag, None);
    }

    /// Whether `tag` was part of the store before the batch began.
    fn committed(&self, tag: Tag) -> bool {
        self.store.contains_key(&tag)
    }

    /// True when `candidate` is `tag` itself or one of its ancestors.
    fn is_ancestor_or_self(&self, candidate: Tag, tag: Tag) -> bool {
        let mut cursor = Some(tag);
        while let Some(current) = cursor {
            if current == candidate {
                return true;
            }
            cursor = self.get(current).and_then(|descriptor| descriptor.parent_tag);
        }
        false
    }
}

/// Owns the descriptor tree of one instance and applies mutation batches to it.
pub struct DescriptorRegistry {
    descriptors: HashMap<Tag, Descriptor>,
    default_props: PropMap,
    state_updater: Option<StateUpdater>,
    logger: Option<Logger>,
    listeners: Vec<(SubscriptionId, ChangeListener)>,
    descriptor_listeners: HashMap<Tag, Vec<(SubscriptionId, DescriptorListener)>>,
    next_subscription: u64,
}

impl Default for DescriptorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorRegistry {
    /// Registry seeded with the root descriptor only.
    pub fn new() -> Self {
        let mut descriptors = HashMap::new();
        descriptors.insert(ROOT_TAG, root_descriptor());
        Self::from_store(descriptors)
    }

    /// Registry seeded with `descriptors`; the root is added when missing.
    /// `parentTag` is rebuilt from the children lists, which must reference
    /// existing tags, give every child a single parent and contain no cycle.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = Descriptor>,
    ) -> std::result::Result<Self, SeedError> {
        let mut map: HashMap<Tag, Descriptor> = HashMap::new();
        for descriptor in descriptors {
            if descriptor.tag == 0 {
                return Err(SeedError::InvalidTag);
            }
            map.insert(descriptor.tag, descriptor);
        }
        map.entry(ROOT_TAG).or_insert_with(root_descriptor);

        let mut tags: Vec<Tag> = map.keys().copied().collect();
        tags.sort_unstable();
        let mut parents: HashMap<Tag, Tag> = HashMap::new();
        for tag in &tags {
            for child in &map[tag].children_tags {
                if !map.contains_key(child) {
                    return Err(SeedError::DanglingChild {
                        parent: *tag,
                        child: *child,
                    });
                }
                if let Some(first) = parents.insert(*child, *tag) {
                    return Err(SeedError::MultipleParents {
                        child: *child,
                        first,
                        second: *tag,
                    });
                }
            }
        }

        // Every node has at most one parent, so a chain longer than the
        // store can only be a loop.
        for tag in &tags {
            let mut cursor = parents.get(tag).copied();
            let mut steps = 0;
            while let Some(current) = cursor {
                steps += 1;
                if current == *tag || steps > tags.len() {
                    return Err(SeedError::Cycle { tag: *tag });
                }
                cursor = parents.get(&current).copied();
            }
        }

        for (tag, descriptor) in map.iter_mut() {
            descriptor.parent_tag = parents.get(tag).copied();
        }
        Ok(Self::from_store(map))
    }

    fn from_store(descriptors: HashMap<Tag, Descriptor>) -> Self {
        Self {
            descriptors,
            default_props: PropMap::new(),
            state_updater: None,
            logger: None,
            listeners: Vec::new(),
            descriptor_listeners: HashMap::new(),
            next_subscription: 0,
        }
    }

    pub fn with_state_updater(mut self, updater: StateUpdater) -> Self {
        self.state_updater = Some(updater);
        self
    }

    /// Props every CREATE starts from before its initial props are merged on top.
    pub fn with_default_props(mut self, props: PropMap) -> Self {
        self.default_props = props;
        self
    }

    pub fn with_logger(mut self, logger: Option<Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn get(&self, tag: Tag) -> Option<&Descriptor> {
        self.descriptors.get(&tag)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.descriptors.contains_key(&tag)
    }

    pub fn root(&self) -> Option<&Descriptor> {
        self.get(ROOT_TAG)
    }

    pub fn children_of(&self, tag: Tag) -> Option<&[Tag]> {
        self.get(tag)
            .map(|descriptor| descriptor.children_tags.as_slice())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.descriptors.keys().copied()
    }

    /// `(parent, child)` pairs whose child has no descriptor. Always empty
    /// between batches.
    pub fn dangling_children(&self) -> Vec<(Tag, Tag)> {
        let mut dangling = Vec::new();
        for descriptor in self.descriptors.values() {
            for child in &descriptor.children_tags {
                if !self.descriptors.contains_key(child) {
                    dangling.push((descriptor.tag, *child));
                }
            }
        }
        dangling
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&DescriptorChangeSet) + Send + 'static,
    {
        let id = self.next_subscription_id();
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn subscribe_to_descriptor<F>(&mut self, tag: Tag, listener: F) -> SubscriptionId
    where
        F: FnMut(&Descriptor) + Send + 'static,
    {
        let id = self.next_subscription_id();
        self.descriptor_listeners
            .entry(tag)
            .or_default()
            .push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        if self.listeners.len() != before {
            return true;
        }

        for listeners in self.descriptor_listeners.values_mut() {
            let before = listeners.len();
            listeners.retain(|(existing, _)| *existing != id);
            if listeners.len() != before {
                return true;
            }
        }
        false
    }

    /// Apply one batch atomically. On error nothing is committed and no
    /// subscriber is notified.
    pub fn apply_mutations(
        &mut self,
        batch: &[Mutation],
    ) -> std::result::Result<BatchReport, MutationError> {
        if batch.is_empty() {
            return Ok(BatchReport::default());
        }

        let mut staging = Staging::new(&self.descriptors);
        let mut clamped = Vec::new();
        let mut deleted = IndexSet::new();
        for (index, mutation) in batch.iter().enumerate() {
            apply_one(
                &mut staging,
                &self.default_props,
                index,
                mutation,
                &mut clamped,
                &mut deleted,
            )?;
        }

        let overlay = staging.overlay;
        let mut changes = DescriptorChangeSet {
            updated: Vec::new(),
            deleted: deleted.into_iter().collect(),
        };
        for (tag, entry) in overlay {
            match entry {
                Some(descriptor) => {
                    changes.updated.push(descriptor.clone());
                    self.descriptors.insert(tag, descriptor);
                }
                None => {
                    self.descriptors.remove(&tag);
                }
            }
        }

        for insert in &clamped {
            emit(
                self.logger.as_ref(),
                LogLevel::Warn,
                "rnoh::descriptors",
                "child_insert_clamped",
                [
                    json_kv("parent", json!(insert.parent)),
                    json_kv("child", json!(insert.child)),
                    json_kv("requested", json!(insert.requested)),
                    json_kv("applied", json!(insert.applied)),
                ],
            );
        }

        let report = BatchReport {
            applied: batch.len(),
            affected: changes.updated.iter().map(|d| d.tag).collect(),
            deleted: changes.deleted.clone(),
            clamped,
        };
        self.notify(&changes);
        Ok(report)
    }

    /// Merge host-originated state into a descriptor and forward it to the
    /// native boundary without waiting for confirmation.
    pub fn set_state(&mut self, tag: Tag, delta: PropMap) -> Result<()> {
        let descriptor = self
            .descriptors
            .get_mut(&tag)
            .ok_or(BridgeError::DescriptorNotFound(tag))?;
        merge_props(&mut descriptor.state, &delta);
        let changes = DescriptorChangeSet {
            updated: vec![descriptor.clone()],
            deleted: Vec::new(),
        };
        let component_name = descriptor.kind.clone();

        self.notify(&changes);
        if let Some(updater) = self.state_updater.as_ref() {
            updater(&component_name, tag, &delta);
        }
        Ok(())
    }

    fn notify(&mut self, changes: &DescriptorChangeSet) {
        if changes.is_empty() {
            return;
        }

        // Listeners of a deleted tag never see a descriptor recreated under it.
        for tag in &changes.deleted {
            self.descriptor_listeners.remove(tag);
        }

        for (_, listener) in self.listeners.iter_mut() {
            listener(changes);
        }

        for descriptor in &changes.updated {
            if let Some(listeners) = self.descriptor_listeners.get_mut(&descriptor.tag) {
                for (_, listener) in listeners.iter_mut() {
                    listener(descriptor);
                }
            }
        }
    }

    fn next_subscription_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        id
    }
}

fn apply_one(
    staging: &mut Staging<'_>,
    default_props: &PropMap,
    index: usize,
    mutation: &Mutation,
    clamped: &mut Vec<ClampedInsert>,
    deleted: &mut IndexSet<Tag>,
) -> std::result::Result<(), MutationError> {
    match mutation {
        Mutation::Create { tag, kind, props } => {
            ensure_valid(index, *tag)?;
            if staging.contains(*tag) {
                return Err(MutationError::DuplicateTag { index, tag: *tag });
            }
            let mut descriptor = Descriptor::new(*tag, kind.clone()).with_props(default_props.clone());
            merge_props(&mut descriptor.props, props);
            staging.insert(descriptor);
        }
        Mutation::Update {
            tag,
            props,
            state,
            layout,
        } => {
            ensure_valid(index, *tag)?;
            let descriptor = staging
                .get_mut(*tag)
                .ok_or(MutationError::UnknownTag { index, tag: *tag })?;
            merge_props(&mut descriptor.props, props);
            merge_props(&mut descriptor.state, state);
            descriptor.layout_metrics.apply(layout);
        }
        Mutation::InsertChild {
            parent,
            child,
            index: position,
        } => {
            ensure_valid(index, *parent)?;
            ensure_valid(index, *child)?;
            ensure_exists(staging, index, *parent)?;
            let current_parent = staging
                .get(*child)
                .ok_or(MutationError::UnknownTag { index, tag: *child })?
                .parent_tag;
            if let Some(existing) = current_parent {
                return Err(MutationError::AlreadyAttached {
                    index,
                    parent: existing,
                    child: *child,
                });
            }
            if staging.is_ancestor_or_self(*child, *parent) {
                return Err(MutationError::Cycle {
                    index,
                    parent: *parent,
                    child: *child,
                });
            }

            if let Some(descriptor) = staging.get_mut(*parent) {
                let len = descriptor.children_tags.len();
                let applied = (*position).min(len);
                if *position > len {
                    clamped.push(ClampedInsert {
                        parent: *parent,
                        child: *child,
                        requested: *position,
                        applied,
                    });
                }
                descriptor.children_tags.insert(applied, *child);
            }
            if let Some(descriptor) = staging.get_mut(*child) {
                descriptor.parent_tag = Some(*parent);
            }
        }
        Mutation::RemoveChild { parent, child } => {
            ensure_valid(index, *parent)?;
            ensure_valid(index, *child)?;
            let descriptor = staging
                .get_mut(*parent)
                .ok_or(MutationError::UnknownTag { index, tag: *parent })?;
            let position = descriptor
                .children_tags
                .iter()
                .position(|existing| existing == child)
                .ok_or(MutationError::ChildNotFound {
                    index,
                    parent: *parent,
                    child: *child,
                })?;
            descriptor.children_tags.remove(position);
            if let Some(descriptor) = staging.get_mut(*child) {
                descriptor.parent_tag = None;
            }
        }
        Mutation::Delete { tag } => {
            ensure_valid(index, *tag)?;
            if *tag == ROOT_TAG {
                return Err(MutationError::RootDeletion { index });
            }
            let descriptor = staging
                .get(*tag)
                .ok_or(MutationError::UnknownTag { index, tag: *tag })?;
            if let Some(parent) = descriptor.parent_tag {
                return Err(MutationError::StillAttached {
                    index,
                    tag: *tag,
                    parent,
                });
            }
            let orphans = descriptor.children_tags.clone();
            for orphan in orphans {
                if let Some(child) = staging.get_mut(orphan) {
                    child.parent_tag = None;
                }
            }
            if staging.committed(*tag) {
                deleted.insert(*tag);
            }
            staging.remove(*tag);
        }
    }
    Ok(())
}

fn ensure_valid(index: usize, tag: Tag) -> std::result::Result<(), MutationError> {
    if tag == 0 {
        return Err(MutationError::InvalidTag { index });
    }
    Ok(())
}

fn ensure_exists(
    staging: &Staging<'_>,
    index: usize,
    tag: Tag,
) -> std::result::Result<(), MutationError> {
    if staging.contains(tag) {
        Ok(())
    } else {
        Err(MutationError::UnknownTag { index, tag })
    }
}
