use std::collections::HashMap;

use crate::descriptor::Tag;

/// Behavioural counterpart of a descriptor. Concrete managers are supplied by
/// platform packages; the registry only relies on this interface.
pub trait ComponentManager: Send {
    fn tag(&self) -> Tag;

    fn parent_tag(&self) -> Option<Tag>;

    /// Teardown hook, called exactly once before the manager is dropped.
    fn on_destroy(&mut self) {}
}

/// One optional manager per live tag. Managers are destroyed when they are
/// unregistered, replaced, or when the registry itself is dropped.
#[derive(Default)]
pub struct ComponentManagerRegistry {
    managers: HashMap<Tag, Box<dyn ComponentManager>>,
}

impl ComponentManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `manager` to `tag`. A manager already registered for the tag is
    /// destroyed first; returns whether that happened.
    pub fn register<M>(&mut self, tag: Tag, manager: M) -> bool
    where
        M: ComponentManager + 'static,
    {
        self.register_boxed(tag, Box::new(manager))
    }

    pub fn register_boxed(&mut self, tag: Tag, manager: Box<dyn ComponentManager>) -> bool {
        match self.managers.insert(tag, manager) {
            Some(mut previous) => {
                previous.on_destroy();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, tag: Tag) -> Option<&dyn ComponentManager> {
        self.managers.get(&tag).map(|manager| manager.as_ref())
    }

    pub fn get_mut(&mut self, tag: Tag) -> Option<&mut (dyn ComponentManager + 'static)> {
        self.managers.get_mut(&tag).map(|manager| manager.as_mut())
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.managers.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    pub fn unregister(&mut self, tag: Tag) -> bool {
        match self.managers.remove(&tag) {
            Some(mut manager) => {
                manager.on_destroy();
                true
            }
            None => false,
        }
    }

    /// Destroy every manager, returning how many were released.
    pub fn release_all(&mut self) -> usize {
        let count = self.managers.len();
        for (_, mut manager) in self.managers.drain() {
            manager.on_destroy();
        }
        count
    }
}

impl Drop for ComponentManagerRegistry {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Spy {
        tag: Tag,
        parent: Option<Tag>,
        destroyed: Arc<Mutex<Vec<Tag>>>,
    }

    impl ComponentManager for Spy {
        fn tag(&self) -> Tag {
            self.tag
        }

        fn parent_tag(&self) -> Option<Tag> {
            self.parent
        }

        fn on_destroy(&mut self) {
            self.destroyed.lock().unwrap().push(self.tag);
        }
    }

    fn spy(tag: Tag, destroyed: &Arc<Mutex<Vec<Tag>>>) -> Spy {
        Spy {
            tag,
            parent: Some(1),
            destroyed: destroyed.clone(),
        }
    }

    #[test]
    fn unregister_calls_on_destroy() {
        let destroyed = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ComponentManagerRegistry::new();
        registry.register(4, spy(4, &destroyed));

        assert_eq!(registry.get(4).map(|m| m.parent_tag()), Some(Some(1)));
        assert!(registry.unregister(4));
        assert!(!registry.unregister(4));
        assert_eq!(*destroyed.lock().unwrap(), vec![4]);
    }

    #[test]
    fn replacing_destroys_previous_manager() {
        let destroyed = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ComponentManagerRegistry::new();
        assert!(!registry.register(4, spy(4, &destroyed)));
        assert!(registry.register(4, spy(4, &destroyed)));

        assert_eq!(registry.len(), 1);
        assert_eq!(*destroyed.lock().unwrap(), vec![4]);
    }

    #[test]
    fn dropping_registry_releases_everything() {
        let destroyed = Arc::new(Mutex::new(Vec::new()));
        {
            let mut registry = ComponentManagerRegistry::new();
            registry.register(2, spy(2, &destroyed));
            registry.register(3, spy(3, &destroyed));
        }
        let mut seen = destroyed.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec![2, 3]);
    }
}
