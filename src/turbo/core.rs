use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use thiserror::Error;

use crate::boundary::NativeBoundary;
use crate::logging::Logger;
use crate::runtime::InstanceId;

/// A resolved turbo module. Callers downcast to the concrete module type.
pub type TurboModuleRef = Arc<dyn Any + Send + Sync>;

/// Creates named turbo modules on demand. One factory per package.
pub trait TurboModulesFactory: Send + Sync {
    fn has_turbo_module(&self, name: &str) -> bool;

    fn create_turbo_module(&self, name: &str) -> Option<TurboModuleRef>;
}

/// Handed to package factories so the modules they build can talk back to the
/// native boundary on behalf of their instance.
#[derive(Clone)]
pub struct TurboModuleContext {
    pub instance_id: InstanceId,
    pub boundary: Arc<dyn NativeBoundary>,
    pub logger: Option<Logger>,
}

impl TurboModuleContext {
    pub fn call_rn_function(&self, module_name: &str, function_name: &str, args: Vec<Value>) {
        self.boundary
            .call_rn_function(self.instance_id, module_name, function_name, args);
    }
}

/// Passed to the package factory when an instance is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageContext {
    pub instance_id: InstanceId,
}

/// Unit of native capability registration.
pub trait Package: Send {
    fn name(&self) -> &str {
        "package"
    }

    fn create_turbo_modules_factory(&self, ctx: &TurboModuleContext)
    -> Box<dyn TurboModulesFactory>;
}

#[derive(Debug, Error)]
pub enum TurboModuleError {
    #[error("no package provides turbo module `{0}`")]
    NotFound(String),
    #[error("turbo module `{0}` has a different type than requested")]
    TypeMismatch(String),
    #[error("turbo module cache poisoned")]
    Poisoned,
}

/// Resolves turbo modules by name, asking factories in package order and
/// caching each module after its first creation.
pub struct TurboModuleProvider {
    factories: Vec<Box<dyn TurboModulesFactory>>,
    cache: RwLock<HashMap<String, TurboModuleRef>>,
}

impl TurboModuleProvider {
    pub fn new(factories: Vec<Box<dyn TurboModulesFactory>>) -> Self {
        Self {
            factories,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_packages(packages: &[Box<dyn Package>], ctx: &TurboModuleContext) -> Self {
        Self::new(
            packages
                .iter()
                .map(|package| package.create_turbo_modules_factory(ctx))
                .collect(),
        )
    }

    pub fn has_module(&self, name: &str) -> bool {
        let cached = self
            .cache
            .read()
            .map(|guard| guard.contains_key(name))
            .unwrap_or(false);
        cached
            || self
                .factories
                .iter()
                .any(|factory| factory.has_turbo_module(name))
    }

    pub fn cached_count(&self) -> usize {
        self.cache.read().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn get_module_ref(&self, name: &str) -> Result<TurboModuleRef, TurboModuleError> {
        {
            let guard = self.cache.read().map_err(|_| TurboModuleError::Poisoned)?;
            if let Some(module) = guard.get(name) {
                return Ok(module.clone());
            }
        }

        let created = self
            .factories
            .iter()
            .filter(|factory| factory.has_turbo_module(name))
            .find_map(|factory| factory.create_turbo_module(name))
            .ok_or_else(|| TurboModuleError::NotFound(name.to_string()))?;

        let mut guard = self.cache.write().map_err(|_| TurboModuleError::Poisoned)?;
        let module = guard.entry(name.to_string()).or_insert(created);
        Ok(module.clone())
    }

    pub fn get_module<T>(&self, name: &str) -> Result<Arc<T>, TurboModuleError>
    where
        T: Any + Send + Sync,
    {
        self.get_module_ref(name)?
            .downcast::<T>()
            .map_err(|_| TurboModuleError::TypeMismatch(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct DeviceInfo {
        scale: f64,
    }

    struct Counting {
        names: Vec<&'static str>,
        created: Arc<AtomicUsize>,
    }

    impl TurboModulesFactory for Counting {
        fn has_turbo_module(&self, name: &str) -> bool {
            self.names.iter().any(|known| *known == name)
        }

        fn create_turbo_module(&self, _name: &str) -> Option<TurboModuleRef> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Some(Arc::new(DeviceInfo { scale: 2.0 }))
        }
    }

    fn provider(created: &Arc<AtomicUsize>) -> TurboModuleProvider {
        let factories: Vec<Box<dyn TurboModulesFactory>> = vec![Box::new(Counting {
            names: vec!["DeviceInfo"],
            created: created.clone(),
        })];
        TurboModuleProvider::new(factories)
    }

    #[test]
    fn resolves_and_caches_module() {
        let created = Arc::new(AtomicUsize::new(0));
        let provider = provider(&created);

        let first = provider.get_module::<DeviceInfo>("DeviceInfo").unwrap();
        let second = provider.get_module::<DeviceInfo>("DeviceInfo").unwrap();

        assert_eq!(first.scale, 2.0);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(provider.cached_count(), 1);
    }

    #[test]
    fn unknown_module_is_not_found() {
        let provider = provider(&Arc::new(AtomicUsize::new(0)));
        assert!(!provider.has_module("Linking"));
        let err = provider.get_module::<DeviceInfo>("Linking").unwrap_err();
        assert!(matches!(err, TurboModuleError::NotFound(name) if name == "Linking"));
    }

    #[test]
    fn wrong_type_is_reported() {
        let provider = provider(&Arc::new(AtomicUsize::new(0)));
        let err = provider.get_module::<String>("DeviceInfo").unwrap_err();
        assert!(matches!(err, TurboModuleError::TypeMismatch(_)));
    }

    #[test]
    fn earlier_factories_win() {
        struct Fixed(&'static str);
        impl TurboModulesFactory for Fixed {
            fn has_turbo_module(&self, name: &str) -> bool {
                name == "Shared"
            }
            fn create_turbo_module(&self, _name: &str) -> Option<TurboModuleRef> {
                Some(Arc::new(self.0.to_string()))
            }
        }

        let factories: Vec<Box<dyn TurboModulesFactory>> =
            vec![Box::new(Fixed("core")), Box::new(Fixed("app"))];
        let provider = TurboModuleProvider::new(factories);
        let module = provider.get_module::<String>("Shared").unwrap();
        assert_eq!(module.as_str(), "core");
    }
}
