//! Namespaced, type-checked service registry.
//!
//! Plugins publish handles under keys such as `audit.service` and other
//! plugins resolve them by type. Keys are unique for the registry's lifetime:
//! registering a key twice is an error, never an overwrite.
//!
//! To share a trait object, register the `Arc<dyn Trait>` itself and resolve
//! with the same type: `resolve::<Arc<dyn AuditSink>>("audit.sink")`.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::ServiceError;

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Entry>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Any + Send + Sync>(
        &self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), ServiceError> {
        self.register_arc(key, Arc::new(value))
    }

    pub fn register_arc<T: Any + Send + Sync>(
        &self,
        key: impl Into<String>,
        value: Arc<T>,
    ) -> Result<(), ServiceError> {
        let key = key.into();
        let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
        if services.contains_key(&key) {
            return Err(ServiceError::Duplicate(key));
        }
        debug!(service = %key, r#type = type_name::<T>(), "Service registered");
        services.insert(
            key,
            Entry {
                value,
                type_name: type_name::<T>(),
            },
        );
        Ok(())
    }

    pub fn resolve<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, ServiceError> {
        let services = self.services.read().unwrap_or_else(PoisonError::into_inner);
        let entry = services
            .get(key)
            .ok_or_else(|| ServiceError::NotFound(key.to_string()))?;
        Arc::clone(&entry.value)
            .downcast::<T>()
            .map_err(|_| ServiceError::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
                actual: entry.type_name,
            })
    }

    /// Like [`resolve`](Self::resolve) but panics; for startup wiring where a
    /// missing service is a programming error.
    pub fn must_resolve<T: Any + Send + Sync>(&self, key: &str) -> Arc<T> {
        match self.resolve(key) {
            Ok(service) => service,
            Err(e) => panic!("{e}"),
        }
    }

    /// Like [`register`](Self::register) but panics on a duplicate key.
    pub fn must_register<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        if let Err(e) = self.register(key, value) {
            panic!("{e}");
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.services.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct AuditService {
        retention_days: u32,
    }

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = ServiceRegistry::new();
        registry
            .register("audit.service", AuditService { retention_days: 30 })
            .unwrap();

        let audit = registry.resolve::<AuditService>("audit.service").unwrap();
        assert_eq!(audit.retention_days, 30);
        assert!(registry.contains("audit.service"));
        assert_eq!(registry.keys(), vec!["audit.service"]);
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let registry = ServiceRegistry::new();
        registry.register("audit.service", 1u32).unwrap();
        let err = registry.register("audit.service", 2u32).unwrap_err();
        assert_eq!(err, ServiceError::Duplicate("audit.service".into()));
        assert_eq!(*registry.resolve::<u32>("audit.service").unwrap(), 1);
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let registry = ServiceRegistry::new();
        registry.register("audit.service", AuditService { retention_days: 1 }).unwrap();
        let err = registry.resolve::<String>("audit.service").unwrap_err();
        assert!(matches!(err, ServiceError::TypeMismatch { ref key, .. } if key == "audit.service"));
    }

    #[test]
    fn test_absent_key_is_rejected() {
        let registry = ServiceRegistry::new();
        let err = registry.resolve::<u32>("nope").unwrap_err();
        assert_eq!(err, ServiceError::NotFound("nope".into()));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_trait_object_services() {
        let registry = ServiceRegistry::new();
        let greeter: Arc<dyn Greeter> = Arc::new(English);
        registry.register("i18n.greeter", greeter).unwrap();

        let resolved = registry.resolve::<Arc<dyn Greeter>>("i18n.greeter").unwrap();
        assert_eq!(resolved.greet(), "hello");
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn test_must_resolve_panics() {
        ServiceRegistry::new().must_resolve::<u32>("missing");
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_must_register_panics_on_duplicate() {
        let registry = ServiceRegistry::new();
        registry.must_register("k", 1u8);
        registry.must_register("k", 2u8);
    }
}
