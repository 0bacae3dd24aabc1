//! Plugin registry: tracks registered plugins and their lifecycle state.
//!
//! Registration order is kept so listings are stable. The state map is read
//! concurrently by callers while the runtime drives transitions.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use crate::error::RegistrationError;
use crate::lifecycle::{Plugin, PluginState};
use crate::resolver::PluginDescriptor;

struct PluginEntry {
    plugin: Arc<dyn Plugin>,
    state: PluginState,
    last_error: Option<String>,
}

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    entries: HashMap<String, PluginEntry>,
}

#[derive(Default)]
pub struct PluginRegistry {
    inner: RwLock<Inner>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<(), RegistrationError> {
        let name = plugin.name().to_string();
        if name.trim().is_empty() {
            return Err(RegistrationError::EmptyName);
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.entries.contains_key(&name) {
            return Err(RegistrationError::Duplicate(name));
        }
        debug!(plugin = %name, version = plugin.version(), "Plugin registered");
        inner.order.push(name.clone());
        inner.entries.insert(
            name,
            PluginEntry {
                plugin,
                state: PluginState::Registered,
                last_error: None,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(name)
            .map(|e| Arc::clone(&e.plugin))
    }

    pub fn state(&self, name: &str) -> Option<PluginState> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(name)
            .map(|e| e.state)
    }

    /// Move `name` to `next` if the state machine allows it. Returns whether
    /// the transition happened.
    pub fn transition(&self, name: &str, next: PluginState) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = inner.entries.get_mut(name) else {
            return false;
        };
        if !entry.state.can_transition_to(next) {
            warn!(plugin = %name, from = %entry.state, to = %next, "Rejected plugin state transition");
            return false;
        }
        debug!(plugin = %name, from = %entry.state, to = %next, "Plugin state changed");
        entry.state = next;
        true
    }

    /// Mark `name` as `Failed` and remember why.
    pub fn mark_failed(&self, name: &str, reason: impl Into<String>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = inner.entries.get_mut(name) {
            if entry.state.can_transition_to(PluginState::Failed) {
                entry.state = PluginState::Failed;
            }
            entry.last_error = Some(reason.into());
        }
    }

    pub fn last_error(&self, name: &str) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(name)
            .and_then(|e| e.last_error.clone())
    }

    /// Snapshot of every plugin's state, keyed by name.
    pub fn states(&self) -> BTreeMap<String, PluginState> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .iter()
            .map(|(name, e)| (name.clone(), e.state))
            .collect()
    }

    /// Descriptors in registration order, for dependency resolution.
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .order
            .iter()
            .filter_map(|name| inner.entries.get(name))
            .map(|e| PluginDescriptor::new(e.plugin.name(), e.plugin.dependencies()))
            .collect()
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AppContext;
    use async_trait::async_trait;

    struct Named(&'static str, Vec<String>);

    #[async_trait]
    impl Plugin for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn version(&self) -> &str {
            "0.1.0"
        }

        fn dependencies(&self) -> Vec<String> {
            self.1.clone()
        }

        async fn enable(&self, _ctx: &AppContext) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn plugin(name: &'static str, deps: &[&str]) -> Arc<dyn Plugin> {
        Arc::new(Named(name, deps.iter().map(|d| d.to_string()).collect()))
    }

    #[test]
    fn test_register_keeps_order() {
        let registry = PluginRegistry::new();
        registry.register(plugin("zeta", &[])).unwrap();
        registry.register(plugin("alpha", &["zeta"])).unwrap();

        assert_eq!(registry.names(), vec!["zeta", "alpha"]);
        assert_eq!(registry.state("alpha"), Some(PluginState::Registered));
        assert_eq!(registry.descriptors()[1].dependencies, vec!["zeta"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_duplicate_and_empty_names_rejected() {
        let registry = PluginRegistry::new();
        registry.register(plugin("audit", &[])).unwrap();
        assert_eq!(
            registry.register(plugin("audit", &[])).unwrap_err(),
            RegistrationError::Duplicate("audit".into())
        );
        assert_eq!(
            registry.register(plugin("  ", &[])).unwrap_err(),
            RegistrationError::EmptyName
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_transitions_follow_state_machine() {
        let registry = PluginRegistry::new();
        registry.register(plugin("audit", &[])).unwrap();

        assert!(!registry.transition("audit", PluginState::Enabled));
        assert!(registry.transition("audit", PluginState::Installed));
        assert!(registry.transition("audit", PluginState::Enabled));
        assert!(registry.transition("audit", PluginState::Disabled));
        assert!(!registry.transition("audit", PluginState::Enabled));
        assert!(!registry.transition("missing", PluginState::Installed));
    }

    #[test]
    fn test_mark_failed_records_reason() {
        let registry = PluginRegistry::new();
        registry.register(plugin("audit", &[])).unwrap();
        registry.mark_failed("audit", "disk full");

        assert_eq!(registry.state("audit"), Some(PluginState::Failed));
        assert_eq!(registry.last_error("audit").as_deref(), Some("disk full"));
        assert_eq!(registry.states().get("audit"), Some(&PluginState::Failed));
    }
}
