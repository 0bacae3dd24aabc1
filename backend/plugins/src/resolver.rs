//! Deterministic topological ordering of plugins.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::DependencyError;

/// A plugin's identity and declared dependencies, detached from the plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub name: String,
    pub dependencies: Vec<String>,
}

impl PluginDescriptor {
    pub fn new<I, S>(name: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
        }
    }
}

pub struct DependencyResolver;

impl DependencyResolver {
    /// Order `plugins` so every dependency precedes its dependents.
    ///
    /// Kahn's algorithm; among ready plugins the lexicographically smallest
    /// name always goes next, so the same input gives the same order.
    pub fn resolve(plugins: &[PluginDescriptor]) -> Result<Vec<String>, DependencyError> {
        let mut in_degree: BTreeMap<&str, usize> =
            plugins.iter().map(|p| (p.name.as_str(), 0)).collect();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for plugin in plugins {
            let deps: BTreeSet<&str> = plugin.dependencies.iter().map(String::as_str).collect();
            for dep in deps {
                if !in_degree.contains_key(dep) {
                    return Err(DependencyError::Missing {
                        plugin: plugin.name.clone(),
                        dependency: dep.to_string(),
                    });
                }
                dependents.entry(dep).or_default().push(plugin.name.as_str());
                if let Some(degree) = in_degree.get_mut(plugin.name.as_str()) {
                    *degree += 1;
                }
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(in_degree.len());

        while let Some(name) = ready.pop_first() {
            order.push(name.to_string());
            for &dependent in dependents.get(name).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() < in_degree.len() {
            let remaining = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(name, _)| name.to_string())
                .collect();
            return Err(DependencyError::Circular { remaining });
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(name: &str, deps: &[&str]) -> PluginDescriptor {
        PluginDescriptor::new(name, deps.iter().copied())
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let plugins = vec![
            d("users", &["audit", "auth"]),
            d("billing", &["users"]),
            d("auth", &[]),
            d("audit", &["auth"]),
            d("metrics", &[]),
        ];
        let order = DependencyResolver::resolve(&plugins).unwrap();

        assert_eq!(order.len(), plugins.len());
        for plugin in &plugins {
            for dep in &plugin.dependencies {
                assert!(position(&order, dep) < position(&order, &plugin.name));
            }
        }
    }

    #[test]
    fn test_order_is_deterministic_and_lexicographic() {
        let plugins = vec![d("zeta", &[]), d("beta", &["alpha"]), d("alpha", &[]), d("gamma", &[])];
        let first = DependencyResolver::resolve(&plugins).unwrap();
        assert_eq!(first, vec!["alpha", "beta", "gamma", "zeta"]);

        let mut reversed = plugins.clone();
        reversed.reverse();
        for _ in 0..10 {
            assert_eq!(DependencyResolver::resolve(&reversed).unwrap(), first);
        }
    }

    #[test]
    fn test_chain_resolves_in_order() {
        let plugins = vec![d("c", &["b"]), d("b", &["a"]), d("a", &[])];
        assert_eq!(DependencyResolver::resolve(&plugins).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let plugins = vec![d("a", &["b"]), d("b", &["a"]), d("c", &[])];
        let err = DependencyResolver::resolve(&plugins).unwrap_err();
        assert_eq!(
            err,
            DependencyError::Circular {
                remaining: vec!["a".into(), "b".into()]
            }
        );
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = DependencyResolver::resolve(&[d("loop", &["loop"])]).unwrap_err();
        assert!(matches!(err, DependencyError::Circular { .. }));
    }

    #[test]
    fn test_missing_dependency_is_reported() {
        let plugins = vec![d("users", &["audit"])];
        let err = DependencyResolver::resolve(&plugins).unwrap_err();
        assert_eq!(
            err,
            DependencyError::Missing {
                plugin: "users".into(),
                dependency: "audit".into()
            }
        );
    }

    #[test]
    fn test_duplicate_dependency_counts_once() {
        let plugins = vec![d("a", &[]), d("b", &["a", "a"])];
        assert_eq!(DependencyResolver::resolve(&plugins).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(DependencyResolver::resolve(&[]).unwrap().is_empty());
    }
}
