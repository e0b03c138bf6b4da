//! Extension plug-in registry.
//!
//! Extensions add command handlers, wrap existing ones middleware-style,
//! advertise capability strings, and may depend on other extensions. They
//! are registered while the server is being built and applied once, in
//! dependency order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use thiserror::Error;

use mailtide_proto::{CapSet, Capability};

use crate::dispatch::{Dispatcher, Handler};
use crate::session::Session;

/// A protocol extension plug-in.
pub trait Extension: Send + Sync {
    /// Unique extension name (conventionally the capability string).
    fn name(&self) -> &str;

    /// Capabilities to merge into the server's advertised set.
    fn capabilities(&self) -> Vec<Capability> {
        Vec::new()
    }

    /// Names of extensions that must be applied before this one.
    fn depends_on(&self) -> Vec<String> {
        Vec::new()
    }

    /// New command handlers contributed by this extension.
    fn handlers(&self) -> Vec<(String, Handler)> {
        Vec::new()
    }

    /// Optionally wraps an already-registered handler.
    ///
    /// Invoked once per registered command name; returning `Some`
    /// atomically replaces the entry.
    #[allow(unused_variables)]
    fn wrap_handler(&self, name: &str, inner: Handler) -> Option<Handler> {
        None
    }

    /// Probes whether the session backend supports this extension.
    ///
    /// Handlers should return `NO <name> not supported` when this is
    /// `false` for the current session.
    #[allow(unused_variables)]
    fn supported_by(&self, session: &dyn Session) -> bool {
        true
    }

    /// Fired when a client enables one of this extension's capabilities
    /// via ENABLE.
    #[allow(unused_variables)]
    fn on_enabled(&self, conn_id: u64) {}
}

/// Errors from extension registration and application.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtensionError {
    /// Two extensions share a name.
    #[error("extension {0} is already registered")]
    DuplicateName(String),

    /// A dependency is absent.
    #[error("{name} depends on {dep} which is not registered")]
    MissingDependency {
        /// The dependent extension.
        name: String,
        /// The missing dependency.
        dep: String,
    },

    /// The dependency graph has a cycle.
    #[error("circular dependency detected")]
    Circular,

    /// Two extensions registered the same command.
    #[error("command {0} is registered by more than one extension")]
    HandlerConflict(String),
}

/// Ordered registry of extensions with dependency resolution.
#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Arc<dyn Extension>>,
}

impl ExtensionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an extension; names must be unique.
    pub fn register(&mut self, ext: Arc<dyn Extension>) -> Result<(), ExtensionError> {
        if self.extensions.iter().any(|e| e.name() == ext.name()) {
            return Err(ExtensionError::DuplicateName(ext.name().to_string()));
        }
        self.extensions.push(ext);
        Ok(())
    }

    /// The registered extensions in registration order.
    #[must_use]
    pub fn extensions(&self) -> &[Arc<dyn Extension>] {
        &self.extensions
    }

    /// Looks up an extension by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Extension>> {
        self.extensions.iter().find(|e| e.name() == name)
    }

    /// Resolves the extensions into dependency order (Kahn's algorithm).
    ///
    /// Registration order is preserved among extensions that are ready at
    /// the same time, so resolution is deterministic.
    pub fn resolve(&self) -> Result<Vec<Arc<dyn Extension>>, ExtensionError> {
        let index: HashMap<&str, usize> = self
            .extensions
            .iter()
            .enumerate()
            .map(|(i, e)| (e.name(), i))
            .collect();

        let mut in_degree = vec![0usize; self.extensions.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.extensions.len()];
        for (i, ext) in self.extensions.iter().enumerate() {
            for dep in ext.depends_on() {
                let Some(&dep_idx) = index.get(dep.as_str()) else {
                    return Err(ExtensionError::MissingDependency {
                        name: ext.name().to_string(),
                        dep,
                    });
                };
                in_degree[i] += 1;
                dependents[dep_idx].push(i);
            }
        }

        let mut ready: VecDeque<usize> = (0..self.extensions.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut ordered = Vec::with_capacity(self.extensions.len());
        while let Some(i) = ready.pop_front() {
            ordered.push(Arc::clone(&self.extensions[i]));
            for &dep in &dependents[i] {
                in_degree[dep] -= 1;
                if in_degree[dep] == 0 {
                    ready.push_back(dep);
                }
            }
        }

        if ordered.len() != self.extensions.len() {
            return Err(ExtensionError::Circular);
        }
        Ok(ordered)
    }

    /// Applies the extensions to a dispatcher and capability set:
    /// resolve, register handlers (conflicts are errors), run the wrap
    /// pass, and merge capabilities.
    pub fn apply(
        &self,
        dispatcher: &mut Dispatcher,
        caps: &CapSet,
    ) -> Result<Vec<Arc<dyn Extension>>, ExtensionError> {
        let ordered = self.resolve()?;

        let mut extension_owned: HashSet<String> = HashSet::new();
        for ext in &ordered {
            for (name, handler) in ext.handlers() {
                let key = name.to_ascii_uppercase();
                if !extension_owned.insert(key.clone()) {
                    return Err(ExtensionError::HandlerConflict(key));
                }
                dispatcher.register(&key, handler);
            }
        }

        for ext in &ordered {
            for name in dispatcher.names() {
                dispatcher.wrap(&name, |inner| {
                    ext.wrap_handler(&name, Arc::clone(&inner)).unwrap_or(inner)
                });
            }
        }

        for ext in &ordered {
            for cap in ext.capabilities() {
                caps.insert(cap);
            }
        }
        Ok(ordered)
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.extensions.iter().map(|e| e.name()).collect();
        f.debug_struct("ExtensionRegistry")
            .field("extensions", &names)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct TestExt {
        name: &'static str,
        deps: Vec<&'static str>,
        caps: Vec<Capability>,
    }

    impl TestExt {
        fn new(name: &'static str, deps: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                name,
                deps: deps.to_vec(),
                caps: Vec::new(),
            })
        }
    }

    impl Extension for TestExt {
        fn name(&self) -> &str {
            self.name
        }
        fn depends_on(&self) -> Vec<String> {
            self.deps.iter().map(ToString::to_string).collect()
        }
        fn capabilities(&self) -> Vec<Capability> {
            self.caps.clone()
        }
    }

    fn position(ordered: &[Arc<dyn Extension>], name: &str) -> usize {
        ordered.iter().position(|e| e.name() == name).unwrap()
    }

    #[test]
    fn resolve_orders_dependencies_first() {
        let mut registry = ExtensionRegistry::new();
        registry.register(TestExt::new("QRESYNC", &["CONDSTORE"])).unwrap();
        registry.register(TestExt::new("CONDSTORE", &[])).unwrap();
        registry.register(TestExt::new("IDLE", &[])).unwrap();

        let ordered = registry.resolve().unwrap();
        assert!(position(&ordered, "CONDSTORE") < position(&ordered, "QRESYNC"));
    }

    #[test]
    fn resolve_is_stable_for_independent_extensions() {
        let mut registry = ExtensionRegistry::new();
        registry.register(TestExt::new("A", &[])).unwrap();
        registry.register(TestExt::new("B", &[])).unwrap();
        registry.register(TestExt::new("C", &[])).unwrap();

        let resolved = registry.resolve().unwrap();
        let names: Vec<&str> = resolved.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn missing_dependency_is_an_error() {
        let mut registry = ExtensionRegistry::new();
        registry.register(TestExt::new("QRESYNC", &["CONDSTORE"])).unwrap();
        let err = match registry.resolve() {
            Err(e) => e,
            Ok(_) => panic!("expected resolve() to fail"),
        };
        assert_eq!(
            err.to_string(),
            "QRESYNC depends on CONDSTORE which is not registered"
        );
    }

    #[test]
    fn cycle_is_detected() {
        let mut registry = ExtensionRegistry::new();
        registry.register(TestExt::new("A", &["B"])).unwrap();
        registry.register(TestExt::new("B", &["A"])).unwrap();
        let err = match registry.resolve() {
            Err(e) => e,
            Ok(_) => panic!("expected resolve() to fail"),
        };
        assert_eq!(err, ExtensionError::Circular);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut registry = ExtensionRegistry::new();
        registry.register(TestExt::new("A", &["A"])).unwrap();
        let err = match registry.resolve() {
            Err(e) => e,
            Ok(_) => panic!("expected resolve() to fail"),
        };
        assert_eq!(err, ExtensionError::Circular);
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut registry = ExtensionRegistry::new();
        registry.register(TestExt::new("A", &[])).unwrap();
        let err = registry.register(TestExt::new("A", &[])).unwrap_err();
        assert_eq!(err, ExtensionError::DuplicateName("A".to_string()));
    }

    #[test]
    fn apply_merges_capabilities() {
        let mut registry = ExtensionRegistry::new();
        registry
            .register(Arc::new(TestExt {
                name: "MOVE",
                deps: Vec::new(),
                caps: vec![Capability::Move],
            }))
            .unwrap();

        let mut dispatcher = Dispatcher::new();
        let caps = CapSet::new();
        registry.apply(&mut dispatcher, &caps).unwrap();
        assert!(caps.contains(&Capability::Move));
    }
}
