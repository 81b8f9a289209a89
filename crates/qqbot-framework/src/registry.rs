//! The handler registry.
//!
//! Populated once at startup, then shared read-only (behind an `Arc`) by
//! every dispatch. Order matters only for prompt enumeration: all handlers
//! of a kind are evaluated, and listed in registration order.

use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};
use crate::handler::{HandlerDescriptor, HandlerKind};
use crate::plugin::PluginDescriptor;

/// An ordered collection of [`HandlerDescriptor`]s.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: Vec<HandlerDescriptor>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Registers a handler.
    ///
    /// Fails if another handler of the same kind already uses the name.
    pub fn register(&mut self, descriptor: HandlerDescriptor) -> RegistryResult<()> {
        let kind = descriptor.kind();
        if descriptor.name().is_empty() {
            return Err(RegistryError::EmptyName { kind });
        }
        if self.get(kind, descriptor.name()).is_some() {
            return Err(RegistryError::DuplicateName {
                kind,
                name: descriptor.name().to_string(),
            });
        }

        debug!(handler = %descriptor.name(), kind = %kind, "Registered handler");
        self.handlers.push(descriptor);
        Ok(())
    }

    /// Registers a handler (builder pattern).
    pub fn with(mut self, descriptor: HandlerDescriptor) -> RegistryResult<Self> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Registers every handler of a plugin, returning how many were added.
    pub fn register_plugin(&mut self, plugin: &PluginDescriptor) -> RegistryResult<usize> {
        let handlers = plugin.instantiate();
        let count = handlers.len();
        for descriptor in handlers {
            self.register(descriptor)?;
        }
        info!(plugin = plugin.name, handlers = count, "Plugin loaded");
        Ok(count)
    }

    /// Handlers of `kind`, in registration order.
    pub fn handlers_of(&self, kind: HandlerKind) -> impl Iterator<Item = &HandlerDescriptor> {
        self.handlers.iter().filter(move |d| d.kind() == kind)
    }

    /// Looks a handler up by kind and name.
    pub fn get(&self, kind: HandlerKind, name: &str) -> Option<&HandlerDescriptor> {
        self.handlers_of(kind).find(|d| d.name() == name)
    }

    /// Total number of handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MatchLabel;

    fn noop(name: &str, kind: HandlerKind) -> HandlerDescriptor {
        HandlerDescriptor::from_fn(
            name,
            kind,
            |_| MatchLabel::new("any"),
            |_| async { anyhow::Ok(()) },
        )
    }

    #[test]
    fn test_register_preserves_order() {
        let mut registry = HandlerRegistry::new();
        registry.register(noop("b", HandlerKind::Interactive)).unwrap();
        registry.register(noop("a", HandlerKind::Interactive)).unwrap();
        registry.register(noop("quiet", HandlerKind::Silent)).unwrap();

        let names: Vec<_> = registry
            .handlers_of(HandlerKind::Interactive)
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(registry.handlers_of(HandlerKind::Silent).count(), 1);
        assert_eq!(registry.handlers_of(HandlerKind::Scheduled).count(), 0);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_duplicate_name_within_kind() {
        let mut registry = HandlerRegistry::new();
        registry.register(noop("echo", HandlerKind::Interactive)).unwrap();
        let err = registry
            .register(noop("echo", HandlerKind::Interactive))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateName {
                kind: HandlerKind::Interactive,
                name: "echo".into()
            }
        );
    }

    #[test]
    fn test_same_name_different_kind_is_allowed() {
        let registry = HandlerRegistry::new()
            .with(noop("echo", HandlerKind::Interactive))
            .and_then(|r| r.with(noop("echo", HandlerKind::Silent)))
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut registry = HandlerRegistry::new();
        assert!(matches!(
            registry.register(noop("", HandlerKind::Silent)),
            Err(RegistryError::EmptyName { .. })
        ));
    }

    #[test]
    fn test_register_plugin() {
        fn handlers() -> Vec<HandlerDescriptor> {
            vec![
                noop("one", HandlerKind::Interactive),
                noop("two", HandlerKind::Silent),
            ]
        }
        let plugin = PluginDescriptor {
            name: "demo",
            description: "two handlers",
            handlers,
        };

        let mut registry = HandlerRegistry::new();
        assert_eq!(registry.register_plugin(&plugin).unwrap(), 2);
        assert!(registry.register_plugin(&plugin).is_err());
    }
}
