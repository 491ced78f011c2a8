//! Command registry - stores toggle handlers and dispatches by exact name

use crate::slots::SlotArena;
use relay_shared::{defaults, Arguments};
use tracing::{debug, info, warn};

/// Something a toggle command can run
pub trait CommandAction: Send + Sync {
    fn invoke(&self, arguments: &Arguments);
}

impl<F> CommandAction for F
where
    F: Fn(&Arguments) + Send + Sync,
{
    fn invoke(&self, arguments: &Arguments) {
        self(arguments)
    }
}

/// Result of dispatching a command name to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A handler ran
    Dispatched,
    /// No handler has this name
    NotFound,
}

struct CommandEntry {
    name: String,
    action: Box<dyn CommandAction>,
}

/// Bounded table of toggle command handlers
pub struct CommandRegistry {
    entries: SlotArena<CommandEntry>,
    verbose: bool,
}

impl CommandRegistry {
    /// Create a registry with the default number of slots
    pub fn new() -> Self {
        Self::with_capacity(defaults::MAX_COMMANDS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: SlotArena::with_capacity(capacity),
            verbose: true,
        }
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Register a handler for `name`.
    ///
    /// Empty names, names already registered and registrations beyond
    /// capacity are dropped with a warning. Returns whether the handler
    /// was stored.
    pub fn register(&mut self, name: &str, action: impl CommandAction + 'static) -> bool {
        if name.is_empty() {
            if self.verbose {
                warn!("Ignoring command registration with an empty name");
            }
            return false;
        }

        if self.contains(name) {
            if self.verbose {
                warn!("Command already registered, ignoring: {}", name);
            }
            return false;
        }

        let entry = CommandEntry {
            name: name.to_string(),
            action: Box::new(action),
        };

        match self.entries.insert(entry) {
            Ok(_) => {
                if self.verbose {
                    info!("Registered command: {}", name);
                }
                true
            }
            Err(_) => {
                if self.verbose {
                    warn!(
                        "Max commands registered ({}), ignoring: {}",
                        self.entries.capacity(),
                        name
                    );
                }
                false
            }
        }
    }

    /// Run the first handler registered under `name`
    pub fn dispatch(&self, name: &str, arguments: &Arguments) -> Dispatch {
        match self.entries.find(|entry| entry.name == name) {
            Some((index, entry)) => {
                debug!("Matched toggle command handler: {} (slot {})", name, index);
                entry.action.invoke(arguments);
                Dispatch::Dispatched
            }
            None => Dispatch::NotFound,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.find(|entry| entry.name == name).is_some()
    }

    /// Number of registered commands
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicU32>, impl Fn(&Arguments) + Send + Sync) {
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        (count, move |_: &Arguments| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_dispatch_runs_one_handler() {
        let mut registry = CommandRegistry::new();
        let (heater_on, action_on) = counter();
        let (heater_off, action_off) = counter();
        registry.register("heater_on", action_on);
        registry.register("heater_off", action_off);

        let result = registry.dispatch("heater_on", &Arguments::new());

        assert_eq!(result, Dispatch::Dispatched);
        assert_eq!(heater_on.load(Ordering::SeqCst), 1);
        assert_eq!(heater_off.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_name_runs_nothing() {
        let mut registry = CommandRegistry::new();
        let (count, action) = counter();
        registry.register("heater_on", action);

        assert_eq!(registry.dispatch("heater", &Arguments::new()), Dispatch::NotFound);
        assert_eq!(registry.dispatch("HEATER_ON", &Arguments::new()), Dispatch::NotFound);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_handler_sees_arguments() {
        let mut registry = CommandRegistry::new();
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = seen.clone();
        registry.register("set_level", move |args: &Arguments| {
            let level = args.get("level").and_then(|v| v.as_u64()).unwrap_or(0);
            seen_clone.store(level as u32, Ordering::SeqCst);
        });

        let mut args = Arguments::new();
        args.insert("level".into(), 7.into());
        registry.dispatch("set_level", &args);

        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_capacity_enforced() {
        let mut registry = CommandRegistry::with_capacity(2);
        assert!(registry.register("a", |_: &Arguments| {}));
        assert!(registry.register("b", |_: &Arguments| {}));

        let (count, action) = counter();
        assert!(!registry.register("c", action));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.dispatch("c", &Arguments::new()), Dispatch::NotFound);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rejects_empty_and_duplicate_names() {
        let mut registry = CommandRegistry::new();
        let (first, action_first) = counter();
        let (second, action_second) = counter();

        assert!(!registry.register("", |_: &Arguments| {}));
        assert!(registry.register("relay", action_first));
        assert!(!registry.register("relay", action_second));

        registry.dispatch("relay", &Arguments::new());
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(registry.len(), 1);
    }
}
