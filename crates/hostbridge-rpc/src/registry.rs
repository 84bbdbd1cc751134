use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::command::CommandHandler;

struct Entry<C> {
    handler: Arc<dyn CommandHandler<C>>,
    enabled: bool,
}

/// Method name -> handler table.
///
/// Built once at startup by explicit [`register`](Self::register) calls and
/// shared read-only afterwards.
pub struct CommandRegistry<C> {
    entries: HashMap<String, Entry<C>>,
}

impl<C: 'static> CommandRegistry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register `handler` under `name`, replacing any earlier registration.
    pub fn register<H>(&mut self, name: impl Into<String>, handler: H) -> &mut Self
    where
        H: CommandHandler<C> + 'static,
    {
        let name = name.into();
        let entry = Entry {
            handler: Arc::new(handler),
            enabled: true,
        };
        if self.entries.insert(name.clone(), entry).is_some() {
            warn!(method = %name, "command registered twice; keeping the latest");
        } else {
            debug!(method = %name, "command registered");
        }
        self
    }

    /// Enable or disable a registered command.
    ///
    /// A disabled command is reported as an unknown method. Returns `false`
    /// when `name` is not registered.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.enabled = enabled;
                debug!(method = name, enabled, "command availability changed");
                true
            }
            None => false,
        }
    }

    /// Look up the handler for `name`, if registered and enabled.
    pub fn try_get_handler(&self, name: &str) -> Option<Arc<dyn CommandHandler<C>>> {
        self.entries
            .get(name)
            .filter(|entry| entry.enabled)
            .map(|entry| Arc::clone(&entry.handler))
    }

    /// Whether `name` resolves to an enabled handler.
    pub fn contains(&self, name: &str) -> bool {
        self.try_get_handler(name).is_some()
    }

    /// Enabled command names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Number of registered commands, enabled or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: 'static> Default for CommandRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for CommandRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort_unstable();
        f.debug_struct("CommandRegistry")
            .field("commands", &names)
            .finish()
    }
}
