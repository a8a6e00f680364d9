//! Shared state for one pipeline run
//!
//! A [`PipelineContext`] is filled in at startup and then shared through an
//! `Rc` with the pipeline and every pass it creates. Nothing in it changes
//! after the first pass runs, except for the source manager's append-only
//! file store.

use std::fmt;
use std::rc::Rc;

use crate::texpipe::config::ConfigStore;
use crate::texpipe::passes::PassRegistry;
use crate::texpipe::source::SourceManager;

/// A function run against every new Lua interpreter
pub type ScriptHook = Rc<dyn Fn(&mlua::Lua) -> mlua::Result<()>>;

/// Hooks that extend the Lua environment of script passes
#[derive(Clone, Default)]
pub struct ScriptHooks {
    hooks: Vec<ScriptHook>,
}

impl ScriptHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&mut self, hook: F)
    where
        F: Fn(&mlua::Lua) -> mlua::Result<()> + 'static,
    {
        self.hooks.push(Rc::new(hook));
    }

    /// Run every hook against `lua`, in registration order
    pub fn install(&self, lua: &mlua::Lua) -> mlua::Result<()> {
        self.hooks.iter().try_for_each(|hook| hook(lua))
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for ScriptHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptHooks")
            .field("len", &self.hooks.len())
            .finish()
    }
}

/// Everything a pipeline run shares
pub struct PipelineContext {
    pub sources: SourceManager,
    pub config: ConfigStore,
    pub registry: PassRegistry,
    pub hooks: ScriptHooks,
    // Declared after `hooks`: hook closures may point into these libraries,
    // so they must be dropped first.
    #[cfg(feature = "plugins")]
    plugins: Vec<crate::texpipe::plugin::Plugin>,
}

impl PipelineContext {
    pub fn new(sources: SourceManager, config: ConfigStore, registry: PassRegistry) -> Self {
        Self {
            sources,
            config,
            registry,
            hooks: ScriptHooks::new(),
            #[cfg(feature = "plugins")]
            plugins: Vec::new(),
        }
    }

    /// Keep a plugin library loaded for the life of the context
    #[cfg(feature = "plugins")]
    pub fn keep_plugin(&mut self, plugin: crate::texpipe::plugin::Plugin) {
        self.plugins.push(plugin);
    }

    #[cfg(feature = "plugins")]
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new(
            SourceManager::new(),
            ConfigStore::new(),
            PassRegistry::with_builtins(),
        )
    }
}
