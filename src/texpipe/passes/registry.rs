//! Pass registry
//!
//! Maps pass names to the factories that create them. Built-in passes are
//! registered by [`PassRegistry::with_builtins`]; script passes are found by
//! scanning directories for `*.lua` files.

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use crate::texpipe::context::PipelineContext;

use super::{
    MarkupOutputPass, PassError, PassFactory, PassHandle, ScriptPassFactory, SingletonFactory,
    TeXOutputPass,
};

/// Registry of pass factories
pub struct PassRegistry {
    factories: HashMap<String, Box<dyn PassFactory>>,
}

impl PassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        PassRegistry {
            factories: HashMap::new(),
        }
    }

    /// Register a factory
    ///
    /// A factory with the same name replaces the old one.
    pub fn register<F: PassFactory + 'static>(&mut self, factory: F) {
        let name = factory.name().to_string();
        if self.factories.insert(name.clone(), Box::new(factory)).is_some() {
            tracing::debug!(pass = %name, "replaced pass factory");
        } else {
            tracing::debug!(pass = %name, "registered pass factory");
        }
    }

    /// Create the pass called `name`, or `None` if there is no such pass
    pub fn create(
        &self,
        name: &str,
        ctx: &Rc<PipelineContext>,
    ) -> Option<Result<PassHandle, PassError>> {
        self.factories.get(name).map(|factory| factory.create(ctx))
    }

    /// Check if a pass exists
    pub fn has(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// List all pass names (sorted)
    pub fn list_passes(&self) -> Vec<String> {
        let mut names: Vec<_> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Create a registry with the built-in output passes
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register(SingletonFactory::new(TeXOutputPass::NAME, TeXOutputPass::new));
        registry.register(SingletonFactory::new("HTMLOutputPass", MarkupOutputPass::html));
        registry.register(SingletonFactory::new("XMLOutputPass", MarkupOutputPass::xml));

        registry
    }

    /// Register one script pass per `*.lua` file directly inside `dir`,
    /// named after the file stem. Returns how many were added.
    pub fn register_script_directory(&mut self, dir: impl AsRef<Path>) -> std::io::Result<usize> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "lua") {
                paths.push(path);
            }
        }
        paths.sort();
        let mut count = 0;
        for path in paths {
            match ScriptPassFactory::from_path(&path) {
                Some(factory) => {
                    self.register(factory);
                    count += 1;
                }
                None => tracing::warn!(
                    path = %path.display(),
                    "skipping script with a non UTF-8 name"
                ),
            }
        }
        tracing::debug!(dir = %dir.display(), count, "registered script directory");
        Ok(count)
    }
}

impl Default for PassRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
