//! Native plugins
//!
//! A plugin is a dynamic library exporting
//!
//! ```text
//! #[no_mangle]
//! pub fn register_lua_helpers(registrar: &mut texpipe::texpipe::plugin::PluginRegistrar)
//! ```
//!
//! which is called once when the plugin is loaded. It adds [`ScriptHooks`]
//! that run against every Lua interpreter created afterwards, typically to
//! install extra global functions for script passes.
//!
//! The entry point uses the Rust ABI, so a plugin must be built with the same
//! compiler and the same version of this crate as the host.

use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use thiserror::Error;

use crate::texpipe::context::{PipelineContext, ScriptHooks};

/// Name of the symbol every plugin exports
pub const ENTRY_POINT: &str = "register_lua_helpers";

type RegisterFn = unsafe extern "Rust" fn(&mut PluginRegistrar<'_>);

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to open plugin {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
}

/// Handed to a plugin's entry point
pub struct PluginRegistrar<'a> {
    hooks: &'a mut ScriptHooks,
    added: usize,
}

impl<'a> PluginRegistrar<'a> {
    pub fn new(hooks: &'a mut ScriptHooks) -> Self {
        Self { hooks, added: 0 }
    }

    /// Run `hook` against every Lua interpreter created from now on
    pub fn add_hook<F>(&mut self, hook: F)
    where
        F: Fn(&mlua::Lua) -> mlua::Result<()> + 'static,
    {
        self.hooks.add(hook);
        self.added += 1;
    }

    /// Hooks added through this registrar
    pub fn added(&self) -> usize {
        self.added
    }
}

/// A loaded plugin library
#[derive(Debug)]
pub struct Plugin {
    path: PathBuf,
    _library: Library,
}

impl Plugin {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Load the plugin at `path` and let it register its hooks with `ctx`.
///
/// Returns `Ok(false)` when the library has no entry point; that is logged
/// and the library is unloaded again.
pub fn load_plugin(ctx: &mut PipelineContext, path: &Path) -> Result<bool, PluginError> {
    // SAFETY: loading a library runs its initialisers; plugins are trusted
    // code named explicitly on the command line.
    let library = unsafe { Library::new(path) }.map_err(|source| PluginError::Load {
        path: path.to_path_buf(),
        source,
    })?;

    let added = {
        // SAFETY: the symbol's type is part of the plugin contract above.
        let entry: Result<Symbol<RegisterFn>, _> = unsafe { library.get(ENTRY_POINT.as_bytes()) };
        match entry {
            Ok(register) => {
                let mut registrar = PluginRegistrar::new(&mut ctx.hooks);
                // SAFETY: see above; the library outlives the call.
                unsafe { register(&mut registrar) };
                Some(registrar.added())
            }
            Err(err) => {
                tracing::warn!(
                    plugin = %path.display(),
                    error = %err,
                    "no register hook found in plugin"
                );
                None
            }
        }
    };

    let Some(added) = added else {
        return Ok(false);
    };
    tracing::info!(plugin = %path.display(), hooks = added, "loaded plugin");
    ctx.keep_plugin(Plugin {
        path: path.to_path_buf(),
        _library: library,
    });
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registrar_adds_hooks() {
        let mut hooks = ScriptHooks::new();
        {
            let mut registrar = PluginRegistrar::new(&mut hooks);
            registrar.add_hook(|lua| lua.globals().set("answer", 42));
            assert_eq!(registrar.added(), 1);
        }
        let lua = mlua::Lua::new();
        hooks.install(&lua).unwrap();
        assert_eq!(lua.globals().get::<i64>("answer").unwrap(), 42);
    }

    #[test]
    fn missing_library_is_an_error() {
        let mut ctx = PipelineContext::default();
        let err = load_plugin(&mut ctx, Path::new("/no/such/libplugin.so")).unwrap_err();
        assert!(err.to_string().contains("/no/such/libplugin.so"));
        assert_eq!(ctx.plugin_count(), 0);
    }

    #[test]
    fn non_library_file_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "not a shared object").unwrap();
        let mut ctx = PipelineContext::default();
        assert!(matches!(
            load_plugin(&mut ctx, file.path()),
            Err(PluginError::Load { .. })
        ));
    }
}
