//! Lua script passes
//!
//! A script pass is a Lua file defining a global `process` function:
//!
//! ```lua
//! function process(tree)
//!   tree:match("emph", function(node)
//!     node.kind = "em"
//!     return node
//!   end)
//!   return tree
//! end
//! ```
//!
//! Every time the registry creates a script pass it gets a fresh interpreter:
//! the bindings in [`bindings`] are installed, then the plugin hooks, then
//! the script itself runs once to define `process`. Scripts share nothing
//! with each other except the config table and whatever they pass through
//! the tree.
//!
//! `process` may return a tree, or nil to keep the tree it was given. A
//! fatal diagnostic raised with `node:fatal_error(...)` stops the pipeline
//! just like one raised from Rust; any other Lua error does too, reported as
//! a script failure.

pub mod bindings;

use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::{Function, Lua, LuaOptions, StdLib, Value};

use crate::texpipe::context::PipelineContext;
use crate::texpipe::source::FatalError;
use crate::texpipe::tree::Node;

use super::{Pass, PassError, PassFactory, PassHandle};

/// Standard libraries available to scripts
fn script_libraries() -> StdLib {
    StdLib::TABLE | StdLib::STRING | StdLib::IO | StdLib::PACKAGE | StdLib::MATH | StdLib::UTF8
}

/// Find a fatal diagnostic buried in a Lua error
pub(crate) fn find_fatal(err: &mlua::Error) -> Option<FatalError> {
    match err {
        mlua::Error::CallbackError { cause, .. } => find_fatal(cause),
        mlua::Error::WithContext { cause, .. } => find_fatal(cause),
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<FatalError>().cloned(),
        _ => None,
    }
}

/// A pass backed by a Lua script
pub struct ScriptPass {
    name: String,
    process: Function,
    lua: Lua,
}

impl ScriptPass {
    /// Load the script at `path` into a fresh interpreter
    pub fn load(name: &str, path: &Path, ctx: &Rc<PipelineContext>) -> Result<Self, PassError> {
        let source = std::fs::read_to_string(path)
            .map_err(|err| PassError::io(format!("cannot read script {}", path.display()), err))?;
        Self::from_source(name, &path.display().to_string(), &source, ctx)
    }

    /// Build a pass from script text; `chunk_name` appears in Lua error
    /// messages
    pub fn from_source(
        name: &str,
        chunk_name: &str,
        source: &str,
        ctx: &Rc<PipelineContext>,
    ) -> Result<Self, PassError> {
        let lua = Lua::new_with(script_libraries(), LuaOptions::default())?;
        lua.set_app_data(Rc::clone(ctx));
        bindings::install(&lua, ctx)?;
        ctx.hooks.install(&lua)?;
        lua.load(source).set_name(chunk_name).exec()?;

        let process = match lua.globals().get::<Value>("process")? {
            Value::Function(process) => process,
            _ => {
                return Err(PassError::MissingProcess {
                    name: name.to_string(),
                })
            }
        };
        tracing::debug!(pass = name, "loaded script pass");
        Ok(Self {
            name: name.to_string(),
            process,
            lua,
        })
    }

    /// The interpreter this pass runs in
    pub fn lua(&self) -> &Lua {
        &self.lua
    }
}

impl Pass for ScriptPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&mut self, tree: Node) -> Result<Node, PassError> {
        match self.process.call::<Value>(tree.clone())? {
            Value::Nil => Ok(tree),
            Value::UserData(result) => Ok(result.borrow::<Node>()?.clone()),
            other => Err(PassError::Script(mlua::Error::runtime(format!(
                "process must return a tree or nil, got {}",
                other.type_name()
            )))),
        }
    }
}

/// Creates a [`ScriptPass`] from a file, with a new interpreter every time
#[derive(Debug, Clone)]
pub struct ScriptPassFactory {
    name: String,
    path: PathBuf,
}

impl ScriptPassFactory {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// A factory named after the file stem of `path`
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let name = path.file_stem()?.to_str()?.to_string();
        Some(Self { name, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PassFactory for ScriptPassFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, ctx: &Rc<PipelineContext>) -> Result<PassHandle, PassError> {
        let pass = ScriptPass::load(&self.name, &self.path, ctx)?;
        Ok(Rc::new(std::cell::RefCell::new(pass)))
    }
}
