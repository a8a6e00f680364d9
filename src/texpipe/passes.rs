//! Passes: named transformations over a document tree
//!
//! Every pass satisfies one contract, [`Pass::process`]: it takes the tree,
//! may rewrite it in place or build a new one, and hands back the tree the
//! next pass should see. Passes that write output also implement
//! [`OutputPass`], which gives them a switchable sink.
//!
//! Passes are created by name through the [`PassRegistry`]. Built-in passes
//! are singletons per registry, so state such as a chosen output file carries
//! over between lookups. Script passes get a fresh Lua interpreter every time.
//!
//! ## Built-in passes
//!
//! | Name             | Output                                   |
//! |------------------|------------------------------------------|
//! | `TeXOutputPass`  | the markup the scanner reads             |
//! | `HTMLOutputPass` | HTML, void elements left unclosed        |
//! | `XMLOutputPass`  | XML, childless elements self-closed      |

pub mod markup;
pub mod registry;
pub mod script;
pub mod sink;
pub mod tex;

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use thiserror::Error;

use crate::texpipe::context::PipelineContext;
use crate::texpipe::source::FatalError;
use crate::texpipe::tree::Node;

pub use markup::{render_markup, MarkupOutputPass, MarkupStyle};
pub use registry::PassRegistry;
pub use script::{ScriptPass, ScriptPassFactory};
pub use sink::OutputSink;
pub use tex::{render_tex, TeXOutputPass};

/// Errors that stop a pass, and with it the pipeline
#[derive(Debug, Error)]
pub enum PassError {
    #[error(transparent)]
    Fatal(#[from] FatalError),
    #[error("Lua error: {0}")]
    Script(mlua::Error),
    #[error("script {name} does not define a process function")]
    MissingProcess { name: String },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PassError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PassError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<mlua::Error> for PassError {
    /// A fatal diagnostic raised inside a script comes back wrapped in Lua
    /// callback errors; unwrap it so it is reported as fatal, not as a script
    /// failure.
    fn from(err: mlua::Error) -> Self {
        match script::find_fatal(&err) {
            Some(fatal) => PassError::Fatal(fatal),
            None => PassError::Script(err),
        }
    }
}

/// A document transformation
pub trait Pass {
    /// Registry name of this pass
    fn name(&self) -> &str;

    /// Transform `tree`, returning the tree for the next pass
    fn process(&mut self, tree: Node) -> Result<Node, PassError>;

    /// Access to the output sink, for passes that write output
    fn as_output_pass(&mut self) -> Option<&mut dyn OutputPass> {
        None
    }
}

/// A pass that writes to a switchable sink
pub trait OutputPass: Pass {
    fn sink_mut(&mut self) -> &mut OutputSink;

    fn output_stdout(&mut self) {
        *self.sink_mut() = OutputSink::Stdout;
    }

    fn output_stderr(&mut self) {
        *self.sink_mut() = OutputSink::Stderr;
    }

    /// Write to `path`, truncating it. The previous sink is dropped first.
    fn output_file(&mut self, path: &Path) -> Result<(), PassError> {
        *self.sink_mut() = OutputSink::Stdout;
        *self.sink_mut() = OutputSink::file(path)?;
        Ok(())
    }
}

/// Shared handle to a created pass
pub type PassHandle = Rc<RefCell<dyn Pass>>;

/// Creates passes for the registry
pub trait PassFactory {
    fn name(&self) -> &str;

    fn create(&self, ctx: &Rc<PipelineContext>) -> Result<PassHandle, PassError>;
}

/// Creates its pass on first use and returns the same handle afterwards
pub struct SingletonFactory<P> {
    name: String,
    make: fn() -> P,
    instance: once_cell::unsync::OnceCell<PassHandle>,
}

impl<P: Pass + 'static> SingletonFactory<P> {
    pub fn new(name: impl Into<String>, make: fn() -> P) -> Self {
        Self {
            name: name.into(),
            make,
            instance: once_cell::unsync::OnceCell::new(),
        }
    }
}

impl<P: Pass + 'static> PassFactory for SingletonFactory<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, _ctx: &Rc<PipelineContext>) -> Result<PassHandle, PassError> {
        let handle = self.instance.get_or_init(|| {
            tracing::debug!(pass = %self.name, "creating singleton pass");
            let pass: PassHandle = Rc::new(RefCell::new((self.make)()));
            pass
        });
        Ok(Rc::clone(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upcase;

    impl Pass for Upcase {
        fn name(&self) -> &str {
            "Upcase"
        }

        fn process(&mut self, tree: Node) -> Result<Node, PassError> {
            tree.visit(|child| match child {
                crate::texpipe::tree::Child::Text(t) => vec![t.to_uppercase().into()],
                other => vec![other],
            });
            Ok(tree)
        }
    }

    #[test]
    fn singleton_factory_returns_same_handle() {
        let ctx = Rc::new(PipelineContext::default());
        let factory = SingletonFactory::new("Upcase", || Upcase);
        let a = factory.create(&ctx).unwrap();
        let b = factory.create(&ctx).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.borrow().name(), "Upcase");
    }

    #[test]
    fn plain_pass_has_no_sink() {
        let mut pass = Upcase;
        assert!(pass.as_output_pass().is_none());
        let tree = Node::new();
        tree.append_text("abc");
        assert_eq!(pass.process(tree).unwrap().text(), "ABC");
    }

    #[test]
    fn lua_errors_wrapping_fatal_become_fatal() {
        let inner = mlua::Error::external(FatalError::new("stop"));
        let wrapped = mlua::Error::CallbackError {
            traceback: String::new(),
            cause: std::sync::Arc::new(inner),
        };
        assert!(matches!(PassError::from(wrapped), PassError::Fatal(f) if f.message == "stop"));
        let plain = mlua::Error::runtime("oops");
        assert!(matches!(PassError::from(plain), PassError::Script(_)));
    }
}
