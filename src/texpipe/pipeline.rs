//! Pipeline executor that threads one tree through named passes

use std::rc::Rc;

use thiserror::Error;

use crate::texpipe::context::PipelineContext;
use crate::texpipe::passes::tex::dump_tree;
use crate::texpipe::passes::PassError;
use crate::texpipe::tree::Node;

/// Errors that abort a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not create pass {pass}: {source}")]
    Create {
        pass: String,
        #[source]
        source: PassError,
    },
    #[error("pass {pass} failed: {source}")]
    Failed {
        pass: String,
        #[source]
        source: PassError,
    },
}

impl PipelineError {
    /// Name of the pass that stopped the run
    pub fn pass(&self) -> &str {
        match self {
            PipelineError::Create { pass, .. } | PipelineError::Failed { pass, .. } => pass,
        }
    }

    /// Whether the run stopped on a fatal diagnostic
    pub fn is_fatal(&self) -> bool {
        match self {
            PipelineError::Create { source, .. } | PipelineError::Failed { source, .. } => {
                matches!(source, PassError::Fatal(_))
            }
        }
    }
}

/// Runs passes from the context's registry in order
pub struct Pipeline {
    ctx: Rc<PipelineContext>,
    print_after_all: bool,
}

impl Pipeline {
    pub fn new(ctx: Rc<PipelineContext>) -> Self {
        Self {
            ctx,
            print_after_all: false,
        }
    }

    /// Dump the tree to stderr after every pass
    pub fn print_after_all(mut self, enabled: bool) -> Self {
        self.print_after_all = enabled;
        self
    }

    pub fn context(&self) -> &Rc<PipelineContext> {
        &self.ctx
    }

    /// Run the passes called `names` over `tree`, returning the final tree.
    ///
    /// Unknown names are logged and skipped. The first failing pass stops
    /// the run.
    pub fn run<S: AsRef<str>>(&self, mut tree: Node, names: &[S]) -> Result<Node, PipelineError> {
        for name in names {
            let name = name.as_ref();
            let handle = match self.ctx.registry.create(name, &self.ctx) {
                Some(Ok(handle)) => handle,
                Some(Err(source)) => {
                    return Err(PipelineError::Create {
                        pass: name.to_string(),
                        source,
                    })
                }
                None => {
                    tracing::warn!(pass = name, "Unknown pass");
                    continue;
                }
            };

            tracing::info!(pass = name, "Running pass");
            tree = handle
                .borrow_mut()
                .process(tree)
                .map_err(|source| PipelineError::Failed {
                    pass: name.to_string(),
                    source,
                })?;

            if self.print_after_all {
                dump_tree(&tree);
            }
        }
        Ok(tree)
    }
}
