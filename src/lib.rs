//! # texpipe
//!
//! Scans backslash-command markup (`\kind[key=value]{body}`) into a mutable
//! document tree and runs it through a pipeline of named passes. The
//! built-in passes write TeX, HTML or XML; further passes are Lua scripts.
//!
//! ```text
//! let ctx = Rc::new(PipelineContext::default());
//! let tree = parse_source(&ctx.sources, "doc.tex", r"\p{hello}")?;
//! Pipeline::new(ctx).run(tree, &["HTMLOutputPass"])?;
//! ```

pub mod texpipe;
