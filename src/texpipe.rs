//! Main module for texpipe library functionality

pub mod config;
pub mod context;
pub mod passes;
pub mod pipeline;
#[cfg(feature = "plugins")]
pub mod plugin;
pub mod providers;
pub mod scanner;
pub mod source;
pub mod tree;

pub use config::{ConfigStore, ConfigValue};
pub use context::{PipelineContext, ScriptHooks};
pub use passes::{Pass, PassError, PassRegistry};
pub use pipeline::{Pipeline, PipelineError};
pub use scanner::{parse_source, read_file, ScanError};
pub use source::{FatalError, Severity, SourceManager};
pub use tree::{Child, Node, TreeError};
