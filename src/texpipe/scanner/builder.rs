//! Token handlers
//!
//! [`TreeBuilder`] assembles scanner events into a document tree.
//! [`TracingHandler`] logs each event and passes it on, which is handy when
//! working out why a document scanned the way it did:
//!
//! ```text
//! TEXPIPE_LOG=texpipe::scanner=trace texpipe --file doc.tex
//! ```

use crate::texpipe::source::{Severity, SourceManager, SourceRange};
use crate::texpipe::tree::Node;

use super::{ScanError, TokenHandler};

/// Builds a document tree from scanner events
pub struct TreeBuilder<'a> {
    sources: &'a SourceManager,
    root: Node,
    current: Node,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(sources: &'a SourceManager) -> Self {
        let root = Node::new();
        Self {
            sources,
            current: root.clone(),
            root,
        }
    }

    /// Finish building and return the root.
    ///
    /// Commands still open at the end of input are reported as warnings and
    /// kept in the tree as they are.
    pub fn finish(self) -> Result<Node, ScanError> {
        let mut open = self.current.clone();
        while !open.ptr_eq(&self.root) {
            let range = open.source_range();
            let message = format!("Command \\{} is never closed", open.kind());
            self.sources
                .report_error(range.start, range.start, &message, Severity::Warning)?;
            match open.parent() {
                Some(parent) => open = parent,
                None => break,
            }
        }
        Ok(self.root)
    }
}

impl TokenHandler for TreeBuilder<'_> {
    fn command_start(&mut self, range: SourceRange, name: &str) -> Result<(), ScanError> {
        let child = self.current.new_child();
        child.set_source_range(range);
        child.set_kind(name);
        self.current = child;
        Ok(())
    }

    fn command_end(&mut self, range: SourceRange) -> Result<(), ScanError> {
        let parent = match self.current.parent() {
            Some(parent) if !self.current.ptr_eq(&self.root) => parent,
            _ => {
                self.sources.report_range(
                    range,
                    "Terminating unopened command",
                    Severity::Fatal,
                )?;
                return Ok(());
            }
        };
        self.current.set_source_end(range.end);
        self.current = parent;
        Ok(())
    }

    fn command_argument(
        &mut self,
        _range: SourceRange,
        key: &str,
        value: &str,
    ) -> Result<(), ScanError> {
        self.current.set_attribute(key, value);
        Ok(())
    }

    fn text(&mut self, _range: SourceRange, text: &str) -> Result<(), ScanError> {
        self.current.append_text(text);
        Ok(())
    }
}

/// Logs every event at trace level before forwarding it
pub struct TracingHandler<H> {
    inner: H,
}

impl<H: TokenHandler> TracingHandler<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: TokenHandler> TokenHandler for TracingHandler<H> {
    fn command_start(&mut self, range: SourceRange, name: &str) -> Result<(), ScanError> {
        tracing::trace!(?range, name, "start command");
        self.inner.command_start(range, name)
    }

    fn command_end(&mut self, range: SourceRange) -> Result<(), ScanError> {
        tracing::trace!(?range, "end command");
        self.inner.command_end(range)
    }

    fn command_argument(
        &mut self,
        range: SourceRange,
        key: &str,
        value: &str,
    ) -> Result<(), ScanError> {
        tracing::trace!(?range, key, value, "argument");
        self.inner.command_argument(range, key, value)
    }

    fn text(&mut self, range: SourceRange, text: &str) -> Result<(), ScanError> {
        tracing::trace!(?range, text, "text");
        self.inner.text(range, text)
    }
}
