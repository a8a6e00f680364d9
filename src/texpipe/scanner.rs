//! Markup scanner
//!
//! Scans TeX/SILE-style markup and reports what it finds to a [`TokenHandler`].
//!
//! ```text
//! document := (text | command)*
//! command  := '\' NAME ('[' arglist ']')? ('{' document '}')?
//! arglist  := arg (',' arg)*
//! arg      := NAME ('=' (quoted-string | bare-value))?
//! ```
//!
//! Inside text, `\\`, `\}` and `\%` stand for the literal character and `%`
//! starts a comment that runs through the end of the line. Any other `\`
//! starts a command.
//!
//! The scanner keeps no stack of open commands: a `}` is reported as the end
//! of whatever command is innermost, and it is up to the handler to decide
//! whether one is open. [`TreeBuilder`](builder::TreeBuilder) is the handler
//! that turns the events into a document tree.

pub mod builder;
mod stream;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::texpipe::source::{
    CompressedSourceLocation, FatalError, FileId, Severity, SourceManager, SourceRange,
};
use crate::texpipe::tree::Node;

pub use builder::{TracingHandler, TreeBuilder};
pub use stream::CharStream;

/// Errors that stop a scan
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Fatal(#[from] FatalError),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Receives structural events from the scanner
///
/// Every callback may fail, which stops the scan immediately.
pub trait TokenHandler {
    /// A command name was read, `range` covering the backslash and the name
    fn command_start(&mut self, range: SourceRange, name: &str) -> Result<(), ScanError>;

    /// The innermost command ended: either a `}` or a command without a body
    fn command_end(&mut self, range: SourceRange) -> Result<(), ScanError>;

    /// One `key=value` pair from a command's argument list
    fn command_argument(
        &mut self,
        range: SourceRange,
        key: &str,
        value: &str,
    ) -> Result<(), ScanError>;

    /// A run of text with escapes resolved and comments removed
    fn text(&mut self, range: SourceRange, text: &str) -> Result<(), ScanError>;
}

impl<H: TokenHandler + ?Sized> TokenHandler for &mut H {
    fn command_start(&mut self, range: SourceRange, name: &str) -> Result<(), ScanError> {
        (**self).command_start(range, name)
    }

    fn command_end(&mut self, range: SourceRange) -> Result<(), ScanError> {
        (**self).command_end(range)
    }

    fn command_argument(
        &mut self,
        range: SourceRange,
        key: &str,
        value: &str,
    ) -> Result<(), ScanError> {
        (**self).command_argument(range, key, value)
    }

    fn text(&mut self, range: SourceRange, text: &str) -> Result<(), ScanError> {
        (**self).text(range, text)
    }
}

/// Characters allowed after the first in command and argument names
fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

/// One scan of one file
pub struct Scanner<'a, H: TokenHandler> {
    stream: CharStream<'a>,
    sources: &'a SourceManager,
    file_id: FileId,
    handler: H,
}

impl<'a, H: TokenHandler> Scanner<'a, H> {
    pub fn new(sources: &'a SourceManager, file_id: FileId, text: &'a str, handler: H) -> Self {
        Self {
            stream: CharStream::new(text),
            sources,
            file_id,
            handler,
        }
    }

    /// Scan the whole input, returning the handler
    pub fn run(mut self) -> Result<H, ScanError> {
        self.scan_document()?;
        Ok(self.handler)
    }

    fn location(&self) -> CompressedSourceLocation {
        let offset = u32::try_from(self.stream.index()).unwrap_or(u32::MAX);
        self.sources.compress(self.file_id, self.stream.line(), offset)
    }

    fn range_from(&self, start: CompressedSourceLocation) -> SourceRange {
        SourceRange::new(start, self.location())
    }

    /// Report a fatal diagnostic at the current position
    fn fatal(&self, message: &str) -> ScanError {
        let here = self.location();
        match self.sources.report_error(here, here, message, Severity::Fatal) {
            Err(fatal) => fatal.into(),
            Ok(()) => FatalError::new(message).into(),
        }
    }

    fn scan_document(&mut self) -> Result<(), ScanError> {
        while !self.stream.is_eof() {
            let start = self.location();
            if self.stream.eat('}') {
                let range = self.range_from(start);
                self.handler.command_end(range)?;
                continue;
            }
            let text = self.read_text_run();
            if !text.is_empty() {
                let range = self.range_from(start);
                self.handler.text(range, &text)?;
            }
            let start = self.location();
            if self.stream.eat('\\') {
                self.scan_command(start)?;
            }
        }
        Ok(())
    }

    /// Read text up to a command, a closing brace or the end of input
    fn read_text_run(&mut self) -> String {
        let mut text = String::new();
        while let Some(c) = self.stream.peek() {
            match c {
                '}' => break,
                '\\' => match self.stream.peek_ahead() {
                    Some(escaped @ ('\\' | '}' | '%')) => {
                        self.stream.bump();
                        self.stream.bump();
                        text.push(escaped);
                    }
                    _ => break,
                },
                '%' => {
                    self.stream.eat_while(|c| c != '\n');
                    self.stream.bump();
                }
                _ => {
                    self.stream.bump();
                    text.push(c);
                }
            }
        }
        text
    }

    fn read_name(&mut self) -> &'a str {
        match self.stream.peek() {
            Some(c) if c.is_alphanumeric() => self.stream.eat_while(is_name_char),
            _ => "",
        }
    }

    fn scan_command(&mut self, start: CompressedSourceLocation) -> Result<(), ScanError> {
        let name = self.read_name();
        let range = self.range_from(start);
        self.handler.command_start(range, name)?;
        if self.stream.eat('[') {
            self.scan_arguments()?;
        }
        if !self.stream.eat('{') {
            let range = self.range_from(start);
            self.handler.command_end(range)?;
        }
        Ok(())
    }

    fn scan_arguments(&mut self) -> Result<(), ScanError> {
        loop {
            self.stream.skip_whitespace();
            let start = self.location();
            let key = self.read_name();
            if key.is_empty() {
                // `[]` and a trailing comma both land here
                return if self.stream.eat(']') {
                    Ok(())
                } else if self.stream.is_eof() {
                    Err(self.fatal("Unterminated argument list"))
                } else {
                    Err(self.fatal("Unexpected value parsing arguments"))
                };
            }
            self.stream.skip_whitespace();
            let value = if self.stream.eat('=') {
                self.stream.skip_whitespace();
                if self.stream.eat('"') {
                    self.read_quoted_value()?
                } else {
                    self.read_bare_value()?
                }
            } else {
                String::new()
            };
            let range = self.range_from(start);
            self.handler.command_argument(range, key, &value)?;

            self.stream.skip_whitespace();
            if self.stream.eat(',') {
                continue;
            }
            if self.stream.eat(']') {
                return Ok(());
            }
            return Err(if self.stream.is_eof() {
                self.fatal("Unterminated argument list")
            } else {
                self.fatal("Unexpected value parsing arguments")
            });
        }
    }

    fn read_quoted_value(&mut self) -> Result<String, ScanError> {
        let mut value = String::new();
        loop {
            match self.stream.bump() {
                None => return Err(self.fatal("Unterminated quoted value")),
                Some('"') => return Ok(value),
                Some('\\') if matches!(self.stream.peek(), Some('"' | '\\')) => {
                    if let Some(escaped) = self.stream.bump() {
                        value.push(escaped);
                    }
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn read_bare_value(&mut self) -> Result<String, ScanError> {
        let value = self.stream.eat_while(|c| c != ',' && c != ']');
        if self.stream.is_eof() {
            return Err(self.fatal("Unterminated argument list"));
        }
        Ok(value.trim().to_string())
    }
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Register `text` under `name` and scan it into a document tree
pub fn parse_source(
    sources: &SourceManager,
    name: impl Into<String>,
    text: impl Into<String>,
) -> Result<Node, ScanError> {
    let (file_id, contents) = sources.add_file(name, text);
    let builder = Scanner::new(sources, file_id, &contents, TreeBuilder::new(sources)).run()?;
    let root = builder.finish()?;

    let last_line = u32::try_from(contents.matches('\n').count() + 1).unwrap_or(u32::MAX);
    let length = u32::try_from(contents.len()).unwrap_or(u32::MAX);
    root.set_source_range(SourceRange::new(
        sources.compress(file_id, 1, 0),
        sources.compress(file_id, last_line, length),
    ));
    Ok(root)
}

/// Read a file from disk and scan it
pub fn read_file(sources: &SourceManager, path: impl AsRef<Path>) -> Result<Node, ScanError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), bytes = text.len(), "scanning file");
    parse_source(sources, path.to_string_lossy(), text)
}
