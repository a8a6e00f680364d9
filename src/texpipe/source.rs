//! Source file storage, location encoding and diagnostics
//!
//! The [`SourceManager`] owns the text of every scanned file for the life of a
//! pipeline run. Scanners ask it for [`CompressedSourceLocation`]s as they
//! go; passes hand those locations back to [`SourceManager::report_error`] to
//! print a diagnostic with the offending source line underneath.
//!
//! All methods take `&self`: the file list and overflow table are only ever
//! appended to, and the whole pipeline is single threaded.

pub mod location;
mod render;

use std::cell::{Cell, RefCell};
use std::io::{IsTerminal, Write};
use std::path::Path;
use std::rc::Rc;

use thiserror::Error;

pub use location::{CompressedSourceLocation, FileId, SourceLocation, SourceRange};
pub use render::{display_width, Severity};

use render::{render_unlocated, Snippet};

/// Raised by a fatal diagnostic; callers must abandon the current operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fatal error: {message}")]
pub struct FatalError {
    pub message: String,
}

impl FatalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug)]
struct SourceFile {
    name: String,
    contents: Rc<str>,
}

/// Where rendered diagnostics go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticOutput {
    /// Standard error, coloured when it is a terminal
    Stderr,
    /// Rendered and counted, but not printed
    Silent,
}

/// Owns file contents and resolves source locations
#[derive(Debug)]
pub struct SourceManager {
    files: RefCell<Vec<SourceFile>>,
    overflow: RefCell<Vec<SourceLocation>>,
    counts: [Cell<usize>; 3],
    output: DiagnosticOutput,
}

impl SourceManager {
    pub fn new() -> Self {
        Self::with_output(DiagnosticOutput::Stderr)
    }

    pub fn with_output(output: DiagnosticOutput) -> Self {
        Self {
            files: RefCell::new(Vec::new()),
            overflow: RefCell::new(Vec::new()),
            counts: Default::default(),
            output,
        }
    }

    /// Register a file, taking ownership of its contents.
    ///
    /// Returns the new file's id and a shared handle to its contents.
    pub fn add_file(
        &self,
        name: impl Into<String>,
        contents: impl Into<String>,
    ) -> (FileId, Rc<str>) {
        let contents: Rc<str> = Rc::from(contents.into());
        let mut files = self.files.borrow_mut();
        let id = files.len() as FileId;
        files.push(SourceFile {
            name: name.into(),
            contents: Rc::clone(&contents),
        });
        (id, contents)
    }

    pub fn file_name(&self, id: FileId) -> Option<String> {
        self.files
            .borrow()
            .get(id as usize)
            .map(|file| file.name.clone())
    }

    pub fn file_contents(&self, id: FileId) -> Option<Rc<str>> {
        self.files
            .borrow()
            .get(id as usize)
            .map(|file| Rc::clone(&file.contents))
    }

    pub fn file_count(&self) -> usize {
        self.files.borrow().len()
    }

    /// Directory containing the file a location points into
    pub fn directory_of(&self, loc: CompressedSourceLocation) -> Option<String> {
        let expanded = self.expand(loc);
        let name = self.file_name(expanded.file_id)?;
        Path::new(&name)
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(|parent| parent.to_string_lossy().into_owned())
    }

    // ========================================================================
    // LOCATION ENCODING
    // ========================================================================

    /// Encode a location, spilling into the overflow table when a field is too
    /// wide for the inline layout.
    pub fn compress(&self, file_id: FileId, line: u32, offset: u32) -> CompressedSourceLocation {
        if let Some(loc) = CompressedSourceLocation::inline(file_id, line, offset) {
            return loc;
        }
        let mut overflow = self.overflow.borrow_mut();
        let index = overflow.len() as u32;
        overflow.push(SourceLocation::new(file_id, line, offset));
        CompressedSourceLocation::overflow(index)
    }

    pub fn expand(&self, loc: CompressedSourceLocation) -> SourceLocation {
        if !loc.is_valid() {
            return SourceLocation::UNKNOWN;
        }
        match loc.decode() {
            Ok(expanded) => expanded,
            Err(index) => self
                .overflow
                .borrow()
                .get(index as usize)
                .copied()
                .unwrap_or(SourceLocation::UNKNOWN),
        }
    }

    /// Number of locations that did not fit the inline encoding
    pub fn overflow_len(&self) -> usize {
        self.overflow.borrow().len()
    }

    // ========================================================================
    // DIAGNOSTICS
    // ========================================================================

    /// Render a diagnostic without printing it
    pub fn render_diagnostic(
        &self,
        start: CompressedSourceLocation,
        end: CompressedSourceLocation,
        message: &str,
        severity: Severity,
    ) -> String {
        self.render(start, end, message, severity, false)
    }

    fn render(
        &self,
        start: CompressedSourceLocation,
        end: CompressedSourceLocation,
        message: &str,
        severity: Severity,
        colored: bool,
    ) -> String {
        let end = if end.is_valid() { end } else { start };
        let start_loc = self.expand(start);
        let end_loc = self.expand(end);
        let files = self.files.borrow();
        let Some(file) = files.get(start_loc.file_id as usize) else {
            return render_unlocated(severity, message, colored);
        };
        let same_line = end_loc.file_id == start_loc.file_id && end_loc.line == start_loc.line;
        Snippet::locate(
            &file.name,
            &file.contents,
            start_loc.line,
            start_loc.offset as usize,
            end_loc.offset as usize,
            same_line,
        )
        .render(severity, message, colored)
    }

    /// Report a diagnostic for the span `start..end`.
    ///
    /// Fatal diagnostics come back as `Err(FatalError)` so the caller can
    /// unwind with `?`.
    pub fn report_error(
        &self,
        start: CompressedSourceLocation,
        end: CompressedSourceLocation,
        message: &str,
        severity: Severity,
    ) -> Result<(), FatalError> {
        self.counts[severity as usize].set(self.counts[severity as usize].get() + 1);
        match severity {
            Severity::Warning => tracing::debug!(%message, "warning reported"),
            Severity::Error => tracing::debug!(%message, "error reported"),
            Severity::Fatal => tracing::debug!(%message, "fatal error reported"),
        }
        if self.output == DiagnosticOutput::Stderr {
            let stderr = std::io::stderr();
            let rendered = self.render(start, end, message, severity, stderr.is_terminal());
            // Nothing sensible to do if stderr is gone.
            let _ = stderr.lock().write_all(rendered.as_bytes());
        }
        match severity {
            Severity::Fatal => Err(FatalError::new(message)),
            Severity::Warning | Severity::Error => Ok(()),
        }
    }

    /// Report a diagnostic covering a whole range
    pub fn report_range(
        &self,
        range: SourceRange,
        message: &str,
        severity: Severity,
    ) -> Result<(), FatalError> {
        self.report_error(range.start, range.end, message, severity)
    }

    /// How many diagnostics of `severity` have been reported
    pub fn diagnostic_count(&self, severity: Severity) -> usize {
        self.counts[severity as usize].get()
    }
}

impl Default for SourceManager {
    fn default() -> Self {
        Self::new()
    }
}
