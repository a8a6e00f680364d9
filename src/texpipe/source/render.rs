//! Diagnostic rendering
//!
//! Turns a located message into the familiar three-line form:
//!
//! ```text
//! doc.tex:3:4: error: Unexpected value parsing arguments
//! see \ref[x y]{here}
//!     ^~~~~~~~
//! ```
//!
//! Column and underline widths are terminal display widths, so wide
//! East-Asian characters take two cells.

use std::fmt;

use crossterm::style::Stylize;
use unicode_width::UnicodeWidthChar;

/// How serious a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    /// Aborts the operation that reported it
    Fatal,
}

impl Severity {
    pub fn is_error(&self) -> bool {
        !matches!(self, Severity::Warning)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Fatal => write!(f, "fatal error"),
        }
    }
}

/// Display width of a run of text
pub fn display_width(text: &str) -> usize {
    text.chars()
        .map(|c| UnicodeWidthChar::width(c).unwrap_or(0))
        .sum()
}

/// A diagnostic resolved against its source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Snippet<'a> {
    pub file_name: &'a str,
    pub line: u32,
    /// Display width of the text before the highlighted span
    pub column: usize,
    pub source_line: &'a str,
    /// Display width of the highlighted span, at least 1
    pub highlight: usize,
}

impl<'a> Snippet<'a> {
    /// Locate the line containing `start` and measure the highlighted span.
    ///
    /// `end` is clipped to the end of the start line when `same_line` is false
    /// or when it lies past the line.
    pub fn locate(
        file_name: &'a str,
        contents: &'a str,
        line: u32,
        start: usize,
        end: usize,
        same_line: bool,
    ) -> Self {
        let start = clamp_to_boundary(contents, start);
        let line_start = contents[..start].rfind('\n').map_or(0, |i| i + 1);
        let line_end = contents[start..]
            .find('\n')
            .map_or(contents.len(), |i| start + i);
        let end = if same_line {
            clamp_to_boundary(contents, end.clamp(start, line_end))
        } else {
            line_end
        };
        Self {
            file_name,
            line,
            column: display_width(&contents[line_start..start]),
            source_line: contents[line_start..line_end].trim_end_matches('\r'),
            highlight: display_width(&contents[start..end]).max(1),
        }
    }

    pub fn render(&self, severity: Severity, message: &str, colored: bool) -> String {
        let label = severity_label(severity, colored);
        let underline = format!("^{}", "~".repeat(self.highlight - 1));
        let underline = if colored {
            underline.green().to_string()
        } else {
            underline
        };
        format!(
            "{}:{}:{}: {}: {}\n{}\n{}{}\n",
            self.file_name,
            self.line,
            self.column,
            label,
            message,
            self.source_line,
            " ".repeat(self.column),
            underline
        )
    }
}

/// Render a diagnostic that has no usable location
pub(super) fn render_unlocated(severity: Severity, message: &str, colored: bool) -> String {
    format!(
        "<unknown location>: {}: {}\n",
        severity_label(severity, colored),
        message
    )
}

fn severity_label(severity: Severity, colored: bool) -> String {
    let label = severity.to_string();
    if !colored {
        return label;
    }
    if severity.is_error() {
        label.red().to_string()
    } else {
        label.yellow().to_string()
    }
}

/// Move `index` back to the nearest character boundary inside `text`
fn clamp_to_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
