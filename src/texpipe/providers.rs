//! Code intelligence and highlighting collaborators
//!
//! The document pipeline does not parse program source itself. Providers do
//! that and hand back ordinary subtrees, so that passes can splice code
//! listings and doc comments into a document like any other content.
//!
//! A highlighted listing has this shape:
//!
//! ```text
//! \code[code-kind=listing,first-line=12]{\code-run[token-kind=Keyword]{local} x = \code-run[token-kind=Number]{1}}
//! ```
//!
//! [`CodeFragmentBuilder`] produces it from a list of highlight ranges.

use std::collections::BTreeSet;
use std::ops::Range;

use thiserror::Error;

use crate::texpipe::tree::Node;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("highlight range {start}..{end} is outside the {length} byte source")]
    OutOfRange {
        start: usize,
        end: usize,
        length: usize,
    },
    #[error("highlight range {start}..{end} does not fall on character boundaries")]
    NotCharBoundary { start: usize, end: usize },
    #[error("no highlighter for language {0}")]
    UnsupportedLanguage(String),
    #[error("{0}")]
    Failed(String),
}

/// Kinds of declaration a code-intelligence provider can look up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Function,
    Macro,
}

/// Symbol lookup over a compiled code base
pub trait CodeIntelligence {
    /// Unique symbol ids of every declaration called `name`
    fn usrs_for(&self, name: &str, kind: EntityKind) -> BTreeSet<String>;

    /// The doc comment of a symbol, as a tree
    fn doc_comment_for(&self, usr: &str) -> Option<Node>;

    /// A highlighted listing of `file`, lines `first_line..=last_line`
    fn listing_for(&self, file: &str, first_line: u32, last_line: u32) -> Option<Node>;
}

/// Grammar-based syntax highlighting
pub trait Highlighter {
    /// Highlight the part of `source` between the comments containing
    /// `begin_marker` and `end_marker`
    fn highlight(
        &self,
        source: &str,
        language: &str,
        begin_marker: &str,
        end_marker: &str,
    ) -> Result<Node, ProviderError>;
}

/// One highlighted span of source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightRange {
    pub start: usize,
    pub end: usize,
    pub token_kind: String,
}

/// Part of a source file selected by begin and end markers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkedRegion {
    /// Bytes from the line after the begin marker up to the line holding the
    /// end marker
    pub range: Range<usize>,
    /// Line number (from 1) of the first line in the region
    pub first_line: u32,
}

/// Find the region between the line containing `begin_marker` and the next
/// line containing `end_marker`. A missing end marker extends the region to
/// the end of `source`.
pub fn marked_region(source: &str, begin_marker: &str, end_marker: &str) -> Option<MarkedRegion> {
    let marker = source.find(begin_marker)?;
    let start = source[marker..]
        .find('\n')
        .map_or(source.len(), |newline| marker + newline + 1);
    let end = match source[start..].find(end_marker) {
        Some(found) => source[..start + found]
            .rfind('\n')
            .map_or(start, |newline| (newline + 1).max(start)),
        None => source.len(),
    };
    let first_line = u32::try_from(source[..start].matches('\n').count() + 1).unwrap_or(u32::MAX);
    Some(MarkedRegion {
        range: start..end,
        first_line,
    })
}

/// Builds `code` trees from highlight ranges over a source string
#[derive(Debug, Clone)]
pub struct CodeFragmentBuilder<'a> {
    source: &'a str,
    region: Range<usize>,
    first_line: u32,
    ranges: Vec<HighlightRange>,
}

impl<'a> CodeFragmentBuilder<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            region: 0..source.len(),
            first_line: 1,
            ranges: Vec::new(),
        }
    }

    /// Restrict the fragment to a marked region
    pub fn region(mut self, region: &MarkedRegion) -> Self {
        self.region = region.range.clone();
        self.first_line = region.first_line;
        self
    }

    pub fn first_line(mut self, line: u32) -> Self {
        self.first_line = line;
        self
    }

    pub fn highlight(
        &mut self,
        start: usize,
        end: usize,
        token_kind: impl Into<String>,
    ) -> &mut Self {
        self.ranges.push(HighlightRange {
            start,
            end,
            token_kind: token_kind.into(),
        });
        self
    }

    /// Build the `code` node.
    ///
    /// Ranges are clipped to the region and to each other, so overlapping
    /// input keeps the earlier range. Text between ranges becomes plain runs.
    pub fn build(&self) -> Result<Node, ProviderError> {
        let length = self.source.len();
        if self.region.start > self.region.end || self.region.end > length {
            return Err(ProviderError::OutOfRange {
                start: self.region.start,
                end: self.region.end,
                length,
            });
        }
        let mut ranges = self.ranges.clone();
        for range in &ranges {
            if range.start > range.end || range.end > length {
                return Err(ProviderError::OutOfRange {
                    start: range.start,
                    end: range.end,
                    length,
                });
            }
            if !self.source.is_char_boundary(range.start)
                || !self.source.is_char_boundary(range.end)
            {
                return Err(ProviderError::NotCharBoundary {
                    start: range.start,
                    end: range.end,
                });
            }
        }
        ranges.sort_by_key(|range| range.start);

        let root = Node::with_kind("code");
        root.set_attribute("code-kind", "listing");
        root.set_attribute("first-line", self.first_line.to_string());

        let mut cursor = self.region.start;
        for range in ranges {
            let start = range.start.max(cursor);
            let end = range.end.min(self.region.end);
            if start >= end {
                continue;
            }
            root.append_text(&self.source[cursor..start]);
            let run = root.new_child();
            run.set_kind("code-run");
            run.set_attribute("token-kind", range.token_kind);
            run.append_text(&self.source[start..end]);
            cursor = end;
        }
        root.append_text(&self.source[cursor..self.region.end]);
        Ok(root)
    }
}
