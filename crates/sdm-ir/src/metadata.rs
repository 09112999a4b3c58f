//! Source position metadata for diagnostics
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

use std::fmt;

use serde::{Deserialize, Serialize};

/// Source position information for error reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Line number (1-indexed)
    pub line: usize,

    /// Column number (1-indexed)
    pub column: usize,

    /// Byte offset from start of input
    pub offset: usize,
}

/// Information about the source of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Source file path or identifier
    pub source: String,

    /// Position within the source
    pub position: Position,

    /// Additional context (e.g., root tag)
    pub context: Option<String>,
}

impl Position {
    /// Create a new position
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }

    /// Compute line and column for a byte offset into `input`
    pub fn from_offset(input: &str, offset: usize) -> Self {
        let mut tracker = PositionTracker::new(input);
        tracker.advance_to(offset)
    }
}

/// Line and column bookkeeping for a forward scan over one input
///
/// Each call only scans the bytes since the previous offset, so a parser that
/// asks for every event position pays for the input once.
#[derive(Debug, Clone)]
pub struct PositionTracker<'a> {
    input: &'a str,
    current: Position,
}

impl<'a> PositionTracker<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            current: Position::new(1, 1, 0),
        }
    }

    /// Position of `offset`, clamped to the input length
    pub fn advance_to(&mut self, offset: usize) -> Position {
        let offset = offset.min(self.input.len());
        if offset < self.current.offset {
            self.current = Position::new(1, 1, 0);
        }
        let scanned = &self.input.as_bytes()[self.current.offset..offset];
        match scanned.iter().rposition(|b| *b == b'\n') {
            Some(last_newline) => {
                self.current.line += scanned.iter().filter(|b| **b == b'\n').count();
                self.current.column = char_count(&scanned[last_newline + 1..]) + 1;
            }
            None => self.current.column += char_count(scanned),
        }
        self.current.offset = offset;
        self.current
    }
}

/// Characters in a UTF-8 byte run, counting lead bytes only
fn char_count(bytes: &[u8]) -> usize {
    bytes.iter().filter(|b| (**b & 0xC0) != 0x80).count()
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

impl SourceInfo {
    /// Create new source info
    pub fn new(source: impl Into<String>, position: Position) -> Self {
        Self {
            source: source.into(),
            position,
            context: None,
        }
    }

    /// Add context
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}
