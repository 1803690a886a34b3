//! Offset to line/column translation.

use serde::Serialize;

use crate::errors::InternalError;

/// 1-based line, 0-based column counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceLocation {
    pub start: Position,
    pub end: Position,
}

/// Line-start table over one source text. Built once per file and shared
/// read-only by every stage that needs positions.
#[derive(Debug, Clone)]
pub struct PositionIndex {
    source: String,
    line_starts: Vec<u32>,
}

impl PositionIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        let mut chars = source.char_indices().peekable();
        while let Some((offset, ch)) = chars.next() {
            match ch {
                '\r' => {
                    if let Some((_, '\n')) = chars.peek() {
                        chars.next();
                        line_starts.push(offset as u32 + 2);
                    } else {
                        line_starts.push(offset as u32 + 1);
                    }
                }
                '\n' => line_starts.push(offset as u32 + 1),
                '\u{2028}' | '\u{2029}' => line_starts.push((offset + ch.len_utf8()) as u32),
                _ => {}
            }
        }
        Self {
            source: source.to_string(),
            line_starts,
        }
    }

    pub fn source_len(&self) -> u32 {
        self.source.len() as u32
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Offset equal to the source length maps to the end of the last line.
    pub fn locate(&self, offset: u32) -> Result<Position, InternalError> {
        if offset > self.source_len() {
            return Err(InternalError::OutOfRange {
                offset,
                len: self.source_len(),
            });
        }
        let line = match self.line_starts.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert - 1,
        };
        let line_start = self.line_starts[line] as usize;
        let column = self
            .source
            .get(line_start..offset as usize)
            .map(|prefix| prefix.chars().count())
            .ok_or(InternalError::OutOfRange {
                offset,
                len: self.source_len(),
            })?;
        Ok(Position {
            line: line as u32 + 1,
            column: column as u32,
        })
    }

    pub fn location(&self, start: u32, end: u32) -> Result<SourceLocation, InternalError> {
        Ok(SourceLocation {
            start: self.locate(start)?,
            end: self.locate(end)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_and_later_lines() {
        let index = PositionIndex::new("<div>\n  {x}\n</div>");
        assert_eq!(index.locate(0).unwrap(), Position { line: 1, column: 0 });
        assert_eq!(index.locate(8).unwrap(), Position { line: 2, column: 2 });
        assert_eq!(index.locate(12).unwrap(), Position { line: 3, column: 0 });
    }

    #[test]
    fn test_crlf_counts_as_one_terminator() {
        let index = PositionIndex::new("a\r\nb\rc");
        assert_eq!(index.line_count(), 3);
        assert_eq!(index.locate(3).unwrap(), Position { line: 2, column: 0 });
        assert_eq!(index.locate(5).unwrap(), Position { line: 3, column: 0 });
    }

    #[test]
    fn test_end_of_source_is_addressable() {
        let index = PositionIndex::new("ab\n");
        assert_eq!(index.locate(3).unwrap(), Position { line: 2, column: 0 });
        assert!(matches!(
            index.locate(4),
            Err(InternalError::OutOfRange { offset: 4, len: 3 })
        ));
    }

    #[test]
    fn test_columns_count_characters() {
        let index = PositionIndex::new("é{x}");
        assert_eq!(index.locate(3).unwrap(), Position { line: 1, column: 2 });
    }
}
