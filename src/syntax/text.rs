//! Line and position helpers over UTF-8 source buffers.
//!
//! All offsets are byte offsets. Newline handling looks only at `\n`, so
//! `\r\n` files keep their `\r` attached to the line content.

use tree_sitter::Point;

/// Offset of the first byte of the line containing `offset`.
pub fn line_start(source: &str, offset: usize) -> usize {
    let offset = offset.min(source.len());
    source.as_bytes()[..offset]
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|p| p + 1)
        .unwrap_or(0)
}

/// Offset of the `\n` terminating the line containing `offset`, or the
/// buffer length for the last line.
pub fn line_end(source: &str, offset: usize) -> usize {
    let offset = offset.min(source.len());
    source.as_bytes()[offset..]
        .iter()
        .position(|b| *b == b'\n')
        .map(|p| offset + p)
        .unwrap_or(source.len())
}

/// Offset of the line following the one containing `offset`.
///
/// Returns the buffer length when `offset` is on the last line.
pub fn next_line_start(source: &str, offset: usize) -> usize {
    let end = line_end(source, offset);
    if end < source.len() {
        end + 1
    } else {
        end
    }
}

/// First offset after the line on which a node ending at `end` finishes.
///
/// Some nodes (a C `#include`, for one) already span their trailing newline;
/// for those `end` is returned as is.
pub fn line_after(source: &str, end: usize) -> usize {
    let end = end.min(source.len());
    if end > 0 && source.as_bytes()[end - 1] == b'\n' {
        end
    } else {
        next_line_start(source, end)
    }
}

/// Leading whitespace of the line containing `offset`.
pub fn line_indent(source: &str, offset: usize) -> &str {
    let start = line_start(source, offset);
    let rest = &source[start..];
    let width = rest
        .bytes()
        .take_while(|b| *b == b' ' || *b == b'\t')
        .count();
    &rest[..width]
}

/// Whether everything between the line start and `offset` is whitespace.
pub fn starts_line(source: &str, offset: usize) -> bool {
    let start = line_start(source, offset);
    source.as_bytes()[start..offset.min(source.len())]
        .iter()
        .all(|b| *b == b' ' || *b == b'\t')
}

/// Row/column (both 0-based, column in bytes) of `offset`.
pub fn point_at(source: &str, offset: usize) -> Point {
    let offset = offset.min(source.len());
    let prefix = &source.as_bytes()[..offset];
    let row = prefix.iter().filter(|b| **b == b'\n').count();
    let column = offset - line_start(source, offset);
    Point { row, column }
}

/// Whether the buffer ends with a newline or is empty.
pub fn ends_with_newline(source: &str) -> bool {
    source.is_empty() || source.ends_with('\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = "def f():\n    x = 1\n\treturn x";

    #[test]
    fn test_line_bounds() {
        assert_eq!(line_start(SRC, 0), 0);
        assert_eq!(line_start(SRC, 13), 9);
        assert_eq!(line_end(SRC, 13), 18);
        assert_eq!(next_line_start(SRC, 13), 19);
        assert_eq!(next_line_start(SRC, 20), SRC.len());
    }

    #[test]
    fn test_line_after() {
        assert_eq!(line_after(SRC, 13), 19);
        assert_eq!(line_after(SRC, 19), 19);
        assert_eq!(line_after(SRC, SRC.len()), SRC.len());
        assert_eq!(line_after("#include <a.h>\nint x;\n", 15), 15);
    }

    #[test]
    fn test_line_indent() {
        assert_eq!(line_indent(SRC, 15), "    ");
        assert_eq!(line_indent(SRC, 22), "\t");
        assert_eq!(line_indent(SRC, 2), "");
    }

    #[test]
    fn test_starts_line() {
        assert!(starts_line(SRC, 13));
        assert!(!starts_line(SRC, 15));
        assert!(starts_line(SRC, 0));
    }

    #[test]
    fn test_point_at() {
        assert_eq!(point_at(SRC, 0), Point { row: 0, column: 0 });
        assert_eq!(point_at(SRC, 13), Point { row: 1, column: 4 });
        assert_eq!(point_at(SRC, SRC.len()), Point { row: 2, column: 9 });
    }
}
