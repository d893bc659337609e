//! Small parser-side helpers.

/// 1-indexed (line, column) of a byte offset, for error messages.
pub fn line_col(script: &str, offset: usize) -> (usize, usize) {
    let clamped = offset.min(script.len());
    let mut line = 1;
    let mut col = 1;
    for c in script[..clamped].chars() {
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::line_col;

    #[test]
    fn test_line_col() {
        let src = "ab\ncd\nef";
        assert_eq!(line_col(src, 0), (1, 1));
        assert_eq!(line_col(src, 3), (2, 1));
        assert_eq!(line_col(src, 7), (3, 2));
    }
}
