//! Comment stripping.
//!
//! Comments are overwritten byte-for-byte with spaces (newlines kept), so the
//! normalized text has the same length, byte offsets and line numbers as the
//! raw source. Token spans computed on the normalized text therefore slice the
//! raw text too, which is how excerpts keep their comments for documentation.

use crate::report::Diagnostic;

#[derive(Debug, Clone)]
pub struct Normalized {
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    Str,
    Line,
    Block,
}

pub fn normalize(source: &str) -> Normalized {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut diagnostics = Vec::new();
    let mut mode = Mode::Code;
    let mut line = 1usize;
    let mut block_start = (0usize, 0usize); // (byte offset in `out`, line)

    let mut chars = source.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let next = bytes.get(i + 1).copied();
        match mode {
            Mode::Code => match c {
                '"' => {
                    mode = Mode::Str;
                    out.push(c);
                }
                '/' if next == Some(b'/') => {
                    mode = Mode::Line;
                    chars.next();
                    out.push_str("  ");
                }
                '/' if next == Some(b'*') => {
                    mode = Mode::Block;
                    block_start = (out.len(), line);
                    chars.next();
                    out.push_str("  ");
                }
                '*' if next == Some(b'/') => {
                    // closer without opener: leave it alone
                    diagnostics.push(
                        Diagnostic::warning("stray `*/` without a matching `/*` left in place")
                            .at_line(line),
                    );
                    chars.next();
                    out.push_str("*/");
                }
                _ => out.push(c),
            },
            Mode::Str => {
                out.push(c);
                if c == '\\' {
                    if let Some((_, escaped)) = chars.next() {
                        if escaped == '\n' {
                            line += 1;
                        }
                        out.push(escaped);
                    }
                } else if c == '"' || c == '\n' {
                    // SV string literals end at the line; an unclosed one must not eat the file
                    mode = Mode::Code;
                }
            }
            Mode::Line => {
                if c == '\n' {
                    mode = Mode::Code;
                    out.push('\n');
                } else {
                    blank(&mut out, c);
                }
            }
            Mode::Block => {
                if c == '*' && next == Some(b'/') {
                    chars.next();
                    out.push_str("  ");
                    mode = Mode::Code;
                } else if c == '\n' {
                    out.push('\n');
                } else {
                    blank(&mut out, c);
                }
            }
        }
        if c == '\n' {
            line += 1;
        }
    }

    if mode == Mode::Block {
        // unterminated block comment: restore the original text from the opener on
        out.truncate(block_start.0);
        out.push_str(&source[block_start.0..]);
        diagnostics.push(
            Diagnostic::warning("unterminated `/*` comment passed through unchanged")
                .at_line(block_start.1),
        );
    }

    Normalized { text: out, diagnostics }
}

fn blank(out: &mut String, c: char) {
    for _ in 0..c.len_utf8() {
        out.push(' ');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_become_whitespace_with_same_layout() {
        let src = "a = 1; // tail\n/* one\n two */ b;\n";
        let n = normalize(src);
        assert_eq!(n.text.len(), src.len());
        assert_eq!(n.text.lines().count(), src.lines().count());
        assert!(!n.text.contains("tail"));
        assert!(!n.text.contains("two"));
        assert!(n.text.contains("b;"));
        assert!(n.diagnostics.is_empty());
    }

    #[test]
    fn idempotent_on_comment_free_text() {
        let src = "class a; rand bit [7:0] x; constraint c { x < 4; } endclass\n";
        let once = normalize(src);
        assert_eq!(once.text, src);
        let twice = normalize(&once.text);
        assert_eq!(twice.text, once.text);
    }

    #[test]
    fn string_literals_are_untouched() {
        let src = "s = \"http://x // not a comment /* nor this */\";";
        let n = normalize(src);
        assert_eq!(n.text, src);
    }

    #[test]
    fn multibyte_comment_text_keeps_offsets() {
        let src = "x; // ünïcödé\ny;";
        let n = normalize(src);
        assert_eq!(n.text.len(), src.len());
        assert_eq!(&n.text[n.text.len() - 2..], "y;");
    }

    #[test]
    fn unterminated_block_comment_is_passed_through_with_warning() {
        let src = "x;\n/* never closed\ny;";
        let n = normalize(src);
        assert_eq!(n.text, src);
        assert_eq!(n.diagnostics.len(), 1);
        assert_eq!(n.diagnostics[0].line, Some(2));
    }
}
