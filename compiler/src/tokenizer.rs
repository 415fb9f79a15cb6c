use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::IdlError;
use crate::utils::quote;

lazy_static! {
    static ref TOKEN_REGEX: Regex = Regex::new(
        r#"(?x)
          /\*\*(?s:.*?)\*/                          # doc comment
        | /\*(?s:.*?)\*/                            # block comment
        | //[^\n]*                                  # line comment
        | \#[^\n]*                                  # shell-style comment
        | "(?:\\.|[^"\\])*"                         # double-quoted string
        | '(?:\\.|[^'\\])*'                         # single-quoted string
        | [+-]?0[xX][0-9A-Fa-f]+                    # hex integer
        | [+-]?(?:\d+\.\d*|\.\d+)(?:[eE][+-]?\d+)?  # double
        | [+-]?\d+[eE][+-]?\d+                      # double, exponent only
        | [+-]?\d+                                  # decimal integer
        | [A-Za-z_][A-Za-z0-9._]*                   # identifier (may be dotted)
        | [{}()\[\]<>,;:=*]                         # punctuation
        | \s+                                       # whitespace
        "#
    )
    .unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    IntLiteral,
    DoubleLiteral,
    StringLiteral,
    DocComment,
    Symbol,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind:   TokenKind,
    pub text:   String,
    pub line:   usize,
    pub column: usize,
}

fn syntax_error(path: &Path, unexpected: &str, line: usize) -> IdlError {
    IdlError::Parse {
        msg:  format!("Syntax error {}", quote(unexpected)),
        path: path.to_path_buf(),
        line,
    }
}

/// Splits a source file into tokens. Comments and whitespace are dropped;
/// doc comments survive as `DocComment` tokens with a cleaned body. The
/// stream always ends with an `Eof` token.
pub fn tokenize(path: &Path, text: &str) -> Result<Vec<Token>, IdlError> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut column = 1;
    let mut last_end = 0;

    for mat in TOKEN_REGEX.find_iter(text) {
        if mat.start() > last_end {
            let unexpected = &text[last_end..mat.start()];
            return Err(syntax_error(path, unexpected, line));
        }
        let part = mat.as_str();

        match classify(part) {
            Some((kind, cooked)) => tokens.push(Token {
                kind,
                text: cooked,
                line,
                column,
            }),
            None => {}
        }

        let newline_count = part.matches('\n').count();
        if newline_count > 0 {
            line += newline_count;
            if let Some(last_line_part) = part.split('\n').last() {
                column = last_line_part.chars().count() + 1;
            }
        } else {
            column += part.chars().count();
        }
        last_end = mat.end();
    }

    if last_end != text.len() {
        let unexpected = &text[last_end..];
        return Err(syntax_error(path, unexpected, line));
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        text: String::new(),
        line,
        column,
    });
    Ok(tokens)
}

/// Maps a raw match to its token kind and cooked text; `None` for trivia.
fn classify(part: &str) -> Option<(TokenKind, String)> {
    let first = part.chars().next()?;
    if part.starts_with("/**") && part.len() >= 5 {
        let body = &part[3..part.len() - 2];
        return Some((TokenKind::DocComment, clean_doc_text(body)));
    }
    if part.starts_with("/*") || part.starts_with("//") || part.starts_with('#') {
        return None;
    }
    if first == '"' || first == '\'' {
        let body = &part[1..part.len() - 1];
        return Some((TokenKind::StringLiteral, unescape(body)));
    }
    if first.is_ascii_digit()
        || ((first == '+' || first == '-' || first == '.') && part.len() > 1)
    {
        let digits = part.trim_start_matches(['+', '-']);
        let kind = if digits.starts_with("0x") || digits.starts_with("0X") {
            TokenKind::IntLiteral
        } else if part.contains('.') || part.contains('e') || part.contains('E') {
            TokenKind::DoubleLiteral
        } else {
            TokenKind::IntLiteral
        };
        return Some((kind, part.to_string()));
    }
    if first.is_ascii_alphabetic() || first == '_' {
        return Some((TokenKind::Identifier, part.to_string()));
    }
    if first.is_whitespace() {
        return None;
    }
    Some((TokenKind::Symbol, part.to_string()))
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n')  => out.push('\n'),
            Some('t')  => out.push('\t'),
            Some('r')  => out.push('\r'),
            Some('0')  => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Cleans up text commonly found in doxygen-like comments.
///
/// Warning: if you mix tabs and spaces in a non-uniform way, you will get
/// what you deserve.
pub fn clean_doc_text(raw: &str) -> String {
    let text: String = raw.chars().filter(|c| *c != '\r').collect();

    let mut lines: Vec<String> = text.split('\n').map(|l| l.to_string()).collect();
    if let Some(last) = lines.last() {
        if last.trim().is_empty() {
            lines.pop();
        }
    }
    if lines.is_empty() {
        return String::new();
    }

    // Leading whitespace on the first line goes unconditionally.
    lines[0] = lines[0].trim_start().to_string();

    // If every nonblank line after the first has the same number of
    // spaces/tabs, then a star, remove them.
    let mut have_prefix = true;
    let mut found_prefix = false;
    let mut prefix_len = 0;
    for l in lines.iter_mut().skip(1) {
        let pos = l.find(|c: char| c != ' ' && c != '\t');
        match pos {
            None => l.clear(),
            Some(pos) => {
                if !found_prefix {
                    if l.as_bytes()[pos] == b'*' {
                        found_prefix = true;
                        prefix_len = pos;
                    } else {
                        have_prefix = false;
                        break;
                    }
                } else if !(l.as_bytes()[pos] == b'*' && pos == prefix_len) {
                    have_prefix = false;
                    break;
                }
            }
        }
    }
    if have_prefix && found_prefix {
        for l in lines.iter_mut().skip(1) {
            let n = (prefix_len + 1).min(l.len());
            l.drain(..n);
        }
    }

    // Delete the minimum amount of leading whitespace shared by lines 2..n.
    let min_indent = lines
        .iter()
        .skip(1)
        .filter_map(|l| l.find(|c: char| c != ' ' && c != '\t'))
        .min();
    if let Some(min_indent) = min_indent {
        for l in lines.iter_mut().skip(1) {
            let n = min_indent.min(l.len());
            l.drain(..n);
        }
    }

    for l in lines.iter_mut() {
        let end = l.trim_end_matches([' ', '\t']).len();
        l.truncate(end);
    }

    if lines.first().map(|l| l.is_empty()).unwrap_or(false) {
        lines.remove(0);
    }

    let mut out = String::new();
    for l in &lines {
        out.push_str(l);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn toks(input: &str) -> Vec<Token> {
        tokenize(&PathBuf::from("test.idl"), input).expect("tokenize failed")
    }

    #[test]
    fn test_tokenize_simple() {
        let tokens = toks("const i32 X = 42;");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["const", "i32", "X", "=", "42", ";", ""]);
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[4].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[4].line, 1);
        assert_eq!(tokens[4].column, 15);
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn test_tokenize_literals() {
        let tokens = toks("0xFF -12 3.14 1e10 \"hi\\nthere\" 'x'");
        assert_eq!(tokens[0].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[1].kind, TokenKind::IntLiteral);
        assert_eq!(tokens[1].text, "-12");
        assert_eq!(tokens[2].kind, TokenKind::DoubleLiteral);
        assert_eq!(tokens[3].kind, TokenKind::DoubleLiteral);
        assert_eq!(tokens[4].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[4].text, "hi\nthere");
        assert_eq!(tokens[5].text, "x");
    }

    #[test]
    fn test_tokenize_comments_dropped() {
        let tokens = toks("a // trailing\n# shell\n/* block\nblock */ b");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", ""]);
        assert_eq!(tokens[1].line, 4);
    }

    #[test]
    fn test_tokenize_doc_comment() {
        let tokens = toks("/** Hello */ struct S {}");
        assert_eq!(tokens[0].kind, TokenKind::DocComment);
        assert_eq!(tokens[0].text, "Hello\n");
    }

    #[test]
    fn test_tokenize_dotted_identifier() {
        let tokens = toks("shared.SharedStruct");
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].text, "shared.SharedStruct");
    }

    #[test]
    fn test_tokenize_unexpected_text() {
        let err = tokenize(&PathBuf::from("test.idl"), "struct S { @ }").unwrap_err();
        assert!(err.to_string().contains("Syntax error"));
    }

    #[test]
    fn test_clean_doc_text_star_gutter() {
        let raw = " Part one.\n * Part two.\n *   Indented.\n ";
        assert_eq!(clean_doc_text(raw), "Part one.\nPart two.\n  Indented.\n");
    }

    #[test]
    fn test_clean_doc_text_common_indent() {
        let raw = "\n    First\n      Second\n";
        assert_eq!(clean_doc_text(raw), "First\n  Second\n");
    }
}
