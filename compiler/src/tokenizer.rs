use regex::Regex;
use lazy_static::lazy_static;
use crate::error::ColfError;
use crate::types::Comment;
use crate::utils::{quote, syntax_error};

lazy_static! {
    pub static ref TOKEN_REGEX: Regex = Regex::new(
        r"(/\*(?s:.*?)\*/|//[^\n]*|\n|[ \t\r]+|\[\]|[\[\]{}=*]|\d+|[A-Za-z_][A-Za-z0-9_]*(?:/[A-Za-z_][A-Za-z0-9_]*)*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)"
    ).unwrap();
    pub static ref WHITESPACE_RX: Regex = Regex::new(r"^[ \t\r]+$").unwrap();
}

/// A significant token. Comments do not become tokens of their own: those on
/// a line of their own attach to the next token as `leading`, and one that
/// follows a token on the same line attaches to it as `trailing`.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text:         String,
    pub line:         usize,
    pub column:       usize,
    pub blank_before: bool,
    pub leading:      Vec<Comment>,
    pub trailing:     Option<String>,
}

impl Token {
    fn new(text: &str, line: usize, column: usize, blank_before: bool, leading: Vec<Comment>) -> Token {
        Token {
            text: text.to_string(),
            line,
            column,
            blank_before,
            leading,
            trailing: None,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.text.is_empty()
    }
}

/// Splits schema text into tokens, ending with an empty EOF token that holds
/// any comments after the last declaration.
pub fn tokenize_schema(file: &str, text: &str) -> Result<Vec<Token>, ColfError> {
    let mut tokens: Vec<Token> = Vec::new();
    let mut pending: Vec<Comment> = Vec::new();
    let mut line = 1;
    let mut column = 1;
    let mut last_end = 0;
    let mut newlines = 0;
    let mut token_on_line = false;

    for mat in TOKEN_REGEX.find_iter(text) {
        let start = mat.start();
        let part = mat.as_str();

        if start > last_end {
            return Err(unexpected(file, &text[last_end..], line, column));
        }
        last_end = mat.end();

        if part == "\n" {
            line += 1;
            column = 1;
            newlines += 1;
            token_on_line = false;
            continue;
        }
        if WHITESPACE_RX.is_match(part) {
            column += part.chars().count();
            continue;
        }

        if part.starts_with("//") || part.starts_with("/*") {
            let comment = part.trim_end();
            match tokens.last_mut() {
                Some(prev) if token_on_line => {
                    prev.trailing = Some(match prev.trailing.take() {
                        Some(before) => format!("{} {}", before, comment),
                        None => comment.to_string(),
                    });
                }
                _ => pending.push(Comment {
                    text:         comment.to_string(),
                    blank_before: newlines >= 2,
                }),
            }
            newlines = 0;
        } else {
            tokens.push(Token::new(part, line, column, newlines >= 2, std::mem::take(&mut pending)));
            newlines = 0;
            token_on_line = true;
        }

        // Update line/column
        let newline_count = part.matches('\n').count();
        if newline_count > 0 {
            line += newline_count;
            token_on_line = false;
            if let Some(last_line_part) = part.split('\n').last() {
                column = last_line_part.chars().count() + 1;
            }
        } else {
            column += part.chars().count();
        }
    }

    if last_end != text.len() {
        return Err(unexpected(file, &text[last_end..], line, column));
    }

    // Append EOF token
    tokens.push(Token::new("", line, column, newlines >= 2, pending));
    Ok(tokens)
}

fn unexpected(file: &str, rest: &str, line: usize, column: usize) -> ColfError {
    if rest.starts_with("/*") {
        return syntax_error(file, "unterminated block comment", line, column);
    }
    let word: String = rest.chars().take_while(|c| !c.is_whitespace()).take(16).collect();
    syntax_error(file, &format!("unexpected {}", quote(&word)), line, column)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(tokens: &[Token]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[test]
    fn test_tokenize_simple() {
        let got = tokenize_schema("a.colf", "x int32 [size=10]").unwrap();
        assert_eq!(texts(&got), vec!["x", "int32", "[", "size", "=", "10", "]", ""]);
        assert_eq!((got[1].line, got[1].column), (1, 3));
        assert_eq!((got[7].line, got[7].column), (1, 18));
    }

    #[test]
    fn test_tokenize_type_forms() {
        let got = tokenize_schema("a.colf", "a []text\nb *Node\nc geo/v2.Point").unwrap();
        assert_eq!(
            texts(&got),
            vec!["a", "[]", "text", "b", "*", "Node", "c", "geo/v2.Point", ""]
        );
        assert_eq!((got[3].line, got[3].column), (2, 1));
        assert_eq!((got[7].line, got[7].column), (3, 3));
    }

    #[test]
    fn test_tokenize_comments() {
        let input = "// doc one\n\n// doc two\nx int32 // trailing\n/* tail */\n";
        let got = tokenize_schema("a.colf", input).unwrap();
        assert_eq!(texts(&got), vec!["x", "int32", ""]);
        assert_eq!(
            got[0].leading,
            vec![
                Comment { text: "// doc one".into(), blank_before: false },
                Comment { text: "// doc two".into(), blank_before: true },
            ]
        );
        assert_eq!(got[1].trailing.as_deref(), Some("// trailing"));
        assert_eq!(got[2].leading, vec![Comment { text: "/* tail */".into(), blank_before: false }]);
        assert_eq!(got[0].line, 4);
    }

    #[test]
    fn test_tokenize_block_comment_lines() {
        let got = tokenize_schema("a.colf", "/* one\n two */\nx").unwrap();
        assert_eq!(got[0].text, "x");
        assert_eq!((got[0].line, got[0].column), (3, 1));
        assert!(!got[0].blank_before);
    }

    #[test]
    fn test_tokenize_blank_lines() {
        let got = tokenize_schema("a.colf", "a\nb\n\n\nc").unwrap();
        assert!(!got[1].blank_before);
        assert!(got[2].blank_before);
    }

    #[test]
    fn test_tokenize_errors() {
        match tokenize_schema("a.colf", "x int32 $") {
            Err(ColfError::Syntax { line, column, msg, .. }) => {
                assert_eq!((line, column), (1, 9));
                assert_eq!(msg, "unexpected \"$\"");
            }
            other => panic!("unexpected result {:?}", other),
        }
        match tokenize_schema("a.colf", "x\n  /* open") {
            Err(ColfError::Syntax { line, column, msg, .. }) => {
                assert_eq!((line, column), (2, 3));
                assert_eq!(msg, "unterminated block comment");
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
