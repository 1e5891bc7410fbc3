use crate::error::ColfError;

/// Quotes text the way JSON does, which is also a valid string literal in
/// every target language.
pub fn quote(text: &str) -> String {
    serde_json::Value::String(text.to_owned()).to_string()
}

pub fn syntax_error(file: &str, msg: &str, line: usize, column: usize) -> ColfError {
    ColfError::Syntax {
        file: file.to_string(),
        line,
        column,
        msg: msg.to_string(),
    }
}

/// Converts a name to PascalCase. Underscores separate words; the casing of
/// the remaining letters is kept so that acronyms survive (`sessionID` becomes
/// `SessionID`).
pub fn to_pascal_case(s: &str) -> String {
    s.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().to_string() + chars.as_str(),
            }
        })
        .collect()
}

/// Converts a name to camelCase.
pub fn to_camel_case(s: &str) -> String {
    let pascal = to_pascal_case(s);
    let mut chars = pascal.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_lowercase().to_string() + chars.as_str(),
    }
}

/// Converts a name to snake_case.
/// Consecutive uppercase letters stay together, so that acronyms remain intact
/// (e.g. "sessionID" becomes "session_id").
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut snake = String::new();
    for i in 0..chars.len() {
        let c = chars[i];
        if c.is_uppercase() {
            if i > 0 && chars[i - 1] != '_' {
                let prev = chars[i - 1];
                if !prev.is_uppercase() || (i + 1 < chars.len() && chars[i + 1].is_lowercase()) {
                    snake.push('_');
                }
            }
            snake.extend(c.to_lowercase());
        } else {
            snake.push(c);
        }
    }
    snake
}

/// Converts a name to SCREAMING_SNAKE_CASE.
pub fn to_upper_snake_case(s: &str) -> String {
    to_snake_case(s).to_uppercase()
}

/// Suffixes `s` with an underscore when it is one of `keywords`.
pub fn escape_keyword(s: String, keywords: &[&str]) -> String {
    if keywords.contains(&s.as_str()) {
        format!("{}_", s)
    } else {
        s
    }
}

/// Prefixes every non-empty line with `indent`.
pub fn indent(text: &str, indent: &str) -> String {
    text.lines()
        .map(|line| if line.is_empty() { String::new() } else { format!("{}{}", indent, line) })
        .collect::<Vec<_>>()
        .join("\n")
}
