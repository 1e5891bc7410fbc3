use std::path::Path;

use crate::{
    config::CEILING_LIMIT,
    error::ColfError,
    tokenizer::{tokenize_schema, Token},
    types::{FieldDecl, Limits, ScalarType, SchemaFile, StructDecl, TypeExpr, NATIVE_TYPES},
    utils::{quote, syntax_error},
};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref IDENTIFIER:      Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref PACKAGE_NAME:    Regex = Regex::new(r"^[a-z][a-z0-9_]*(/[a-z][a-z0-9_]*)*$").unwrap();
    static ref TYPE_NAME:       Regex = Regex::new(r"^([a-z][a-z0-9_]*(/[a-z][a-z0-9_]*)*\.)?[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref INTEGER:         Regex = Regex::new(r"^\d+$").unwrap();
    static ref EQUALS:          Regex = Regex::new(r"^=$").unwrap();
    static ref STAR:            Regex = Regex::new(r"^\*$").unwrap();
    static ref LEFT_BRACE:      Regex = Regex::new(r"^\{$").unwrap();
    static ref RIGHT_BRACE:     Regex = Regex::new(r"^\}$").unwrap();
    static ref LEFT_BRACKET:    Regex = Regex::new(r"^\[$").unwrap();
    static ref RIGHT_BRACKET:   Regex = Regex::new(r"^\]$").unwrap();
    static ref ARRAY_TOKEN:     Regex = Regex::new(r"^\[\]$").unwrap();
    static ref PACKAGE_KEYWORD: Regex = Regex::new(r"^package$").unwrap();
    static ref TYPE_KEYWORD:    Regex = Regex::new(r"^type$").unwrap();
    static ref STRUCT_KEYWORD:  Regex = Regex::new(r"^struct$").unwrap();
    static ref EOF:             Regex = Regex::new(r"^$").unwrap();
}

/// Reads and parses one schema file.
pub fn parse_file(path: &Path) -> Result<SchemaFile, ColfError> {
    let text = std::fs::read_to_string(path)?;
    parse_source(&path.display().to_string(), &text)
}

/// Parses schema text; `file` names the source in errors and in the result.
pub fn parse_source(file: &str, text: &str) -> Result<SchemaFile, ColfError> {
    let tokens = tokenize_schema(file, text)?;
    parse_schema(file, &tokens)
}

/// Parses independent schema files in parallel. The result keeps the input
/// order, and the error of the earliest failing file wins.
pub fn parse_files<P: AsRef<Path> + Sync>(paths: &[P]) -> Result<Vec<SchemaFile>, ColfError> {
    let results: Vec<Result<SchemaFile, ColfError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = paths
            .iter()
            .map(|path| scope.spawn(move || parse_file(path.as_ref())))
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });
    let files = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    for f in &files {
        tracing::debug!(file = %f.path, package = %f.package, structs = f.structs.len(), "parsed schema");
    }
    Ok(files)
}

struct Parser<'a> {
    file:   &'a str,
    tokens: &'a [Token],
    index:  usize,
}

impl<'a> Parser<'a> {
    fn current(&self) -> &'a Token {
        // the EOF token is never consumed, so the index stays in range
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek(&self, test: &Regex) -> bool {
        test.is_match(&self.current().text)
    }

    fn eat(&mut self, test: &Regex) -> bool {
        if self.peek(test) && !self.current().is_eof() {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, test: &Regex, expected: &str) -> Result<&'a Token, ColfError> {
        let tok = self.current();
        if !self.eat(test) {
            return Err(self.error_at(
                tok,
                &format!("expected {} but found {}", expected, describe(tok)),
            ));
        }
        Ok(tok)
    }

    fn error_at(&self, tok: &Token, msg: &str) -> ColfError {
        syntax_error(self.file, msg, tok.line, tok.column)
    }

    /// Only the first token of a declaration may carry comments above it and
    /// only the last one a comment after it; comments anywhere else would be
    /// lost by the formatter.
    fn check_comments(&self, start: usize) -> Result<(), ColfError> {
        let end = self.index;
        for i in start..end {
            let tok = &self.tokens[i];
            if i != start && !tok.leading.is_empty() {
                return Err(self.error_at(tok, "comment not allowed inside a declaration"));
            }
            if i + 1 != end && tok.trailing.is_some() {
                return Err(self.error_at(tok, "comment not allowed inside a declaration"));
            }
        }
        Ok(())
    }

    fn parse(&mut self) -> Result<SchemaFile, ColfError> {
        let start = self.index;
        let keyword = self.expect(&PACKAGE_KEYWORD, "\"package\"")?;
        let name = self.expect(&PACKAGE_NAME, "package name")?;
        self.check_comments(start)?;

        let mut structs = Vec::new();
        while !self.peek(&EOF) {
            structs.push(self.parse_struct()?);
        }

        Ok(SchemaFile {
            path:            self.file.to_string(),
            package:         name.text.clone(),
            line:            keyword.line,
            column:          keyword.column,
            doc:             keyword.leading.clone(),
            blank_before:    keyword.blank_before,
            package_comment: name.trailing.clone(),
            structs,
            tail:            self.current().leading.clone(),
        })
    }

    fn parse_struct(&mut self) -> Result<StructDecl, ColfError> {
        let start = self.index;
        let keyword = self.expect(&TYPE_KEYWORD, "\"type\"")?;
        let name = self.expect(&IDENTIFIER, "struct name")?;
        if NATIVE_TYPES.contains(&name.text.as_str()) {
            return Err(self.error_at(name, &format!("type name {} is reserved", quote(&name.text))));
        }
        self.expect(&STRUCT_KEYWORD, "\"struct\"")?;
        let open = self.expect(&LEFT_BRACE, "\"{\"")?;
        self.check_comments(start)?;

        let mut fields = Vec::new();
        while !self.peek(&RIGHT_BRACE) {
            if self.peek(&EOF) {
                return Err(self.error_at(self.current(), "expected \"}\" but found end of file"));
            }
            fields.push(self.parse_field()?);
        }
        let close = self.expect(&RIGHT_BRACE, "\"}\"")?;

        Ok(StructDecl {
            name:         name.text.clone(),
            line:         name.line,
            column:       name.column,
            doc:          keyword.leading.clone(),
            blank_before: keyword.blank_before,
            comment:      open.trailing.clone(),
            fields,
            tail:         close.leading.clone(),
            end_comment:  close.trailing.clone(),
        })
    }

    fn parse_field(&mut self) -> Result<FieldDecl, ColfError> {
        let start = self.index;
        let name = self.expect(&IDENTIFIER, "field name")?;

        let is_optional = self.eat(&STAR);
        let is_list = !is_optional && self.eat(&ARRAY_TOKEN);
        if self.peek(&STAR) || self.peek(&ARRAY_TOKEN) {
            let tok = self.current();
            let msg = if is_list {
                "lists can not nest and their elements can not be optional"
            } else {
                "optional fields can not be lists"
            };
            return Err(self.error_at(tok, msg));
        }
        let type_tok = self.expect(&TYPE_NAME, "type")?;
        let scalar = ScalarType::from_keyword(&type_tok.text);
        if is_optional && scalar.is_some() {
            return Err(self.error_at(
                type_tok,
                &format!("type {} can not be optional; only struct types can", quote(&type_tok.text)),
            ));
        }

        let mut limits = Limits::default();
        while self.eat(&LEFT_BRACKET) {
            let key = self.expect(&IDENTIFIER, "directive")?;
            self.expect(&EQUALS, "\"=\"")?;
            let value_tok = self.expect(&INTEGER, "integer")?;
            self.expect(&RIGHT_BRACKET, "\"]\"")?;

            let value = value_tok
                .text
                .parse::<u64>()
                .ok()
                .filter(|v| (1..=CEILING_LIMIT).contains(v))
                .ok_or_else(|| {
                    self.error_at(value_tok, &format!("directive value {} out of range", quote(&value_tok.text)))
                })?;
            let slot = match key.text.as_str() {
                "size" => {
                    if !scalar.map_or(false, ScalarType::is_sized) {
                        return Err(self.error_at(key, "size directive applies to text and binary only"));
                    }
                    &mut limits.size
                }
                "list" => {
                    if !is_list {
                        return Err(self.error_at(key, "list directive applies to lists only"));
                    }
                    &mut limits.list
                }
                other => {
                    return Err(self.error_at(key, &format!("unknown directive {}", quote(other))));
                }
            };
            if slot.is_some() {
                return Err(self.error_at(key, &format!("duplicate directive {}", quote(&key.text))));
            }
            *slot = Some(value);
        }
        self.check_comments(start)?;

        Ok(FieldDecl {
            name: name.text.clone(),
            line: name.line,
            column: name.column,
            type_: TypeExpr {
                name: type_tok.text.clone(),
                is_list,
                is_optional,
            },
            limits,
            doc: name.leading.clone(),
            blank_before: name.blank_before,
            comment: self.tokens[self.index - 1].trailing.clone(),
        })
    }
}

fn describe(tok: &Token) -> String {
    if tok.is_eof() {
        "end of file".to_string()
    } else {
        quote(&tok.text)
    }
}

/// Parses a token stream as produced by `tokenize_schema`.
pub fn parse_schema(file: &str, tokens: &[Token]) -> Result<SchemaFile, ColfError> {
    if tokens.last().map_or(true, |t| !t.is_eof()) {
        return Err(syntax_error(file, "token stream lacks an end of file", 0, 0));
    }
    Parser { file, tokens, index: 0 }.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<SchemaFile, ColfError> {
        parse_source("test.colf", text)
    }

    fn syntax_message(text: &str) -> (usize, usize, String) {
        match parse(text) {
            Err(ColfError::Syntax { line, column, msg, .. }) => (line, column, msg),
            other => panic!("expected a syntax error, got {:?}", other),
        }
    }

    #[test]
    fn parse_package_and_structs() {
        let schema = parse(
            "// Package demo.\npackage demo\n\n// Point is a location.\ntype Point struct {\n\tx int32\n\ty int32 // vertical\n}\n",
        )
        .unwrap();
        assert_eq!(schema.package, "demo");
        assert_eq!(schema.doc[0].text, "// Package demo.");
        assert_eq!(schema.structs.len(), 1);
        let point = &schema.structs[0];
        assert_eq!(point.name, "Point");
        assert_eq!((point.line, point.column), (5, 6));
        assert_eq!(point.doc[0].text, "// Point is a location.");
        assert_eq!(point.fields.len(), 2);
        assert_eq!(point.fields[0].name, "x");
        assert_eq!(point.fields[0].type_.name, "int32");
        assert_eq!(point.fields[1].comment.as_deref(), Some("// vertical"));
    }

    #[test]
    fn parse_type_forms_and_directives() {
        let schema = parse(
            "package demo\ntype A struct {\n\ttags []text [list=8] [size=64]\n\tnext *A\n\tpos geo.Point\n\tblob binary [size=1024]\n}\n",
        )
        .unwrap();
        let fields = &schema.structs[0].fields;
        assert_eq!(fields[0].type_, TypeExpr { name: "text".into(), is_list: true, is_optional: false });
        assert_eq!(fields[0].limits, Limits { size: Some(64), list: Some(8) });
        assert_eq!(fields[1].type_, TypeExpr { name: "A".into(), is_list: false, is_optional: true });
        assert_eq!(fields[2].type_.name, "geo.Point");
        assert_eq!(fields[3].limits, Limits { size: Some(1024), list: None });
    }

    #[test]
    fn parse_keeps_field_order() {
        let schema = parse("package p\ntype T struct {\n\tz bool\n\ta bool\n\tm bool\n}\n").unwrap();
        let names: Vec<_> = schema.structs[0].fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn parse_rejects_missing_package() {
        let (line, column, msg) = syntax_message("type A struct {}");
        assert_eq!((line, column), (1, 1));
        assert_eq!(msg, "expected \"package\" but found \"type\"");
    }

    #[test]
    fn parse_rejects_bad_types() {
        assert_eq!(
            syntax_message("package p\ntype A struct {\n\tn *int32\n}").2,
            "type \"int32\" can not be optional; only struct types can"
        );
        assert_eq!(
            syntax_message("package p\ntype A struct {\n\tn [][]int32\n}").2,
            "lists can not nest and their elements can not be optional"
        );
        assert_eq!(
            syntax_message("package p\ntype A struct {\n\tn *[]A\n}").2,
            "optional fields can not be lists"
        );
        assert_eq!(
            syntax_message("package p\ntype text struct {}").2,
            "type name \"text\" is reserved"
        );
    }

    #[test]
    fn parse_rejects_bad_directives() {
        assert_eq!(
            syntax_message("package p\ntype A struct {\n\tn int32 [size=4]\n}").2,
            "size directive applies to text and binary only"
        );
        assert_eq!(
            syntax_message("package p\ntype A struct {\n\tn text [list=4]\n}").2,
            "list directive applies to lists only"
        );
        assert_eq!(
            syntax_message("package p\ntype A struct {\n\tn []text [list=4] [list=5]\n}").2,
            "duplicate directive \"list\""
        );
        assert_eq!(
            syntax_message("package p\ntype A struct {\n\tn []text [list=0]\n}").2,
            "directive value \"0\" out of range"
        );
        assert_eq!(
            syntax_message("package p\ntype A struct {\n\tn []text [max=1]\n}").2,
            "unknown directive \"max\""
        );
    }

    #[test]
    fn parse_rejects_misplaced_comments() {
        let (line, column, msg) = syntax_message("package p\ntype A struct {\n\tn /* c */ int32\n}");
        assert_eq!((line, column), (3, 2));
        assert_eq!(msg, "comment not allowed inside a declaration");
    }

    #[test]
    fn parse_reports_unterminated_struct() {
        let (line, _, msg) = syntax_message("package p\ntype A struct {\n\tn int32\n");
        assert_eq!(line, 4);
        assert_eq!(msg, "expected \"}\" but found end of file");
    }

    #[test]
    fn parse_keeps_dangling_comments() {
        let schema = parse("package p\ntype A struct {\n\tn int32\n\t// later\n} // end\n// bye\n").unwrap();
        assert_eq!(schema.structs[0].tail[0].text, "// later");
        assert_eq!(schema.structs[0].end_comment.as_deref(), Some("// end"));
        assert_eq!(schema.tail[0].text, "// bye");
    }
}
