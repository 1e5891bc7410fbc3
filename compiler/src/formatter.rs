use std::path::Path;

use crate::{
    error::ColfError,
    parser::parse_source,
    types::{Comment, FieldDecl, SchemaFile, StructDecl},
};

/// Normalizes schema text. Returns the canonical text and whether it differs
/// from the input.
pub fn format(source: &str) -> Result<(String, bool), ColfError> {
    format_named("<source>", source)
}

/// Like `format`, with `file` naming the source in syntax errors.
pub fn format_named(file: &str, source: &str) -> Result<(String, bool), ColfError> {
    let schema = parse_source(file, source)?;
    let text = print_schema(&schema);
    let changed = text != source;
    Ok((text, changed))
}

/// Normalizes a schema file in place. The file is only written when its
/// content changes; the return value tells whether it did.
pub fn format_file(path: &Path) -> Result<bool, ColfError> {
    let source = std::fs::read_to_string(path)?;
    let (text, changed) = format_named(&path.display().to_string(), &source)?;
    if changed {
        std::fs::write(path, text).map_err(|source| ColfError::Generation {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(file = %path.display(), "formatted schema");
    }
    Ok(changed)
}

/// Prints a syntax tree in canonical form.
pub fn print_schema(schema: &SchemaFile) -> String {
    let mut lines: Vec<String> = Vec::new();

    push_comments(&mut lines, "", &schema.doc);
    if schema.blank_before && !schema.doc.is_empty() {
        lines.push(String::new());
    }
    lines.push(with_comment(format!("package {}", schema.package), &schema.package_comment));

    for decl in &schema.structs {
        lines.push(String::new());
        print_struct(&mut lines, decl);
    }

    if !schema.tail.is_empty() {
        lines.push(String::new());
        push_comments(&mut lines, "", &schema.tail);
    }

    let mut text = lines.join("\n");
    text.push('\n');
    text
}

fn print_struct(lines: &mut Vec<String>, decl: &StructDecl) {
    push_comments(lines, "", &decl.doc);
    if decl.blank_before && !decl.doc.is_empty() {
        lines.push(String::new());
    }

    let open = format!("type {} struct {{", decl.name);
    if decl.fields.is_empty() && decl.tail.is_empty() && decl.comment.is_none() {
        lines.push(with_comment(open + "}", &decl.end_comment));
        return;
    }
    lines.push(with_comment(open, &decl.comment));

    for (i, run) in runs(&decl.fields).iter().enumerate() {
        if i > 0 {
            lines.push(String::new());
        }
        print_run(lines, run);
    }

    if !decl.tail.is_empty() {
        if !decl.fields.is_empty() && decl.tail[0].blank_before {
            lines.push(String::new());
        }
        push_comments(lines, "\t", &decl.tail);
    }
    lines.push(with_comment("}".to_string(), &decl.end_comment));
}

/// Whether a blank line precedes the field, its documentation included.
fn separated(field: &FieldDecl) -> bool {
    match field.doc.first() {
        Some(c) => c.blank_before,
        None => field.blank_before,
    }
}

/// Splits fields into runs that blank lines separate. Columns align within
/// a run only.
fn runs(fields: &[FieldDecl]) -> Vec<&[FieldDecl]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..fields.len() {
        if separated(&fields[i]) {
            runs.push(&fields[start..i]);
            start = i;
        }
    }
    if !fields.is_empty() {
        runs.push(&fields[start..]);
    }
    runs
}

fn print_run(lines: &mut Vec<String>, run: &[FieldDecl]) {
    let rows: Vec<Vec<String>> = run
        .iter()
        .map(|f| {
            let mut cells = vec![
                f.name.clone(),
                f.type_.to_string(),
                f.limits.to_string(),
                f.comment.clone().unwrap_or_default(),
            ];
            while cells.last().map_or(false, String::is_empty) {
                cells.pop();
            }
            cells
        })
        .collect();

    // a cell only counts towards its column width when more cells follow it
    let mut widths = [0usize; 4];
    for cells in &rows {
        for (k, cell) in cells.iter().enumerate().take(cells.len().saturating_sub(1)) {
            widths[k] = widths[k].max(cell.chars().count());
        }
    }

    for (field, cells) in run.iter().zip(&rows) {
        push_comments(lines, "\t", &field.doc);
        if field.blank_before && !field.doc.is_empty() {
            lines.push(String::new());
        }

        let mut line = String::from("\t");
        for (k, cell) in cells.iter().enumerate() {
            if k + 1 == cells.len() {
                line.push_str(cell);
            } else if widths[k] > 0 {
                line.push_str(cell);
                line.extend(std::iter::repeat(' ').take(widths[k] - cell.chars().count() + 1));
            }
        }
        lines.push(line);
    }
}

/// Writes comments one per line, keeping single blank lines between groups.
/// Block comment lines keep their own indentation.
fn push_comments(lines: &mut Vec<String>, indent: &str, comments: &[Comment]) {
    for (i, comment) in comments.iter().enumerate() {
        if i > 0 && comment.blank_before {
            lines.push(String::new());
        }
        for (j, line) in comment.text.lines().enumerate() {
            let line = line.trim_end();
            if j == 0 {
                lines.push(format!("{}{}", indent, line));
            } else {
                lines.push(line.to_string());
            }
        }
    }
}

fn with_comment(mut line: String, comment: &Option<String>) -> String {
    if let Some(c) = comment {
        line.push(' ');
        line.push_str(&trim_lines(c));
    }
    line
}

fn trim_lines(text: &str) -> String {
    text.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn format_aligns_columns() {
        let source = "package demo\ntype Point struct{\n  x int32 // horizontal\n  label text [size=16]   // name\n\n\n  tags []text [list=4] [size=8]\n  y int32\n}";
        let (text, changed) = format(source).unwrap();
        assert!(changed);
        assert_eq!(
            text,
            "package demo\n\ntype Point struct {\n\tx     int32           // horizontal\n\tlabel text  [size=16] // name\n\n\ttags []text [size=8] [list=4]\n\ty    int32\n}\n"
        );
    }

    #[test]
    fn format_is_stable() {
        let source = "// Package demo.\npackage demo\n\n// Point is a location.\ntype Point struct {\n\tx int32\n\ty int32\n}\n\ntype Empty struct {}\n";
        let (text, changed) = format(source).unwrap();
        assert_eq!(text, source);
        assert!(!changed);
    }

    #[test]
    fn format_keeps_comments() {
        let source = "// Copyright holder\n\n// Package demo.\npackage demo // the demo\n// Node is a list element.\n\n\ntype Node struct { // open\n\t// Next node, if any.\n\tnext *Node\n\t/* payload\n\t   bytes */\n\tdata binary\n\n\t// later\n} // close\n\n\n// trailer\n";
        let (text, _) = format(source).unwrap();
        assert_eq!(
            text,
            "// Copyright holder\n\n// Package demo.\npackage demo // the demo\n\n// Node is a list element.\n\ntype Node struct { // open\n\t// Next node, if any.\n\tnext *Node\n\t/* payload\n\t   bytes */\n\tdata binary\n\n\t// later\n} // close\n\n// trailer\n"
        );
        let (again, changed) = format(&text).unwrap();
        assert_eq!(again, text);
        assert!(!changed);
    }

    #[test]
    fn format_preserves_documentation() {
        let source = "package demo\ntype A struct {\n\n\t// doc of b\n\tb bool\n\t// doc of c\n\n\tc bool\n}\n";
        let (text, _) = format(source).unwrap();
        let before = parse_source("a", source).unwrap();
        let after = parse_source("a", &text).unwrap();
        let docs = |s: &SchemaFile| {
            s.structs[0]
                .fields
                .iter()
                .map(|f| crate::types::doc_lines(&f.doc, f.blank_before))
                .collect::<Vec<_>>()
        };
        assert_eq!(docs(&before), docs(&after));
        assert_eq!(docs(&after), vec![vec!["doc of b".to_string()], vec![]]);
    }

    #[test]
    fn format_file_rewrites_only_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.colf");
        std::fs::write(&path, "package demo\ntype A struct {\n  n int8\n}").unwrap();
        assert!(format_file(&path).unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "package demo\n\ntype A struct {\n\tn int8\n}\n"
        );
        assert!(!format_file(&path).unwrap());
    }

    #[test]
    fn format_reports_syntax_errors() {
        match format("package demo\ntype A struct {\n\tn\n}") {
            Err(ColfError::Syntax { line, .. }) => assert_eq!(line, 4),
            other => panic!("expected a syntax error, got {:?}", other),
        }
    }

    fn field_line() -> impl Strategy<Value = String> {
        let name = "[a-z][a-z0-9_]{0,8}";
        let type_ = prop_oneof![
            Just("int32".to_string()),
            Just("[]text [list=3]".to_string()),
            Just("binary [size=9]".to_string()),
            Just("*Node".to_string()),
            Just("geo.Point".to_string()),
        ];
        let comment = prop_oneof![Just(String::new()), Just(" // note".to_string())];
        let blank = prop_oneof![Just(String::new()), Just("\n".to_string()), Just("\n  \n".to_string())];
        let doc = prop_oneof![Just(String::new()), Just("  // doc\n".to_string())];
        (name, " {1,3}", type_, comment, blank, doc)
            .prop_map(|(n, sp, t, c, b, d)| format!("{}{}{}{}{}{}\n", b, d, n, sp, t, c))
    }

    proptest! {
        #[test]
        fn format_idempotent(fields in prop::collection::vec(field_line(), 0..8), gap in "\n{1,3}") {
            let source = format!("package demo{}type Node struct {{\n{}}}\n", gap, fields.concat());
            let (once, _) = format(&source).unwrap();
            let (twice, changed) = format(&once).unwrap();
            prop_assert_eq!(&twice, &once);
            prop_assert!(!changed);
            prop_assert!(once.ends_with("}\n"), "formatted output must end with closing brace");
            prop_assert!(once.lines().all(|l| l == l.trim_end()));

            let before = parse_source("a", &source).unwrap();
            let after = parse_source("a", &once).unwrap();
            let shape = |s: &SchemaFile| s.structs[0].fields.iter()
                .map(|f| (f.name.clone(), f.type_.clone(), f.limits, f.comment.clone()))
                .collect::<Vec<_>>();
            prop_assert_eq!(shape(&before), shape(&after));
        }
    }
}
