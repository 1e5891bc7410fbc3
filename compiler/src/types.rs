use serde::Serialize;
use std::fmt;

use crate::config::Ceiling;

// ---------------------------------------------------------------------------
// Syntax tree, one per schema file
// ---------------------------------------------------------------------------

/// A comment as written, delimiters included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    pub text:         String,
    pub blank_before: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaFile {
    pub path:            String,
    pub package:         String,
    pub line:            usize,
    pub column:          usize,
    pub doc:             Vec<Comment>,
    /// A blank line separates `doc` from the package clause, so `doc` is a
    /// file header rather than package documentation.
    pub blank_before:    bool,
    pub package_comment: Option<String>,
    pub structs:         Vec<StructDecl>,
    /// Comments after the last declaration.
    pub tail:            Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructDecl {
    pub name:         String,
    pub line:         usize,
    pub column:       usize,
    pub doc:          Vec<Comment>,
    pub blank_before: bool,
    /// Comment following the opening brace.
    pub comment:      Option<String>,
    pub fields:       Vec<FieldDecl>,
    /// Comments between the last field and the closing brace.
    pub tail:         Vec<Comment>,
    /// Comment following the closing brace.
    pub end_comment:  Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDecl {
    pub name:         String,
    pub line:         usize,
    pub column:       usize,
    pub type_:        TypeExpr,
    pub limits:       Limits,
    pub doc:          Vec<Comment>,
    pub blank_before: bool,
    pub comment:      Option<String>,
}

/// A field type as written: `int32`, `[]text`, `*Node` or `geo.Point`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeExpr {
    pub name:        String,
    pub is_list:     bool,
    pub is_optional: bool,
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_list {
            f.write_str("[]")?;
        }
        if self.is_optional {
            f.write_str("*")?;
        }
        f.write_str(&self.name)
    }
}

/// Per-field ceiling overrides, written as `[size=N]` and `[list=N]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Limits {
    pub size: Option<u64>,
    pub list: Option<u64>,
}

impl fmt::Display for Limits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        if let Some(n) = self.size {
            write!(f, "[size={}]", n)?;
            sep = " ";
        }
        if let Some(n) = self.list {
            write!(f, "{}[list={}]", sep, n)?;
        }
        Ok(())
    }
}

/// Returns the documentation text that belongs to a declaration: the last
/// group of comments directly above it, with the comment delimiters removed.
pub fn doc_lines(doc: &[Comment], blank_before: bool) -> Vec<String> {
    if blank_before {
        return Vec::new();
    }
    let start = doc.iter().rposition(|c| c.blank_before).unwrap_or(0);
    let mut lines = Vec::new();
    for comment in &doc[start..] {
        let text = comment.text.as_str();
        if let Some(body) = text.strip_prefix("//") {
            lines.push(body.strip_prefix(' ').unwrap_or(body).trim_end().to_string());
        } else {
            let body = text.trim_start_matches("/*").trim_end_matches("*/");
            let block: Vec<&str> = body
                .lines()
                .map(|line| {
                    let line = line.trim();
                    line.strip_prefix('*').map(str::trim_start).unwrap_or(line)
                })
                .collect();
            let first = block.iter().position(|l| !l.is_empty()).unwrap_or(block.len());
            let last = block.iter().rposition(|l| !l.is_empty()).map_or(first, |i| i + 1);
            lines.extend(block[first..last].iter().map(|l| l.to_string()));
        }
    }
    lines
}

// ---------------------------------------------------------------------------
// Package model, produced by the linker
// ---------------------------------------------------------------------------

pub const NATIVE_TYPES: [&str; 14] = [
    "bool", "int8", "int16", "int32", "int64", "uint8", "uint16", "uint32", "uint64",
    "float32", "float64", "timestamp", "text", "binary",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Timestamp,
    Text,
    Binary,
}

impl ScalarType {
    pub fn from_keyword(s: &str) -> Option<ScalarType> {
        use ScalarType::*;
        Some(match s {
            "bool" => Bool,
            "int8" => Int8,
            "int16" => Int16,
            "int32" => Int32,
            "int64" => Int64,
            "uint8" => Uint8,
            "uint16" => Uint16,
            "uint32" => Uint32,
            "uint64" => Uint64,
            "float32" => Float32,
            "float64" => Float64,
            "timestamp" => Timestamp,
            "text" => Text,
            "binary" => Binary,
            _ => return None,
        })
    }

    /// Bit width of integer types.
    pub fn int_bits(self) -> Option<u32> {
        use ScalarType::*;
        match self {
            Int8 | Uint8 => Some(8),
            Int16 | Uint16 => Some(16),
            Int32 | Uint32 => Some(32),
            Int64 | Uint64 => Some(64),
            _ => None,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(self, ScalarType::Int8 | ScalarType::Int16 | ScalarType::Int32 | ScalarType::Int64)
    }

    /// Text and binary carry a byte length and honour `[size=N]`.
    pub fn is_sized(self) -> bool {
        matches!(self, ScalarType::Text | ScalarType::Binary)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StructRef {
    pub package: String,
    pub name:    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldType {
    Scalar(ScalarType),
    Struct(StructRef),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name:        String,
    pub doc:         Vec<String>,
    pub type_:       FieldType,
    pub is_list:     bool,
    pub is_optional: bool,
    pub size_max:    Option<u64>,
    pub list_max:    Option<u64>,
}

impl Field {
    pub fn scalar(&self) -> Option<ScalarType> {
        match self.type_ {
            FieldType::Scalar(t) => Some(t),
            FieldType::Struct(_) => None,
        }
    }

    pub fn struct_ref(&self) -> Option<&StructRef> {
        match &self.type_ {
            FieldType::Struct(r) => Some(r),
            FieldType::Scalar(_) => None,
        }
    }

    /// Element count ceiling of a list field.
    pub fn effective_list_max(&self, package: &Package) -> u64 {
        self.list_max.unwrap_or(package.list_max.value)
    }

    /// Byte length ceiling of each text or binary value in the field.
    pub fn effective_size_max(&self, package: &Package) -> u64 {
        self.size_max.unwrap_or(package.size_max.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Struct {
    pub name:   String,
    pub doc:    Vec<String>,
    pub fields: Vec<Field>,
    pub file:   String,
    pub line:   usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Package {
    pub name:        String,
    pub doc:         Vec<String>,
    pub structs:     Vec<Struct>,
    pub size_max:    Ceiling,
    pub list_max:    Ceiling,
    pub super_class: Option<String>,
    pub interfaces:  Vec<String>,
    pub snippet:     Option<String>,
}

impl Package {
    pub fn find_struct(&self, name: &str) -> Option<&Struct> {
        self.structs.iter().find(|s| s.name == name)
    }

    /// Last segment of the slash-separated package name.
    pub fn base_name(&self) -> &str {
        base_name(&self.name)
    }

    /// Names of the other packages this package references, in first-use
    /// order.
    pub fn dependencies(&self) -> Vec<&str> {
        let mut deps: Vec<&str> = Vec::new();
        for s in &self.structs {
            for f in &s.fields {
                if let Some(r) = f.struct_ref() {
                    if r.package != self.name && !deps.contains(&r.package.as_str()) {
                        deps.push(&r.package);
                    }
                }
            }
        }
        deps
    }

    /// Reports whether any field of the package has the given scalar type.
    pub fn uses(&self, t: ScalarType) -> bool {
        self.structs
            .iter()
            .flat_map(|s| s.fields.iter())
            .any(|f| f.scalar() == Some(t))
    }
}

pub fn base_name(package: &str) -> &str {
    package.rsplit('/').next().unwrap_or(package)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(text: &str, blank_before: bool) -> Comment {
        Comment { text: text.to_string(), blank_before }
    }

    #[test]
    fn doc_lines_take_last_group() {
        let doc = vec![
            comment("// Copyright notice", false),
            comment("// Point is a location.", true),
            comment("//   Indented.", false),
        ];
        assert_eq!(doc_lines(&doc, false), vec!["Point is a location.", "  Indented."]);
        assert!(doc_lines(&doc, true).is_empty());
    }

    #[test]
    fn doc_lines_from_block_comment() {
        let doc = vec![comment("/**\n * First.\n * Second.\n */", false)];
        assert_eq!(doc_lines(&doc, false), vec!["First.", "Second."]);
    }

    #[test]
    fn type_expr_display() {
        let t = TypeExpr { name: "Node".into(), is_list: false, is_optional: true };
        assert_eq!(t.to_string(), "*Node");
        let t = TypeExpr { name: "text".into(), is_list: true, is_optional: false };
        assert_eq!(t.to_string(), "[]text");
        let l = Limits { size: Some(64), list: Some(8) };
        assert_eq!(l.to_string(), "[size=64] [list=8]");
    }
}
