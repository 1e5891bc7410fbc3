use std::collections::HashMap;
use std::path::PathBuf;

use crate::{
    error::ColfError,
    generator::{push_doc, GeneratedFile, Generator, Language, GENERATED_NOTICE},
    types::{Field, FieldType, Package, ScalarType, Struct, StructRef},
    utils::{escape_keyword, quote, to_pascal_case, to_snake_case},
};

const RUST_KEYWORDS: [&str; 38] = [
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub",
    "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true", "type", "unsafe",
    "use", "where", "while",
];

/// Generates one module per package on top of the `colf-wire` runtime,
/// plus a `mod.rs` that declares them. Modules refer to each other through
/// `super`, so they must be siblings.
pub struct RustGenerator;

impl Generator for RustGenerator {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn generate(&self, packages: &[Package]) -> Result<Vec<GeneratedFile>, ColfError> {
        let mut files = Vec::with_capacity(packages.len() + 1);
        let mut mods = vec![format!("// {}", GENERATED_NOTICE), String::new()];
        let mut seen: HashMap<String, &str> = HashMap::new();
        for package in packages {
            let module = module_name(&package.name);
            if let Some(other) = seen.insert(module.clone(), &package.name) {
                return Err(ColfError::Config(format!(
                    "packages {} and {} both map to Rust module {}",
                    quote(other),
                    quote(&package.name),
                    quote(&module)
                )));
            }
            files.push(GeneratedFile {
                path:     PathBuf::from(format!("{}.rs", module)),
                contents: compile_package_to_rust(package),
            });
            mods.push(format!("pub mod {};", module));
        }
        mods.push(String::new());
        files.push(GeneratedFile { path: PathBuf::from("mod.rs"), contents: mods.join("\n") });
        Ok(files)
    }
}

/// Module name of a package: slashes, and any other character not valid in
/// an identifier, become underscores.
pub fn module_name(package: &str) -> String {
    let name: String = package
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    escape_keyword(name, &RUST_KEYWORDS)
}

fn type_name(name: &str) -> String {
    to_pascal_case(name)
}

fn field_name(name: &str) -> String {
    escape_keyword(to_snake_case(name), &RUST_KEYWORDS)
}

fn scalar_type(t: ScalarType) -> &'static str {
    match t {
        ScalarType::Bool => "bool",
        ScalarType::Int8 => "i8",
        ScalarType::Int16 => "i16",
        ScalarType::Int32 => "i32",
        ScalarType::Int64 => "i64",
        ScalarType::Uint8 => "u8",
        ScalarType::Uint16 => "u16",
        ScalarType::Uint32 => "u32",
        ScalarType::Uint64 => "u64",
        ScalarType::Float32 => "f32",
        ScalarType::Float64 => "f64",
        ScalarType::Timestamp => "Timestamp",
        ScalarType::Text => "String",
        ScalarType::Binary => "Vec<u8>",
    }
}

fn struct_path(package: &Package, r: &StructRef) -> String {
    if r.package == package.name {
        type_name(&r.name)
    } else {
        format!("super::{}::{}", module_name(&r.package), type_name(&r.name))
    }
}

fn element_type(package: &Package, field: &Field) -> String {
    match &field.type_ {
        FieldType::Scalar(t) => scalar_type(*t).to_string(),
        FieldType::Struct(r) => struct_path(package, r),
    }
}

fn field_type(package: &Package, field: &Field) -> String {
    let elem = element_type(package, field);
    if field.is_list {
        format!("Vec<{}>", elem)
    } else if field.is_optional {
        format!("Option<Box<{}>>", elem)
    } else {
        elem
    }
}

/// Size ceiling of each text or binary value, as a constant or a literal.
fn size_max(field: &Field) -> String {
    match field.size_max {
        Some(n) => n.to_string(),
        None => "SIZE_MAX".to_string(),
    }
}

fn list_max(field: &Field) -> String {
    match field.list_max {
        Some(n) => n.to_string(),
        None => "LIST_MAX".to_string(),
    }
}

/// Expression that holds when the field has its default value.
fn zero_test(field: &Field, place: &str) -> String {
    if field.is_list {
        return format!("{}.is_empty()", place);
    }
    if field.is_optional {
        return format!("{}.is_none()", place);
    }
    match field.scalar() {
        Some(ScalarType::Bool) => format!("!{}", place),
        Some(ScalarType::Float32) | Some(ScalarType::Float64) => format!("{}.to_bits() == 0", place),
        Some(ScalarType::Timestamp) | None => format!("{}.is_zero()", place),
        Some(ScalarType::Text) | Some(ScalarType::Binary) => format!("{}.is_empty()", place),
        Some(_) => format!("{} == 0", place),
    }
}

fn present_test(field: &Field, place: &str) -> String {
    if field.is_list {
        return format!("!{}.is_empty()", place);
    }
    if field.is_optional {
        return format!("{}.is_some()", place);
    }
    match field.scalar() {
        Some(ScalarType::Bool) => place.to_string(),
        Some(ScalarType::Float32) | Some(ScalarType::Float64) => format!("{}.to_bits() != 0", place),
        Some(ScalarType::Timestamp) | None => format!("!{}.is_zero()", place),
        Some(ScalarType::Text) | Some(ScalarType::Binary) => format!("!{}.is_empty()", place),
        Some(_) => format!("{} != 0", place),
    }
}

/// Statement that writes one value. Text and binary take a reference.
fn write_value(field: &Field, value: &str) -> String {
    match field.scalar() {
        Some(ScalarType::Bool) => format!("w.write_bool({});", value),
        Some(ScalarType::Int8 | ScalarType::Int16 | ScalarType::Int32 | ScalarType::Int64) => {
            format!("w.write_int(i64::from({}));", value)
        }
        Some(ScalarType::Uint8 | ScalarType::Uint16 | ScalarType::Uint32 | ScalarType::Uint64) => {
            format!("w.write_uint(u64::from({}));", value)
        }
        Some(ScalarType::Float32) => format!("w.write_f32({});", value),
        Some(ScalarType::Float64) => format!("w.write_f64({});", value),
        Some(ScalarType::Timestamp) => format!("w.write_timestamp(&{})?;", value),
        Some(ScalarType::Text) => format!("w.write_text({}, {})?;", value, size_max(field)),
        Some(ScalarType::Binary) => format!("w.write_binary({}, {})?;", value, size_max(field)),
        None => format!("{}.write_to(w)?;", value),
    }
}

fn read_value(package: &Package, field: &Field) -> String {
    match &field.type_ {
        FieldType::Scalar(t) => match t {
            ScalarType::Bool => "r.read_bool()?".to_string(),
            ScalarType::Int8 => "r.read_i8()?".to_string(),
            ScalarType::Int16 => "r.read_i16()?".to_string(),
            ScalarType::Int32 => "r.read_i32()?".to_string(),
            ScalarType::Int64 => "r.read_i64()?".to_string(),
            ScalarType::Uint8 => "r.read_u8()?".to_string(),
            ScalarType::Uint16 => "r.read_u16()?".to_string(),
            ScalarType::Uint32 => "r.read_u32()?".to_string(),
            ScalarType::Uint64 => "r.read_u64()?".to_string(),
            ScalarType::Float32 => "r.read_f32()?".to_string(),
            ScalarType::Float64 => "r.read_f64()?".to_string(),
            ScalarType::Timestamp => "r.read_timestamp()?".to_string(),
            ScalarType::Text => format!("r.read_text({})?", size_max(field)),
            ScalarType::Binary => format!("r.read_binary({})?", size_max(field)),
        },
        FieldType::Struct(r) => format!("{}::read_from(r)?", struct_path(package, r)),
    }
}

fn is_copy(field: &Field) -> bool {
    !matches!(field.scalar(), None | Some(ScalarType::Text) | Some(ScalarType::Binary))
}

/// Compiles one package into the source of a Rust module.
pub fn compile_package_to_rust(package: &Package) -> String {
    let mut rust_code: Vec<String> = Vec::new();

    rust_code.push(format!("// {}", GENERATED_NOTICE));
    rust_code.push(format!("// Package {} of the colf schema.", package.name));
    if !package.doc.is_empty() {
        rust_code.push("//".to_string());
        push_doc(&mut rust_code, "", "// ", &package.doc);
    }
    rust_code.push(String::new());

    let mut imports = vec!["DecodeError", "EncodeError", "Message", "Reader", "Writer"];
    if package.uses(ScalarType::Timestamp) {
        imports.push("Timestamp");
    }
    rust_code.push(format!("use colf_wire::{{{}}};", imports.join(", ")));
    rust_code.push(String::new());

    rust_code.push(format!("/// Size ceiling of one serial: `{}`.", package.size_max.expr));
    rust_code.push(format!("pub const SIZE_MAX: usize = {};", package.size_max.value));
    rust_code.push(String::new());
    rust_code.push(format!("/// Default element ceiling of lists: `{}`.", package.list_max.expr));
    rust_code.push(format!("pub const LIST_MAX: usize = {};", package.list_max.value));

    for s in &package.structs {
        rust_code.push(String::new());
        generate_struct(&mut rust_code, package, s);
        rust_code.push(String::new());
        generate_message_impl(&mut rust_code, package, s);
    }

    rust_code.push(String::new());
    rust_code.join("\n")
}

fn generate_struct(lines: &mut Vec<String>, package: &Package, s: &Struct) {
    push_doc(lines, "", "/// ", &s.doc);
    lines.push("#[derive(Debug, Clone, Default, PartialEq)]".to_string());
    if s.fields.is_empty() {
        lines.push(format!("pub struct {} {{}}", type_name(&s.name)));
        return;
    }
    lines.push(format!("pub struct {} {{", type_name(&s.name)));
    for field in &s.fields {
        push_doc(lines, "    ", "/// ", &field.doc);
        lines.push(format!("    pub {}: {},", field_name(&field.name), field_type(package, field)));
    }
    lines.push("}".to_string());
}

fn generate_message_impl(lines: &mut Vec<String>, package: &Package, s: &Struct) {
    let count = s.fields.len();
    lines.push(format!("impl Message for {} {{", type_name(&s.name)));
    lines.push("    const SIZE_MAX: usize = SIZE_MAX;".to_string());
    lines.push(String::new());

    // is_zero
    lines.push("    fn is_zero(&self) -> bool {".to_string());
    if s.fields.is_empty() {
        lines.push("        true".to_string());
    } else {
        let tests: Vec<String> = s
            .fields
            .iter()
            .map(|f| zero_test(f, &format!("self.{}", field_name(&f.name))))
            .collect();
        lines.push(format!("        {}", tests.join("\n            && ")));
    }
    lines.push("    }".to_string());
    lines.push(String::new());

    // write_to
    lines.push("    fn write_to(&self, w: &mut Writer) -> Result<(), EncodeError> {".to_string());
    if s.fields.is_empty() {
        lines.push("        let fields = w.fields(&[])?;".to_string());
    } else {
        lines.push("        let fields = w.fields(&[".to_string());
        for f in &s.fields {
            lines.push(format!("            {},", present_test(f, &format!("self.{}", field_name(&f.name)))));
        }
        lines.push("        ])?;".to_string());
        for (index, f) in s.fields.iter().enumerate() {
            write_field(lines, f, index);
        }
    }
    lines.push("        w.end(fields);".to_string());
    lines.push("        Ok(())".to_string());
    lines.push("    }".to_string());
    lines.push(String::new());

    // read_from
    lines.push("    fn read_from(r: &mut Reader<'_>) -> Result<Self, DecodeError> {".to_string());
    if s.fields.is_empty() {
        lines.push("        let mut scan = r.fields(0)?;".to_string());
        lines.push("        match r.next_field(&mut scan)? {".to_string());
        lines.push("            Some(index) => Err(DecodeError::FieldIndex { index, count: 0 }),".to_string());
        lines.push("            None => Ok(Self::default()),".to_string());
        lines.push("        }".to_string());
    } else {
        lines.push("        let mut value = Self::default();".to_string());
        lines.push(format!("        let mut scan = r.fields({})?;", count));
        lines.push("        while let Some(index) = r.next_field(&mut scan)? {".to_string());
        lines.push("            match index {".to_string());
        for (index, f) in s.fields.iter().enumerate() {
            read_field(lines, package, f, index);
        }
        lines.push(format!(
            "                _ => return Err(DecodeError::FieldIndex {{ index, count: {} }}),",
            count
        ));
        lines.push("            }".to_string());
        lines.push("        }".to_string());
        lines.push("        Ok(value)".to_string());
    }
    lines.push("    }".to_string());
    lines.push("}".to_string());
}

fn write_field(lines: &mut Vec<String>, f: &Field, index: usize) {
    let place = format!("self.{}", field_name(&f.name));

    if f.is_optional {
        lines.push(format!("        if let Some(v) = &{} {{", place));
        lines.push(format!("            w.header(&fields, {});", index));
        lines.push("            v.write_to(w)?;".to_string());
        lines.push("        }".to_string());
        return;
    }

    lines.push(format!("        if {} {{", present_test(f, &place)));
    lines.push(format!("            w.header(&fields, {});", index));
    if f.is_list {
        lines.push(format!("            w.write_count({}.len(), {})?;", place, list_max(f)));
        let binding = if is_copy(f) { "&v" } else { "v" };
        lines.push(format!("            for {} in &{} {{", binding, place));
        lines.push(format!("                {}", write_value(f, "v")));
        lines.push("            }".to_string());
    } else if f.scalar() != Some(ScalarType::Bool) {
        let value = match f.scalar() {
            Some(ScalarType::Text | ScalarType::Binary) => format!("&{}", place),
            _ => place.clone(),
        };
        lines.push(format!("            {}", write_value(f, &value)));
    }
    lines.push("        }".to_string());
}

fn read_field(lines: &mut Vec<String>, package: &Package, f: &Field, index: usize) {
    let place = format!("value.{}", field_name(&f.name));

    if f.is_list {
        lines.push(format!("                {} => {{", index));
        lines.push(format!("                    let n = r.read_count({})?;", list_max(f)));
        lines.push("                    let mut list = Vec::with_capacity(n);".to_string());
        lines.push("                    for _ in 0..n {".to_string());
        lines.push(format!("                        list.push({});", read_value(package, f)));
        lines.push("                    }".to_string());
        lines.push(format!("                    {} = list;", place));
        lines.push("                }".to_string());
    } else if f.is_optional {
        lines.push(format!("                {} => {} = Some(Box::new({})),", index, place, read_value(package, f)));
    } else if f.scalar() == Some(ScalarType::Bool) {
        lines.push(format!("                {} => {} = true,", index, place));
    } else {
        lines.push(format!("                {} => {} = {},", index, place, read_value(package, f)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, linker::link, parser::parse_source};

    fn compile(sources: &[(&str, &str)], config: &Config) -> Vec<GeneratedFile> {
        let files: Vec<_> = sources.iter().map(|(p, t)| parse_source(p, t).unwrap()).collect();
        RustGenerator.generate(&link(&files, config).unwrap()).unwrap()
    }

    #[test]
    fn test_compile_point() {
        let files = compile(
            &[("demo.colf", "package demo\n// Point is a location.\ntype Point struct {\n\tx int32\n\ty int32\n}\n")],
            &Config::default(),
        );
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, PathBuf::from("demo.rs"));
        let code = &files[0].contents;
        assert!(code.starts_with("// Code generated by colf; DO NOT EDIT.\n"));
        assert!(code.contains("use colf_wire::{DecodeError, EncodeError, Message, Reader, Writer};"));
        assert!(code.contains("pub const SIZE_MAX: usize = 16777216;"));
        assert!(code.contains("pub const LIST_MAX: usize = 65536;"));
        assert!(code.contains("/// Point is a location.\n#[derive(Debug, Clone, Default, PartialEq)]\npub struct Point {\n    pub x: i32,\n    pub y: i32,\n}"));
        assert!(code.contains("        self.x == 0\n            && self.y == 0\n"));
        assert!(code.contains("        if self.y != 0 {\n            w.header(&fields, 1);\n            w.write_int(i64::from(self.y));\n        }"));
        assert!(code.contains("                1 => value.y = r.read_i32()?,"));
        assert_eq!(files[1].path, PathBuf::from("mod.rs"));
        assert_eq!(files[1].contents, "// Code generated by colf; DO NOT EDIT.\n\npub mod demo;\n");
    }

    #[test]
    fn test_compile_field_kinds() {
        let files = compile(
            &[
                (
                    "demo.colf",
                    "package demo\ntype Node struct {\n\tnext *Node\n\tat geo.Point\n\ttags []text [list=3] [size=8]\n\ton bool\n\tflags []bool\n\tseen timestamp\n\ttype binary\n}\n",
                ),
                ("geo.colf", "package geo\ntype Point struct {\n\tlat float64\n}\n"),
            ],
            &Config::default(),
        );
        let code = &files[0].contents;
        assert!(code.contains("use colf_wire::{DecodeError, EncodeError, Message, Reader, Writer, Timestamp};"));
        assert!(code.contains("    pub next: Option<Box<Node>>,"));
        assert!(code.contains("    pub at: super::geo::Point,"));
        assert!(code.contains("    pub tags: Vec<String>,"));
        assert!(code.contains("    pub type_: Vec<u8>,"));
        assert!(code.contains("            w.write_count(self.tags.len(), 3)?;\n            for v in &self.tags {\n                w.write_text(v, 8)?;"));
        assert!(code.contains("            for &v in &self.flags {\n                w.write_bool(v);"));
        assert!(code.contains("        if self.on {\n            w.header(&fields, 3);\n        }"));
        assert!(code.contains("                0 => value.next = Some(Box::new(Node::read_from(r)?)),"));
        assert!(code.contains("                1 => value.at = super::geo::Point::read_from(r)?,"));
        assert!(code.contains("                3 => value.on = true,"));
        assert!(code.contains("                6 => value.type_ = r.read_binary(SIZE_MAX)?,"));
        assert!(files[1].contents.contains("self.lat.to_bits() == 0"));
    }

    #[test]
    fn test_compile_empty_struct() {
        let files = compile(&[("demo.colf", "package demo\ntype Nothing struct {}\n")], &Config::default());
        let code = &files[0].contents;
        assert!(code.contains("pub struct Nothing {}"));
        assert!(code.contains("        let fields = w.fields(&[])?;\n        w.end(fields);\n        Ok(())"));
        assert!(code.contains("Some(index) => Err(DecodeError::FieldIndex { index, count: 0 }),"));
    }

    #[test]
    fn test_module_collision() {
        let files: Vec<_> = [("a.colf", "package a/b\ntype A struct {}\n"), ("b.colf", "package a_b\ntype B struct {}\n")]
            .iter()
            .map(|(p, t)| parse_source(p, t).unwrap())
            .collect();
        let packages = link(&files, &Config::default()).unwrap();
        match RustGenerator.generate(&packages) {
            Err(ColfError::Config(msg)) => {
                assert_eq!(msg, "packages \"a/b\" and \"a_b\" both map to Rust module \"a_b\"")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_module_names() {
        assert_eq!(module_name("com/example/demo"), "com_example_demo");
        assert_eq!(module_name("type"), "type_");
        assert_eq!(module_name("example.com/app/demo"), "example_com_app_demo");
    }
}
