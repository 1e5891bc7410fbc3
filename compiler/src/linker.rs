use std::collections::{HashMap, HashSet};

use colf_wire::header::MAX_FIELDS;

use crate::{
    config::Config,
    error::ColfError,
    types::{doc_lines, Field, FieldDecl, FieldType, Package, ScalarType, SchemaFile, Struct, StructDecl, StructRef},
    utils::quote,
};

/// Struct names that collide with identifiers of the generated code.
pub const RESERVED_NAMES: [&str; 25] = [
    "Boolean", "Box", "Byte", "DecodeError", "DepthMax", "Double", "EncodeError", "Float", "Instant", "Integer",
    "ListMax", "Long", "Math", "Message", "Object", "Option", "Reader", "Result", "Short", "SizeMax",
    "String", "Timestamp", "Vec", "Wire", "Writer",
];

type StructKey<'a> = (&'a str, &'a str);

/// Merges parsed files into packages, resolves struct references and applies
/// the configuration. The result is ordered by package name.
pub fn link(files: &[SchemaFile], config: &Config) -> Result<Vec<Package>, ColfError> {
    // 1) Group the files by package, keeping input order
    let mut groups: Vec<(&str, Vec<&SchemaFile>)> = Vec::new();
    for file in files {
        match groups.iter_mut().find(|(name, _)| *name == file.package) {
            Some((_, members)) => members.push(file),
            None => groups.push((file.package.as_str(), vec![file])),
        }
    }

    // 2) Check struct names and fields
    let mut known: HashMap<&str, HashSet<&str>> = HashMap::new();
    for &(package, ref members) in &groups {
        let mut seen: HashMap<String, (&SchemaFile, &StructDecl)> = HashMap::new();
        for &file in members {
            for decl in &file.structs {
                if RESERVED_NAMES.contains(&decl.name.as_str()) {
                    return Err(link_error(
                        file,
                        decl.line,
                        decl.column,
                        format!("struct name {} is reserved", quote(&decl.name)),
                    ));
                }
                if let Some((first_file, first)) = seen.get(&decl.name.to_lowercase()) {
                    let msg = if first.name == decl.name {
                        format!(
                            "struct {} is declared twice; first at {}:{}:{}",
                            quote(&decl.name),
                            first_file.path,
                            first.line,
                            first.column
                        )
                    } else {
                        format!(
                            "struct {} collides with {} at {}:{}:{}; names must differ by more than letter case",
                            quote(&decl.name),
                            quote(&first.name),
                            first_file.path,
                            first.line,
                            first.column
                        )
                    };
                    return Err(link_error(file, decl.line, decl.column, msg));
                }
                check_fields(file, decl)?;
                seen.insert(decl.name.to_lowercase(), (file, decl));
                known.entry(package).or_default().insert(decl.name.as_str());
            }
        }
    }

    // 3) Resolve field types
    let mut resolved: HashMap<StructKey<'_>, Vec<(&FieldDecl, FieldType)>> = HashMap::new();
    for &(package, ref members) in &groups {
        for &file in members {
            for decl in &file.structs {
                let mut fields = Vec::with_capacity(decl.fields.len());
                for field in &decl.fields {
                    fields.push((field, resolve(package, file, field, &known)?));
                }
                resolved.insert((package, decl.name.as_str()), fields);
            }
        }
    }

    // 4) Check that structs do not contain themselves by value
    let owners = files_by_struct(&groups);
    let mut state: HashMap<StructKey<'_>, u8> = HashMap::new();
    for &(package, ref members) in &groups {
        for &file in members {
            for decl in &file.structs {
                check_recursion((package, decl.name.as_str()), file, &resolved, &owners, &mut state)?;
            }
        }
    }

    // 5) Build the package model
    let mut packages = Vec::with_capacity(groups.len());
    for &(package, ref members) in &groups {
        let doc = members
            .iter()
            .map(|f| doc_lines(&f.doc, f.blank_before))
            .find(|d| !d.is_empty())
            .unwrap_or_default();

        let mut structs = Vec::new();
        for &file in members {
            for decl in &file.structs {
                let fields = resolved[&(package, decl.name.as_str())]
                    .iter()
                    .map(|(field, type_)| Field {
                        name:        field.name.clone(),
                        doc:         doc_lines(&field.doc, field.blank_before),
                        type_:       prefix_type(type_, config),
                        is_list:     field.type_.is_list,
                        is_optional: field.type_.is_optional,
                        size_max:    field.limits.size,
                        list_max:    field.limits.list,
                    })
                    .collect();
                structs.push(Struct {
                    name: decl.name.clone(),
                    doc: doc_lines(&decl.doc, decl.blank_before),
                    fields,
                    file: file.path.clone(),
                    line: decl.line,
                    column: decl.column,
                });
            }
        }

        packages.push(Package {
            name: config.prefixed(package),
            doc,
            structs,
            size_max: config.size_max.clone(),
            list_max: config.list_max.clone(),
            super_class: config.super_class.clone(),
            interfaces: config.interfaces.clone(),
            snippet: config.snippet.clone(),
        });
    }
    packages.sort_by(|a, b| a.name.cmp(&b.name));

    for p in &packages {
        tracing::debug!(package = %p.name, structs = p.structs.len(), "linked package");
    }
    Ok(packages)
}

fn link_error(file: &SchemaFile, line: usize, column: usize, msg: String) -> ColfError {
    ColfError::Link { file: file.path.clone(), line, column, msg }
}

/// Field names must stay distinct once converted to each language's naming
/// convention, which drops underscores and changes letter case.
fn check_fields(file: &SchemaFile, decl: &StructDecl) -> Result<(), ColfError> {
    if decl.fields.len() > MAX_FIELDS {
        return Err(link_error(
            file,
            decl.line,
            decl.column,
            format!(
                "struct {} has {} fields; the maximum is {}",
                quote(&decl.name),
                decl.fields.len(),
                MAX_FIELDS
            ),
        ));
    }
    let mut seen: HashMap<String, &FieldDecl> = HashMap::new();
    for field in &decl.fields {
        let key = field.name.replace('_', "").to_lowercase();
        if let Some(first) = seen.get(&key) {
            return Err(link_error(
                file,
                field.line,
                field.column,
                format!(
                    "field {} collides with {} on line {}",
                    quote(&field.name),
                    quote(&first.name),
                    first.line
                ),
            ));
        }
        seen.insert(key, field);
    }
    Ok(())
}

fn resolve(
    package: &str,
    file: &SchemaFile,
    field: &FieldDecl,
    known: &HashMap<&str, HashSet<&str>>,
) -> Result<FieldType, ColfError> {
    let type_name = field.type_.name.as_str();
    if let Some(t) = ScalarType::from_keyword(type_name) {
        return Ok(FieldType::Scalar(t));
    }
    let (target, name) = type_name.rsplit_once('.').unwrap_or((package, type_name));
    if known.get(target).map_or(false, |names| names.contains(name)) {
        return Ok(FieldType::Struct(StructRef { package: target.to_string(), name: name.to_string() }));
    }
    Err(link_error(
        file,
        field.line,
        field.column,
        format!("unresolved type {} for field {}", quote(type_name), quote(&field.name)),
    ))
}

fn prefix_type(type_: &FieldType, config: &Config) -> FieldType {
    match type_ {
        FieldType::Scalar(t) => FieldType::Scalar(*t),
        FieldType::Struct(r) => FieldType::Struct(StructRef {
            package: config.prefixed(&r.package),
            name:    r.name.clone(),
        }),
    }
}

fn files_by_struct<'a>(groups: &[(&'a str, Vec<&'a SchemaFile>)]) -> HashMap<StructKey<'a>, &'a SchemaFile> {
    let mut map = HashMap::new();
    for &(package, ref members) in groups {
        for &file in members {
            for decl in &file.structs {
                map.insert((package, decl.name.as_str()), file);
            }
        }
    }
    map
}

/// Depth-first walk over value fields. State 1 marks a struct on the current
/// path and 2 one that is fully checked. Lists and optional fields break the
/// containment, so they are not followed.
fn check_recursion<'a>(
    key: StructKey<'a>,
    file: &'a SchemaFile,
    resolved: &'a HashMap<StructKey<'a>, Vec<(&'a FieldDecl, FieldType)>>,
    owners: &HashMap<StructKey<'a>, &'a SchemaFile>,
    state: &mut HashMap<StructKey<'a>, u8>,
) -> Result<(), ColfError> {
    if state.get(&key) == Some(&2) {
        return Ok(());
    }
    state.insert(key, 1);
    for (field, type_) in resolved.get(&key).into_iter().flatten() {
        let target = match type_ {
            FieldType::Struct(r) if !field.type_.is_list && !field.type_.is_optional => {
                (r.package.as_str(), r.name.as_str())
            }
            _ => continue,
        };
        if state.get(&target) == Some(&1) {
            return Err(link_error(
                file,
                field.line,
                field.column,
                format!(
                    "struct {} contains itself by value through field {}; make the field optional or a list",
                    quote(target.1),
                    quote(&field.name)
                ),
            ));
        }
        if let Some(owner) = owners.get(&target) {
            check_recursion(target, owner, resolved, owners, state)?;
        }
    }
    state.insert(key, 2);
    Ok(())
}
