//! colf-compiler
//!
//! This crate implements:
//!  1) A tokenizer + parser for `.colf` schema files,
//!  2) A linker that merges files into packages and validates them (reserved
//!     and duplicate names, unresolved references, structs that contain
//!     themselves by value),
//!  3) A canonical formatter for the schema language,
//!  4) Code generation for Rust, Go, Java, ECMAScript and C,
//!  5) The compiler configuration and its error type (`ColfError`).

pub mod error;
pub mod types;
pub mod utils;
pub mod tokenizer;
pub mod parser;
pub mod config;
pub mod linker;
pub mod formatter;
pub mod generator;
pub mod gen_rust;
pub mod gen_go;
pub mod gen_java;
pub mod gen_ecma;
pub mod gen_c;

use std::path::Path;

pub use config::{Ceiling, Config};
pub use error::ColfError;
pub use formatter::{format, format_file};
pub use generator::{emit, parse_languages, GeneratedFile, Generator, Language};
pub use linker::link;
pub use parser::{parse_file, parse_files, parse_source};
pub use types::Package;

/// Parses and links schema files into packages. Fails when the files
/// declare no struct at all.
pub fn compile_files<P: AsRef<Path> + Sync>(paths: &[P], config: &Config) -> Result<Vec<Package>, ColfError> {
    let files = parse_files(paths)?;
    let packages = link(&files, config)?;
    if packages.iter().all(|p| p.structs.is_empty()) {
        return Err(ColfError::Config("no struct definitions found".to_string()));
    }
    Ok(packages)
}
