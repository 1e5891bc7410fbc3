use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};

use colf_compiler::error::ColfError;
use colf_compiler::{compile_files, emit, format_file, parse_languages, Config};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "colf")]
#[command(about = "Generate marshal and unmarshal code from colf schemas", long_about = None)]
struct Cli {
    /// Target languages, comma separated: rust, go, java, ecmascript, c
    languages: String,

    /// Schema files or directories of `*.colf` files [default: the working directory]
    files: Vec<PathBuf>,

    /// Destination root of the generated code
    #[arg(short = 'b', value_name = "dir", default_value = ".")]
    dest: PathBuf,

    /// Package prefix, slash separated
    #[arg(short = 'p', value_name = "prefix")]
    prefix: Option<String>,

    /// Normalize the format of the input schemas in place
    #[arg(short = 'f')]
    format: bool,

    /// Report progress on stderr
    #[arg(short = 'v')]
    verbose: bool,

    /// Size ceiling expression for serial data
    #[arg(short = 's', value_name = "expr", default_value = colf_compiler::config::DEFAULT_SIZE_MAX)]
    size_max: String,

    /// List ceiling expression for the number of elements
    #[arg(short = 'l', value_name = "expr", default_value = colf_compiler::config::DEFAULT_LIST_MAX)]
    list_max: String,

    /// Super class for the generated classes (Java only)
    #[arg(short = 'x', value_name = "class")]
    super_class: Option<String>,

    /// Interfaces for the generated classes, comma separated (Java only)
    #[arg(short = 'i', value_name = "list")]
    interfaces: Option<String>,

    /// File with code to include in each generated class (Java only)
    #[arg(short = 'c', value_name = "file")]
    snippet: Option<PathBuf>,

    /// Print the linked package model as JSON instead of generating code
    #[arg(long)]
    dump: bool,
}

impl Cli {
    fn config(&self) -> Result<Config, ColfError> {
        let mut config = Config::new(&self.dest)
            .with_size_max(&self.size_max)?
            .with_list_max(&self.list_max)?;
        if let Some(prefix) = &self.prefix {
            config = config.with_prefix(prefix)?;
        }
        if let Some(class) = &self.super_class {
            config = config.with_super_class(class)?;
        }
        if let Some(list) = &self.interfaces {
            config = config.with_interfaces(list)?;
        }
        if let Some(path) = &self.snippet {
            config = config.with_snippet(fs::read_to_string(path)?);
        }
        Ok(config)
    }
}

/// Expands directories into their `*.colf` files, sorted by name, and drops
/// paths seen before.
fn collect_schemas(operands: &[PathBuf]) -> Result<Vec<PathBuf>, ColfError> {
    let operands = if operands.is_empty() { vec![PathBuf::from(".")] } else { operands.to_vec() };

    let mut files = Vec::new();
    for operand in &operands {
        if operand.is_dir() {
            let mut found = Vec::new();
            for entry in fs::read_dir(operand)? {
                let path = entry?.path();
                if path.is_file() && path.extension().map_or(false, |e| e == "colf") {
                    found.push(path);
                }
            }
            found.sort();
            files.extend(found);
        } else {
            files.push(operand.clone());
        }
    }

    let mut seen = Vec::new();
    let mut unique = Vec::new();
    for file in files {
        let key = fs::canonicalize(&file).unwrap_or_else(|_| file.clone());
        if seen.contains(&key) {
            tracing::debug!(file = %file.display(), "duplicate schema path ignored");
            continue;
        }
        seen.push(key);
        unique.push(file);
    }
    Ok(unique)
}

/// Rewrites the schemas in canonical format. The formatter logs every file
/// it changes.
fn format_schemas(files: &[PathBuf]) -> Result<usize, ColfError> {
    let mut changed = 0;
    for file in files {
        if format_file(Path::new(file))? {
            changed += 1;
        }
    }
    Ok(changed)
}

/// Log filter: warnings plus the formatted files, or everything with `-v`.
fn log_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn,colf_compiler::formatter=info")
    }
}

/// Compiles every schema before `-f` rewrites any of them, so a bad schema
/// leaves all files untouched.
fn run(cli: &Cli) -> Result<(), ColfError> {
    let languages = parse_languages(&cli.languages)?;
    let config = cli.config()?;

    let files = collect_schemas(&cli.files)?;
    tracing::debug!(count = files.len(), "schema files");
    let packages = compile_files(&files, &config)?;
    if cli.format {
        let changed = format_schemas(&files)?;
        tracing::debug!(changed, "format done");
    }

    if cli.dump {
        let json = serde_json::to_string_pretty(&packages)
            .map_err(|e| ColfError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        println!("{}", json);
        return Ok(());
    }

    let written = emit(&packages, &config, &languages)?;
    tracing::info!(files = written.len(), dest = %config.dest.display(), "generated");
    Ok(())
}

fn main() -> Result<(), ColfError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    run(&cli)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_expands_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.colf", "a.colf", "notes.txt"] {
            fs::write(dir.path().join(name), "package demo\n").unwrap();
        }
        let a = dir.path().join("a.colf");
        let files = collect_schemas(&[a.clone(), dir.path().to_path_buf()]).unwrap();
        assert_eq!(files, vec![a, dir.path().join("b.colf")]);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from(["colf", "-b", "out", "-p", "com/example", "-s", "1024", "go,java", "x.colf"]).unwrap();
        assert_eq!(cli.languages, "go,java");
        assert_eq!(cli.files, vec![PathBuf::from("x.colf")]);
        let config = cli.config().unwrap();
        assert_eq!(config.dest, PathBuf::from("out"));
        assert_eq!(config.size_max.value, 1024);
        assert_eq!(config.list_max.value, 64 * 1024);
        assert_eq!(config.prefix, "com/example");
    }

    #[test]
    fn test_format_waits_for_all_schemas() {
        let dir = tempfile::tempdir().unwrap();
        let messy = dir.path().join("a.colf");
        let broken = dir.path().join("b.colf");
        fs::write(&messy, "package demo\n\ntype A struct {\n  n   int8\n}\n").unwrap();
        fs::write(&broken, "package demo\ntype B struct {\n\tx int33\n}\n").unwrap();
        let out = dir.path().join("out");
        let args = ["colf", "-f", "-b", out.to_str().unwrap(), "go", dir.path().to_str().unwrap()];

        let cli = Cli::try_parse_from(args).unwrap();
        assert!(run(&cli).is_err());
        assert_eq!(fs::read_to_string(&messy).unwrap(), "package demo\n\ntype A struct {\n  n   int8\n}\n");

        fs::remove_file(&broken).unwrap();
        run(&cli).unwrap();
        assert_eq!(fs::read_to_string(&messy).unwrap(), "package demo\n\ntype A struct {\n\tn int8\n}\n");
        assert!(out.join("demo/colf.go").is_file());
    }

    #[test]
    fn test_formatted_files_log_by_default() {
        assert_eq!(log_filter(false).to_string(), "warn,colf_compiler::formatter=info");
        assert_eq!(log_filter(true).to_string(), "debug");
    }

    #[test]
    fn test_bad_ceiling() {
        let cli = Cli::try_parse_from(["colf", "-l", "0", "go"]).unwrap();
        assert!(matches!(cli.config(), Err(ColfError::Config(_))));
    }
}
