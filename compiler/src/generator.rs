use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{
    config::{Config, Directive},
    error::ColfError,
    gen_c::CGenerator,
    gen_ecma::EcmaGenerator,
    gen_go::GoGenerator,
    gen_java::JavaGenerator,
    gen_rust::RustGenerator,
    types::Package,
    utils::quote,
};

/// Header line of every generated file.
pub const GENERATED_NOTICE: &str = "Code generated by colf; DO NOT EDIT.";

/// A source file produced by a generator, relative to the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path:     PathBuf,
    pub contents: String,
}

/// Translates linked packages into the source of one target language.
/// Generators are pure: writing the files is up to the caller.
pub trait Generator: Sync {
    fn language(&self) -> Language;

    /// Optional directives the generator honours.
    fn supports(&self) -> &'static [Directive] {
        &[]
    }

    fn generate(&self, packages: &[Package]) -> Result<Vec<GeneratedFile>, ColfError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    Go,
    Java,
    ECMAScript,
    C,
}

impl Language {
    pub const ALL: [Language; 5] = [Language::Rust, Language::Go, Language::Java, Language::ECMAScript, Language::C];

    /// Subdirectory of the output root when several languages are emitted.
    pub fn dir_name(self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::ECMAScript => "ecmascript",
            Language::C => "c",
        }
    }

    pub fn generator(self) -> Box<dyn Generator> {
        match self {
            Language::Rust => Box::new(RustGenerator),
            Language::Go => Box::new(GoGenerator),
            Language::Java => Box::new(JavaGenerator),
            Language::ECMAScript => Box::new(EcmaGenerator),
            Language::C => Box::new(CGenerator),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Language::Rust => "Rust",
            Language::Go => "Go",
            Language::Java => "Java",
            Language::ECMAScript => "ECMAScript",
            Language::C => "C",
        })
    }
}

impl FromStr for Language {
    type Err = ColfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rust" => Ok(Language::Rust),
            "go" => Ok(Language::Go),
            "java" => Ok(Language::Java),
            "ecmascript" | "javascript" | "js" => Ok(Language::ECMAScript),
            "c" => Ok(Language::C),
            _ => Err(ColfError::Config(format!("unsupported language {}", quote(s)))),
        }
    }
}

/// Parses a comma-separated language list, dropping repeats.
pub fn parse_languages(list: &str) -> Result<Vec<Language>, ColfError> {
    let mut languages = Vec::new();
    for name in list.split(',') {
        let language = name.parse::<Language>()?;
        if !languages.contains(&language) {
            languages.push(language);
        }
    }
    Ok(languages)
}

/// Generates code for each language and writes it below `config.dest`. With
/// more than one language every generator gets its own subdirectory, and
/// they run concurrently. Directive support is checked for all languages
/// before anything is written. Returns the paths written, in language order.
pub fn emit(packages: &[Package], config: &Config, languages: &[Language]) -> Result<Vec<PathBuf>, ColfError> {
    let generators: Vec<Box<dyn Generator>> = languages.iter().map(|l| l.generator()).collect();
    for g in &generators {
        config.check_support(&g.language().to_string(), g.supports())?;
    }

    if let [g] = generators.as_slice() {
        let files = g.generate(packages)?;
        return write_files(&config.dest, &files);
    }

    let results: Vec<Result<Vec<PathBuf>, ColfError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = generators
            .iter()
            .map(|g| {
                scope.spawn(move || {
                    let files = g.generate(packages)?;
                    write_files(&config.dest.join(g.language().dir_name()), &files)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    let mut written = Vec::new();
    for result in results {
        written.extend(result?);
    }
    Ok(written)
}

/// Writes generated files below `root`, creating directories as needed.
pub fn write_files(root: &Path, files: &[GeneratedFile]) -> Result<Vec<PathBuf>, ColfError> {
    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let path = root.join(&file.path);
        let io_error = |source| ColfError::Generation { path: path.clone(), source };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        std::fs::write(&path, &file.contents).map_err(io_error)?;
        tracing::info!(file = %path.display(), "wrote");
        written.push(path);
    }
    Ok(written)
}

/// Appends documentation lines with a comment prefix such as `"/// "`.
pub(crate) fn push_doc(lines: &mut Vec<String>, indent: &str, prefix: &str, doc: &[String]) {
    for line in doc {
        if line.is_empty() {
            lines.push(format!("{}{}", indent, prefix.trim_end()));
        } else {
            lines.push(format!("{}{}{}", indent, prefix, line));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{linker::link, parser::parse_source};

    fn packages(config: &Config) -> Vec<Package> {
        let files = vec![
            parse_source("demo.colf", "package demo\ntype Point struct {\n\tx int32\n\ty int32\n}\n").unwrap(),
        ];
        link(&files, config).unwrap()
    }

    #[test]
    fn language_names() {
        assert_eq!("Rust".parse::<Language>().unwrap(), Language::Rust);
        assert_eq!("js".parse::<Language>().unwrap(), Language::ECMAScript);
        assert_eq!(parse_languages("go,java,Go").unwrap(), vec![Language::Go, Language::Java]);
        assert_eq!(" C ".parse::<Language>().unwrap(), Language::C);
        match "cpp".parse::<Language>() {
            Err(ColfError::Config(msg)) => assert_eq!(msg, "unsupported language \"cpp\""),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn emit_single_language_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path());
        let written = emit(&packages(&config), &config, &[Language::Go]).unwrap();
        assert_eq!(written, vec![dir.path().join("demo/colf.go")]);
        assert!(dir.path().join("demo/colf.go").is_file());
    }

    #[test]
    fn emit_several_languages_to_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path());
        emit(&packages(&config), &config, &Language::ALL).unwrap();
        assert!(dir.path().join("rust/demo.rs").is_file());
        assert!(dir.path().join("rust/mod.rs").is_file());
        assert!(dir.path().join("go/demo/colf.go").is_file());
        assert!(dir.path().join("java/demo/Point.java").is_file());
        assert!(dir.path().join("java/demo/Wire.java").is_file());
        assert!(dir.path().join("ecmascript/demo/colf.js").is_file());
        assert!(dir.path().join("c/colf.h").is_file());
        assert!(dir.path().join("c/colf.c").is_file());
    }

    #[test]
    fn emit_checks_directives_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path()).with_snippet("// extra");
        match emit(&packages(&config), &config, &[Language::Java, Language::Rust]) {
            Err(ColfError::Config(msg)) => assert_eq!(msg, "snippet not supported with Rust"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn generation_is_deterministic() {
        let config = Config::default();
        let packages = packages(&config);
        for language in Language::ALL {
            let g = language.generator();
            assert_eq!(g.generate(&packages).unwrap(), g.generate(&packages).unwrap());
        }
    }
}
