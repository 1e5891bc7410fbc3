//! Compiles the schemas under `schema` and `limits` with the Rust generator
//! into `OUT_DIR`. The `limits` packages get a list ceiling of 3.

use std::path::{Path, PathBuf};

use colf_compiler::{compile_files, gen_rust::RustGenerator, generator::write_files, Config, Generator};

fn schemas(dir: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map_or(false, |e| e == "colf") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn generate(paths: &[PathBuf], out: &Path, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let packages = compile_files(paths, config)?;
    write_files(out, &RustGenerator.generate(&packages)?)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=schema");
    println!("cargo:rerun-if-changed=limits");

    let out = PathBuf::from(std::env::var("OUT_DIR")?);
    generate(&schemas("schema")?, &out, &Config::new(&out).with_size_max("64 * 1024")?)?;

    let limits = out.join("limits");
    generate(&schemas("limits")?, &limits, &Config::new(&limits).with_list_max("3")?)?;
    Ok(())
}
