//! SPIRE CLI
//!
//! Compiles annotated schema files into deployment artifacts.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use spire_core::TransformConfig;
use spire_transform::CompiledSchema;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spire")]
#[command(about = "SPIRE - annotated schema compiler", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile schema files and write the artifacts
    Compile {
        /// Schema files or directories of `.graphql` files, in fragment order
        #[arg(required = true)]
        schema: Vec<PathBuf>,
        /// Transform configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output directory
        #[arg(short, long, default_value = "build")]
        output: PathBuf,
    },
    /// Compile without writing anything and report diagnostics
    Check {
        /// Schema files or directories of `.graphql` files, in fragment order
        #[arg(required = true)]
        schema: Vec<PathBuf>,
        /// Transform configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spire=info"));
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).with_writer(std::io::stderr).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    match cli.command {
        Commands::Compile { schema, config, output } => {
            let compiled = run_compile(&schema, config.as_deref())?;
            let written = write_artifacts(&compiled, &output)?;
            for diagnostic in &compiled.diagnostics {
                eprintln!("{diagnostic}");
            }
            println!("wrote {written} files to {}", output.display());
            println!("fingerprint {}", compiled.fingerprint);
            Ok(())
        }
        Commands::Check { schema, config, json } => {
            let compiled = run_compile(&schema, config.as_deref())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&compiled.diagnostics)?);
            } else {
                for diagnostic in &compiled.diagnostics {
                    println!("{diagnostic}");
                }
                println!(
                    "ok: {} pipelines in {} groups",
                    compiled.pipelines.len(),
                    compiled.resources.groups.len()
                );
            }
            Ok(())
        }
    }
}

fn run_compile(schema: &[PathBuf], config: Option<&Path>) -> Result<CompiledSchema> {
    let config = load_config(config)?;
    let fragments = read_fragments(schema)?;
    let compiled = spire_transform::compile(&fragments, &config).wrap_err("compile failed")?;
    Ok(compiled)
}

fn load_config(path: Option<&Path>) -> Result<TransformConfig> {
    let Some(path) = path else {
        return Ok(TransformConfig::new());
    };
    let text = fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    TransformConfig::from_json_str(&text).wrap_err_with(|| format!("parsing {}", path.display()))
}

/// Schema fragments in argument order; directories contribute their
/// `.graphql` files sorted by name
fn read_fragments(paths: &[PathBuf]) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = fs::read_dir(path)
                .wrap_err_with(|| format!("listing {}", path.display()))?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<std::io::Result<_>>()?;
            entries.retain(|p| p.extension().is_some_and(|ext| ext == "graphql"));
            entries.sort();
            files.extend(entries);
        } else {
            files.push(path.clone());
        }
    }
    if files.is_empty() {
        bail!("no schema files found");
    }

    files
        .iter()
        .map(|file| {
            debug!(file = %file.display(), "reading schema fragment");
            fs::read_to_string(file).wrap_err_with(|| format!("reading {}", file.display()))
        })
        .collect()
}

fn write_artifacts(compiled: &CompiledSchema, output: &Path) -> Result<usize> {
    let files = compiled.artifacts()?;
    for (relative, contents) in &files {
        let path = output.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).wrap_err_with(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&path, contents).wrap_err_with(|| format!("writing {}", path.display()))?;
    }
    info!(files = files.len(), output = %output.display(), "wrote artifacts");
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    const TODO: &str = "type Todo @model @auth(rules: [{allow: public}]) { id: ID! content: String }\n";

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_directory_fragments_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.graphql"), "type B @model { id: ID! }").unwrap();
        fs::write(dir.path().join("a.graphql"), "type A @model { id: ID! }").unwrap();
        fs::write(dir.path().join("notes.txt"), "not a schema").unwrap();
        let fragments = read_fragments(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(fragments, vec!["type A @model { id: ID! }", "type B @model { id: ID! }"]);
    }

    #[test]
    fn test_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_fragments(&[dir.path().to_path_buf()]).is_err());
    }

    #[test]
    fn test_compile_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("schema.graphql");
        fs::write(&schema, TODO).unwrap();
        let config = dir.path().join("config.json");
        fs::write(&config, r#"{"apiName": "todos", "featureFlags": {"defaultListLimit": 50}}"#).unwrap();

        let compiled = run_compile(&[schema], Some(&config)).unwrap();
        let out = dir.path().join("build");
        let written = write_artifacts(&compiled, &out).unwrap();
        assert!(written > 3);
        assert!(out.join("schema.graphql").is_file());
        assert!(out.join("stacks/Todo.json").is_file());
        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join("manifest.json")).unwrap()).unwrap();
        assert_eq!(manifest["fingerprint"], compiled.fingerprint.as_str());
    }

    #[test]
    fn test_compile_error_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir.path().join("schema.graphql");
        fs::write(&schema, "type Todo @model @cached { id: ID! }").unwrap();
        let err = run_compile(&[schema], None).unwrap_err();
        assert!(format!("{err:?}").contains("cached"));
    }
}
