//! Schema Assembly CLI
//!
//! Assembles every configured target from the fragment pool and writes the
//! results to the output directory, or with `--check` reports which
//! distributed files are stale.
//!
//! Usage:
//!   schema-assemble --root /path/to/file-format
//!   schema-assemble --check

use std::path::{Path, PathBuf};

use clap::Parser;
use file_format_schemas::checksum::CHECKSUM_FILE_NAME;
use file_format_schemas::{
    AssembledSchema, Assembler, AssemblyConfig, ChecksumFile, FragmentRegistry, OutputFormat,
};
use similar::TextDiff;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-assemble")]
#[command(about = "Assemble YAML schema fragments into standalone JSON Schema documents")]
struct Cli {
    /// Config file (defaults to schemas.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    /// Assembly root containing the fragments
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Compare against the output directory instead of writing
    #[arg(long)]
    check: bool,

    /// Skip meta-schema validation
    #[arg(long)]
    no_validate: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AssemblyConfig::load_from(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.assembly.root = root;
    }
    if let Some(out) = cli.out {
        config.output.dir = out;
    }
    if cli.no_validate {
        config.validation.meta_schema = false;
    }

    let root = config.root_path();
    println!("📂 Loading fragments from: {:?}", root);
    let registry = FragmentRegistry::load(&root, &config.load_options())?;
    println!(
        "   Found {} fragments ({} abstract)\n",
        registry.len(),
        registry.abstract_ids().count()
    );

    let assembler = Assembler::new(&registry, config.assembly_options())?;
    let targets = config.targets();

    let mut assembled = Vec::new();
    let mut failed = 0;
    for (target, result) in assembler.assemble_all(&targets) {
        match result {
            Ok(schema) => {
                println!(
                    "  ✅ {} ({} definitions)",
                    schema.file_name,
                    schema.definition_ids().len()
                );
                assembled.push(schema);
            }
            Err(e) => {
                failed += 1;
                println!("  ❌ {} - {}", target.entry.display(), e);
                for violation in e.violations() {
                    println!("     └─ {}", violation);
                }
            }
        }
    }

    if failed > 0 {
        eprintln!("\n❌ {} of {} targets failed, nothing written", failed, targets.len());
        std::process::exit(1);
    }

    let out_dir = config.output_dir();
    let format = config.output.format;

    if cli.check {
        let stale = check_outputs(&assembled, &out_dir, format, config.output.checksums)?;
        if stale > 0 {
            eprintln!("\n❌ {} file(s) out of date in {:?}", stale, out_dir);
            std::process::exit(1);
        }
        println!("\n✅ {:?} is up to date", out_dir);
        return Ok(());
    }

    for schema in &assembled {
        schema.write_to(&out_dir, format)?;
    }
    if config.output.checksums {
        let checksums = checksum_file(&assembled, format)?;
        std::fs::write(out_dir.join(CHECKSUM_FILE_NAME), checksums.to_string())?;
    }

    println!("\n✅ Wrote {} schemas to {:?}", assembled.len(), out_dir);
    Ok(())
}

fn checksum_file(
    assembled: &[AssembledSchema],
    format: OutputFormat,
) -> Result<ChecksumFile, Box<dyn std::error::Error>> {
    let mut checksums = ChecksumFile::new();
    for schema in assembled {
        checksums.insert(schema.file_name.clone(), schema.checksum(format)?);
    }
    Ok(checksums)
}

/// Print a unified diff for every stale file and the checksum entries that
/// no longer match, returning how many files are stale
fn check_outputs(
    assembled: &[AssembledSchema],
    out_dir: &Path,
    format: OutputFormat,
    checksums: bool,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut stale = 0;
    for schema in assembled {
        let current = schema.to_json(format)?;
        let path = out_dir.join(&schema.file_name);
        let existing = read_existing(&path)?;
        if existing == current {
            continue;
        }

        stale += 1;
        println!("\n⚠️  {} is stale", path.display());
        let diff = TextDiff::from_lines(existing.as_str(), current.as_str());
        print!(
            "{}",
            diff.unified_diff()
                .context_radius(3)
                .header(&format!("a/{}", schema.file_name), &format!("b/{}", schema.file_name))
        );
    }

    if checksums {
        let path = out_dir.join(CHECKSUM_FILE_NAME);
        let recorded = ChecksumFile::parse(&read_existing(&path)?);
        let current = checksum_file(assembled, format)?;
        let mismatches = recorded.mismatches(&current);
        if !mismatches.is_empty() {
            stale += 1;
            println!("\n⚠️  {} is stale", path.display());
            for file_name in mismatches {
                println!("   └─ {}", file_name);
            }
        }
    }

    Ok(stale)
}

/// Contents of a previously written file, empty when it does not exist yet
fn read_existing(path: &Path) -> std::io::Result<String> {
    match std::fs::read_to_string(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        result => result,
    }
}
