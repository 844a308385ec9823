//! Schema Validator CLI
//!
//! Assembles every configured target and checks each against the draft-07
//! meta-schema, listing all violations found.

use std::path::PathBuf;

use clap::Parser;
use file_format_schemas::{Assembler, AssemblyConfig, FragmentRegistry};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-validator")]
#[command(about = "Assemble and meta-validate schema targets")]
struct Cli {
    /// Config file (defaults to schemas.toml lookup)
    #[arg(short, long)]
    config: Option<String>,

    /// Assembly root containing the fragments
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Allow validation keywords beside $ref
    #[arg(long)]
    allow_ref_siblings: bool,

    /// Validate only these entries (relative to the root)
    targets: Vec<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AssemblyConfig::load_from(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.assembly.root = root;
    }
    if !cli.targets.is_empty() {
        config.targets = cli.targets;
    }
    config.validation.meta_schema = true;
    if cli.allow_ref_siblings {
        config.validation.ref_siblings = false;
    }

    let registry = FragmentRegistry::load(&config.root_path(), &config.load_options())?;
    let assembler = Assembler::new(&registry, config.assembly_options())?;
    let targets = config.targets();

    println!("🔍 Validating {} schemas...", targets.len());
    let mut all_valid = true;

    for (target, result) in assembler.assemble_all(&targets) {
        match result {
            Ok(schema) => println!("  ✅ {} - valid", schema.file_name),
            Err(e) => {
                all_valid = false;
                println!("  ❌ {} - INVALID", target.entry.display());
                if e.violations().is_empty() {
                    println!("   └─ {}", e);
                }
                for violation in e.violations() {
                    println!("   └─ {}", violation);
                }
            }
        }
    }

    if !all_valid {
        std::process::exit(1);
    }
    println!("✅ All schemas valid");
    Ok(())
}
