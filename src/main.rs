use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, ValueEnum};
use ontorel::graph::UninformedPolicy;
use ontorel::obda::{render_obda, render_properties};
use ontorel::options::{ConfigError, Connection, MappingStrategy, Options};
use ontorel::sql::{render_ddl, Dialect};
use ontorel::transform::{transform_source, Transformation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    Ddl,
    Obda,
    Trace,
    All,
}

/// Compile an ontology class diagram into a relational schema
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Ontology source file
    input: PathBuf,

    /// Directory to write outputs into (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// class-per-table, kind-per-table or concrete-class-per-table
    #[arg(long, default_value = "kind-per-table")]
    strategy: String,

    /// generic, mysql, h2, sqlserver, oracle or postgres
    #[arg(long, default_value = "generic")]
    dialect: String,

    /// Rewrite identifiers to snake_case
    #[arg(long)]
    standardize_names: bool,

    /// Emit enumerations as lookup tables
    #[arg(long)]
    enum_lookup: bool,

    /// Reading of undeclared cardinalities: many or one
    #[arg(long, default_value = "many")]
    uninformed: String,

    /// Database name (default: input file stem)
    #[arg(long)]
    name: Option<String>,

    #[arg(long, value_enum, default_value_t = Emit::Ddl)]
    emit: Emit,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Log every rewrite step
    #[arg(short, long)]
    verbose: bool,
}

impl TryFrom<&Cli> for Options {
    type Error = ConfigError;

    fn try_from(cli: &Cli) -> Result<Self, Self::Error> {
        let mapping_strategy = MappingStrategy::from_str(&cli.strategy)
            .ok_or_else(|| ConfigError::UnknownStrategy(cli.strategy.clone()))?;
        let target_dialect = Dialect::from_str(&cli.dialect)
            .ok_or_else(|| ConfigError::UnknownDialect(cli.dialect.clone()))?;
        let uninformed_cardinality = UninformedPolicy::from_str(&cli.uninformed)
            .ok_or_else(|| ConfigError::UnknownPolicy(cli.uninformed.clone()))?;
        let database_name = cli
            .name
            .clone()
            .or_else(|| {
                cli.input
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| Options::default().database_name);

        let options = Options {
            mapping_strategy,
            target_dialect,
            standardize_names: cli.standardize_names,
            enum_as_lookup_table: cli.enum_lookup,
            uninformed_cardinality,
            database_name,
            connection: Connection {
                host: cli.host.clone(),
                port: cli.port,
                user: cli.user.clone(),
                password: cli.password.clone(),
            },
        };
        options.validate()?;
        Ok(options)
    }
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let options = match Options::try_from(&cli) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    let input = match fs::read_to_string(&cli.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read {}: {}", cli.input.display(), e);
            process::exit(1);
        }
    };

    let transformation = match transform_source(&input, &options) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let outputs = match render(&transformation, cli.emit) {
        Ok(outputs) => outputs,
        Err(e) => {
            eprintln!("Failed to serialize trace: {}", e);
            process::exit(1);
        }
    };

    match &cli.output {
        Some(dir) => {
            if let Err(e) = write_outputs(dir, &options.database_name, &outputs) {
                eprintln!("Failed to write {}: {}", dir.display(), e);
                process::exit(1);
            }
        }
        None => {
            for (_, content) in &outputs {
                print!("{}", content);
            }
        }
    }
}

/// Rendered files as `(extension, content)` pairs.
fn render(
    transformation: &Transformation,
    emit: Emit,
) -> Result<Vec<(&'static str, String)>, serde_json::Error> {
    let mut outputs = Vec::new();
    if matches!(emit, Emit::Ddl | Emit::All) {
        outputs.push(("sql", render_ddl(transformation)));
    }
    if matches!(emit, Emit::Obda | Emit::All) {
        outputs.push(("obda", render_obda(transformation)));
        outputs.push(("properties", render_properties(transformation)));
    }
    if matches!(emit, Emit::Trace | Emit::All) {
        outputs.push(("trace.json", transformation.to_json()?));
    }
    Ok(outputs)
}

fn write_outputs(dir: &Path, name: &str, outputs: &[(&str, String)]) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    for (extension, content) in outputs {
        let path = dir.join(format!("{}.{}", name, extension));
        fs::write(&path, content)?;
        log::info!("wrote {}", path.display());
    }
    Ok(())
}
