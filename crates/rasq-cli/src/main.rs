//! rasq CLI: run, validate and explain tile queries.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use rasq_core::config::EngineConfig;
use rasq_core::query::QueryRectangle;
use rasq_exec::{Consumer, Digest, Engine, Summary};
use rasq_io::Catalog;
use rasq_operators::backend::BackendProvider;
use rasq_planner::{estimate_work, parse_query_document, plan_document, QueryConfig, QueryDocument, WorkHint};

#[derive(Parser)]
#[command(name = "rasq")]
#[command(version, about = "Pull-based query engine over tiled, time-varying rasters", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputMode {
    /// One JSON line of statistics per tile
    Summary,
    /// A single blake3 digest over every tile
    Digest,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a query from a YAML file
    Run {
        /// Path to the query YAML file
        #[arg(short, long)]
        query: PathBuf,

        #[arg(long, value_enum, default_value_t = OutputMode::Summary)]
        output: OutputMode,

        /// Order changer materialization limit (overrides config)
        #[arg(long)]
        max_materialized_tiles: Option<usize>,

        /// Base directory for relative dataset paths (overrides config)
        #[arg(long)]
        data_dir: Option<String>,
    },

    /// Validate a query YAML file (syntax, operator names, arity, orders)
    Validate {
        #[arg(short, long)]
        query: PathBuf,
    },

    /// Show the negotiated operator tree and a work estimate
    Explain {
        #[arg(short, long)]
        query: PathBuf,
    },
}

/// Flag values that take precedence over env and the query file.
#[derive(Debug, Default)]
struct CliOverrides {
    max_materialized_tiles: Option<usize>,
    data_dir: Option<String>,
}

/// env < query file `config:` < CLI flags.
fn resolve_config(mut base: EngineConfig, doc: Option<&QueryConfig>, cli: &CliOverrides) -> EngineConfig {
    if let Some(doc) = doc {
        doc.apply(&mut base);
    }
    if let Some(v) = cli.max_materialized_tiles {
        base.max_materialized_tiles = v;
    }
    if let Some(dir) = &cli.data_dir {
        base.data_dir = dir.clone();
    }
    base
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "rasq=debug,debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            query,
            output,
            max_materialized_tiles,
            data_dir,
        } => run_query(
            &query,
            output,
            &CliOverrides {
                max_materialized_tiles,
                data_dir,
            },
        ),
        Commands::Validate { query } => validate_query(&query).map(|_| println!("✓ Query is valid")),
        Commands::Explain { query } => explain_query(&query),
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load(path: &Path) -> Result<QueryDocument, Box<dyn std::error::Error>> {
    let yaml_content = fs::read_to_string(path)?;
    Ok(parse_query_document(&yaml_content)?)
}

fn run_query(path: &Path, output: OutputMode, cli: &CliOverrides) -> Result<(), Box<dyn std::error::Error>> {
    let doc = load(path)?;
    let config = resolve_config(EngineConfig::from_env(), doc.config.as_ref(), cli);
    let catalog = Catalog::from_specs(&doc.datasets, &config)?;
    let program = plan_document(&doc)?;

    let mut engine = Engine::new(config);
    let (mut summary, mut digest) = (Summary::new(), Digest::new());
    let consumer: &mut dyn Consumer = match output {
        OutputMode::Summary => &mut summary,
        OutputMode::Digest => &mut digest,
    };
    let manifest = engine.run(&program, &catalog, consumer)?;
    info!(plan = %manifest.plan_hash, tiles = manifest.tiles_emitted, "query finished");

    match output {
        OutputMode::Summary => print!("{}", summary.to_json_lines()?),
        OutputMode::Digest => {
            if let Some(h) = manifest.outputs_digest {
                println!("{h}");
            }
        }
    }
    eprintln!(
        "✓ {} tiles in {}ms (plan {})",
        manifest.tiles_emitted,
        manifest.finished_ms.saturating_sub(manifest.started_ms),
        manifest.plan_hash
    );
    Ok(())
}

fn validate_query(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let doc = load(path)?;
    plan_document(&doc)?;
    Ok(())
}

/// Rasters of `dataset` that start inside the query window.
fn count_rasters(catalog: &Catalog, dataset: &str, query: &QueryRectangle) -> Option<u64> {
    const LIMIT: u64 = 1_000_000;
    let backend = catalog.backend(dataset).ok()?;
    let series = backend.metadata().temporal;
    let mut t = series.t1;
    let mut n = 0u64;
    while t < series.t2 && t < query.temporal.t2 && n < LIMIT {
        if backend.validity_end(t).ok()? > query.temporal.t1 {
            n += 1;
        }
        let next = backend.advance(t).ok()?;
        if next <= t {
            break;
        }
        t = next;
    }
    Some(n)
}

fn explain_query(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let doc = load(path)?;
    let config = resolve_config(EngineConfig::from_env(), doc.config.as_ref(), &CliOverrides::default());
    let program = plan_document(&doc)?;
    let catalog = Catalog::from_specs(&doc.datasets, &config)?;
    let hints = WorkHint {
        source_rasters: catalog
            .names()
            .filter_map(|d| count_rasters(&catalog, d, &program.query).map(|n| (d.to_string(), n)))
            .collect(),
    };
    let work = estimate_work(&program, Some(&hints))?;

    println!("Query Plan");
    println!("==========");
    println!();
    print!("{}", program.explain());
    println!();
    println!("Work Estimate:");
    println!("  Operators: {}", work.operators);
    println!("  Tiles per raster: {}", work.tiles_per_raster);
    println!("  Output rasters: {}", work.output_rasters);
    println!("  Descriptors: {}", work.descriptors);
    println!("  Materialized tiles: {}", work.materialized_tiles);
    Ok(())
}
