use geocode_lookup::catalog;
use geocode_lookup::config::LookupConfig;
use geocode_lookup::lookup::GeocodeLookup;
use geocode_lookup::resolver::ResolveOptions;
use geocode_lookup::variant::VariantPolicy;

use anyhow::Result;
use clap::{Parser, Subcommand};
use polars::prelude::*;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "geocode")]
#[command(about = "Find the chain of lookup tables joining one geography code to another")]
#[command(version)]
struct Args {
    /// JSON config file; missing keys keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding one subdirectory of lookup tables per year
    #[arg(long, global = true)]
    lookups_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the lookup tables and write the manifest
    Index {
        /// Re-index even when the manifest is up to date
        #[arg(long)]
        force: bool,
    },
    /// Print the shortest join paths between two columns
    Resolve {
        start: String,
        end: String,

        #[arg(long, value_enum)]
        policy: Option<VariantPolicy>,

        #[arg(long)]
        max_paths: Option<usize>,
    },
    /// Join the tables on the best path(s) and write the result as CSV
    Materialize {
        start: String,
        end: String,

        /// Local authority name to keep (repeatable)
        #[arg(long = "authority")]
        authorities: Vec<String>,

        /// Number of paths to materialize
        #[arg(long, default_value_t = 1)]
        top: usize,

        /// Print only the distinct codes of this column
        #[arg(long)]
        codes: Option<String>,

        #[arg(long, value_enum)]
        policy: Option<VariantPolicy>,

        /// Write CSV here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the code columns available overall or for one year
    Geographies {
        #[arg(long)]
        year: Option<String>,
    },
    /// Describe the geography prefixes used in column names
    Keys,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref(), args.lookups_dir)?;

    match args.command {
        Commands::Index { force } => run_index(config, force),
        Commands::Resolve { start, end, policy, max_paths } => {
            let mut options = ResolveOptions::from_config(&config);
            if let Some(policy) = policy {
                options.policy = policy;
            }
            if let Some(max_paths) = max_paths {
                options.max_paths = max_paths;
            }
            run_resolve(config, &start, &end, &options)
        }
        Commands::Materialize { start, end, authorities, top, codes, policy, output } => {
            let mut options = ResolveOptions::from_config(&config).with_authorities(authorities);
            if let Some(policy) = policy {
                options.policy = policy;
            }
            run_materialize(config, &start, &end, &options, top, codes, output)
        }
        Commands::Geographies { year } => {
            let mut lookup = GeocodeLookup::open(config)?;
            for column in catalog::available_geographies(lookup.manifest()?, year.as_deref())? {
                println!("{}", column);
            }
            Ok(())
        }
        Commands::Keys => {
            println!("Add a year code (e.g. 21 for 2021) and CD to a key, e.g. WD22CD for 2022 wards.\n");
            for (key, description) in catalog::geography_keys() {
                println!("{:<6} {}", key, description);
            }
            Ok(())
        }
    }
}

/// Defaults, then the config file, then the environment, then CLI flags.
fn load_config(path: Option<&PathBuf>, lookups_dir: Option<PathBuf>) -> Result<LookupConfig> {
    let config = match path {
        Some(path) => LookupConfig::load(path)?,
        None => LookupConfig::default(),
    };
    let mut config = config.apply_env();
    if let Some(dir) = lookups_dir {
        config.lookups_dir = dir;
    }
    Ok(config)
}

fn run_index(config: LookupConfig, force: bool) -> Result<()> {
    let mut lookup = GeocodeLookup::new(config);
    if force {
        lookup.invalidate()?;
        lookup.rebuild()?;
    }
    let manifest = lookup.manifest()?;

    println!("Indexed {} tables in {} groupings", manifest.table_count(), manifest.groupings.len());
    for warning in &manifest.warnings {
        println!("  skipped {}", warning);
    }
    Ok(())
}

fn run_resolve(config: LookupConfig, start: &str, end: &str, options: &ResolveOptions) -> Result<()> {
    let mut lookup = GeocodeLookup::open(config)?;
    let paths = lookup.resolve(start, end, options)?;

    println!("{} path(s) of {} join(s):", paths.len(), paths.first().map(|p| p.len()).unwrap_or_default());
    for (i, path) in paths.iter().enumerate() {
        println!("{:>3}. {}", i + 1, path);
    }
    Ok(())
}

fn run_materialize(
    config: LookupConfig,
    start: &str,
    end: &str,
    options: &ResolveOptions,
    top: usize,
    codes: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut lookup = GeocodeLookup::open(config)?;
    let results = lookup.top_results(start, end, options, top.max(1))?;

    for (i, result) in results.into_iter().enumerate() {
        info!("Result {} from {}", i + 1, result.path);
        if let Some(outcome) = &result.filter {
            if outcome.is_empty() {
                info!("No rows left after filtering on {}", outcome.column());
            }
        }

        if let Some(column) = &codes {
            println!("{}", result.code_values(column)?.join(","));
            continue;
        }

        let mut frame = result.frame;
        match &output {
            Some(path) => {
                let path = if i == 0 { path.clone() } else { numbered(path, i + 1) };
                let file = std::fs::File::create(&path)?;
                CsvWriter::new(file).finish(&mut frame)?;
                println!("Wrote {} rows to {}", frame.height(), path.display());
            }
            None => CsvWriter::new(std::io::stdout().lock()).finish(&mut frame)?,
        }
    }
    Ok(())
}

fn numbered(path: &std::path::Path, n: usize) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("result");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("csv");
    path.with_file_name(format!("{}_{}.{}", stem, n, ext))
}
