use clap::{Parser, Subcommand};
use postfmt::config;
use postfmt::output::{self, Action, FileOutcome};
use postfmt::store::FileStore;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "postfmt")]
#[command(about = "Read, migrate, and rewrite blog post files")]
#[command(long_about = "\
Read, migrate, and rewrite blog post files

Posts are markdown files with a YAML front-matter block, one directory per
collection. The filename carries the date and id.

Site structure:

  site/
  ├── postfmt.toml                 # Site config (optional)
  ├── _blog/                       # Text collection
  │   └── 2021-05-01-hello.md
  └── _artwork/                    # Picture collection
      ├── 2019-03-02-sunset.md     # Older schema, migrated on load
      └── 2019-03-02-sunset.md.bak # Original bytes, written once

Loading a post written in an older schema backs the file up to <file>.bak
before migrating it in memory. 'upgrade' then rewrites it in place.

Run 'postfmt gen-config' to generate a documented postfmt.toml.
Set RUST_LOG=postfmt=debug to trace detection and migration steps.")]
#[command(version)]
struct Cli {
    /// Site root holding postfmt.toml and the _<collection> directories
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load posts and report their schema without rewriting them
    Check {
        /// Post files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Print the reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rewrite posts written in an older schema in the current one
    Upgrade {
        /// Post files to upgrade
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print a post re-encoded in the current schema
    Show {
        /// Post file to show
        file: PathBuf,
    },
    /// Print a stock postfmt.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Check { files, json } => {
            let store = FileStore::open(&cli.root)?;
            let outcomes: Vec<FileOutcome> = distinct_paths(files)
                .into_iter()
                .map(|path| {
                    let result = store.load_report(&path);
                    (path, result)
                })
                .collect();
            if json {
                println!("{}", output::format_json(&outcomes)?);
            } else {
                output::print_outcomes(&outcomes, &cli.root, Action::Check);
            }
            exit_status(&outcomes)?;
        }
        Command::Upgrade { files } => {
            let site_config = config::load_config(&cli.root)?;
            init_thread_pool(&site_config.processing);
            let store = FileStore::from_config(&cli.root, &site_config);
            let outcomes: Vec<FileOutcome> = distinct_paths(files)
                .into_par_iter()
                .map(|path| {
                    let result = store.upgrade(&path);
                    (path, result)
                })
                .collect();
            output::print_outcomes(&outcomes, &cli.root, Action::Upgrade);
            exit_status(&outcomes)?;
        }
        Command::Show { file } => {
            let store = FileStore::open(&cli.root)?;
            let post = store.load(&file)?;
            print!("{}", store.codec().encode(&post)?);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Structured logs go to stderr; reports go to stdout.
fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("postfmt=warn")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; config can lower it, not raise it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Drop repeated paths, keeping first-seen order.
///
/// Two spellings of one file would otherwise race in parallel upgrades.
fn distinct_paths(files: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    files
        .into_iter()
        .filter(|path| seen.insert(identity(path)))
        .collect()
}

fn identity(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn exit_status(outcomes: &[FileOutcome]) -> Result<(), Box<dyn std::error::Error>> {
    let failed = outcomes.iter().filter(|(_, r)| r.is_err()).count();
    if failed > 0 {
        return Err(format!("{failed} of {} files failed", outcomes.len()).into());
    }
    Ok(())
}
