//! Collapse every `func_instance` in a map (or map manifest) into a single
//! self-contained `.vmf`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use instance_collapser::{collapse_path, CollapseOptions, VisgroupMode};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Map (.vmf) or manifest (.vmm) to collapse
    input: PathBuf,

    /// Where to write the result [default: <input>_collapsed.vmf]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON options file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Entity schema JSON replacing the built-in one
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Extra directory to search for instance files (repeatable)
    #[arg(long = "search-path")]
    search_paths: Vec<PathBuf>,

    /// Maximum nesting rounds
    #[arg(long)]
    recursion_limit: Option<u32>,

    /// strip, keep or nest:<name>
    #[arg(long)]
    visgroups: Option<VisgroupMode>,

    /// Load instance files one at a time
    #[arg(long)]
    no_parallel: bool,

    /// Print a JSON summary to stdout
    #[arg(long)]
    report: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "map".to_string());
    input.with_file_name(format!("{}_collapsed.vmf", stem))
}

fn build_options(args: &Args) -> Result<CollapseOptions> {
    let mut options = match &args.config {
        Some(path) => CollapseOptions::load(path)
            .with_context(|| format!("loading options from {}", path.display()))?,
        None => CollapseOptions::default(),
    };
    if let Some(schema) = &args.schema {
        options.schema_path = Some(schema.clone());
    }
    options.search_paths.extend(args.search_paths.iter().cloned());
    if let Some(limit) = args.recursion_limit {
        options.recursion_limit = limit;
    }
    if let Some(mode) = &args.visgroups {
        options.visgroups = mode.clone();
    }
    if args.no_parallel {
        options.parallel_preload = false;
    }
    Ok(options)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).init();

    let options = build_options(&args)?;
    let (doc, report) = collapse_path(&args.input, &options)
        .with_context(|| format!("collapsing {}", args.input.display()))?;

    let output = args.output.clone().unwrap_or_else(|| default_output(&args.input));
    std::fs::write(&output, doc.export())
        .with_context(|| format!("writing {}", output.display()))?;
    log::info!("Wrote {}", output.display());

    if args.report {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
