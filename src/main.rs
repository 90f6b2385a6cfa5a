use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use match_ids::diamond::{Diamond, DiamondError};
use match_ids::pipeline::{self, RunConfig};

/// Printed bare by `-V/--version`.
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn parse_similarity(s: &str) -> Result<f64, String> {
    s.trim().parse().map_err(|_| format!("Invalid number: {}", s))
}

#[derive(Parser)]
#[command(name = "match-ids")]
#[command(disable_version_flag = true)]
#[command(about = "Match protein identifiers between two GenBank files using DIAMOND")]
#[command(long_about = r#"
match-ids - report which reference proteins match each query protein

  1. Exports the CDS translations of both GenBank files to FASTA
     ({name}.fa in the current directory, headers are locus tags)
  2. Builds a DIAMOND database from the reference proteins (reference.dmnd)
  3. Searches the query proteins with diamond blastp
  4. Prints every hit at or above the similarity threshold

OUTPUT (stdout, tab-separated, no header):
  query_locus_tag  reference_locus_tag  identity  evalue  bitscore

  Hits are grouped by query protein in the order DIAMOND reports them.
  Malformed DIAMOND output lines are reported on stderr and skipped.

EXAMPLES:
  match-ids reference.gbk query.gbk
  match-ids -s 95 -k reference.gbk query.gbk > matches.tsv
"#)]
struct Args {
    #[arg(value_name = "REFERENCE", required_unless_present = "version",
          help = "GenBank file to use as reference")]
    reference: Option<PathBuf>,

    #[arg(value_name = "QUERY", required_unless_present = "version",
          help = "GenBank file to query with")]
    query: Option<PathBuf>,

    #[arg(short = 's', long, value_name = "FLOAT", default_value = "90.0",
          value_parser = parse_similarity, allow_negative_numbers = true,
          help = "Minimum similarity (in %) to be considered a hit")]
    similarity: f64,

    #[arg(short = 'k', long, help = "Keep the intermediate files")]
    keep: bool,

    #[arg(short = 'v', long, action = ArgAction::Count,
          help = "Increase log verbosity (-v info, -vv debug)")]
    verbose: u8,

    #[arg(long, value_name = "PATH", help = "DIAMOND executable (default: search PATH)")]
    diamond: Option<PathBuf>,

    #[arg(short = 'V', long, help = "Print version")]
    version: bool,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn run(args: &Args) -> Result<()> {
    let (Some(reference), Some(query)) = (&args.reference, &args.query) else {
        anyhow::bail!("Both REFERENCE and QUERY are required");
    };
    if !(0.0..=100.0).contains(&args.similarity) {
        log::warn!("Similarity {} is outside 0-100", args.similarity);
    }

    let diamond = match &args.diamond {
        Some(path) => Diamond::new(
            path.canonicalize()
                .with_context(|| format!("DIAMOND executable not found: {}", path.display()))?,
        ),
        None => Diamond::locate()?,
    };
    log::info!("Using DIAMOND: {}", diamond.executable().display());

    let config = RunConfig {
        reference: reference.clone(),
        query: query.clone(),
        similarity: args.similarity,
        keep: args.keep,
        workdir: PathBuf::from("."),
    };

    let mut out = BufWriter::new(io::stdout().lock());
    let mut diagnostics = io::stderr().lock();
    pipeline::run(&config, &diamond, &mut out, &mut diagnostics)?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    if args.version {
        println!("{}", VERSION);
        return ExitCode::SUCCESS;
    }
    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e.downcast_ref::<DiamondError>().map_or(1, DiamondError::exit_code);
            ExitCode::from(code)
        }
    }
}
