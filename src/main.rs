use anyhow::{Context, Result};
use clap::Parser;
use results_etl::{init_tracing_once, DirStore, FilterSpec, ResultsEtl, RunSummary, ScoreFilter, DEFAULT_OUTPUT, DEFAULT_PREFIX};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// Fetch evaluation result objects, normalize them into one JSONL file, and optionally
/// filter that file by score, uid and model.
///
/// ## Examples
///
/// Download and normalize:
///   results-etl --store-root ./bucket
///
/// Download (or reuse existing output) and keep score == 0 rows for one miner:
///   results-etl --filter --score 0 --uid 123
#[derive(Parser, Debug)]
#[command(name = "results-etl", version, about, long_about = None)]
struct Cli {
    /// Local mirror of the bucket holding the result objects
    #[arg(long, env = "RESULTS_STORE_ROOT", default_value = "./bucket")]
    store_root: PathBuf,

    /// Key prefix to enumerate
    #[arg(long, env = "RESULTS_PREFIX", default_value = DEFAULT_PREFIX)]
    prefix: String,

    /// Consolidated output file
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Overwrite an existing output without asking
    #[arg(short = 'y', long)]
    yes: bool,

    /// Filter the consolidated output (skips the download when the output already exists)
    #[arg(long)]
    filter: bool,

    /// Where the filter pass writes its projection
    #[arg(long, default_value = "filtered_data.jsonl")]
    filtered_output: PathBuf,

    /// Keep rows with this score
    #[arg(long, default_value = "1", value_parser = ["0", "1", "both"])]
    score: String,

    /// Keep rows for this miner uid
    #[arg(long)]
    uid: Option<i64>,

    /// Keep rows for this model name
    #[arg(long)]
    model: Option<String>,

    /// Maximum fetches in flight
    #[arg(short = 'c', long, default_value_t = 256, value_parser = parse_positive_usize)]
    concurrency: usize,

    /// Connection ceiling of the store client; concurrency is clamped to it
    #[arg(long, default_value_t = 256, value_parser = parse_positive_usize)]
    max_connections: usize,

    /// Keys dispatched to the worker pool per round
    #[arg(long, default_value_t = 100, value_parser = parse_positive_usize)]
    batch_size: usize,

    /// Records buffered before each append to the output
    #[arg(long, default_value_t = 1000, value_parser = parse_positive_usize)]
    write_batch_size: usize,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

fn parse_positive_usize(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing_once();

    let spec = FilterSpec::new()
        .score(cli.score.parse::<ScoreFilter>()?)
        .uid(cli.uid)
        .model(cli.model.clone());

    let mut etl = ResultsEtl::new()
        .prefix(&cli.prefix)
        .output(&cli.output)
        .concurrency(cli.concurrency)
        .dispatch_batch(cli.batch_size)
        .write_batch(cli.write_batch_size)
        .progress(!cli.no_progress)
        .overwrite(cli.yes);

    if cli.filter && etl.output_has_data() {
        println!("Found existing {}, skipping download...", cli.output.display());
        return run_filter(&etl, &cli.filtered_output, &spec);
    }

    if etl.output_has_data() && !cli.yes {
        if !confirm_overwrite(&cli.output)? {
            println!("Aborting download. Use --filter to filter existing data.");
            return Ok(());
        }
        println!("Overwriting {}...", cli.output.display());
        etl = etl.overwrite(true);
    }

    let store = DirStore::new(&cli.store_root).with_max_connections(cli.max_connections);
    let summary = etl.run(&store)?;
    print_summary(&summary);

    if cli.filter {
        println!("\nRunning filtering...");
        run_filter(&etl, &cli.filtered_output, &spec)?;
    }
    Ok(())
}

fn confirm_overwrite(path: &Path) -> Result<bool> {
    print!("\n{} already exists. Do you want to overwrite it? (y/N): ", path.display());
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer).context("read confirmation")?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn run_filter(etl: &ResultsEtl, out: &Path, spec: &FilterSpec) -> Result<()> {
    let summary = etl.filter_to(out, spec)?;
    println!("\nNumber of rows in filtered dataset: {}", summary.kept);
    if summary.malformed > 0 {
        println!("Malformed lines skipped: {}", summary.malformed);
    }
    println!("Filtered data saved to: {}", summary.output.display());
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("\n{summary}");
    println!("\nVariable-structure fields have been converted to JSON strings:");
    println!("  - challenge.extra -> challenge.extra_json");
    println!("  - evaluation.extra -> evaluation.extra_json");
    println!("  - miner.chute -> miner.chute_json");
}
