use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use convfeat_models::{load_alexnet, load_pca};
use convfeat_pipeline::{OutputFormat, Pipeline};
use convfeat_runtime::{default_thread_count, ThreadPool};

/// Extract dense image features on the CPU: images through an
/// AlexNet-shaped network, optionally projected by a PCA stage. With only
/// `--pca`, the single input file is read as raw 4096-wide features.
#[derive(Parser, Debug)]
#[command(name = "feature")]
struct Args {
    /// Binary AlexNet weight file
    #[arg(short = 'a', long)]
    alexnet: Option<PathBuf>,

    /// Binary PCA weight file
    #[arg(short = 'p', long)]
    pca: Option<PathBuf>,

    /// Number of worker threads (defaults to the hardware concurrency)
    #[arg(short = 't', long)]
    threads: Option<NonZeroUsize>,

    /// Forward batch size (defaults to the hardware concurrency)
    #[arg(short = 's', long)]
    batch: Option<NonZeroUsize>,

    /// Output file (stdout when absent)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Write binary output instead of text
    #[arg(short = 'b', long)]
    binary: bool,

    /// Verbose timing output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Input image files, or one raw feature file in reducer-only mode
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("feature: {err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = run(args) {
        eprintln!("feature: {err:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(args: Args) -> anyhow::Result<()> {
    init_tracing(args.verbose);
    if args.alexnet.is_none() && args.pca.is_none() {
        anyhow::bail!("requires at least one of --alexnet and --pca");
    }

    let threads = args.threads.map_or_else(default_thread_count, NonZeroUsize::get);
    let batch = args.batch.map_or_else(default_thread_count, NonZeroUsize::get);
    let pool = ThreadPool::new(threads);
    info!(
        threads,
        batch,
        simd = convfeat_nn::SIMD_ENABLED,
        files = args.files.len(),
        "starting"
    );

    let feature_net = match &args.alexnet {
        Some(path) => {
            let started = Instant::now();
            let net = load_alexnet(path)?;
            info!("alexnet loaded in {:?}", started.elapsed());
            Some(net)
        }
        None => None,
    };
    let reducer = match &args.pca {
        Some(path) => {
            let started = Instant::now();
            let net = load_pca(path)?;
            info!("pca loaded in {:?}", started.elapsed());
            Some(net)
        }
        None => None,
    };

    let format = if args.binary {
        OutputFormat::Binary
    } else {
        OutputFormat::Text
    };
    let pipeline = Pipeline::new(feature_net, reducer, batch);
    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to open output file \"{}\"", path.display()))?;
            let mut sink = BufWriter::new(file);
            pipeline.run(&args.files, &mut sink, format, &pool)?;
            sink.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut sink = BufWriter::new(stdout.lock());
            pipeline.run(&args.files, &mut sink, format, &pool)?;
            sink.flush()?;
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}
