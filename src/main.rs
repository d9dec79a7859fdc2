use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use ziptree::archive::{ExtractOptions, Extractor, RunOutcome};
use ziptree::codec::CodecPolicy;
use ziptree::container::{EntrySource, ZipSource};
use ziptree::entry::{Container, EntryId};
use ziptree::error::RunError;
use ziptree::sink::{ContentSink, DirContentStore, DiscardContent, MemoryCatalog, MemoryQueue, Services};

#[derive(Parser)]
#[command(name = "ziptree", about = "Rebuild the directory tree inside a zip container")]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the raw central index
    List {
        input: PathBuf,
    },
    /// Catalog every entry and print the reconstructed tree
    Catalog {
        input: PathBuf,
        /// Print catalog entries as JSON instead of a tree
        #[arg(long)]
        json: bool,
        /// Store extracted content here, one file per entry id
        #[arg(long)]
        content_dir: Option<PathBuf>,
        /// Full path recorded for the container itself (default: input path)
        #[arg(long)]
        container_path: Option<String>,
        /// Accepted compression methods, comma separated
        #[arg(long, default_value = "store,deflate")]
        codecs: String,
        /// Skip size and CRC-32 checks on decoded content
        #[arg(long)]
        no_verify: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn execute(command: Commands) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match command {

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input } => {
            let mut src = ZipSource::open(File::open(&input)?)?;
            println!("Archive: {}", input.display());
            println!("{:<40} {:>12} {:>12} {:<12} {:>8}",
                     "Name", "Size", "Compressed", "Method", "CRC-32");
            for i in 0..src.len() {
                let e = src.entry(i)?;
                println!("{:<40} {:>12} {:>12} {:<12} {:08x}",
                    e.raw_path, e.uncompressed_size, e.compressed_size,
                    e.codec.name(), e.crc32);
            }
            Ok(ExitCode::SUCCESS)
        }

        // ── Catalog ──────────────────────────────────────────────────────────
        Commands::Catalog { input, json, content_dir, container_path, codecs, no_verify } => {
            let options = ExtractOptions {
                codecs:           CodecPolicy::from_names(&codecs)?,
                verify_checksums: !no_verify,
            };
            let content: Box<dyn ContentSink> = match &content_dir {
                Some(dir) => Box::new(DirContentStore::create(dir)?),
                None      => Box::new(DiscardContent::new()),
            };
            let catalog = MemoryCatalog::starting_at(1);
            let queue   = MemoryQueue::new();
            let container = Container::new(
                EntryId(0),
                container_path.unwrap_or_else(|| input.display().to_string()),
            );

            let extractor = Extractor::new(Services::new(&catalog, content.as_ref(), &queue), &options);
            let outcome = extractor.run(File::open(&input)?, &container);

            let print = |catalog: &MemoryCatalog| -> Result<(), serde_json::Error> {
                if json {
                    println!("{}", serde_json::to_string_pretty(&catalog.entries())?);
                } else {
                    print!("{}", catalog.render_tree(&container));
                }
                Ok(())
            };

            match outcome {
                Ok(RunOutcome::Completed(report)) => {
                    print(&catalog)?;
                    eprint!("{}", report.summary());
                    Ok(if report.is_clean() { ExitCode::SUCCESS } else { ExitCode::from(3) })
                }
                Ok(RunOutcome::Skipped) => {
                    eprintln!("{}: not a zip container", input.display());
                    Ok(ExitCode::from(2))
                }
                Err(e @ RunError::CorruptArchive { .. }) => {
                    print(&catalog)?;
                    if let Some(report) = e.report() {
                        eprint!("{}", report.summary());
                    }
                    eprintln!("error: {e}");
                    Ok(ExitCode::FAILURE)
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
