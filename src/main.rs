use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rayon::prelude::*;

use quadfp::{AudioLoader, Engine, Fingerprint, FpType, LoadOptions};

#[derive(Parser, Debug)]
#[command(name = "quadfp")]
#[command(about = "Quad-based audio fingerprinting", long_about = None)]
struct Cli {
    /// Show debug logs instead of warnings only
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fingerprint WAV files and store them as references
    Index {
        /// Catalog database path
        #[arg(long, default_value = "quadfp.db")]
        db: PathBuf,

        /// Mono 16 kHz WAV files; each is stored under its file stem
        files: Vec<PathBuf>,
    },
    /// Match a query clip against the catalog
    Query {
        /// Catalog database path
        #[arg(long, default_value = "quadfp.db")]
        db: PathBuf,

        /// Mono 16 kHz WAV clip
        file: PathBuf,

        /// Only fingerprint the first SECONDS of the clip
        #[arg(long, value_name = "SECONDS")]
        snip: Option<f64>,

        /// Print matches as JSON lines
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Warn };
    env_logger::Builder::from_default_env().filter_level(level).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Index { db, files } => {
            let mut engine = Engine::open(db)?;

            // Fingerprinting is CPU-bound and independent per file; the
            // catalog writes below stay on this thread, one transaction
            // per record.
            let fingerprints: Vec<(String, quadfp::Result<Fingerprint>)> = files
                .par_iter()
                .map(|file| {
                    let title = file
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| file.to_string_lossy().into_owned());
                    let fp = AudioLoader::load_wav(file, &LoadOptions::default())
                        .and_then(|samples| Fingerprint::from_samples(&samples, FpType::Reference));
                    (title, fp)
                })
                .collect();

            for (title, fp) in fingerprints {
                let fp = match fp {
                    Ok(fp) => fp,
                    Err(err) => {
                        eprintln!("skipped {title:?}: {err}");
                        continue;
                    }
                };
                match engine.store(&fp, &title)? {
                    Some(record_id) => {
                        println!("indexed {title:?} as record {record_id} ({} quads)", fp.quads.len())
                    }
                    None => println!("skipped {title:?}: already in the catalog"),
                }
            }
        }
        Command::Query { db, file, snip, json } => {
            let engine = Engine::open(db)?;
            let opts = LoadOptions { snip, ..LoadOptions::default() };
            let samples = AudioLoader::load_wav(&file, &opts)?;
            let fp = Fingerprint::from_samples(&samples, FpType::Query)?;
            let matches = engine.query(&fp)?;

            if json {
                for m in &matches {
                    println!("{}", serde_json::to_string(m)?);
                }
            } else if matches.is_empty() {
                println!("no matches");
            } else {
                for (rank, m) in matches.iter().enumerate() {
                    println!(
                        "{}. {} (score {:.3}, offset {} frames, {} aligned quads, \
                         sTime {:.3}, sFreq {:.3})",
                        rank + 1,
                        m.title,
                        m.v_score,
                        m.offset,
                        m.num_matches,
                        m.s_time,
                        m.s_freq
                    );
                }
            }
        }
    }
    Ok(())
}
