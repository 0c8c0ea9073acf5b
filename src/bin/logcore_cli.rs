//! Demonstration CLI driving [`logcore`] from the command line. This binary
//! owns no indexing logic of its own: it wires `clap` argument parsing and
//! `env_logger` initialization to the library's public API.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use logcore::encoding::Encoding;
use logcore::events::{Event, FileChangeStatus};
use logcore::indexer::IndexingStatus;
use logcore::log_data::LogData;

/// Index and watch a log file, printing its size, line count, and detected
/// encoding; with `--follow`, keep running and report growth as it happens.
#[derive(Parser, Debug)]
#[command(name = "logcore-cli", version, about)]
struct Cli {
    /// Log file to open.
    path: PathBuf,

    /// Keep running after the initial index and report file growth.
    #[arg(long)]
    follow: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long, value_name = "PATH")]
    log_to_file: Option<PathBuf>,

    /// Log verbosity: 0=error, 1=warn, 2=info, 3=debug, 4=trace.
    #[arg(long, value_name = "N", default_value_t = 2)]
    log_level: u8,

    /// Force a character encoding instead of auto-detecting it.
    #[arg(long, value_name = "ENCODING")]
    encoding: Option<String>,
}

fn level_filter(level: u8) -> log::LevelFilter {
    match level {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn init_logging(cli: &Cli) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level_filter(cli.log_level));
    if let Some(path) = &cli.log_to_file {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!("logcore-cli: could not open {}: {e}; logging to stderr", path.display());
            }
        }
    }
    builder.init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let forced_encoding = match cli.encoding.as_deref().map(Encoding::parse) {
        Some(Some(enc)) => Some(enc),
        Some(None) => {
            eprintln!("logcore-cli: unrecognized --encoding value {:?}", cli.encoding.unwrap());
            return ExitCode::FAILURE;
        }
        None => None,
    };

    let log_data = Arc::new(LogData::new());
    let (tx, rx) = std::sync::mpsc::channel();
    log_data.set_event_sender(tx);

    if let Err(e) = log_data.attach(&cli.path, forced_encoding) {
        eprintln!("logcore-cli: failed to open {}: {e}", cli.path.display());
        return ExitCode::FAILURE;
    }

    // Block until the initial index finishes, printing progress as it comes.
    loop {
        match rx.recv_timeout(Duration::from_secs(30)) {
            Ok(Event::LoadingProgressed(pct)) => {
                log::debug!("indexing {pct}% complete");
            }
            Ok(Event::LoadingFinished(status)) => {
                if status != IndexingStatus::Successful {
                    eprintln!("logcore-cli: indexing of {} ended with {status:?}", cli.path.display());
                }
                break;
            }
            Ok(_) => {}
            Err(_) => {
                eprintln!("logcore-cli: timed out waiting for {} to index", cli.path.display());
                return ExitCode::FAILURE;
            }
        }
    }

    println!("{}", cli.path.display());
    println!("  lines:    {}", log_data.line_count());
    println!("  bytes:    {}", log_data.get_file_size());
    println!("  max width: {}", log_data.get_max_length());
    println!("  encoding: {:?}", log_data.get_detected_encoding());

    if !cli.follow {
        return ExitCode::SUCCESS;
    }

    println!("following {} for changes (ctrl-c to stop)...", cli.path.display());
    for event in rx.iter() {
        match event {
            Event::FileChanged(FileChangeStatus::Truncated) => {
                println!("file truncated");
            }
            Event::FileChanged(FileChangeStatus::DataAdded) => {
                log::debug!("file grew; reindexing");
            }
            Event::LoadingFinished(IndexingStatus::Successful) => {
                println!("lines: {}  bytes: {}", log_data.line_count(), log_data.get_file_size());
            }
            _ => {}
        }
    }
    ExitCode::SUCCESS
}
