//! cfglog
//!
//! Operator tool for a cfgdb data directory: check, repair, inspect and
//! back up the commit log pair.

use std::path::{Path, PathBuf};

use cfgdb::commitlog::{
    CommitIndex, CommitLog, Journal, LogReader, LogRecord, LogRecovery, OpType, RecoveryReport,
    ScanEnd,
};
use cfgdb::{Result, SyncMode};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// cfgdb commit log tool
#[derive(Parser, Debug)]
#[command(name = "cfglog")]
#[command(about = "Inspect and repair a cfgdb commit log")]
#[command(version)]
struct Args {
    /// Data directory holding commit.log and commit.idx
    #[arg(short, long, default_value = "./cfgdb_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report torn tails and index mismatches without changing anything
    Verify,

    /// Truncate a torn tail and rebuild the index
    Repair {
        /// Remove a lock file left by a crashed process
        #[arg(long)]
        force: bool,
    },

    /// Print records in log order
    Dump {
        /// Only the last N records, newest first
        #[arg(long, value_name = "N")]
        from_end: Option<usize>,
    },

    /// Copy the log and index into another directory
    Backup {
        /// Destination directory
        dest: PathBuf,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cfgdb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    tracing::debug!("cfglog v{} on {}", cfgdb::VERSION, args.data_dir.display());

    let outcome = match &args.command {
        Commands::Verify => verify(&args.data_dir),
        Commands::Repair { force } => repair(&args.data_dir, *force),
        Commands::Dump { from_end } => dump(&args.data_dir, *from_end),
        Commands::Backup { dest } => backup(&args.data_dir, dest),
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Exit status 2 when the pair needs repair
fn verify(dir: &Path) -> Result<bool> {
    let report = LogRecovery::verify(
        &dir.join(Journal::LOG_FILENAME),
        &dir.join(Journal::INDEX_FILENAME),
    )?;
    print_report(&report);
    Ok(!report.was_truncated && !report.index_inconsistent)
}

fn repair(dir: &Path, force: bool) -> Result<bool> {
    let (_journal, _records, report) = Journal::open(dir, SyncMode::All, force)?;
    print_report(&report);
    Ok(true)
}

fn dump(dir: &Path, from_end: Option<usize>) -> Result<bool> {
    if let Some(n) = from_end {
        if dump_from_index(dir, n)? {
            return Ok(true);
        }
        tracing::warn!("Index missing or out of step with the log; scanning the log instead");
    }

    let mut iter = LogReader::open(&dir.join(Journal::LOG_FILENAME))?.records();
    let mut records: Vec<(u64, LogRecord)> = Vec::new();
    for item in iter.by_ref() {
        match item {
            Ok(entry) => records.push(entry),
            Err(e) => {
                tracing::warn!("Stopping dump: {}", e);
                break;
            }
        }
    }
    if let ScanEnd::Torn { offset, reason } = iter.scan_end() {
        tracing::warn!("Torn tail at offset {}: {}", offset, reason);
    }

    if let Some(n) = from_end {
        records.reverse();
        records.truncate(n);
    }

    for (offset, record) in &records {
        println!("{}", format_record(*offset, record));
    }
    Ok(true)
}

/// Last `n` records newest first, located through the index.
///
/// Returns `false` without printing when the index cannot be trusted.
fn dump_from_index(dir: &Path, n: usize) -> Result<bool> {
    let index_path = dir.join(Journal::INDEX_FILENAME);
    if !index_path.exists() {
        return Ok(false);
    }
    let log = CommitLog::open(&dir.join(Journal::LOG_FILENAME), SyncMode::All)?;
    let index = CommitIndex::open(&index_path, SyncMode::All)?;
    if !index.is_consistent_with(log.file_size()) {
        return Ok(false);
    }

    let len = index.len();
    for record_no in (len - n.min(len)..len).rev() {
        let offset = index.offset_of(record_no)?;
        println!("{}", format_record(offset, &log.read_at(offset)?));
    }
    Ok(true)
}

fn backup(dir: &Path, dest: &Path) -> Result<bool> {
    let (journal, _records, _report) = Journal::open(dir, SyncMode::All, false)?;
    journal.backup(dest)?;
    println!(
        "backed up {} records ({} bytes) to {}",
        journal.record_count(),
        journal.log_size(),
        dest.display()
    );
    Ok(true)
}

fn print_report(report: &RecoveryReport) {
    println!("records:        {}", report.records_recovered);
    println!("valid length:   {}", report.valid_len);
    println!("last timestamp: {}", report.last_timestamp);
    if report.was_truncated {
        println!(
            "torn tail:      {} bytes ({})",
            report.truncated_bytes,
            report.truncation_reason.as_deref().unwrap_or("unknown")
        );
    }
    println!("index ok:       {}", !report.index_inconsistent);
    if report.index_rebuilt {
        println!("index rebuilt");
    }
}

fn format_record(offset: u64, record: &LogRecord) -> String {
    let key = String::from_utf8_lossy(&record.key);
    match record.op {
        OpType::Insert => format!(
            "{:>10} {:>16} INSERT {} = {}",
            offset,
            record.timestamp,
            key,
            String::from_utf8_lossy(&record.value)
        ),
        OpType::Delete => format!("{:>10} {:>16} DELETE {}", offset, record.timestamp, key),
        OpType::Lock => format!("{:>10} {:>16} LOCK   {}", offset, record.timestamp, key),
        OpType::Unlock => format!(
            "{:>10} {:>16} UNLOCK {} (token {})",
            offset,
            record.timestamp,
            key,
            record.unlock_token().unwrap_or_default()
        ),
    }
}
