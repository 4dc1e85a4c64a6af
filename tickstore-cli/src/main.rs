//! Tickstore CLI - create, fill and inspect single-field stores

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tickstore_core::storage::{Environment, EnvironmentOptions, TransactionMode};
use tickstore_core::{SeriesId, Timestamp};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

type Env = Environment<1>;

#[derive(Debug, Parser)]
#[command(name = "tickstore")]
#[command(about = "Tickstore helper tools", version, long_about = None)]
struct Cli {
    /// Log lifecycle events at debug level
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an empty store
    Init {
        #[arg(long)]
        db: PathBuf,
        /// Size limit in bytes, stored with the store
        #[arg(long)]
        max_size: Option<u64>,
    },
    /// Generate test series
    Load {
        #[arg(long)]
        db: PathBuf,
        /// Number of series, ids 1..=K
        #[arg(long, default_value_t = 10)]
        series: u64,
        /// Points per series
        #[arg(long, default_value_t = 10_000)]
        points: u64,
        #[arg(long, default_value_t = 0)]
        start: u64,
        #[arg(long, default_value_t = 1)]
        step: u64,
        /// Points per committed chunk
        #[arg(long, default_value_t = 100_000)]
        chunk: u64,
    },
    /// Print the points of one series
    Dump {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        series: Uuid,
        /// First timestamp to print
        #[arg(long, default_value_t = 0)]
        from: u64,
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Print the store header and point count
    Stats {
        #[arg(long)]
        db: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Init { db, max_size } => init(db, max_size),
        Command::Load {
            db,
            series,
            points,
            start,
            step,
            chunk,
        } => load(db, series, points, start, step, chunk),
        Command::Dump {
            db,
            series,
            from,
            limit,
        } => dump(db, SeriesId::from(series), from, limit),
        Command::Stats { db } => stats(db),
    }
}

fn open_read_only(db: PathBuf) -> anyhow::Result<Env> {
    let options = EnvironmentOptions::new(db)
        .with_create_if_missing(false)
        .with_read_only(true);
    Env::open(options).context("failed to open store")
}

fn init(db: PathBuf, max_size: Option<u64>) -> anyhow::Result<()> {
    if db.exists() {
        bail!("{} already exists", db.display());
    }
    let mut options = EnvironmentOptions::new(db);
    if let Some(bytes) = max_size {
        options = options.with_max_size(bytes);
    }

    let env = Env::open(options).context("failed to create store")?;
    env.close()?;
    Ok(())
}

fn load(db: PathBuf, series: u64, points: u64, start: u64, step: u64, chunk: u64) -> anyhow::Result<()> {
    if chunk == 0 {
        bail!("--chunk must be positive");
    }

    let env = Env::open(EnvironmentOptions::new(db).with_create_if_missing(false))
        .context("failed to open store")?;
    let started = Instant::now();

    let mut txn = env.begin_transaction(TransactionMode::Default)?;
    for k in 1..=series {
        let id = SeriesId::from_u128(k as u128);
        let mut offset = 0;
        while offset < points {
            let end = offset.saturating_add(chunk).min(points);
            {
                let mut cursor = txn.open_timeseries(id)?;
                for i in offset..end {
                    let tick = i
                        .checked_mul(step)
                        .and_then(|t| t.checked_add(start))
                        .context("timestamp overflows u64")?;
                    cursor.insert(Timestamp::new(tick), 0, [tick as f64 + k as f64])?;
                }
            }
            txn.checkpoint()?;
            offset = end;
        }
    }
    txn.commit()?;

    let total = series.saturating_mul(points);
    let elapsed = started.elapsed();
    info!(
        "Loaded {} points into {} series in {:?} ({:.0} points/s)",
        total,
        series,
        elapsed,
        total as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    env.close()?;
    Ok(())
}

fn dump(db: PathBuf, series: SeriesId, from: u64, limit: Option<u64>) -> anyhow::Result<()> {
    let env = open_read_only(db)?;
    {
        let txn = env.begin_transaction(TransactionMode::ReadOnly)?;
        let mut cursor = txn.open_timeseries(series)?;

        let limit = limit.unwrap_or(u64::MAX);
        let mut printed = 0;
        let mut more = cursor.search(Timestamp::new(from))?.found();
        while more && printed < limit {
            let point = cursor.current()?;
            println!("{}\t{}\t{}", point.timestamp, point.flags, point.values[0]);
            printed += 1;
            more = cursor.move_next()?;
        }
        info!("Printed {} points of {}", printed, series);
    }
    env.close()?;
    Ok(())
}

fn stats(db: PathBuf) -> anyhow::Result<()> {
    let env = open_read_only(db)?;
    let header = env.header();
    let stats = env.stats()?;

    println!("path:           {}", env.path().display());
    println!("format version: {}", header.format_version);
    println!("fields:         {}", header.field_count);
    if let Some(created) = header.created_at() {
        println!("created:        {}", created.to_rfc3339());
    }
    println!("points:         {}", stats.points);
    println!("file bytes:     {}", stats.file_bytes);
    println!("max size:       {} (stored {})", stats.max_size, header.max_size);
    env.close()?;
    Ok(())
}
