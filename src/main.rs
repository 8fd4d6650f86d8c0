use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::info;

use commit_harvest::config::Settings;
use commit_harvest::db;
use commit_harvest::fetcher::{DocumentSource, HttpSource, LinkPolicy, LocalSource};
use commit_harvest::inventory::{load_inventory, CommitRecord};
use commit_harvest::joiner::{self, JoinOptions, JoinedRecord};
use commit_harvest::metrics::{JoinStats, RunInfo};
use commit_harvest::normalize::normalize;
use commit_harvest::output::TableWriter;
use commit_harvest::parser::{self, Representation};

const BATCH_SIZE: usize = 500;

#[derive(Parser)]
#[command(name = "commit_harvest", about = "Join labeled commits with the Java declarations they touch")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, parse and label every commit in an inventory
    Join(JoinArgs),
    /// Fetch one commit's source files and list them
    Fetch {
        /// Project identifier, e.g. owner-repo
        project: String,
        commit: String,
        /// Read from a local mirror instead of the network
        #[arg(long)]
        local: Option<PathBuf>,
    },
    /// Parse a local Java file and list its top-level declarations
    Parse {
        file: PathBuf,
        /// Skip comment stripping
        #[arg(long)]
        raw: bool,
    },
    /// Show stored run statistics
    Stats {
        /// Recent runs to list
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Args)]
struct JoinArgs {
    /// Delimited inventory with a header row
    #[arg(short, long)]
    inventory: PathBuf,
    /// Write the joined table to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Store records and run counters in SQLite
    #[arg(long)]
    store: bool,
    /// Max inventory rows to join (default: all)
    #[arg(short = 'n', long)]
    limit: Option<usize>,
    #[arg(long, value_enum)]
    link_policy: Option<LinkPolicy>,
    #[arg(long, value_enum)]
    representation: Option<Representation>,
    /// Read commits from a local mirror instead of the network
    #[arg(long)]
    local: Option<PathBuf>,
    /// Join rows on a worker pool, 500 at a time
    #[cfg(feature = "rayon")]
    #[arg(long)]
    parallel: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Join(args) => run_join(&args, &settings),
        Commands::Fetch {
            project,
            commit,
            local,
        } => {
            let source = build_source(&settings, local.as_deref(), settings.link_policy)?;
            let docs = source.fetch(&project, &commit)?;
            for doc in &docs {
                println!("{}  ({} lines)", doc.path, doc.text.lines().count());
            }
            println!("\n{} file(s) for {} @ {}", docs.len(), project, commit);
            Ok(())
        }
        Commands::Parse { file, raw } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let text = if raw { text } else { normalize(&text) };
            let tree = parser::parse(&text).with_context(|| format!("Failed to parse {:?}", file))?;
            if tree.is_empty() {
                println!("No top-level declarations.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<12} | {:<32} | {:>11} | {:>7}",
                "#", "Kind", "Name", "Lines", "Members"
            );
            println!("{}", "-".repeat(78));
            for (i, unit) in tree.units.iter().enumerate() {
                let kind = unit.kind.trim_end_matches("_declaration");
                let name = truncate(unit.name.as_deref().unwrap_or("-"), 32);
                let lines = format!("{}-{}", unit.start_line, unit.end_line);
                println!(
                    "{:>3} | {:<12} | {:<32} | {:>11} | {:>7}",
                    i + 1,
                    kind,
                    name,
                    lines,
                    unit.size() - 1
                );
            }
            println!("\n{} top-level declaration(s)", tree.len());
            Ok(())
        }
        Commands::Stats { limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn, limit)?;
            println!("Runs:     {}", s.runs);
            println!("Records:  {}", s.records);
            println!("Skipped:  {}", s.skipped);

            if !s.labels.is_empty() {
                println!("\n--- Labels ---");
                for (label, count) in &s.labels {
                    println!("  {:<24} {}", truncate(label, 24), count);
                }
            }

            if !s.recent.is_empty() {
                println!("\n--- Recent runs ---");
                println!(
                    "{:<26} | {:<28} | {:>6} | {:>8} | {:>5} | {:>5} | {}",
                    "Run", "Inventory", "Rows", "Records", "Fetch", "Parse", "Status"
                );
                println!("{}", "-".repeat(104));
                for r in &s.recent {
                    println!(
                        "{:<26} | {:<28} | {:>6} | {:>8} | {:>5} | {:>5} | {}",
                        r.run_id,
                        truncate(&r.inventory, 28),
                        r.rows,
                        r.records,
                        r.fetch_failures,
                        r.parse_failures,
                        if r.finished { "done" } else { "incomplete" }
                    );
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn run_join(args: &JoinArgs, settings: &Settings) -> Result<()> {
    let inventory = load_inventory(&args.inventory, settings.inventory_delimiter()?)?;
    let mut rows = inventory.rows;
    if let Some(n) = args.limit {
        rows.truncate(n);
    }
    if rows.is_empty() {
        println!("Inventory has no rows.");
        return Ok(());
    }

    let link_policy = args.link_policy.unwrap_or(settings.link_policy);
    let opts = JoinOptions {
        representation: args.representation.unwrap_or(settings.representation),
    };
    let source = build_source(settings, args.local.as_deref(), link_policy)?;

    let run = RunInfo::start(&args.inventory.display().to_string());
    let mut sink = Sink::open(settings, args, &inventory.flag_columns, &run)?;
    if args.output.is_none() && !args.store {
        println!("No --output or --store given; records are counted only.");
    }

    info!(run_id = %run.run_id, rows = rows.len(), "starting join");
    println!("Joining {} rows...", rows.len());
    let pb = progress_bar(rows.len());

    #[cfg(feature = "rayon")]
    let stats = if args.parallel {
        join_parallel_into(&rows, source.as_ref(), opts, &mut sink, &pb)?
    } else {
        join_into(rows, source.as_ref(), opts, &mut sink, &pb)?
    };
    #[cfg(not(feature = "rayon"))]
    let stats = join_into(rows, source.as_ref(), opts, &mut sink, &pb)?;

    pb.finish_and_clear();
    let (written, stored) = sink.finish(&stats)?;
    stats.print();
    if let (Some(n), Some(path)) = (written, &args.output) {
        println!("Wrote {} rows to {:?}", n, path);
    }
    if let Some(n) = stored {
        println!("Stored {} records as {}", n, run.run_id);
    }
    Ok(())
}

fn join_into(
    rows: Vec<CommitRecord>,
    source: &dyn DocumentSource,
    opts: JoinOptions,
    sink: &mut Sink,
    pb: &ProgressBar,
) -> Result<JoinStats> {
    let mut joined = joiner::join(rows, source, opts);
    while let Some(record) = joined.next() {
        sink.push(record)?;
        pb.set_position(joined.stats().rows as u64);
    }
    pb.set_position(joined.stats().rows as u64);
    Ok(joined.into_stats())
}

#[cfg(feature = "rayon")]
fn join_parallel_into(
    rows: &[CommitRecord],
    source: &dyn DocumentSource,
    opts: JoinOptions,
    sink: &mut Sink,
    pb: &ProgressBar,
) -> Result<JoinStats> {
    let mut stats = JoinStats::default();
    for chunk in rows.chunks(BATCH_SIZE) {
        let (records, chunk_stats) = joiner::join_parallel(chunk, source, opts, BATCH_SIZE);
        for record in records {
            sink.push(record)?;
        }
        stats.merge(chunk_stats);
        pb.inc(chunk.len() as u64);
    }
    Ok(stats)
}

fn build_source(
    settings: &Settings,
    local: Option<&Path>,
    link_policy: LinkPolicy,
) -> Result<Box<dyn DocumentSource>> {
    let local = local.map(Path::to_path_buf).or_else(|| settings.local_root.clone());
    match local {
        Some(root) => {
            info!(root = %root.display(), "reading commits from local mirror");
            Ok(Box::new(LocalSource::new(root, &settings.file_suffix, link_policy)))
        }
        None => {
            let mut options = settings.fetch_options();
            options.link_policy = link_policy;
            Ok(Box::new(HttpSource::new(options)?))
        }
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

/// Where joined records go: the output table, the database, or both.
struct Sink {
    table: Option<TableWriter<File>>,
    store: Option<(Connection, RunInfo)>,
    batch: Vec<JoinedRecord>,
    stored: usize,
}

impl Sink {
    fn open(settings: &Settings, args: &JoinArgs, flag_columns: &[String], run: &RunInfo) -> Result<Self> {
        let table = match &args.output {
            Some(path) => Some(TableWriter::create(path, settings.table_delimiter()?, flag_columns)?),
            None => None,
        };
        let store = if args.store {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            db::begin_run(&conn, run)?;
            Some((conn, run.clone()))
        } else {
            None
        };
        Ok(Sink {
            table,
            store,
            batch: Vec::with_capacity(BATCH_SIZE),
            stored: 0,
        })
    }

    fn push(&mut self, record: JoinedRecord) -> Result<()> {
        if let Some(table) = self.table.as_mut() {
            table.write(&record)?;
        }
        if self.store.is_some() {
            self.batch.push(record);
            if self.batch.len() >= BATCH_SIZE {
                self.flush()?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some((conn, run)) = &self.store {
            self.stored += db::save_records(conn, &run.run_id, &self.batch)?;
        }
        self.batch.clear();
        Ok(())
    }

    /// Returns rows written to the table and records stored, where enabled.
    fn finish(mut self, stats: &JoinStats) -> Result<(Option<usize>, Option<usize>)> {
        self.flush()?;
        let written = match self.table.take() {
            Some(table) => Some(table.finish()?),
            None => None,
        };
        let stored = match &self.store {
            Some((conn, run)) => {
                db::finish_run(conn, run, stats)?;
                Some(self.stored)
            }
            None => None,
        };
        Ok((written, stored))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
