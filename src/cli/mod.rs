//! Pipeliner CLI Module
//!
//! Command-line interface for inspecting and running experiment plans.

use clap::{Parser, Subcommand};
use colored::*;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::ExperimentConfig;
use crate::plan::PlanTable;
use crate::results::{FileLogSink, ResultTable};
use crate::utils::DataLoader;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn warn(s: &str) -> ColoredString   { s.truecolor(230, 180, 80) }

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
    // The step may run for a while; show the prefix now
    let _ = io::stdout().flush();
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

/// Print rows as left-aligned columns under a dimmed header
fn print_table(header: &[String], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }
    let render = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
    };

    println!("  {}", dim(&render(header)));
    for row in rows {
        println!("  {}", render(row));
    }
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "pipeliner")]
#[command(author = "KolosalAI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Grid search and cross-validated evaluation over every pipeline variant")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the plan table of an experiment
    Plan {
        /// Experiment configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Search and evaluate every plan row
    Run {
        /// Experiment configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Input data file (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Target column name
        #[arg(short, long)]
        target: String,

        /// Text log of the run
        #[arg(short, long, default_value = "results.log")]
        log: PathBuf,

        /// Repeat evaluation N times under shifted seeds
        #[arg(long)]
        collect_n: Option<usize>,

        /// Record failing rows instead of aborting
        #[arg(long)]
        continue_on_error: bool,

        /// Worker threads (defaults to all cores)
        #[arg(long)]
        n_jobs: Option<usize>,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

fn plan_rows(plan: &PlanTable) -> Vec<Vec<String>> {
    plan.iter()
        .map(|row| row.variants().map(str::to_string).collect())
        .collect()
}

pub fn cmd_plan(config_path: &Path) -> anyhow::Result<()> {
    section("Plan");

    let config = ExperimentConfig::from_file(config_path)?;
    let pipeliner = config.build()?;
    let plan = pipeliner.plan();

    println!(
        "  {}   {}",
        kv("combinations", &pipeliner.registry().n_combinations().to_string()),
        kv("rows", &plan.len().to_string())
    );
    println!();
    print_table(plan.step_names(), &plan_rows(plan));
    Ok(())
}

fn print_results(table: &ResultTable) {
    let rows: Vec<Vec<String>> = (0..table.len()).filter_map(|i| table.cells(i)).collect();
    print_table(&table.columns(), &rows);

    let failed = table
        .rows()
        .iter()
        .flat_map(|r| r.metrics.iter())
        .filter(|(_, o)| o.is_failed())
        .count();
    if failed > 0 {
        println!();
        println!("  {} {} metric result(s) failed, see the log", warn("!"), failed);
    }
}

pub fn cmd_run(
    config_path: &Path,
    data_path: &Path,
    target: &str,
    log_path: &Path,
    collect_n: Option<usize>,
    continue_on_error: bool,
    n_jobs: Option<usize>,
) -> anyhow::Result<()> {
    section("Run");

    let mut config = ExperimentConfig::from_file(config_path)?;
    if collect_n.is_some() {
        config.run.collect_n = collect_n;
    }
    if continue_on_error {
        config.run.continue_on_error = true;
    }
    if n_jobs.is_some() {
        config.pipeliner.n_jobs = n_jobs;
    }

    step_run("Loading data");
    let start = Instant::now();
    let dataset = DataLoader::new().load_dataset(data_path, target)?;
    step_done(&format!(
        "{} rows × {} features in {:?}",
        dataset.x.nrows(),
        dataset.x.ncols(),
        start.elapsed()
    ));

    let mut pipeliner = config.build()?;
    let mut sink = FileLogSink::create(log_path)?;

    step_run(&format!("Evaluating {} plan rows", pipeliner.plan().len().to_string().cyan()));
    let start = Instant::now();
    let table = pipeliner.get_results(&dataset.x, Some(&dataset.y), &config.run, &mut sink)?;
    step_done(&format!("{:?}", start.elapsed()));

    if let Some(stats) = pipeliner.cache_stats() {
        println!(
            "  {}   {}   {}",
            kv("cache hits", &stats.hits.to_string()),
            kv("computed", &stats.misses.to_string()),
            kv("evictions", &stats.evictions.to_string())
        );
    }
    println!("  {}", kv("log", &log_path.display().to_string()));
    println!();

    print_results(&table);
    Ok(())
}
