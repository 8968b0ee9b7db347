//! `flowforge` CLI — a thin command surface over the library. The
//! engine itself works over native Rust task types rather than a
//! declarative file format (spec §6: "Workflow file format ... is out
//! of scope for a generic library"), so `run`/`validate` operate on a
//! small set of named fixture task graphs instead of a workflow path.
//! Grounded on the teacher's `main.rs`: `clap::Parser`/`Subcommand`,
//! `colored` status output, `tracing_subscriber` initialization, and the
//! `FixSuggestion`-driven error report.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;

use flowforge::error::{FixSuggestion, FlowError};
use flowforge::resource::ResourceBudget;
use flowforge::storage::local::LocalStorage;
use flowforge::storage::Storage;
use flowforge::task::Task;
use flowforge::testing::{DynamicTask1, Task1, Task2};
use flowforge::workflow::run_workflow;

#[derive(Parser)]
#[command(name = "flowforge")]
#[command(about = "Deterministic DAG task engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one of the built-in fixture task graphs.
    Run {
        /// Fixture graph to run: "linear" (Task1 -> Task2) or "dynamic"
        /// (Task1 -> DynamicTask1).
        #[arg(long, default_value = "linear")]
        fixture: String,

        /// Directory backing the local storage.
        #[arg(long)]
        storage: PathBuf,

        /// Worker count; 1 selects the sequential engine.
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,

        /// Resource budget as `tag=max`, repeatable. Parallel mode only.
        #[arg(long = "resource", value_parser = parse_resource)]
        resources: Vec<(String, usize)>,
    },

    /// Build a fixture graph and report its task ids, without running it.
    Validate {
        #[arg(long, default_value = "linear")]
        fixture: String,
    },

    /// List artifacts under a storage directory.
    Ls {
        #[arg(long)]
        storage: PathBuf,

        /// Path prefix to list, relative to the storage root.
        path: Option<String>,
    },
}

fn parse_resource(raw: &str) -> Result<(String, usize), String> {
    let (tag, budget) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected `tag=max`, got `{raw}`"))?;
    let budget: usize = budget.parse().map_err(|_| format!("`{budget}` is not a non-negative integer"))?;
    Ok((tag.to_string(), budget))
}

/// Builds the named fixture graph's single root task.
fn build_fixture(name: &str) -> Result<Arc<dyn Task>, FlowError> {
    match name {
        "linear" => {
            let parent: Arc<dyn Task> = Arc::new(Task1::new("flowforge"));
            Ok(Arc::new(Task2::new(parent, "downstream")))
        }
        "dynamic" => {
            let parent: Arc<dyn Task> = Arc::new(Task1::new("flowforge"));
            Ok(Arc::new(DynamicTask1::new(parent)))
        }
        other => Err(FlowError::config(format!(
            "unknown fixture `{other}`; expected `linear` or `dynamic`"
        ))),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { fixture, storage, jobs, resources } => run(&fixture, storage, jobs, resources),
        Commands::Validate { fixture } => validate(&fixture),
        Commands::Ls { storage, path } => ls(storage, path),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn run(fixture: &str, storage_dir: PathBuf, jobs: usize, resources: Vec<(String, usize)>) -> Result<(), FlowError> {
    let root = build_fixture(fixture)?;
    let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(storage_dir));
    let budget = ResourceBudget::new(resources);

    println!("{} running fixture `{}` with {} job(s)", "→".cyan(), fixture.cyan().bold(), jobs);

    let workflow = flowforge::workflow::Workflow::new([root], storage);
    run_workflow(workflow, jobs, Some(budget))?;

    println!("{} workflow complete", "✓".green());
    Ok(())
}

fn validate(fixture: &str) -> Result<(), FlowError> {
    let root = build_fixture(fixture)?;
    println!("{} fixture `{}` is valid", "✓".green(), fixture);
    println!("  root task_id: {}", flowforge::task::identity::task_id(root.as_ref()));
    for dep in root.dependencies() {
        println!("  depends on:  {}", flowforge::task::identity::task_id(dep.as_ref()));
    }
    Ok(())
}

fn ls(storage_dir: PathBuf, path: Option<String>) -> Result<(), FlowError> {
    let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(storage_dir));
    let files = storage.list(path.as_deref())?;

    if files.is_empty() {
        println!("{}", "(empty)".yellow());
    }
    for file in files {
        println!("{}", file.path);
    }
    Ok(())
}
