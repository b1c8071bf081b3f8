// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod lock;
pub mod logging;
pub mod persist;
pub mod types;

use std::path::PathBuf;

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate};
use crate::engine::{Job, JobEngine};
use crate::exec::graph_from_config;
use crate::persist::JobRecord;
use crate::types::JobStatus;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the job engine and its record store
/// - recovery of jobs left unfinished by a previous run
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let engine = JobEngine::from_config(&cfg);

    let recovered = engine.recover()?;
    if !recovered.is_empty() {
        info!(count = recovered.len(), "recovered unfinished jobs");
    }

    if args.recover_only {
        for record in &recovered {
            println!("recovered {} ({})", record.id, record.name);
        }
        return Ok(());
    }

    if args.list_records {
        let records = engine.store().load_jobs()?;
        print_records(&records);
        return Ok(());
    }

    if cfg.task.is_empty() {
        bail!("config '{}' defines no [task.*] entries", config_path.display());
    }

    let name = args.name.unwrap_or_else(|| cfg.job.name.clone());
    let graph = graph_from_config(&cfg)?;
    let job = engine.submit(name, graph, false).await?;

    let status = tokio::select! {
        status = job.wait_for_completion() => status,
        res = tokio::signal::ctrl_c() => {
            match res {
                Ok(()) => warn!(job = %job.id(), "interrupted; aborting job"),
                Err(e) => warn!(error = %e, "failed to listen for Ctrl+C; aborting job"),
            }
            job.abort("interrupted");
            job.wait_for_completion().await
        }
    };

    print_summary(&job);

    if let Err(err) = engine.shutdown().await {
        warn!(error = %err, "engine did not shut down cleanly");
    }

    if status == JobStatus::Failed {
        bail!(
            "job '{}' failed: {}",
            job.name(),
            job.failure_reason().unwrap_or_else(|| "unknown reason".to_string())
        );
    }
    Ok(())
}

fn print_summary(job: &Job) {
    let record = job.snapshot();
    println!("job {} ({}): {}", record.name, record.id, record.status);
    let mut tasks = record.tasks;
    tasks.sort_by_key(|t| t.dependency_order);
    for task in tasks {
        match task.fail_reason {
            Some(reason) => println!("  {:<24} {} ({reason})", task.name, task.status),
            None => println!("  {:<24} {}", task.name, task.status),
        }
    }
}

fn print_records(records: &[JobRecord]) {
    println!("job records ({}):", records.len());
    for record in records {
        let aborted = if record.aborted { " [aborted]" } else { "" };
        println!(
            "  {} {:<24} {}{} queued {}",
            record.id,
            record.name,
            record.status,
            aborted,
            record.queued_at.to_rfc3339()
        );
    }
}

/// Simple dry-run output: print engine settings, tasks, deps and commands.
fn print_dry_run(cfg: &ConfigFile) {
    println!("jobgraph dry-run");
    println!(
        "  engine.task_thread_pool_size = {}",
        cfg.engine.task_thread_pool_size
    );
    println!(
        "  engine.job_thread_pool_size = {}",
        cfg.engine.job_thread_pool_size
    );
    println!(
        "  engine.shutdown_timeout = {:?}",
        cfg.engine.shutdown_timeout
    );
    println!("  persistence.mode = {:?}", cfg.persistence.mode);
    println!("  job.name = {}", cfg.job.name);
    println!();

    println!("tasks ({}):", cfg.task.len());
    for (name, task) in cfg.task.iter() {
        println!("  - {name}");
        println!("      cmd: {}", task.cmd);
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        println!("      guard: {}", task.guard);
    }

    debug!("dry-run complete (no execution)");
}
