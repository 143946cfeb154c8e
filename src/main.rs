//! superscan binary: wires CLI options, the TOML config file, and the
//! built-in connect engine into one run.

use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use superscan::input::{Config, Opts, RunConfig};
use superscan::probe::ConnectEngine;
use superscan::report::{RunOutcome, RunReport};
use superscan::scanner::ScanRunner;

#[cfg(not(tarpaulin_include))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut opts = Opts::read();
    let config = Config::read(opts.config_path.clone());
    opts.merge(&config);
    debug!("merged options: {opts:?}");

    let run_config = RunConfig::from_opts(&opts).context("invalid scan configuration")?;
    adjust_nofile_limit(&run_config);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, letting in-flight hosts finish");
            interrupt.cancel();
        }
    });

    let runner = ScanRunner::new(run_config, Arc::new(ConnectEngine));
    let report = runner.run(cancel).await?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

/// Raises the file descriptor ceiling toward the worst case this
/// configuration can hold open: the host cap times the per-host fan-out.
#[cfg(not(tarpaulin_include))]
fn adjust_nofile_limit(config: &RunConfig) {
    let desired = config.max_concurrency as u64 * u64::from(config.threads) + 128;
    match rlimit::increase_nofile_limit(desired) {
        Ok(limit) if limit < desired => {
            warn!("file descriptor limit is {limit}, below the {desired} this run can use");
        }
        Ok(_) => {}
        Err(e) => warn!("could not raise the file descriptor limit: {e}"),
    }
}

#[cfg(not(tarpaulin_include))]
fn print_report(report: &RunReport) {
    for ip in &report.alive_hosts {
        println!("{}", format!("{ip} alive").green());
    }
    for record in &report.records {
        println!("{}", record.summary_line().purple());
    }

    match report.outcome {
        RunOutcome::NoTargets => {
            println!("{}", "Target specification resolved to no hosts.".yellow());
        }
        RunOutcome::Cancelled => {
            println!("{}", "Scan cancelled, results above are partial.".yellow());
        }
        RunOutcome::Completed => {}
    }

    let summary = format!(
        "{} hosts, {}/{} probes, {} findings in {:.1}s",
        report.target_count,
        report.completed_probes,
        report.planned_probes,
        report.records.len(),
        report.duration_ms as f64 / 1000.0
    );
    println!("{}", summary.bold());
}
