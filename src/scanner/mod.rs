//! Core orchestration for scan runs: expansion, bounded launching, and
//! aggregation.

mod scheduler;

use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::address::expand_targets;
use crate::error::Result;
use crate::input::{RunConfig, ScanMode};
use crate::probe::{EngineConfig, PingSweep, ProbeEngine, ScanTarget, SweepScope};
use crate::progress::Progress;
use crate::report::{Aggregator, RunOutcome, RunReport};
use crate::throttle::Throttle;

pub use scheduler::{Scheduler, SlotGuard};

/// Drives one run end to end with a fixed configuration and probing engine.
///
/// The runner owns nothing global. Progress, throttling, and aggregation are
/// created per run and torn down with it, so several runners can operate in
/// the same process without sharing state.
pub struct ScanRunner {
    config: RunConfig,
    engine: Arc<dyn ProbeEngine>,
}

impl ScanRunner {
    /// Pairs a run configuration with a probing engine.
    #[must_use]
    pub fn new(config: RunConfig, engine: Arc<dyn ProbeEngine>) -> Self {
        Self { config, engine }
    }

    /// Runs to completion or until `cancel` fires.
    ///
    /// A malformed target specification aborts before anything is scheduled.
    /// After cancellation no further host is launched; hosts already in
    /// flight wind down and their findings are kept in the report.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunReport> {
        let started_at = Utc::now();

        let targets = match expand_targets(&self.config.ip, &self.config.discovered_hosts) {
            Ok(targets) => targets,
            Err(e) => {
                error!("target expansion failed: {e}");
                return Err(e);
            }
        };

        if targets.is_empty() {
            info!(
                "target specification {:?} resolved to no hosts",
                self.config.ip
            );
            return Ok(empty_report(RunOutcome::NoTargets, started_at));
        }

        if self.config.mode == ScanMode::FullScan {
            Ok(self.full_run(targets, cancel, started_at).await)
        } else {
            Ok(self.ping_run(targets, cancel, started_at).await)
        }
    }

    /// Liveness pass without port probing.
    async fn ping_run(
        &self,
        targets: Vec<Ipv4Addr>,
        cancel: CancellationToken,
        started_at: DateTime<Utc>,
    ) -> RunReport {
        let scope = if self.config.mode == ScanMode::PingNetworkOnly {
            SweepScope::Networks
        } else {
            SweepScope::Hosts
        };
        let target_count = targets.len();
        info!("liveness pass over {target_count} hosts");

        let alive = self
            .engine
            .ping_sweep(PingSweep {
                targets,
                scope,
                timeout: self.config.timeout,
                threads: self.config.threads,
                cancel: cancel.clone(),
            })
            .await;

        for ip in &alive {
            info!("{ip} alive");
        }

        RunReport {
            outcome: outcome_for(&cancel),
            target_count,
            planned_probes: 0,
            completed_probes: 0,
            records: Vec::new(),
            alive_hosts: alive,
            started_at,
            duration_ms: elapsed_ms(started_at),
        }
    }

    /// Full pipeline: launch every host through the scheduler, then drain
    /// and aggregate.
    async fn full_run(
        &self,
        targets: Vec<Ipv4Addr>,
        cancel: CancellationToken,
        started_at: DateTime<Utc>,
    ) -> RunReport {
        let target_count = targets.len();
        let planned = target_count as u64 * self.config.ports.count() as u64;

        let progress = Arc::new(if self.config.show_bar {
            Progress::with_bar(planned)
        } else {
            Progress::new(planned)
        });
        let throttle = Arc::new(Throttle::new(self.config.pps));
        let scheduler = Scheduler::new(self.config.max_concurrency, cancel.clone());
        let (sink, aggregator) = Aggregator::channel();
        let collector = tokio::spawn(aggregator.collect());

        // The calibration port only means something when the whole run is a
        // single host.
        let active_port = if target_count == 1 {
            self.config.alive_port
        } else {
            None
        };

        let engine_config = Arc::new(EngineConfig {
            ports: self.config.ports.ports().to_vec(),
            timeout: self.config.timeout,
            threads: self.config.threads,
            plugin: self.config.plugin.clone(),
            users: self.config.users.clone(),
            passwords: self.config.passwords.clone(),
        });

        info!(
            "loaded {target_count} hosts, {} ports each, {planned} probes, {} hosts at a time",
            self.config.ports.count(),
            scheduler.capacity()
        );

        let mut launched = 0usize;
        for ip in targets {
            let Some(slot) = scheduler.acquire().await else {
                warn!("cancelled after launching {launched} of {target_count} hosts");
                break;
            };
            debug!("{ip} admitted");

            let target = ScanTarget {
                ip,
                active_port,
                sink: sink.clone(),
                progress: Arc::clone(&progress),
                throttle: Arc::clone(&throttle),
                cancel: cancel.child_token(),
            };
            let engine = Arc::clone(&self.engine);
            let engine_config = Arc::clone(&engine_config);

            tokio::spawn(async move {
                let _slot = slot; // freed when this host is done
                engine.scan_host(target, engine_config).await;
            });
            launched += 1;
        }

        scheduler.drain().await;
        drop(sink);

        let records = match collector.await {
            Ok(records) => records,
            Err(e) => {
                error!("aggregation task failed: {e}");
                Vec::new()
            }
        };

        progress.finish();

        RunReport {
            outcome: outcome_for(&cancel),
            target_count,
            planned_probes: planned,
            completed_probes: progress.done(),
            records,
            alive_hosts: Vec::new(),
            started_at,
            duration_ms: elapsed_ms(started_at),
        }
    }
}

fn outcome_for(cancel: &CancellationToken) -> RunOutcome {
    if cancel.is_cancelled() {
        RunOutcome::Cancelled
    } else {
        RunOutcome::Completed
    }
}

fn empty_report(outcome: RunOutcome, started_at: DateTime<Utc>) -> RunReport {
    RunReport {
        outcome,
        target_count: 0,
        planned_probes: 0,
        completed_probes: 0,
        records: Vec::new(),
        alive_hosts: Vec::new(),
        started_at,
        duration_ms: elapsed_ms(started_at),
    }
}

fn elapsed_ms(started_at: DateTime<Utc>) -> u64 {
    u64::try_from((Utc::now() - started_at).num_milliseconds()).unwrap_or(0)
}
