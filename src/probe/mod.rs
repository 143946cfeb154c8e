//! Seam between the orchestrator and the probing engine.
//!
//! The orchestrator expands targets, schedules hosts, and aggregates
//! findings; everything protocol-shaped happens behind [`ProbeEngine`]. The
//! built-in [`ConnectEngine`] covers TCP connect probing with banner grabs,
//! and the integration tests substitute instrumented engines through the
//! same trait.

mod connect;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::progress::Progress;
use crate::report::FindingSink;
use crate::throttle::Throttle;

pub use connect::ConnectEngine;

/// One host's scan order: the address plus the shared run services the
/// engine draws on while working it.
#[derive(Debug, Clone)]
pub struct ScanTarget {
    /// Host to scan.
    pub ip: Ipv4Addr,
    /// Port known to be open on this host, forwarded only on single-host
    /// runs so the engine can calibrate against throttling defenses.
    pub active_port: Option<u16>,
    /// Where findings are reported.
    pub sink: FindingSink,
    /// Advanced exactly once per port in the run's port list.
    pub progress: Arc<Progress>,
    /// Outbound rate limiter shared with every other host's scan.
    pub throttle: Arc<Throttle>,
    /// Cancels this host's remaining work.
    pub cancel: CancellationToken,
}

/// Engine parameters fixed for a whole run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ports probed on every host, ascending and duplicate-free.
    pub ports: Vec<u16>,
    /// Per-probe network timeout.
    pub timeout: Duration,
    /// Worker fan-out inside one host's scan.
    pub threads: u16,
    /// When set, only this plugin's service may produce findings. Ports are
    /// still probed so progress accounting stays exact.
    pub plugin: Option<String>,
    /// Username dictionary for credential-probing plugins.
    pub users: Vec<String>,
    /// Password dictionary for credential-probing plugins.
    pub passwords: Vec<String>,
}

/// Granularity of a liveness pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepScope {
    /// Report each answering host.
    Hosts,
    /// Report each /24 network with at least one answering host, as its
    /// network base address.
    Networks,
}

/// A liveness pass order.
#[derive(Debug, Clone)]
pub struct PingSweep {
    /// Hosts under consideration.
    pub targets: Vec<Ipv4Addr>,
    /// Whether hosts or whole networks are reported.
    pub scope: SweepScope,
    /// Per-check network timeout.
    pub timeout: Duration,
    /// Worker fan-out.
    pub threads: u16,
    /// Cancels the sweep.
    pub cancel: CancellationToken,
}

/// Contract between the orchestrator and whatever does the per-host work.
///
/// The orchestrator schedules and cancels; implementations probe. An
/// implementation must advance `target.progress` exactly once per port in
/// the run's port list, whether the probe succeeded, failed, or was skipped
/// after cancellation, and must wind down promptly once `target.cancel`
/// fires.
#[async_trait]
pub trait ProbeEngine: Send + Sync {
    /// Scans every configured port of one host, reporting findings through
    /// the target's sink. Per-probe failures stay inside the engine.
    async fn scan_host(&self, target: ScanTarget, config: Arc<EngineConfig>);

    /// Checks which targets answer at all, producing no findings.
    async fn ping_sweep(&self, sweep: PingSweep) -> Vec<Ipv4Addr>;
}
