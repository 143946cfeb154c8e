//! Target expansion behavior observed through full runs.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use superscan::input::{PortSpec, RunConfig};
use superscan::probe::{EngineConfig, PingSweep, ProbeEngine, ScanTarget};
use superscan::scanner::ScanRunner;
use superscan::ScanError;

/// Remembers every host it was asked to scan.
#[derive(Default)]
struct VisitEngine {
    visited: Mutex<Vec<Ipv4Addr>>,
}

#[async_trait]
impl ProbeEngine for VisitEngine {
    async fn scan_host(&self, target: ScanTarget, config: Arc<EngineConfig>) {
        self.visited.lock().unwrap().push(target.ip);
        target.progress.advance(config.ports.len() as u64);
    }

    async fn ping_sweep(&self, _sweep: PingSweep) -> Vec<Ipv4Addr> {
        Vec::new()
    }
}

fn config(ip: &str, ports: &str) -> RunConfig {
    RunConfig {
        ip: ip.to_owned(),
        ports: PortSpec::parse(ports).unwrap(),
        ..RunConfig::default()
    }
}

#[tokio::test]
async fn every_expanded_address_is_visited_exactly_once() {
    let engine = Arc::new(VisitEngine::default());
    let runner = ScanRunner::new(
        config("10.3.0.254-10.3.1.2, 192.168.0.0/30", "80"),
        Arc::clone(&engine) as Arc<dyn ProbeEngine>,
    );

    let report = runner.run(CancellationToken::new()).await.unwrap();

    let visited = engine.visited.lock().unwrap();
    assert_eq!(report.target_count, 9);
    assert_eq!(visited.len(), 9);
    // The range rolls over from .254 into the next /24.
    assert!(visited.contains(&Ipv4Addr::new(10, 3, 1, 0)));
    assert!(visited.contains(&Ipv4Addr::new(10, 3, 1, 2)));
    assert!(visited.contains(&Ipv4Addr::new(192, 168, 0, 3)));
}

#[tokio::test]
async fn discovered_hosts_substitute_the_marker() {
    let engine = Arc::new(VisitEngine::default());
    let discovered = vec![Ipv4Addr::new(172, 16, 5, 8), Ipv4Addr::new(172, 16, 5, 20)];
    let runner = ScanRunner::new(
        RunConfig {
            discovered_hosts: discovered.clone(),
            ..config("$IP,10.3.0.1", "80")
        },
        Arc::clone(&engine) as Arc<dyn ProbeEngine>,
    );

    runner.run(CancellationToken::new()).await.unwrap();

    let visited = engine.visited.lock().unwrap();
    assert_eq!(visited.len(), 3);
    assert_eq!(visited[0], discovered[0]);
    assert_eq!(visited[1], discovered[1]);
    assert_eq!(visited[2], Ipv4Addr::new(10, 3, 0, 1));
}

#[tokio::test]
async fn planned_probes_are_the_target_port_product() {
    let engine = Arc::new(VisitEngine::default());
    let runner = ScanRunner::new(
        config("10.3.2.1-10.3.2.6", "21-23,80"),
        Arc::clone(&engine) as Arc<dyn ProbeEngine>,
    );

    let report = runner.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.planned_probes, 24);
    assert_eq!(report.completed_probes, 24);
}

#[tokio::test]
async fn malformed_segment_aborts_the_whole_run() {
    let engine = Arc::new(VisitEngine::default());
    let runner = ScanRunner::new(
        config("10.3.0.1,10.3.0.9-10.3.0.5", "80"),
        Arc::clone(&engine) as Arc<dyn ProbeEngine>,
    );

    let result = runner.run(CancellationToken::new()).await;

    assert!(matches!(result, Err(ScanError::Parse(_))));
    assert!(engine.visited.lock().unwrap().is_empty());
}
