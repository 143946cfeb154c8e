//! Built-in TCP connect engine: full-connect probes with passive banner
//! grabs, no privileges required.

use std::collections::{BTreeMap, HashMap};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::debug;
use once_cell::sync::Lazy;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;

use super::{EngineConfig, PingSweep, ProbeEngine, ScanTarget, SweepScope};
use crate::report::ProbeFinding;

/// Ports tried when checking whether a host answers at all.
const CANARY_PORTS: [u16; 6] = [80, 443, 22, 445, 139, 3389];

/// Representatives probed per network during a network-scope sweep, on top
/// of the gateway candidates.
const NETWORK_REPRESENTATIVES: usize = 3;

static SERVICE_NAMES: Lazy<HashMap<u16, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (21, "ftp"),
        (22, "ssh"),
        (23, "telnet"),
        (25, "smtp"),
        (53, "dns"),
        (80, "http"),
        (81, "http"),
        (110, "pop3"),
        (111, "rpcbind"),
        (135, "msrpc"),
        (139, "smb"),
        (143, "imap"),
        (161, "snmp"),
        (389, "ldap"),
        (443, "https"),
        (445, "smb"),
        (465, "smtps"),
        (512, "rexec"),
        (513, "rlogin"),
        (514, "rsh"),
        (515, "printer"),
        (587, "smtp"),
        (636, "ldaps"),
        (873, "rsync"),
        (990, "ftps"),
        (993, "imaps"),
        (995, "pop3s"),
        (1080, "socks5"),
        (1433, "mssql"),
        (1521, "oracle"),
        (1723, "pptp"),
        (2049, "nfs"),
        (2181, "zookeeper"),
        (2375, "docker"),
        (3128, "squid"),
        (3306, "mysql"),
        (3389, "rdp"),
        (5432, "postgres"),
        (5900, "vnc"),
        (5901, "vnc"),
        (5902, "vnc"),
        (6379, "redis"),
        (7001, "weblogic"),
        (8443, "https"),
        (9000, "php-fpm"),
        (9090, "http"),
        (9200, "elasticsearch"),
        (11211, "memcached"),
        (27017, "mongodb"),
    ])
});

fn service_name(port: u16) -> Option<&'static str> {
    SERVICE_NAMES
        .get(&port)
        .copied()
        .or_else(|| matches!(port, 8000..=8010 | 8080..=8090).then_some("http"))
}

fn plugin_selected(config: &EngineConfig, service: Option<&str>) -> bool {
    config
        .plugin
        .as_deref()
        .map_or(true, |selected| service == Some(selected))
}

/// TCP connect probing engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectEngine;

#[async_trait]
impl ProbeEngine for ConnectEngine {
    async fn scan_host(&self, target: ScanTarget, config: Arc<EngineConfig>) {
        if let Some(port) = target.active_port {
            debug!("{}: calibrating against known-open port {port}", target.ip);
        }

        let fan_out = usize::from(config.threads.max(1));
        let target_ref = &target;
        let config_ref = &*config;

        stream::iter(config.ports.iter().copied())
            .for_each_concurrent(fan_out, |port| async move {
                probe_port(target_ref, config_ref, port).await;
            })
            .await;
    }

    async fn ping_sweep(&self, sweep: PingSweep) -> Vec<Ipv4Addr> {
        match sweep.scope {
            SweepScope::Hosts => probe_liveness(sweep.targets.clone(), &sweep).await,
            SweepScope::Networks => {
                let mut networks: BTreeMap<Ipv4Addr, Vec<Ipv4Addr>> = BTreeMap::new();
                for &ip in &sweep.targets {
                    let reps = networks.entry(network_base(ip)).or_default();
                    if reps.len() < NETWORK_REPRESENTATIVES {
                        reps.push(ip);
                    }
                }

                let mut alive_networks = Vec::new();
                for (base, mut reps) in networks {
                    // Gateways commonly sit at .1 and .254.
                    let [a, b, c, _] = base.octets();
                    reps.push(Ipv4Addr::new(a, b, c, 1));
                    reps.push(Ipv4Addr::new(a, b, c, 254));
                    reps.sort_unstable();
                    reps.dedup();

                    if !probe_liveness(reps, &sweep).await.is_empty() {
                        alive_networks.push(base);
                    }
                }
                alive_networks
            }
        }
    }
}

/// Probes one port of one host, advancing progress exactly once no matter
/// how the probe ends.
async fn probe_port(target: &ScanTarget, config: &EngineConfig, port: u16) {
    if !target.cancel.is_cancelled() && target.throttle.take(&target.cancel).await {
        if let Some(mut stream) = connect(target.ip, port, config.timeout).await {
            let service = service_name(port);
            if plugin_selected(config, service) {
                let banner = read_banner(&mut stream).await;
                target.sink.report(ProbeFinding {
                    service: service.map(str::to_owned),
                    banner,
                    ..ProbeFinding::open(target.ip, port)
                });
            }
            if let Err(e) = stream.shutdown().await {
                debug!("{}:{port} shutdown failed: {e}", target.ip);
            }
        }
    }

    target.progress.advance(1);
}

async fn connect(ip: Ipv4Addr, port: u16, timeout: Duration) -> Option<TcpStream> {
    let addr = SocketAddr::from((ip, port));
    match time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Some(stream),
        _ => None,
    }
}

/// Short, passive banner read: up to 256 bytes within 200ms, rendered
/// lossily with line breaks escaped.
async fn read_banner(stream: &mut TcpStream) -> Option<String> {
    let mut buf = vec![0u8; 256];
    match time::timeout(Duration::from_millis(200), stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => {
            buf.truncate(n);
            let banner = String::from_utf8_lossy(&buf)
                .replace('\n', "\\n")
                .replace('\r', "\\r");
            Some(banner)
        }
        _ => None,
    }
}

async fn probe_liveness(candidates: Vec<Ipv4Addr>, sweep: &PingSweep) -> Vec<Ipv4Addr> {
    let fan_out = usize::from(sweep.threads.max(1));
    let cancel = &sweep.cancel;
    let timeout = sweep.timeout;

    let mut alive: Vec<Ipv4Addr> = stream::iter(candidates)
        .map(|ip| async move {
            if cancel.is_cancelled() {
                return None;
            }
            host_answers(ip, timeout).await.then_some(ip)
        })
        .buffer_unordered(fan_out)
        .filter_map(|hit| async move { hit })
        .collect()
        .await;

    alive.sort_unstable();
    alive.dedup();
    alive
}

async fn host_answers(ip: Ipv4Addr, timeout: Duration) -> bool {
    for port in CANARY_PORTS {
        if connect(ip, port, timeout).await.is_some() {
            return true;
        }
    }
    false
}

fn network_base(ip: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) & 0xffff_ff00)
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    use super::{network_base, service_name, ConnectEngine};
    use crate::probe::{EngineConfig, ProbeEngine, ScanTarget};
    use crate::progress::Progress;
    use crate::report::Aggregator;
    use crate::throttle::Throttle;

    fn engine_config(ports: Vec<u16>, plugin: Option<&str>) -> Arc<EngineConfig> {
        Arc::new(EngineConfig {
            ports,
            timeout: Duration::from_millis(500),
            threads: 4,
            plugin: plugin.map(str::to_owned),
            users: Vec::new(),
            passwords: Vec::new(),
        })
    }

    fn target(progress: &Arc<Progress>, sink: crate::report::FindingSink) -> ScanTarget {
        ScanTarget {
            ip: Ipv4Addr::LOCALHOST,
            active_port: None,
            sink,
            progress: Arc::clone(progress),
            throttle: Arc::new(Throttle::new(0)),
            cancel: CancellationToken::new(),
        }
    }

    async fn loopback_listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn common_services_are_named() {
        assert_eq!(service_name(80), Some("http"));
        assert_eq!(service_name(8088), Some("http"));
        assert_eq!(service_name(445), Some("smb"));
        assert_eq!(service_name(6379), Some("redis"));
        assert_eq!(service_name(49152), None);
    }

    #[test]
    fn network_base_clears_the_host_octet() {
        assert_eq!(
            network_base(Ipv4Addr::new(192, 168, 3, 77)),
            Ipv4Addr::new(192, 168, 3, 0)
        );
    }

    #[tokio::test]
    async fn open_loopback_port_produces_a_finding() {
        let (listener, port) = loopback_listener().await;
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let (sink, aggregator) = Aggregator::channel();
        let progress = Arc::new(Progress::new(1));

        ConnectEngine
            .scan_host(target(&progress, sink), engine_config(vec![port], None))
            .await;

        let records = aggregator.collect().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ip, Ipv4Addr::LOCALHOST);
        assert_eq!(records[0].port, port);
        assert_eq!(progress.done(), 1);
    }

    #[tokio::test]
    async fn closed_port_advances_progress_without_findings() {
        let (listener, port) = loopback_listener().await;
        drop(listener);

        let (sink, aggregator) = Aggregator::channel();
        let progress = Arc::new(Progress::new(1));

        ConnectEngine
            .scan_host(target(&progress, sink), engine_config(vec![port], None))
            .await;

        assert!(aggregator.collect().await.is_empty());
        assert_eq!(progress.done(), 1);
    }

    #[tokio::test]
    async fn unselected_plugin_suppresses_the_finding_but_not_progress() {
        let (listener, port) = loopback_listener().await;
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                drop(stream);
            }
        });

        let (sink, aggregator) = Aggregator::channel();
        let progress = Arc::new(Progress::new(1));

        ConnectEngine
            .scan_host(
                target(&progress, sink),
                engine_config(vec![port], Some("ssh")),
            )
            .await;

        assert!(aggregator.collect().await.is_empty());
        assert_eq!(progress.done(), 1);
    }

    #[tokio::test]
    async fn cancelled_host_scan_still_accounts_every_port() {
        let (sink, aggregator) = Aggregator::channel();
        let progress = Arc::new(Progress::new(3));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let target = ScanTarget {
            cancel,
            ..target(&progress, sink)
        };

        ConnectEngine
            .scan_host(target, engine_config(vec![79, 80, 81], None))
            .await;

        assert!(aggregator.collect().await.is_empty());
        assert_eq!(progress.done(), 3);
    }
}
