//! Collects probe findings into per-target records and the final run report.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_derive::Serialize;
use tokio::sync::mpsc;

/// Web service fingerprint attached to an HTTP-family finding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WebFingerprint {
    /// Page title of the service root.
    pub title: String,
    /// `Server` response header.
    pub server: String,
    /// HTTP status code of the fingerprinting request.
    pub status_code: Option<u16>,
    /// URL the fingerprint was taken from.
    pub url: String,
}

impl fmt::Display for WebFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self
            .status_code
            .map_or_else(|| "-".to_owned(), |c| c.to_string());
        write!(f, "[{} {} {} {}]", self.title, self.server, code, self.url)
    }
}

/// NetBIOS identity gathered from a Windows-family host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetBiosInfo {
    /// Address the NetBIOS layer announced; can differ from the scanned
    /// host on multi-homed machines.
    pub ip: String,
    /// Reported operating system string.
    pub os: String,
    /// Visible share names.
    pub shares: Vec<String>,
}

impl fmt::Display for NetBiosInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {} {}]", self.ip, self.os, self.shares.join(","))
    }
}

/// A credential pair a service accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Credential {
    /// Accepted username.
    pub user: String,
    /// Accepted password.
    pub pass: String,
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "crack:[{} {}]", self.user, self.pass)
    }
}

/// One observation the probing engine reports for a single (host, port).
///
/// A bare [`ProbeFinding::open`] records nothing but the open port; protocol
/// plugins enrich later findings for the same pair with whatever they
/// learned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeFinding {
    /// Host the observation belongs to.
    pub ip: Ipv4Addr,
    /// Port the observation belongs to.
    pub port: u16,
    /// Service or plugin name, e.g. `"http"` or `"smb"`.
    pub service: Option<String>,
    /// Raw banner bytes rendered lossily to text.
    pub banner: Option<String>,
    /// Web fingerprint, when the service speaks HTTP.
    pub web: Option<WebFingerprint>,
    /// NetBIOS identity, when the host exposes it.
    pub netbios: Option<NetBiosInfo>,
    /// Credential pair the service accepted, when a crack succeeded.
    pub credential: Option<Credential>,
}

impl ProbeFinding {
    /// A bare open-port observation, the minimum any probe reports.
    #[must_use]
    pub fn open(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            ip,
            port,
            service: None,
            banner: None,
            web: None,
            netbios: None,
            credential: None,
        }
    }

    /// One-line rendering in the classic `ip:port[Opened] details` shape,
    /// used for live logging as findings arrive.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let mut line = format!("{}:{}[Opened]", self.ip, self.port);
        if let Some(service) = &self.service {
            line.push_str(&format!(" {service}"));
        }
        if let Some(web) = &self.web {
            line.push_str(&format!(" {web}"));
        }
        if let Some(netbios) = &self.netbios {
            line.push_str(&format!(" {netbios}"));
        }
        if let Some(credential) = &self.credential {
            line.push_str(&format!(" {credential}"));
        }
        if let Some(banner) = &self.banner {
            line.push_str(&format!(" banner:{banner:?}"));
        }
        line
    }
}

/// Everything learned about one (host, port) over a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateRecord {
    /// Host the record belongs to.
    pub ip: Ipv4Addr,
    /// Port the record belongs to.
    pub port: u16,
    /// Service or plugin name.
    pub service: Option<String>,
    /// Captured banner.
    pub banner: Option<String>,
    /// Web fingerprint.
    pub web: Option<WebFingerprint>,
    /// NetBIOS identity.
    pub netbios: Option<NetBiosInfo>,
    /// Every distinct credential pair that was accepted.
    pub credentials: Vec<Credential>,
    /// When the first finding for this pair arrived.
    pub first_seen: DateTime<Utc>,
}

impl AggregateRecord {
    fn from_finding(finding: ProbeFinding) -> Self {
        Self {
            ip: finding.ip,
            port: finding.port,
            service: finding.service,
            banner: finding.banner,
            web: finding.web,
            netbios: finding.netbios,
            credentials: finding.credential.into_iter().collect(),
            first_seen: Utc::now(),
        }
    }

    /// Folds a later finding for the same (host, port) into this record.
    /// Fields that already hold a value keep it, empty fields fill in, and
    /// distinct credentials accumulate.
    fn absorb(&mut self, finding: ProbeFinding) {
        if self.service.is_none() {
            self.service = finding.service;
        }
        if self.banner.is_none() {
            self.banner = finding.banner;
        }
        if self.web.is_none() {
            self.web = finding.web;
        }
        if self.netbios.is_none() {
            self.netbios = finding.netbios;
        }
        if let Some(credential) = finding.credential {
            if !self.credentials.contains(&credential) {
                self.credentials.push(credential);
            }
        }
    }

    /// One-line rendering for the final text report.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let mut line = format!("{}:{}", self.ip, self.port);
        if let Some(service) = &self.service {
            line.push_str(&format!(" {service}"));
        }
        if let Some(web) = &self.web {
            line.push_str(&format!(" {web}"));
        }
        if let Some(netbios) = &self.netbios {
            line.push_str(&format!(" {netbios}"));
        }
        for credential in &self.credentials {
            line.push_str(&format!(" {credential}"));
        }
        if let Some(banner) = &self.banner {
            line.push_str(&format!(" banner:{banner:?}"));
        }
        line
    }
}

/// Handle the probing engine reports findings through.
///
/// Cheap to clone and safe to use from any task. Reporting never blocks or
/// fails: once aggregation has shut down, findings are dropped with a debug
/// log instead of an error.
#[derive(Debug, Clone)]
pub struct FindingSink {
    tx: mpsc::UnboundedSender<ProbeFinding>,
}

impl FindingSink {
    /// Reports one finding.
    pub fn report(&self, finding: ProbeFinding) {
        if let Err(e) = self.tx.send(finding) {
            debug!(
                "finding dropped, aggregation already closed: {}",
                e.0.summary_line()
            );
        }
    }
}

/// Single consumer that folds findings into per-(host, port) records.
#[derive(Debug)]
pub struct Aggregator {
    rx: mpsc::UnboundedReceiver<ProbeFinding>,
}

impl Aggregator {
    /// Creates the reporting channel and its aggregating consumer.
    #[must_use]
    pub fn channel() -> (FindingSink, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (FindingSink { tx }, Self { rx })
    }

    /// Consumes findings until every sink clone is dropped, then returns the
    /// merged records ordered by address and port.
    pub async fn collect(mut self) -> Vec<AggregateRecord> {
        let mut records: BTreeMap<(Ipv4Addr, u16), AggregateRecord> = BTreeMap::new();

        while let Some(finding) = self.rx.recv().await {
            info!("{}", finding.summary_line());
            match records.entry((finding.ip, finding.port)) {
                Entry::Occupied(mut entry) => entry.get_mut().absorb(finding),
                Entry::Vacant(entry) => {
                    entry.insert(AggregateRecord::from_finding(finding));
                }
            }
        }

        records.into_values().collect()
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every planned probe ran.
    Completed,
    /// The run was cancelled; in-flight host scans finished, the rest never
    /// started.
    Cancelled,
    /// The target specification expanded to nothing.
    NoTargets,
}

/// Final result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Hosts targeted after expansion.
    pub target_count: usize,
    /// Probes planned up front: targets times ports.
    pub planned_probes: u64,
    /// Probes that actually ran.
    pub completed_probes: u64,
    /// Merged findings, ordered by address and port.
    pub records: Vec<AggregateRecord>,
    /// Hosts a liveness pass found alive; empty on full scans.
    pub alive_hosts: Vec<Ipv4Addr>,
    /// Wall-clock start of the run.
    pub started_at: DateTime<Utc>,
    /// Run duration in milliseconds.
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::{Aggregator, Credential, ProbeFinding, WebFingerprint};

    fn host(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[tokio::test]
    async fn findings_for_one_pair_merge_into_one_record() {
        let (sink, aggregator) = Aggregator::channel();

        sink.report(ProbeFinding::open(host(1), 80));
        sink.report(ProbeFinding {
            service: Some("http".to_owned()),
            web: Some(WebFingerprint {
                title: "Login".to_owned(),
                server: "nginx".to_owned(),
                status_code: Some(200),
                url: "http://10.0.0.1:80".to_owned(),
            }),
            ..ProbeFinding::open(host(1), 80)
        });
        drop(sink);

        let records = aggregator.collect().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].service.as_deref(), Some("http"));
        assert_eq!(records[0].web.as_ref().unwrap().server, "nginx");
    }

    #[tokio::test]
    async fn first_value_wins_on_conflicting_findings() {
        let (sink, aggregator) = Aggregator::channel();

        sink.report(ProbeFinding {
            service: Some("http".to_owned()),
            ..ProbeFinding::open(host(1), 8080)
        });
        sink.report(ProbeFinding {
            service: Some("http-proxy".to_owned()),
            banner: Some("HTTP/1.1 400".to_owned()),
            ..ProbeFinding::open(host(1), 8080)
        });
        drop(sink);

        let records = aggregator.collect().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].service.as_deref(), Some("http"));
        assert_eq!(records[0].banner.as_deref(), Some("HTTP/1.1 400"));
    }

    #[tokio::test]
    async fn distinct_credentials_accumulate_without_duplicates() {
        let (sink, aggregator) = Aggregator::channel();

        for (user, pass) in [("root", "root"), ("root", "toor"), ("root", "root")] {
            sink.report(ProbeFinding {
                credential: Some(Credential {
                    user: user.to_owned(),
                    pass: pass.to_owned(),
                }),
                ..ProbeFinding::open(host(2), 22)
            });
        }
        drop(sink);

        let records = aggregator.collect().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].credentials.len(), 2);
    }

    #[tokio::test]
    async fn records_come_back_ordered_by_address_and_port() {
        let (sink, aggregator) = Aggregator::channel();

        sink.report(ProbeFinding::open(host(9), 22));
        sink.report(ProbeFinding::open(host(1), 443));
        sink.report(ProbeFinding::open(host(1), 80));
        drop(sink);

        let records = aggregator.collect().await;
        let pairs: Vec<_> = records.iter().map(|r| (r.ip, r.port)).collect();
        assert_eq!(
            pairs,
            [(host(1), 80), (host(1), 443), (host(9), 22)]
        );
    }

    #[tokio::test]
    async fn reporting_after_shutdown_is_quietly_dropped() {
        let (sink, aggregator) = Aggregator::channel();
        drop(aggregator);

        sink.report(ProbeFinding::open(host(3), 21));
    }

    #[test]
    fn summary_line_keeps_the_classic_shape() {
        let finding = ProbeFinding {
            service: Some("smb".to_owned()),
            credential: Some(Credential {
                user: "admin".to_owned(),
                pass: "admin123".to_owned(),
            }),
            ..ProbeFinding::open(host(7), 445)
        };

        assert_eq!(
            finding.summary_line(),
            "10.0.0.7:445[Opened] smb crack:[admin admin123]"
        );
    }
}
