//! Provides a means to read, parse and hold configuration options for scan runs.
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use itertools::Itertools;
use once_cell::sync::Lazy;
use serde_derive::Deserialize;

use crate::error::{Result, ScanError};

/// Curated default port specification: the services a credential audit
/// actually brute-forces, plus the web and database ports whose findings
/// enrich a report.
pub const DEFAULT_PORT_SPEC: &str = "21-23,25,53,80,81,110,111,135,139,143,161,389,443,445,465,512-515,587,636,873,990,993,995,1080,1433,1521,1723,2049,2181,2375,3128,3306,3389,5432,5900-5902,6379,7001,8000-8010,8080-8090,8443,9000,9090,9200,11211,27017";

static DEFAULT_PORTS: Lazy<PortSpec> =
    Lazy::new(|| PortSpec::parse(DEFAULT_PORT_SPEC).expect("default port specification parses"));

/// How much of the pipeline a run executes.
///
/// Folded exactly once from the two liveness CLI flags, so ambiguous flag
/// combinations cannot reach the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Expand targets and run the full probe pipeline.
    FullScan,
    /// Liveness pass over the target networks only; no port probes.
    PingNetworkOnly,
    /// Liveness pass over every target host; no port probes.
    PingHostsOnly,
}

impl ScanMode {
    /// Folds the `only-alive-network`/`alive-host-check` flag pair into one
    /// mode. The host check wins when both flags are set.
    #[must_use]
    pub fn from_flags(only_alive_network: bool, alive_host_check: bool) -> Self {
        if alive_host_check {
            Self::PingHostsOnly
        } else if only_alive_network {
            Self::PingNetworkOnly
        } else {
            Self::FullScan
        }
    }
}

/// A parsed port specification.
///
/// Carries both the normalized range string handed to the probing engine and
/// the deduplicated, fully expanded port list that progress accounting is
/// sized from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    spec: String,
    ports: Vec<u16>,
}

impl PortSpec {
    /// Parses a comma-separated mix of single ports and inclusive `a-b`
    /// ranges, e.g. `"21-23,80,8000-8010"`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut ports = Vec::new();

        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            if let Some((start, end)) = part.split_once('-') {
                let start = parse_port(start, part)?;
                let end = parse_port(end, part)?;
                if start > end {
                    return Err(ScanError::Parse(format!(
                        "port range {part:?} ends before it starts"
                    )));
                }
                ports.extend(start..=end);
            } else {
                ports.push(parse_port(part, part)?);
            }
        }

        if ports.is_empty() {
            return Err(ScanError::Parse(format!("no ports in {input:?}")));
        }

        ports.sort_unstable();
        ports.dedup();

        Ok(Self {
            spec: collapse_runs(&ports),
            ports,
        })
    }

    /// The curated default set used when no `port-list` option is given.
    #[must_use]
    pub fn default_set() -> Self {
        DEFAULT_PORTS.clone()
    }

    /// Normalized range string, e.g. `"21-23,80,443"`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.spec
    }

    /// Expanded, duplicate-free ports in ascending order.
    #[must_use]
    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    /// Number of distinct ports; one planned probe per port per host.
    #[must_use]
    pub fn count(&self) -> usize {
        self.ports.len()
    }
}

fn parse_port(text: &str, context: &str) -> Result<u16> {
    let text = text.trim();
    let port: u16 = text
        .parse()
        .map_err(|_| ScanError::Parse(format!("invalid port {text:?} in {context:?}")))?;
    if port == 0 {
        return Err(ScanError::Parse(format!(
            "port 0 is not scannable in {context:?}"
        )));
    }
    Ok(port)
}

/// Rebuilds the canonical spec string from a sorted, deduplicated port list,
/// collapsing consecutive ports back into `a-b` segments.
fn collapse_runs(ports: &[u16]) -> String {
    let mut segments: Vec<String> = Vec::new();
    let mut i = 0;
    while i < ports.len() {
        let start = ports[i];
        let mut end = start;
        while i + 1 < ports.len() && ports[i + 1] == end + 1 {
            i += 1;
            end = ports[i];
        }
        segments.push(if start == end {
            start.to_string()
        } else {
            format!("{start}-{end}")
        });
        i += 1;
    }
    segments.iter().join(",")
}

/// Where a `user-list`/`pass-list` value comes from.
///
/// The value is classified exactly once, while the run configuration is
/// being constructed; nothing later in the pipeline probes the filesystem to
/// guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordlistSource {
    /// The value itself, split on commas.
    Inline(Vec<String>),
    /// A file with one entry per line.
    File(PathBuf),
}

impl WordlistSource {
    /// Classifies a raw option value: a value naming an existing file loads
    /// from that file, anything else is an inline comma-separated list.
    #[must_use]
    pub fn classify(value: &str) -> Self {
        let path = Path::new(value);
        if path.is_file() {
            Self::File(path.to_path_buf())
        } else {
            Self::Inline(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_owned)
                    .collect(),
            )
        }
    }

    /// Resolves the source into its entries, dropping blank lines.
    pub fn load(&self) -> Result<Vec<String>> {
        match self {
            Self::Inline(entries) => Ok(entries.clone()),
            Self::File(path) => {
                let content = fs::read_to_string(path).map_err(|source| ScanError::Wordlist {
                    path: path.clone(),
                    source,
                })?;
                Ok(content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_owned)
                    .collect())
            }
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "superscan",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nOPTIONS:\n{options}",
)]
#[allow(clippy::struct_excessive_bools)]
/// Network reconnaissance and credential-audit orchestrator.
/// WARNING Only scan infrastructure you are authorized to test. The --pps
/// rate limit exists so the target's defenses do not have to make that point
/// for you.
pub struct Opts {
    /// Target specification: a single IP, a range "a.b.c.S-a.b.c.E", a CIDR
    /// block, a comma-separated mix of those, or "$IP" to substitute hosts
    /// discovered by a previous liveness pass.
    #[arg(short, long, default_value = "127.0.0.1")]
    pub ip: String,

    /// Ports and/or port ranges probed on every host. Examples: 80,443 or
    /// 1-1000 or 21-23,80,8000-8010. Defaults to a curated common-service
    /// set.
    #[arg(short, long)]
    pub port_list: Option<String>,

    /// Per-probe network timeout in milliseconds.
    #[arg(short, long, default_value = "3000")]
    pub timeout: u64,

    /// Worker fan-out inside one host's scan (probing-engine parameter).
    #[arg(long, default_value = "128")]
    pub thread: u16,

    /// Global outbound rate limit in packets per second; 0 disables
    /// limiting.
    #[arg(long, default_value = "0")]
    pub pps: u32,

    /// Run a single protocol plugin exclusively (probing-engine parameter).
    #[arg(long)]
    pub plugin: Option<String>,

    /// Usernames for credential probes: inline "u1,u2,u3" or a file with
    /// one entry per line.
    #[arg(long)]
    pub user_list: Option<String>,

    /// Passwords for credential probes: inline "p1,p2,p3" or a file with
    /// one entry per line.
    #[arg(long)]
    pub pass_list: Option<String>,

    /// A port known to be open on the target, used by the probing engine as
    /// a canary to detect throttling and adapt its pacing. Honored only when
    /// exactly one host is scanned.
    #[arg(long, alias = "alive_port")]
    pub alive_port: Option<u16>,

    /// Only check which target networks are alive; no port probes.
    #[arg(long)]
    pub only_alive_network: bool,

    /// Only check which target hosts are alive; no port probes.
    #[arg(long)]
    pub alive_host_check: bool,

    /// Maximum number of hosts scanned concurrently.
    #[arg(long, default_value = "32")]
    pub max_concurrency_ip: usize,

    /// Whether to ignore the configuration file or not.
    #[arg(short, long)]
    pub no_config: bool,

    /// Custom path to config file
    #[arg(short, long, value_parser)]
    pub config_path: Option<PathBuf>,

    /// Emit the final report as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[cfg(not(tarpaulin_include))]
impl Opts {
    /// Reads the command line arguments into an `Opts` struct.
    pub fn read() -> Self {
        Self::parse()
    }

    /// Merges values found within the user configuration file into the
    /// parsed command line arguments.
    pub fn merge(&mut self, config: &Config) {
        if !self.no_config {
            self.merge_required(config);
            self.merge_optional(config);
        }
    }

    fn merge_required(&mut self, config: &Config) {
        macro_rules! merge_required {
            ($($field: ident),+) => {
                $(
                    if let Some(e) = &config.$field {
                        self.$field = e.clone();
                    }
                )+
            }
        }

        merge_required!(
            ip,
            timeout,
            thread,
            pps,
            only_alive_network,
            alive_host_check,
            max_concurrency_ip,
            json
        );
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if config.$field.is_some() {
                        self.$field = config.$field.clone();
                    }
                )+
            }
        }

        merge_optional!(port_list, plugin, user_list, pass_list, alive_port);
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_owned(),
            port_list: None,
            timeout: 3000,
            thread: 128,
            pps: 0,
            plugin: None,
            user_list: None,
            pass_list: None,
            alive_port: None,
            only_alive_network: false,
            alive_host_check: false,
            max_concurrency_ip: 32,
            no_config: true,
            config_path: None,
            json: false,
        }
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final `Opts` struct.
#[cfg(not(tarpaulin_include))]
#[derive(Debug, Deserialize)]
pub struct Config {
    ip: Option<String>,
    port_list: Option<String>,
    timeout: Option<u64>,
    thread: Option<u16>,
    pps: Option<u32>,
    plugin: Option<String>,
    user_list: Option<String>,
    pass_list: Option<String>,
    alive_port: Option<u16>,
    only_alive_network: Option<bool>,
    alive_host_check: Option<bool>,
    max_concurrency_ip: Option<usize>,
    json: Option<bool>,
}

#[cfg(not(tarpaulin_include))]
impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// `Config` struct.
    ///
    /// # Format
    ///
    /// ip = "10.0.0.1-10.0.0.255"
    /// port_list = "21-23,80,443"
    /// pps = 500
    /// max_concurrency_ip = 16
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> Self {
        let mut content = String::new();
        let config_path = custom_config_path.unwrap_or_else(default_config_path);
        if config_path.exists() {
            content = fs::read_to_string(config_path).unwrap_or_default();
        }

        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                println!("Found {e} in configuration file.\nAborting scan.\n");
                std::process::exit(1);
            }
        }
    }
}

/// Constructs default path to config toml
#[must_use]
pub fn default_config_path() -> PathBuf {
    let Some(mut config_path) = dirs::home_dir() else {
        panic!("Could not infer config file path.");
    };
    config_path.push(".superscan.toml");
    config_path
}

/// Everything one run needs, constructed once and handed to the runner by
/// value.
///
/// There is no process-wide configuration state: several runs with different
/// configurations can coexist in one process, which is exactly what the
/// integration tests do.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Raw target specification, expanded by the runner.
    pub ip: String,
    /// Hosts discovered by a companion liveness/analysis pass; substituted
    /// for the `$IP` marker during expansion.
    pub discovered_hosts: Vec<Ipv4Addr>,
    /// Ports probed on every host.
    pub ports: PortSpec,
    /// Per-probe timeout.
    pub timeout: Duration,
    /// Worker fan-out inside one host's scan.
    pub threads: u16,
    /// Outbound packets per second; 0 = unlimited.
    pub pps: u32,
    /// Exclusive protocol plugin, if any.
    pub plugin: Option<String>,
    /// Username dictionary for credential probes.
    pub users: Vec<String>,
    /// Password dictionary for credential probes.
    pub passwords: Vec<String>,
    /// Known-open calibration port; only forwarded on single-host runs.
    pub alive_port: Option<u16>,
    /// What the run executes.
    pub mode: ScanMode,
    /// Cap on simultaneously scanned hosts.
    pub max_concurrency: usize,
    /// Mirror progress on an interactive bar.
    pub show_bar: bool,
}

impl RunConfig {
    /// Builds the run configuration from parsed options.
    ///
    /// All parsing and classification happens here: port specs are expanded,
    /// wordlist values are loaded, and the liveness flags fold into a
    /// [`ScanMode`], so a malformed specification fails before anything is
    /// scheduled.
    pub fn from_opts(opts: &Opts) -> Result<Self> {
        let ports = match &opts.port_list {
            Some(spec) => PortSpec::parse(spec)?,
            None => PortSpec::default_set(),
        };
        let users = load_wordlist(opts.user_list.as_deref())?;
        let passwords = load_wordlist(opts.pass_list.as_deref())?;

        Ok(Self {
            ip: opts.ip.clone(),
            discovered_hosts: Vec::new(),
            ports,
            timeout: Duration::from_millis(opts.timeout),
            threads: opts.thread,
            pps: opts.pps,
            plugin: opts.plugin.clone(),
            users,
            passwords,
            alive_port: opts.alive_port,
            mode: ScanMode::from_flags(opts.only_alive_network, opts.alive_host_check),
            max_concurrency: opts.max_concurrency_ip,
            show_bar: !opts.json,
        })
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_owned(),
            discovered_hosts: Vec::new(),
            ports: PortSpec::default_set(),
            timeout: Duration::from_millis(3000),
            threads: 128,
            pps: 0,
            plugin: None,
            users: Vec::new(),
            passwords: Vec::new(),
            alive_port: None,
            mode: ScanMode::FullScan,
            max_concurrency: 32,
            show_bar: false,
        }
    }
}

fn load_wordlist(value: Option<&str>) -> Result<Vec<String>> {
    value
        .map(|v| WordlistSource::classify(v).load())
        .transpose()
        .map(Option::unwrap_or_default)
}
