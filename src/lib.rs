//! This crate exposes the orchestration core of the superscan network
//! reconnaissance and credential-audit tool.
//!
//! superscan sweeps IP ranges for reachable services, fingerprints what it
//! finds, and hands credential dictionaries to protocol plugins, all under a
//! single run-wide concurrency cap and outbound rate budget. The crate holds
//! the machinery that makes such a run predictable: expansion, scheduling,
//! throttling, progress accounting, and finding aggregation. Protocol
//! knowledge lives behind the [`probe::ProbeEngine`] seam.
//!
//! ## Key Capabilities
//!
//! - **Range expansion**: single addresses, `start-end` ranges that carry
//!   across octet boundaries, CIDR blocks, and a `$IP` marker for hosts
//!   discovered by an earlier pass
//! - **Bounded concurrency**: at most a configured number of hosts are
//!   scanned at once, admitted in specification order
//! - **Shared rate limiting**: one token bucket meters every outbound probe
//!   of a run, no matter how many hosts are in flight
//! - **Exact progress accounting**: the probe total is known before the
//!   first connect, so interactive runs get a truthful progress bar
//! - **Typed findings**: open ports, banners, web fingerprints, NetBIOS
//!   identities, and cracked credentials merge into one record per
//!   (host, port)
//! - **Prompt cancellation**: a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken) stops new
//!   work immediately while in-flight scans wind down and keep their findings
//!
//! ## Architecture Overview
//!
//! A run is driven by [`ScanRunner`](crate::scanner::ScanRunner) and flows
//! through five stages:
//!
//! 1. **Input processing**: CLI options and the TOML config merge into a
//!    [`RunConfig`](crate::input::RunConfig); wordlists and port lists are
//!    resolved up front
//! 2. **Target expansion**: the specification becomes a concrete address
//!    list, or the run ends early with a `NoTargets` outcome
//! 3. **Scheduling**: hosts are launched through a slot-based
//!    [`Scheduler`](crate::scanner::Scheduler) that enforces the concurrency
//!    cap and honors cancellation between launches
//! 4. **Probing**: the configured [`ProbeEngine`](crate::probe::ProbeEngine)
//!    works each host, drawing send tokens from the shared
//!    [`Throttle`](crate::throttle::Throttle)
//! 5. **Aggregation**: findings stream into the
//!    [`Aggregator`](crate::report::Aggregator), which folds them into the
//!    final [`RunReport`](crate::report::RunReport)
//!
//! ## Basic Usage Example
//!
//! The following example runs the built-in TCP connect engine against
//! localhost:
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use tokio_util::sync::CancellationToken;
//!
//! use superscan::input::{PortSpec, RunConfig};
//! use superscan::probe::ConnectEngine;
//! use superscan::scanner::ScanRunner;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig {
//!         ip: "127.0.0.1".to_owned(),
//!         ports: PortSpec::parse("22,80,443")?,
//!         ..RunConfig::default()
//!     };
//!
//!     let runner = ScanRunner::new(config, Arc::new(ConnectEngine));
//!
//!     let runtime = tokio::runtime::Runtime::new()?;
//!     let report = runtime.block_on(runner.run(CancellationToken::new()))?;
//!
//!     println!(
//!         "{} probes completed, {} findings",
//!         report.completed_probes,
//!         report.records.len()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ### Sweeping a Range Under a Rate Budget
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use tokio_util::sync::CancellationToken;
//! # use superscan::input::{PortSpec, RunConfig};
//! # use superscan::probe::ConnectEngine;
//! # use superscan::scanner::ScanRunner;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // 300 packets per second across the whole run, 16 hosts at a time.
//! let config = RunConfig {
//!     ip: "192.168.1.1-192.168.2.254,10.0.0.0/28".to_owned(),
//!     ports: PortSpec::parse("21-23,80,443,3306,6379")?,
//!     pps: 300,
//!     max_concurrency: 16,
//!     ..RunConfig::default()
//! };
//!
//! let runner = ScanRunner::new(config, Arc::new(ConnectEngine));
//! let runtime = tokio::runtime::Runtime::new()?;
//! let report = runtime.block_on(runner.run(CancellationToken::new()))?;
//!
//! for record in &report.records {
//!     println!("{}", record.summary_line());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Only faults that abort a run before any probe is scheduled surface as
//! [`ScanError`]: malformed specifications and unreadable wordlist files.
//! Everything after launch is an outcome, not an error: an empty target set
//! reports `NoTargets`, cancellation reports `Cancelled`, and per-probe
//! network failures stay inside the probing engine.
//!
//! ## Custom Probing Engines
//!
//! [`ConnectEngine`](crate::probe::ConnectEngine) covers unprivileged TCP
//! connect scanning. Richer engines, raw-socket scanners or full
//! protocol-plugin suites, implement [`ProbeEngine`](crate::probe::ProbeEngine)
//! and inherit scheduling, throttling, progress, and aggregation unchanged.
#![allow(clippy::needless_doctest_main)]
#![warn(missing_docs)]
#![doc(html_root_url = "https://docs.rs/superscan/0.3.0")]

pub mod address;

pub mod error;

pub mod input;

pub mod probe;

pub mod progress;

pub mod report;

pub mod scanner;

pub mod throttle;

pub use error::{Result, ScanError};
