use std::sync::Arc;
use std::time::Duration;

use hickory_proto::rr::RecordType;

use crate::checks::{self, AccuracyCheck, CheckKind};
use crate::dns;
use crate::resolver::{Endpoint, Protocol};
use crate::scheduler::{self, Job, JobKind, JobOutcome, RateGate};
use crate::stats::{BenchmarkResults, ServerResult};
use crate::transport::Querier;

/// Name used by the connection warm-up queries.
const WARMUP_DOMAIN: &str = "example.com.";
/// Suffix for the randomized uncached-latency names.
const UNCACHED_SUFFIX: &str = ".net.";

/// Benchmark configuration consumed by the engine.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
	pub num_queries: usize,
	pub timeout: Duration,
	pub concurrency: usize,
	pub rate_limit: u32,
	pub query_type: RecordType,
	pub cached_domain: String,
	pub check_dnssec: bool,
	pub check_nxdomain: bool,
	pub check_rebinding: bool,
	pub check_dotcom: bool,
	pub accuracy: Option<AccuracyCheck>,
	pub verbose: bool,
}

/// Split the per-endpoint latency query count into cached and uncached.
///
/// Small counts favor uncached lookups, which carry more signal; larger
/// counts split evenly with the odd query going to uncached.
pub fn split_latency_queries(total: usize) -> (usize, usize) {
	match total {
		0 => (0, 0),
		1 => (0, 1),
		2 => (1, 1),
		3 => (1, 2),
		n => (n / 2, n - n / 2),
	}
}

/// Runs the two benchmark phases over a fixed endpoint set.
pub struct Benchmarker {
	config: BenchmarkConfig,
	querier: Arc<dyn Querier>,
	gate: Arc<RateGate>,
}

impl Benchmarker {
	pub fn new(config: BenchmarkConfig, querier: Arc<dyn Querier>) -> Self {
		let gate = Arc::new(RateGate::new(config.rate_limit));
		Self {
			config,
			querier,
			gate,
		}
	}

	/// Warm up, then run the latency phase and the check phase.
	///
	/// The returned results still need the metrics pass
	/// (`BenchmarkResults::analyze`).
	pub async fn run(&self, endpoints: &[Endpoint]) -> BenchmarkResults {
		let mut results = BenchmarkResults::new();
		for endpoint in endpoints {
			let key = endpoint.canonical();
			results
				.results
				.insert(key.clone(), ServerResult::new(key));
		}

		self.warm_up(endpoints).await;
		self.run_latency_phase(endpoints, &mut results).await;
		self.run_check_phase(endpoints, &mut results).await;

		results
	}

	/// Absorb TCP and TLS handshake costs before the first measured query.
	///
	/// One best-effort query per connection-oriented endpoint; outcomes are
	/// discarded. UDP needs no warm-up and DoQ warms through its pool.
	async fn warm_up(&self, endpoints: &[Endpoint]) {
		let mut handles = Vec::new();
		for endpoint in endpoints {
			if !matches!(
				endpoint.protocol,
				Protocol::Tcp | Protocol::Dot | Protocol::Doh
			) {
				continue;
			}
			let querier = self.querier.clone();
			let endpoint = endpoint.clone();
			let deadline = self.config.timeout;
			handles.push(tokio::spawn(async move {
				let _ = querier
					.query(&endpoint, WARMUP_DOMAIN, RecordType::A, deadline)
					.await;
			}));
		}
		for handle in handles {
			let _ = handle.await;
		}
	}

	/// Phase 1: cached and uncached latency queries.
	async fn run_latency_phase(&self, endpoints: &[Endpoint], results: &mut BenchmarkResults) {
		let (num_cached, num_uncached) = split_latency_queries(self.config.num_queries);
		let per_endpoint = num_cached + num_uncached;
		if per_endpoint == 0 {
			return;
		}

		let mut jobs = Vec::with_capacity(endpoints.len() * per_endpoint);
		for endpoint in endpoints {
			if let Some(server) = results.results.get_mut(&endpoint.canonical()) {
				server.total_queries = per_endpoint;
			}
			for _ in 0..num_cached {
				jobs.push(Job {
					endpoint: endpoint.clone(),
					domain: self.config.cached_domain.clone(),
					rtype: self.config.query_type,
					kind: JobKind::CachedLatency,
				});
			}
			for _ in 0..num_uncached {
				jobs.push(Job {
					endpoint: endpoint.clone(),
					domain: dns::random_name(checks::NXDOMAIN_CHECK_PREFIX, UNCACHED_SUFFIX),
					rtype: self.config.query_type,
					kind: JobKind::UncachedLatency,
				});
			}
		}

		let outcomes = scheduler::run_jobs(
			jobs,
			self.config.concurrency,
			self.config.timeout,
			self.querier.clone(),
			self.gate.clone(),
		)
		.await;
		self.drain_latency_outcomes(outcomes, results);
	}

	/// Apply latency outcomes serially, keyed by canonical endpoint form.
	///
	/// A successful query is one whose transport round-trip completed and
	/// parsed; NXDOMAIN answers to the randomized names count as success
	/// since the round trip is what is measured.
	fn drain_latency_outcomes(&self, outcomes: Vec<JobOutcome>, results: &mut BenchmarkResults) {
		for outcome in outcomes {
			let key = outcome.endpoint.canonical();
			let Some(server) = results.results.get_mut(&key) else {
				continue;
			};
			match outcome.result {
				Ok(reply) => match outcome.kind {
					JobKind::CachedLatency => server.cached_latencies.push(reply.latency),
					JobKind::UncachedLatency => server.uncached_latencies.push(reply.latency),
					JobKind::Check(_) => {}
				},
				Err(e) => {
					if self.config.verbose {
						eprintln!("Latency query error for {}: {}", key, e);
					}
				}
			}
		}
	}

	/// Phase 2: one job per enabled check per endpoint.
	async fn run_check_phase(&self, endpoints: &[Endpoint], results: &mut BenchmarkResults) {
		let mut jobs = Vec::new();
		for endpoint in endpoints {
			for kind in self.enabled_checks() {
				let domain = match kind {
					CheckKind::Dnssec => checks::DNSSEC_CHECK_DOMAIN.to_string(),
					CheckKind::Nxdomain => dns::random_name(
						checks::NXDOMAIN_CHECK_PREFIX,
						checks::NXDOMAIN_CHECK_SUFFIX,
					),
					CheckKind::Rebinding => checks::REBINDING_CHECK_DOMAIN.to_string(),
					CheckKind::Accuracy => match &self.config.accuracy {
						Some(accuracy) => accuracy.domain.clone(),
						None => continue,
					},
					CheckKind::Dotcom => dns::random_name(
						checks::DOTCOM_CHECK_PREFIX,
						checks::DOTCOM_CHECK_SUFFIX,
					),
				};
				jobs.push(Job {
					endpoint: endpoint.clone(),
					domain,
					rtype: RecordType::A,
					kind: JobKind::Check(kind),
				});
			}
		}
		if jobs.is_empty() {
			return;
		}

		let outcomes = scheduler::run_jobs(
			jobs,
			self.config.concurrency,
			self.config.timeout,
			self.querier.clone(),
			self.gate.clone(),
		)
		.await;
		self.drain_check_outcomes(outcomes, results);
	}

	fn enabled_checks(&self) -> Vec<CheckKind> {
		let mut kinds = Vec::new();
		if self.config.check_dnssec {
			kinds.push(CheckKind::Dnssec);
		}
		if self.config.check_nxdomain {
			kinds.push(CheckKind::Nxdomain);
		}
		if self.config.check_rebinding {
			kinds.push(CheckKind::Rebinding);
		}
		if self.config.accuracy.is_some() {
			kinds.push(CheckKind::Accuracy);
		}
		if self.config.check_dotcom {
			kinds.push(CheckKind::Dotcom);
		}
		kinds
	}

	fn drain_check_outcomes(&self, outcomes: Vec<JobOutcome>, results: &mut BenchmarkResults) {
		for outcome in outcomes {
			let key = outcome.endpoint.canonical();
			let Some(server) = results.results.get_mut(&key) else {
				continue;
			};
			let JobKind::Check(kind) = outcome.kind else {
				continue;
			};

			if let Err(e) = &outcome.result {
				if self.config.verbose {
					eprintln!("{} check error for {}: {}", kind.label(), key, e);
				}
			}

			match kind {
				CheckKind::Dnssec => {
					server.supports_dnssec = Some(checks::supports_dnssec(&outcome.result));
				}
				CheckKind::Nxdomain => {
					server.hijacks_nxdomain = Some(checks::hijacks_nxdomain(&outcome.result));
				}
				CheckKind::Rebinding => {
					server.blocks_rebinding = Some(checks::blocks_rebinding(&outcome.result));
				}
				CheckKind::Accuracy => {
					if let Some(accuracy) = &self.config.accuracy {
						server.is_accurate =
							Some(checks::is_accurate(&outcome.result, accuracy.expected_ip));
					}
				}
				CheckKind::Dotcom => {
					if let Ok(reply) = &outcome.result {
						server.dotcom_latency = Some(reply.latency);
					}
				}
			}
		}
	}
}
