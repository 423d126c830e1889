use std::sync::Arc;
use std::time::{Duration, Instant};

use hickory_proto::rr::RecordType;
use tokio::sync::{mpsc, Mutex};

use crate::checks::CheckKind;
use crate::resolver::Endpoint;
use crate::transport::{Querier, QueryError, QueryReply};

/// What a job's outcome feeds once drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
	CachedLatency,
	UncachedLatency,
	Check(CheckKind),
}

/// One query to execute. Immutable once enqueued.
#[derive(Debug, Clone)]
pub struct Job {
	pub endpoint: Endpoint,
	pub domain: String,
	pub rtype: RecordType,
	pub kind: JobKind,
}

/// A finished job, carried back to the drain step.
#[derive(Debug)]
pub struct JobOutcome {
	pub endpoint: Endpoint,
	pub kind: JobKind,
	pub result: Result<QueryReply, QueryError>,
}

/// Global token bucket of capacity one, refilled at `rate` tokens/sec.
///
/// Every query acquires one token before hitting the wire, which spaces
/// queries at least `1/rate` apart across all workers. A rate of zero
/// disables the gate entirely.
pub struct RateGate {
	interval: Option<Duration>,
	next: Mutex<Instant>,
}

impl RateGate {
	pub fn new(rate: u32) -> Self {
		let interval = if rate == 0 {
			None
		} else {
			Some(Duration::from_secs(1) / rate)
		};
		Self {
			interval,
			next: Mutex::new(Instant::now()),
		}
	}

	/// Wait for the next token. Returns immediately when unmetered.
	pub async fn acquire(&self) {
		let Some(interval) = self.interval else {
			return;
		};
		let wake = {
			let mut next = self.next.lock().await;
			let now = Instant::now();
			let at = if *next > now { *next } else { now };
			*next = at + interval;
			at
		};
		tokio::time::sleep_until(wake.into()).await;
	}
}

/// Run every job through a fixed-size worker pool and collect the results.
///
/// Spawns `min(workers, jobs)` homogeneous workers over a single bounded
/// queue; delivery order is unspecified. Each worker takes a rate token,
/// runs the query with the per-query deadline, and pushes the outcome onto
/// the results channel. The channel holds every outcome, so it is drained
/// only after all workers have exited and the caller can apply outcomes
/// serially without locking.
pub async fn run_jobs(
	jobs: Vec<Job>,
	workers: usize,
	deadline: Duration,
	querier: Arc<dyn Querier>,
	gate: Arc<RateGate>,
) -> Vec<JobOutcome> {
	if jobs.is_empty() {
		return Vec::new();
	}

	let total = jobs.len();
	let worker_count = workers.max(1).min(total);

	let (job_tx, job_rx) = mpsc::channel::<Job>(total);
	let (result_tx, mut result_rx) = mpsc::channel::<JobOutcome>(total);

	for job in jobs {
		job_tx
			.send(job)
			.await
			.expect("job queue closed before all jobs were enqueued");
	}
	drop(job_tx);

	let job_rx = Arc::new(Mutex::new(job_rx));
	let mut handles = Vec::with_capacity(worker_count);
	for _ in 0..worker_count {
		let job_rx = job_rx.clone();
		let result_tx = result_tx.clone();
		let querier = querier.clone();
		let gate = gate.clone();

		handles.push(tokio::spawn(async move {
			loop {
				let job = { job_rx.lock().await.recv().await };
				let Some(job) = job else {
					break;
				};

				gate.acquire().await;
				let result = querier
					.query(&job.endpoint, &job.domain, job.rtype, deadline)
					.await;

				let outcome = JobOutcome {
					endpoint: job.endpoint,
					kind: job.kind,
					result,
				};
				result_tx
					.send(outcome)
					.await
					.expect("results channel closed while workers were running");
			}
		}));
	}
	drop(result_tx);

	for handle in handles {
		if let Err(e) = handle.await {
			eprintln!("Warning: worker task failed: {}", e);
		}
	}

	let mut outcomes = Vec::with_capacity(total);
	while let Some(outcome) = result_rx.recv().await {
		outcomes.push(outcome);
	}
	outcomes
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use async_trait::async_trait;
	use hickory_proto::op::{Message, MessageType};

	use crate::resolver::parse_endpoint;

	/// Querier that answers instantly and tracks concurrency.
	struct CountingQuerier {
		in_flight: AtomicUsize,
		max_in_flight: AtomicUsize,
		calls: AtomicUsize,
	}

	impl CountingQuerier {
		fn new() -> Self {
			Self {
				in_flight: AtomicUsize::new(0),
				max_in_flight: AtomicUsize::new(0),
				calls: AtomicUsize::new(0),
			}
		}
	}

	#[async_trait]
	impl Querier for CountingQuerier {
		async fn query(
			&self,
			_endpoint: &Endpoint,
			_domain: &str,
			_rtype: RecordType,
			_deadline: Duration,
		) -> Result<QueryReply, QueryError> {
			let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
			self.max_in_flight.fetch_max(current, Ordering::SeqCst);
			self.calls.fetch_add(1, Ordering::SeqCst);
			tokio::time::sleep(Duration::from_millis(5)).await;
			self.in_flight.fetch_sub(1, Ordering::SeqCst);

			let mut message = Message::new();
			message.set_message_type(MessageType::Response);
			Ok(QueryReply {
				latency: Duration::from_millis(1),
				message,
			})
		}
	}

	fn latency_jobs(count: usize) -> Vec<Job> {
		let endpoint = parse_endpoint("1.1.1.1").unwrap();
		(0..count)
			.map(|i| Job {
				endpoint: endpoint.clone(),
				domain: format!("job-{}.example.com.", i),
				rtype: RecordType::A,
				kind: JobKind::CachedLatency,
			})
			.collect()
	}

	#[tokio::test]
	async fn test_every_job_yields_an_outcome() {
		let querier = Arc::new(CountingQuerier::new());
		let outcomes = run_jobs(
			latency_jobs(20),
			4,
			Duration::from_secs(1),
			querier.clone(),
			Arc::new(RateGate::new(0)),
		)
		.await;
		assert_eq!(outcomes.len(), 20);
		assert_eq!(querier.calls.load(Ordering::SeqCst), 20);
	}

	#[tokio::test]
	async fn test_worker_count_bounds_concurrency() {
		let querier = Arc::new(CountingQuerier::new());
		run_jobs(
			latency_jobs(32),
			3,
			Duration::from_secs(1),
			querier.clone(),
			Arc::new(RateGate::new(0)),
		)
		.await;
		assert!(querier.max_in_flight.load(Ordering::SeqCst) <= 3);
	}

	#[tokio::test]
	async fn test_empty_job_list() {
		let querier = Arc::new(CountingQuerier::new());
		let outcomes = run_jobs(
			Vec::new(),
			4,
			Duration::from_secs(1),
			querier,
			Arc::new(RateGate::new(0)),
		)
		.await;
		assert!(outcomes.is_empty());
	}

	#[tokio::test]
	async fn test_unmetered_gate_is_instant() {
		let gate = RateGate::new(0);
		let start = Instant::now();
		for _ in 0..1000 {
			gate.acquire().await;
		}
		assert!(start.elapsed() < Duration::from_millis(100));
	}

	#[tokio::test]
	async fn test_gate_spaces_queries() {
		// 100 qps -> 10ms spacing; 5 acquisitions span at least 40ms
		let gate = RateGate::new(100);
		let start = Instant::now();
		for _ in 0..5 {
			gate.acquire().await;
		}
		assert!(start.elapsed() >= Duration::from_millis(40));
	}

	#[tokio::test]
	async fn test_rate_limited_run_drains_cleanly() {
		let querier = Arc::new(CountingQuerier::new());
		let outcomes = run_jobs(
			latency_jobs(8),
			4,
			Duration::from_secs(1),
			querier,
			Arc::new(RateGate::new(500)),
		)
		.await;
		assert_eq!(outcomes.len(), 8);
	}
}
