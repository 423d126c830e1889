use std::collections::HashMap;
use std::time::Duration;

/// Accumulated results and derived metrics for a single endpoint.
///
/// Latency lists only hold successful samples; `errors` is derived as
/// attempts minus successes. The check fields are three-valued: `None`
/// means the check did not run or could not produce a verdict.
#[derive(Debug, Clone, Default)]
pub struct ServerResult {
	pub server_address: String,
	pub cached_latencies: Vec<Duration>,
	pub uncached_latencies: Vec<Duration>,
	pub errors: usize,
	pub total_queries: usize,

	pub supports_dnssec: Option<bool>,
	pub hijacks_nxdomain: Option<bool>,
	pub blocks_rebinding: Option<bool>,
	pub is_accurate: Option<bool>,
	pub dotcom_latency: Option<Duration>,

	pub avg_cached_latency: Duration,
	pub stddev_cached_latency: Duration,
	pub avg_uncached_latency: Duration,
	pub stddev_uncached_latency: Duration,
	pub reliability: f64,
}

impl ServerResult {
	pub fn new(server_address: String) -> Self {
		Self {
			server_address,
			..Self::default()
		}
	}

	/// Compute the derived metrics from the accumulated samples.
	pub fn calculate_metrics(&mut self) {
		let successes = self.cached_latencies.len() + self.uncached_latencies.len();
		if self.total_queries > 0 {
			self.errors = self.total_queries - successes;
			self.reliability = successes as f64 / self.total_queries as f64 * 100.0;
		} else {
			self.errors = 0;
			self.reliability = 0.0;
		}

		self.avg_cached_latency = average(&self.cached_latencies);
		self.stddev_cached_latency = std_deviation(&self.cached_latencies, self.avg_cached_latency);
		self.avg_uncached_latency = average(&self.uncached_latencies);
		self.stddev_uncached_latency =
			std_deviation(&self.uncached_latencies, self.avg_uncached_latency);
	}
}

/// Results for every endpoint, keyed by canonical endpoint form.
#[derive(Debug, Default)]
pub struct BenchmarkResults {
	pub results: HashMap<String, ServerResult>,
}

impl BenchmarkResults {
	pub fn new() -> Self {
		Self::default()
	}

	/// Run the metrics pass over every endpoint.
	pub fn analyze(&mut self) {
		for result in self.results.values_mut() {
			result.calculate_metrics();
		}
	}
}

/// Mean latency, rounded to whole nanoseconds. Zero for an empty list
/// (rendered as unavailable by the output layer).
pub fn average(latencies: &[Duration]) -> Duration {
	if latencies.is_empty() {
		return Duration::ZERO;
	}
	let total_nanos: u128 = latencies.iter().map(|l| l.as_nanos()).sum();
	let avg_nanos = total_nanos as f64 / latencies.len() as f64;
	Duration::from_nanos(avg_nanos.round() as u64)
}

/// Sample standard deviation (n-1 denominator), rounded to whole
/// nanoseconds. Zero for fewer than two samples (rendered as unavailable).
pub fn std_deviation(latencies: &[Duration], average: Duration) -> Duration {
	if latencies.len() < 2 {
		return Duration::ZERO;
	}
	let avg_nanos = average.as_nanos() as f64;
	let sum_of_squares: f64 = latencies
		.iter()
		.map(|l| {
			let diff = l.as_nanos() as f64 - avg_nanos;
			diff * diff
		})
		.sum();
	let variance = sum_of_squares / (latencies.len() - 1) as f64;
	Duration::from_nanos(variance.sqrt().round() as u64)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ms(n: u64) -> Duration {
		Duration::from_millis(n)
	}

	#[test]
	fn test_average_single_sample_is_itself() {
		assert_eq!(average(&[ms(42)]), ms(42));
	}

	#[test]
	fn test_average_empty_is_zero() {
		assert_eq!(average(&[]), Duration::ZERO);
	}

	#[test]
	fn test_average_rounds_nanos() {
		let latencies = [ms(10), ms(12)];
		assert_eq!(average(&latencies), ms(11));
	}

	#[test]
	fn test_stddev_single_sample_unavailable() {
		assert_eq!(std_deviation(&[ms(42)], ms(42)), Duration::ZERO);
	}

	#[test]
	fn test_stddev_identical_samples_is_zero() {
		let latencies = [ms(20), ms(20), ms(20)];
		assert_eq!(std_deviation(&latencies, average(&latencies)), Duration::ZERO);
	}

	#[test]
	fn test_stddev_uses_sample_denominator() {
		// [10ms, 12ms]: mean 11ms, sample variance 2ms^2, stddev ~1.414ms
		let latencies = [ms(10), ms(12)];
		let sd = std_deviation(&latencies, average(&latencies));
		assert_eq!(sd, Duration::from_nanos(1_414_214));
	}

	#[test]
	fn test_stddev_three_samples() {
		// [20ms, 25ms, 30ms]: mean 25ms, sample variance 25ms^2, stddev 5ms
		let latencies = [ms(20), ms(25), ms(30)];
		assert_eq!(average(&latencies), ms(25));
		assert_eq!(std_deviation(&latencies, ms(25)), ms(5));
	}

	#[test]
	fn test_reliability_all_successes() {
		let mut result = ServerResult::new("1.1.1.1:53".to_string());
		result.cached_latencies = vec![ms(10), ms(12)];
		result.uncached_latencies = vec![ms(20), ms(25), ms(30)];
		result.total_queries = 5;
		result.calculate_metrics();

		assert_eq!(result.errors, 0);
		assert!((result.reliability - 100.0).abs() < f64::EPSILON);
		assert_eq!(result.avg_cached_latency, ms(11));
		assert_eq!(result.avg_uncached_latency, ms(25));
		assert_eq!(result.stddev_uncached_latency, ms(5));
	}

	#[test]
	fn test_reliability_with_errors() {
		let mut result = ServerResult::new("8.8.8.8:53".to_string());
		result.cached_latencies = vec![ms(15)];
		result.uncached_latencies = vec![ms(35)];
		result.total_queries = 3;
		result.calculate_metrics();

		assert_eq!(result.errors, 1);
		assert!((result.reliability - 66.66666666666667).abs() < 1e-9);
		assert_eq!(result.avg_cached_latency, ms(15));
		// One sample: stddev unavailable
		assert_eq!(result.stddev_cached_latency, Duration::ZERO);
	}

	#[test]
	fn test_reliability_bounds() {
		let mut result = ServerResult::new("9.9.9.9:53".to_string());
		result.total_queries = 4;
		result.calculate_metrics();
		assert_eq!(result.errors, 4);
		assert!((result.reliability - 0.0).abs() < f64::EPSILON);

		result.cached_latencies = vec![ms(1), ms(1)];
		result.uncached_latencies = vec![ms(2), ms(2)];
		result.calculate_metrics();
		assert_eq!(result.errors, 0);
		assert!((result.reliability - 100.0).abs() < f64::EPSILON);
	}

	#[test]
	fn test_no_queries_zero_reliability() {
		let mut result = ServerResult::new("1.0.0.1:53".to_string());
		result.calculate_metrics();
		assert_eq!(result.total_queries, 0);
		assert_eq!(result.errors, 0);
		assert!((result.reliability - 0.0).abs() < f64::EPSILON);
	}
}
