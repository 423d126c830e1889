use std::cmp::Ordering;
use std::io::Write;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use crate::bench::BenchmarkConfig;
use crate::stats::{BenchmarkResults, ServerResult};

/// Reliability below which the summary refuses to recommend a server.
const RELIABILITY_THRESHOLD: f64 = 99.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
	Console,
	Csv,
	Json,
}

impl FromStr for OutputFormat {
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"console" => Ok(OutputFormat::Console),
			"csv" => Ok(OutputFormat::Csv),
			"json" => Ok(OutputFormat::Json),
			other => Err(anyhow!(
				"unknown output format '{}' (expected console, csv, or json)",
				other
			)),
		}
	}
}

/// Create the output writer up front so a bad path fails before any
/// queries are sent. An empty path means stdout.
pub fn create_writer(path: &str) -> Result<Box<dyn Write>> {
	if path.is_empty() {
		return Ok(Box::new(std::io::stdout()));
	}
	let file = std::fs::File::create(path)
		.with_context(|| format!("failed to create output file '{}'", path))?;
	Ok(Box::new(file))
}

/// Render the results in the requested format.
pub fn write_results(
	writer: &mut dyn Write,
	format: OutputFormat,
	results: &BenchmarkResults,
	config: &BenchmarkConfig,
) -> Result<()> {
	match format {
		OutputFormat::Console => write_console_results(writer, results, config),
		OutputFormat::Csv => write_csv_results(writer, results, config),
		OutputFormat::Json => write_json_results(writer, results),
	}
}

/// Results sorted fastest-first: ascending average uncached latency,
/// endpoints without uncached samples last, ties broken by average cached
/// latency and finally by address so output is stable.
pub fn sorted_results(results: &BenchmarkResults) -> Vec<&ServerResult> {
	let mut list: Vec<&ServerResult> = results.results.values().collect();
	list.sort_by(|a, b| compare_servers(a, b));
	list
}

fn compare_servers(a: &ServerResult, b: &ServerResult) -> Ordering {
	compare_metric(
		!a.uncached_latencies.is_empty(),
		a.avg_uncached_latency,
		!b.uncached_latencies.is_empty(),
		b.avg_uncached_latency,
	)
	.then_with(|| {
		compare_metric(
			!a.cached_latencies.is_empty(),
			a.avg_cached_latency,
			!b.cached_latencies.is_empty(),
			b.avg_cached_latency,
		)
	})
	.then_with(|| a.server_address.cmp(&b.server_address))
}

/// Servers holding a metric rank strictly better than servers lacking it.
fn compare_metric(
	a_has: bool,
	a_value: std::time::Duration,
	b_has: bool,
	b_value: std::time::Duration,
) -> Ordering {
	match (a_has, b_has) {
		(true, false) => Ordering::Less,
		(false, true) => Ordering::Greater,
		(true, true) => a_value.cmp(&b_value),
		(false, false) => Ordering::Equal,
	}
}

// --- Console ---

fn write_console_results(
	writer: &mut dyn Write,
	results: &BenchmarkResults,
	config: &BenchmarkConfig,
) -> Result<()> {
	let sorted = sorted_results(results);

	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);

	let mut header = vec![
		"DNS Server".to_string(),
		"Avg Cached".to_string(),
		"StdDev Cached".to_string(),
		"Avg Uncached".to_string(),
		"StdDev Uncached".to_string(),
		"Reliability".to_string(),
	];
	if config.check_dotcom {
		header.push(".com Latency".to_string());
	}
	if config.check_dnssec {
		header.push("DNSSEC".to_string());
	}
	if config.check_nxdomain {
		header.push("NXDOMAIN Policy".to_string());
	}
	if config.check_rebinding {
		header.push("Rebind Protect".to_string());
	}
	if config.accuracy.is_some() {
		header.push("Accuracy".to_string());
	}
	table.set_header(header);

	for server in &sorted {
		let mut row = vec![
			server.server_address.clone(),
			format_latency(server.avg_cached_latency, !server.cached_latencies.is_empty()),
			format_latency(
				server.stddev_cached_latency,
				server.cached_latencies.len() > 1,
			),
			format_latency(
				server.avg_uncached_latency,
				!server.uncached_latencies.is_empty(),
			),
			format_latency(
				server.stddev_uncached_latency,
				server.uncached_latencies.len() > 1,
			),
			format!("{:.1}%", server.reliability),
		];
		if config.check_dotcom {
			row.push(match server.dotcom_latency {
				Some(latency) => format_latency(latency, true),
				None => "N/A".to_string(),
			});
		}
		if config.check_dnssec {
			row.push(format_verdict(server.supports_dnssec, "Yes", "No"));
		}
		if config.check_nxdomain {
			row.push(format_verdict(server.hijacks_nxdomain, "Hijacks", "No Hijack"));
		}
		if config.check_rebinding {
			row.push(format_verdict(server.blocks_rebinding, "Blocks", "Allows"));
		}
		if config.accuracy.is_some() {
			row.push(format_verdict(server.is_accurate, "Accurate", "Mismatch"));
		}
		table.add_row(row);
	}

	writeln!(writer, "{table}").context("failed to write results table")?;
	write_summary(writer, &sorted, config)?;
	Ok(())
}

/// The concluding recommendation: the fastest server that is reliable
/// enough (and accurate, when the accuracy check ran), plus per-server
/// warnings for anything suspicious.
fn write_summary(
	writer: &mut dyn Write,
	sorted: &[&ServerResult],
	config: &BenchmarkConfig,
) -> Result<()> {
	if sorted.is_empty() {
		return Ok(());
	}

	writeln!(writer, "\n--- Conclusion ---")?;

	let best = find_best_server(sorted, config);
	match best {
		Some(best) => {
			writeln!(
				writer,
				"Fastest reliable server (by uncached latency): {}",
				best.server_address
			)?;
			writeln!(
				writer,
				"  Avg Uncached Latency: {} (StdDev: {})",
				format_latency(best.avg_uncached_latency, !best.uncached_latencies.is_empty()),
				format_latency(best.stddev_uncached_latency, best.uncached_latencies.len() > 1),
			)?;
			writeln!(
				writer,
				"  Avg Cached Latency:   {} (StdDev: {})",
				format_latency(best.avg_cached_latency, !best.cached_latencies.is_empty()),
				format_latency(best.stddev_cached_latency, best.cached_latencies.len() > 1),
			)?;
			writeln!(writer, "  Reliability: {:.1}%", best.reliability)?;
		}
		None => {
			writeln!(
				writer,
				"Could not determine a best server meeting the reliability and accuracy criteria."
			)?;
		}
	}

	let mut issues_found = false;
	for server in sorted {
		if let Some(best) = best {
			if best.server_address == server.server_address {
				continue;
			}
		}
		let prefix = format!("Warning ({}):", server.server_address);
		if server.reliability < RELIABILITY_THRESHOLD {
			writeln!(writer, "{} Low reliability ({:.1}%).", prefix, server.reliability)?;
			issues_found = true;
		}
		if server.hijacks_nxdomain == Some(true) {
			writeln!(writer, "{} Appears to hijack NXDOMAIN responses.", prefix)?;
			issues_found = true;
		}
		if server.blocks_rebinding == Some(false) {
			writeln!(
				writer,
				"{} Allows responses with private IPs (rebinding risk).",
				prefix
			)?;
			issues_found = true;
		}
		if server.is_accurate == Some(false) {
			if let Some(accuracy) = &config.accuracy {
				writeln!(
					writer,
					"{} Returned inaccurate results for {}.",
					prefix, accuracy.domain
				)?;
				issues_found = true;
			}
		}
	}

	if !issues_found && best.is_some() {
		writeln!(writer, "Other tested servers performed reliably without major issues.")?;
	}
	writeln!(
		writer,
		"Note: Results are a snapshot of current network conditions."
	)?;
	Ok(())
}

/// Fastest server passing the reliability gate (and the accuracy gate,
/// when that check ran). `sorted` is already fastest-first, so the first
/// survivor wins.
fn find_best_server<'a>(
	sorted: &[&'a ServerResult],
	config: &BenchmarkConfig,
) -> Option<&'a ServerResult> {
	sorted
		.iter()
		.find(|server| {
			if server.reliability < RELIABILITY_THRESHOLD {
				return false;
			}
			if config.accuracy.is_some() && server.is_accurate == Some(false) {
				return false;
			}
			true
		})
		.copied()
}

// --- CSV ---

fn write_csv_results(
	writer: &mut dyn Write,
	results: &BenchmarkResults,
	config: &BenchmarkConfig,
) -> Result<()> {
	let sorted = sorted_results(results);
	let mut csv_writer = csv::Writer::from_writer(writer);

	let mut header = vec![
		"ServerAddress".to_string(),
		"AvgCachedLatency(ms)".to_string(),
		"StdDevCachedLatency(ms)".to_string(),
		"AvgUncachedLatency(ms)".to_string(),
		"StdDevUncachedLatency(ms)".to_string(),
		"Reliability(%)".to_string(),
		"SuccessfulCachedQueries".to_string(),
		"SuccessfulUncachedQueries".to_string(),
		"Errors".to_string(),
		"TotalLatencyQueries".to_string(),
	];
	if config.check_dotcom {
		header.push("DotcomLatency(ms)".to_string());
	}
	if config.check_dnssec {
		header.push("SupportsDNSSEC".to_string());
	}
	if config.check_nxdomain {
		header.push("HijacksNXDOMAIN".to_string());
	}
	if config.check_rebinding {
		header.push("BlocksRebinding".to_string());
	}
	if config.accuracy.is_some() {
		header.push("IsAccurate".to_string());
	}
	csv_writer
		.write_record(&header)
		.context("failed to write CSV header")?;

	for server in sorted {
		let mut row = vec![
			server.server_address.clone(),
			format_millis(server.avg_cached_latency, !server.cached_latencies.is_empty()),
			format_millis(
				server.stddev_cached_latency,
				server.cached_latencies.len() > 1,
			),
			format_millis(
				server.avg_uncached_latency,
				!server.uncached_latencies.is_empty(),
			),
			format_millis(
				server.stddev_uncached_latency,
				server.uncached_latencies.len() > 1,
			),
			format!("{:.1}", server.reliability),
			server.cached_latencies.len().to_string(),
			server.uncached_latencies.len().to_string(),
			server.errors.to_string(),
			server.total_queries.to_string(),
		];
		if config.check_dotcom {
			row.push(match server.dotcom_latency {
				Some(latency) => format_millis(latency, true),
				None => "N/A".to_string(),
			});
		}
		if config.check_dnssec {
			row.push(format_verdict(server.supports_dnssec, "true", "false"));
		}
		if config.check_nxdomain {
			row.push(format_verdict(server.hijacks_nxdomain, "true", "false"));
		}
		if config.check_rebinding {
			row.push(format_verdict(server.blocks_rebinding, "true", "false"));
		}
		if config.accuracy.is_some() {
			row.push(format_verdict(server.is_accurate, "true", "false"));
		}
		csv_writer
			.write_record(&row)
			.with_context(|| format!("failed to write CSV row for {}", server.server_address))?;
	}

	csv_writer.flush().context("failed to flush CSV output")?;
	Ok(())
}

// --- JSON ---

/// JSON shape for one endpoint. Metrics that are unavailable are omitted
/// rather than emitted as null.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonServerResult {
	server_address: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	avg_cached_latency_ms: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	std_dev_cached_latency_ms: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	avg_uncached_latency_ms: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	std_dev_uncached_latency_ms: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	dotcom_latency_ms: Option<f64>,
	reliability_pct: f64,
	successful_cached_queries: usize,
	successful_uncached_queries: usize,
	errors: usize,
	total_latency_queries: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	supports_dnssec: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	hijacks_nxdomain: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	blocks_rebinding: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	is_accurate: Option<bool>,
}

impl JsonServerResult {
	fn from_server(server: &ServerResult) -> Self {
		Self {
			server_address: server.server_address.clone(),
			avg_cached_latency_ms: (!server.cached_latencies.is_empty())
				.then(|| millis(server.avg_cached_latency)),
			std_dev_cached_latency_ms: (server.cached_latencies.len() > 1)
				.then(|| millis(server.stddev_cached_latency)),
			avg_uncached_latency_ms: (!server.uncached_latencies.is_empty())
				.then(|| millis(server.avg_uncached_latency)),
			std_dev_uncached_latency_ms: (server.uncached_latencies.len() > 1)
				.then(|| millis(server.stddev_uncached_latency)),
			dotcom_latency_ms: server.dotcom_latency.map(millis),
			reliability_pct: server.reliability,
			successful_cached_queries: server.cached_latencies.len(),
			successful_uncached_queries: server.uncached_latencies.len(),
			errors: server.errors,
			total_latency_queries: server.total_queries,
			supports_dnssec: server.supports_dnssec,
			hijacks_nxdomain: server.hijacks_nxdomain,
			blocks_rebinding: server.blocks_rebinding,
			is_accurate: server.is_accurate,
		}
	}
}

fn write_json_results(writer: &mut dyn Write, results: &BenchmarkResults) -> Result<()> {
	let sorted = sorted_results(results);
	let json_results: Vec<JsonServerResult> = sorted
		.into_iter()
		.map(JsonServerResult::from_server)
		.collect();
	serde_json::to_writer_pretty(&mut *writer, &json_results)
		.context("failed to encode JSON results")?;
	writeln!(writer)?;
	Ok(())
}

// --- Formatting helpers ---

/// Milliseconds with microsecond precision.
fn millis(d: std::time::Duration) -> f64 {
	d.as_micros() as f64 / 1000.0
}

/// `12.3 ms` for console cells, or `N/A` when the metric is unavailable.
fn format_latency(d: std::time::Duration, available: bool) -> String {
	if !available {
		return "N/A".to_string();
	}
	format!("{:.1} ms", millis(d))
}

/// Three-decimal milliseconds for CSV cells, or `N/A`.
fn format_millis(d: std::time::Duration, available: bool) -> String {
	if !available {
		return "N/A".to_string();
	}
	format!("{:.3}", millis(d))
}

/// Render a three-valued verdict; absent means the check did not run or
/// produced no verdict.
fn format_verdict(value: Option<bool>, true_str: &str, false_str: &str) -> String {
	match value {
		Some(true) => true_str.to_string(),
		Some(false) => false_str.to_string(),
		None => "N/A".to_string(),
	}
}
