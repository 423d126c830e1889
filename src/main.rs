mod bench;
mod checks;
mod cli;
mod dns;
mod output;
mod resolver;
mod scheduler;
mod stats;
mod transport;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use clap::Parser;
use hickory_proto::rr::RecordType;

use crate::bench::{BenchmarkConfig, Benchmarker};
use crate::cli::Cli;
use crate::output::OutputFormat;
use crate::resolver::Endpoint;
use crate::transport::DnsClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	// Build the endpoint set: user file, or defaults plus system resolvers
	let mut endpoint_strings: Vec<String> = match &cli.file {
		Some(path) => resolver::read_endpoint_file(path)?,
		None => resolver::DEFAULT_ENDPOINTS
			.iter()
			.map(|s| s.to_string())
			.collect(),
	};
	if cli.file.is_none() && !cli.no_system {
		endpoint_strings.extend(resolver::system_endpoints());
	}
	let endpoints = resolver::parse_and_dedup(&endpoint_strings);
	if endpoints.is_empty() {
		return Err(anyhow!("no valid DNS endpoints specified or found"));
	}

	// An unusable accuracy file disables the check rather than aborting
	let accuracy = match &cli.accuracy_file {
		Some(path) => match checks::load_accuracy_file(path) {
			Ok(check) => Some(check),
			Err(e) => {
				eprintln!("Warning: disabling accuracy check: {}", e);
				None
			}
		},
		None => None,
	};

	let query_type = RecordType::from_str(&cli.query_type.to_uppercase())
		.map_err(|_| anyhow!("invalid DNS record type '{}'", cli.query_type))?;
	let format = OutputFormat::from_str(&cli.format)?;

	let config = BenchmarkConfig {
		num_queries: cli.queries,
		timeout: Duration::from_millis(cli.timeout),
		concurrency: cli.concurrency,
		rate_limit: cli.rate,
		query_type,
		cached_domain: cli.domain.clone(),
		check_dnssec: cli.dnssec,
		check_nxdomain: cli.nxdomain,
		check_rebinding: cli.rebinding,
		check_dotcom: cli.dotcom,
		accuracy,
		verbose: cli.verbose,
	};

	if cli.verbose {
		print_config(&config, &endpoints, &cli);
	}

	// Create the writer before any query runs so a bad path fails early
	let output_path = cli.output.clone().unwrap_or_default();
	let mut writer = output::create_writer(&output_path)?;

	println!("resolver-bench {}", env!("CARGO_PKG_VERSION"));
	println!(
		"Benchmarking {} endpoints ({} latency queries each)...",
		endpoints.len(),
		config.num_queries
	);

	let client = Arc::new(DnsClient::new(&endpoints)?);
	let benchmarker = Benchmarker::new(config.clone(), client.clone());
	let mut results = benchmarker.run(&endpoints).await;
	results.analyze();
	println!("Benchmark finished.");

	if !output_path.is_empty() {
		println!("Writing results to {}...", output_path);
	}

	// Shut the pool down even when serialization fails
	let write_result = output::write_results(writer.as_mut(), format, &results, &config);
	client.shutdown().await;
	write_result?;

	Ok(())
}

/// Verbose configuration dump, printed before the run.
fn print_config(config: &BenchmarkConfig, endpoints: &[Endpoint], cli: &Cli) {
	println!("--- Configuration ---");
	println!("Endpoints:        {}", endpoints.len());
	for endpoint in endpoints {
		println!("  - {}", endpoint);
	}
	println!("Latency queries:  {}", config.num_queries);
	println!("Timeout:          {} ms", config.timeout.as_millis());
	println!("Concurrency:      {}", config.concurrency);
	println!("Rate limit:       {} qps", config.rate_limit);
	println!("Query type:       {}", config.query_type);
	println!("Cached domain:    {}", config.cached_domain);
	println!("Check DNSSEC:     {}", config.check_dnssec);
	println!("Check NXDOMAIN:   {}", config.check_nxdomain);
	println!("Check rebinding:  {}", config.check_rebinding);
	println!("Check dotcom:     {}", config.check_dotcom);
	match &config.accuracy {
		Some(accuracy) => println!(
			"Accuracy check:   {} -> {}",
			accuracy.domain, accuracy.expected_ip
		),
		None => println!("Accuracy check:   disabled"),
	}
	println!("Output format:    {}", cli.format);
	if let Some(path) = &cli.output {
		println!("Output file:      {}", path);
	}
	println!("---------------------");
}
