use clap::Parser;

/// DNS resolver benchmark tool
#[derive(Parser, Debug)]
#[command(name = "resolver-bench", version)]
#[command(about = "Benchmark DNS resolvers over UDP, TCP, DoT, DoH and DoQ")]
pub struct Cli {
	/// File with DNS endpoints, one per line (IP, tcp://IP, tls://IP,
	/// https://..., quic://IP); disables defaults and system discovery
	#[arg(short = 'f', long = "file")]
	pub file: Option<String>,

	/// Total latency queries per endpoint (at least 2 for stddev)
	#[arg(short = 'n', long = "queries", default_value = "4")]
	pub queries: usize,

	/// Per-query timeout in milliseconds
	#[arg(short = 't', long = "timeout", default_value = "5000")]
	pub timeout: u64,

	/// Worker pool size
	#[arg(short = 'c', long = "concurrency", default_value = "4")]
	pub concurrency: usize,

	/// Max queries per second across all workers (0 for unlimited)
	#[arg(long = "rate", default_value = "50")]
	pub rate: u32,

	/// DNS record type for latency queries
	#[arg(long = "type", default_value = "A")]
	pub query_type: String,

	/// Domain for the cached latency test
	#[arg(long = "domain", default_value = "example.com")]
	pub domain: String,

	/// Check whether resolvers validate DNSSEC (AD flag)
	#[arg(long)]
	pub dnssec: bool,

	/// Check for NXDOMAIN hijacking
	#[arg(long)]
	pub nxdomain: bool,

	/// Check for DNS rebinding protection
	#[arg(long)]
	pub rebinding: bool,

	/// Measure '.com' TLD lookup time
	#[arg(long)]
	pub dotcom: bool,

	/// Accuracy check file ('name ip' per line, first valid entry wins)
	#[arg(long = "accuracy-file")]
	pub accuracy_file: Option<String>,

	/// Do not include system resolvers from /etc/resolv.conf
	#[arg(long = "no-system")]
	pub no_system: bool,

	/// Output file path (defaults to stdout)
	#[arg(short = 'o', long = "output")]
	pub output: Option<String>,

	/// Output format (console, csv, json)
	#[arg(long = "format", default_value = "console")]
	pub format: String,

	/// Verbose output: configuration dump and per-query errors on stderr
	#[arg(short = 'v', long = "verbose")]
	pub verbose: bool,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_cli_definition_is_consistent() {
		use clap::CommandFactory;
		Cli::command().debug_assert();
	}

	#[test]
	fn test_defaults() {
		let cli = Cli::parse_from(["resolver-bench"]);
		assert_eq!(cli.queries, 4);
		assert_eq!(cli.timeout, 5000);
		assert_eq!(cli.concurrency, 4);
		assert_eq!(cli.rate, 50);
		assert_eq!(cli.query_type, "A");
		assert_eq!(cli.domain, "example.com");
		assert_eq!(cli.format, "console");
		assert!(!cli.dnssec);
		assert!(!cli.no_system);
	}

	#[test]
	fn test_flags_parse() {
		let cli = Cli::parse_from([
			"resolver-bench",
			"-f",
			"servers.txt",
			"-n",
			"10",
			"--rate",
			"0",
			"--dnssec",
			"--nxdomain",
			"--format",
			"json",
			"-o",
			"out.json",
		]);
		assert_eq!(cli.file.as_deref(), Some("servers.txt"));
		assert_eq!(cli.queries, 10);
		assert_eq!(cli.rate, 0);
		assert!(cli.dnssec);
		assert!(cli.nxdomain);
		assert_eq!(cli.format, "json");
		assert_eq!(cli.output.as_deref(), Some("out.json"));
	}
}
