use std::collections::HashSet;
use std::net::{IpAddr, Ipv6Addr};

use anyhow::{anyhow, Result};
use url::Url;

/// Transport protocol for a DNS endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
	Udp,
	Tcp,
	Dot,
	Doh,
	Doq,
}

impl Protocol {
	/// Default port used when the endpoint string carries none.
	pub fn default_port(self) -> u16 {
		match self {
			Protocol::Udp | Protocol::Tcp => 53,
			Protocol::Dot | Protocol::Doq => 853,
			// DoH ports come from the URL; never consulted
			Protocol::Doh => 443,
		}
	}
}

/// A parsed DNS server endpoint.
///
/// `address` is `host:port` (IPv6 bracketed) for everything except DoH,
/// where it is the full HTTPS URL. `hostname` is the name used for TLS SNI
/// and certificate validation and never carries IPv6 brackets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
	pub protocol: Protocol,
	pub address: String,
	pub hostname: String,
}

impl Endpoint {
	/// Canonical string form, used for deduplication and as the result key.
	///
	/// `ip:port` for UDP, `tcp://host:port`, `tls://host:port`,
	/// `quic://host:port`, or the full URL for DoH.
	pub fn canonical(&self) -> String {
		match self.protocol {
			Protocol::Udp => self.address.clone(),
			Protocol::Tcp => format!("tcp://{}", self.address),
			Protocol::Dot => format!("tls://{}", self.address),
			Protocol::Doq => format!("quic://{}", self.address),
			Protocol::Doh => self.address.clone(),
		}
	}
}

impl std::fmt::Display for Endpoint {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.canonical())
	}
}

/// Well-known public resolvers covering all five transports.
pub const DEFAULT_ENDPOINTS: &[&str] = &[
	// Cloudflare
	"1.1.1.1",
	"tls://1.1.1.1",
	"https://cloudflare-dns.com/dns-query",
	// Google
	"8.8.8.8",
	"tls://8.8.8.8",
	"https://dns.google/dns-query",
	// Quad9
	"9.9.9.9",
	"tls://9.9.9.9",
	"https://dns.quad9.net/dns-query",
	// OpenDNS
	"208.67.222.222",
	"tls://dns.opendns.com",
	"https://doh.opendns.com/dns-query",
	// AdGuard
	"94.140.14.14",
	"tls://dns.adguard-dns.com",
	"https://dns.adguard-dns.com/dns-query",
	"quic://dns.adguard-dns.com",
];

/// Validate a hostname for use as an endpoint host.
///
/// IP literals always pass. Names must follow RFC 1123 label rules
/// (alphanumeric or hyphen, not hyphen-edged, at most 63 chars per label,
/// 253 overall), contain at least one dot unless the name is `localhost`,
/// and not consist purely of digits and dots, which would be ambiguous
/// with an unbracketed IP.
pub fn is_valid_hostname(hostname: &str) -> bool {
	if hostname.is_empty() {
		return false;
	}
	if hostname.parse::<IpAddr>().is_ok() {
		return true;
	}
	if hostname.len() > 253 {
		return false;
	}
	if !hostname.contains('.') && hostname != "localhost" {
		return false;
	}
	if hostname.chars().all(|c| c.is_ascii_digit() || c == '.') {
		return false;
	}
	for label in hostname.split('.') {
		if label.is_empty() || label.len() > 63 {
			return false;
		}
		if label.starts_with('-') || label.ends_with('-') {
			return false;
		}
		if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
			return false;
		}
	}
	true
}

/// Join a host and port into `host:port`, bracketing IPv6 literals.
fn join_host_port(host: &str, port: u16) -> String {
	if host.parse::<Ipv6Addr>().is_ok() {
		format!("[{}]:{}", host, port)
	} else {
		format!("{}:{}", host, port)
	}
}

/// Split `addr` into host and port, falling back to `default_port`.
///
/// Handles `host`, `host:port`, bare IPv6, `[v6]`, and `[v6]:port`.
/// A present-but-unparseable port is replaced by the default with a
/// warning; the host is preserved.
fn split_host_port(addr: &str, default_port: u16, original: &str) -> Result<(String, u16)> {
	if let Some(rest) = addr.strip_prefix('[') {
		// Bracketed IPv6, optionally with a port
		let end = rest
			.find(']')
			.ok_or_else(|| anyhow!("unterminated '[' in '{}'", original))?;
		let host = &rest[..end];
		let tail = &rest[end + 1..];
		if tail.is_empty() {
			return Ok((host.to_string(), default_port));
		}
		let port_str = tail
			.strip_prefix(':')
			.ok_or_else(|| anyhow!("unexpected characters after ']' in '{}'", original))?;
		return match port_str.parse::<u16>() {
			Ok(port) => Ok((host.to_string(), port)),
			Err(_) => {
				eprintln!(
					"Warning: invalid port in '{}', using default port {} for host '{}'",
					original, default_port, host
				);
				Ok((host.to_string(), default_port))
			}
		};
	}

	// Bare IPv6 literal without brackets
	if addr.parse::<Ipv6Addr>().is_ok() {
		return Ok((addr.to_string(), default_port));
	}

	match addr.rsplit_once(':') {
		Some((host, port_str)) => match port_str.parse::<u16>() {
			Ok(port) => Ok((host.to_string(), port)),
			Err(_) => {
				eprintln!(
					"Warning: invalid port in '{}', using default port {} for host '{}'",
					original, default_port, host
				);
				Ok((host.to_string(), default_port))
			}
		},
		None => Ok((addr.to_string(), default_port)),
	}
}

/// Parse a single endpoint string into an `Endpoint`.
///
/// Accepted forms:
///   `host` / `host:port`            -- UDP, default port 53
///   `tcp://host[:port]`             -- TCP, default 53
///   `tls://host[:port]`             -- DoT, default 853
///   `quic://host[:port]`            -- DoQ, default 853
///   `https://host[:port]/path`      -- DoH
pub fn parse_endpoint(input: &str) -> Result<Endpoint> {
	let trimmed = input.trim();
	if trimmed.is_empty() {
		return Err(anyhow!("endpoint cannot be empty or only whitespace"));
	}

	// DoH endpoints are full URLs
	if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
		let url = Url::parse(trimmed)
			.map_err(|e| anyhow!("invalid DoH URL '{}': {}", trimmed, e))?;
		if url.scheme() != "https" {
			return Err(anyhow!("invalid DoH URL scheme in '{}': must be https", trimmed));
		}
		let hostname = match url.host() {
			Some(url::Host::Domain(d)) => {
				if !is_valid_hostname(d) {
					return Err(anyhow!("invalid hostname '{}' in DoH URL '{}'", d, trimmed));
				}
				d.to_string()
			}
			Some(url::Host::Ipv4(ip)) => ip.to_string(),
			Some(url::Host::Ipv6(ip)) => ip.to_string(),
			None => return Err(anyhow!("DoH URL '{}' is missing a host", trimmed)),
		};
		return Ok(Endpoint {
			protocol: Protocol::Doh,
			address: trimmed.to_string(),
			hostname,
		});
	}

	// Detect the protocol prefix for the remaining transports
	let (protocol, addr_part) = if let Some(rest) = trimmed.strip_prefix("tls://") {
		(Protocol::Dot, rest)
	} else if let Some(rest) = trimmed.strip_prefix("quic://") {
		(Protocol::Doq, rest)
	} else if let Some(rest) = trimmed.strip_prefix("tcp://") {
		(Protocol::Tcp, rest)
	} else if let Some(rest) = trimmed.strip_prefix("udp://") {
		(Protocol::Udp, rest)
	} else if let Some(idx) = scheme_prefix_len(trimmed) {
		eprintln!(
			"Warning: unrecognized protocol scheme '{}' in '{}', assuming UDP",
			&trimmed[..idx],
			trimmed
		);
		(Protocol::Udp, &trimmed[idx + 3..])
	} else {
		(Protocol::Udp, trimmed)
	};

	let (host, port) = split_host_port(addr_part, protocol.default_port(), trimmed)?;
	if !is_valid_hostname(&host) {
		return Err(anyhow!("invalid host '{}' in endpoint '{}'", host, trimmed));
	}

	Ok(Endpoint {
		protocol,
		address: join_host_port(&host, port),
		hostname: host,
	})
}

/// Return the scheme length if the string starts with `<scheme>://` where
/// the scheme contains no colon (so bare IPv6 literals do not match).
fn scheme_prefix_len(s: &str) -> Option<usize> {
	let idx = s.find("://")?;
	if s[..idx].contains(':') {
		return None;
	}
	Some(idx)
}

/// Parse a list of endpoint strings, dropping invalid entries with a
/// warning and deduplicating by canonical form. First occurrence wins.
pub fn parse_and_dedup(inputs: &[String]) -> Vec<Endpoint> {
	let mut seen = HashSet::new();
	let mut endpoints = Vec::new();
	for input in inputs {
		let endpoint = match parse_endpoint(input) {
			Ok(e) => e,
			Err(e) => {
				eprintln!("Warning: skipping invalid endpoint '{}': {}", input.trim(), e);
				continue;
			}
		};
		if seen.insert(endpoint.canonical()) {
			endpoints.push(endpoint);
		}
	}
	endpoints
}

/// Read endpoint strings from a file, one per line.
///
/// Blank lines and lines starting with '#' are skipped.
pub fn read_endpoint_file(path: &str) -> Result<Vec<String>> {
	let content = std::fs::read_to_string(path)
		.map_err(|e| anyhow!("failed to read endpoint file '{}': {}", path, e))?;
	let lines: Vec<String> = content
		.lines()
		.map(|line| line.trim().to_string())
		.filter(|line| !line.is_empty() && !line.starts_with('#'))
		.collect();
	if lines.is_empty() {
		return Err(anyhow!("no endpoints found in file '{}'", path));
	}
	Ok(lines)
}

/// Discover system resolvers from /etc/resolv.conf (Unix only).
///
/// Each `nameserver` IP becomes a plain UDP endpoint string. On platforms
/// without resolv.conf this returns empty with a warning.
#[cfg(unix)]
pub fn system_endpoints() -> Vec<String> {
	let content = match std::fs::read_to_string("/etc/resolv.conf") {
		Ok(c) => c,
		Err(e) => {
			eprintln!("Warning: could not detect system resolvers: {}", e);
			return Vec::new();
		}
	};
	let mut servers = Vec::new();
	for line in content.lines() {
		let mut parts = line.split_whitespace();
		if parts.next() != Some("nameserver") {
			continue;
		}
		if let Some(addr) = parts.next() {
			if addr.parse::<IpAddr>().is_ok() {
				servers.push(addr.to_string());
			}
		}
	}
	servers
}

#[cfg(not(unix))]
pub fn system_endpoints() -> Vec<String> {
	eprintln!("Warning: system resolver detection is not implemented on this platform");
	Vec::new()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_udp_bare_ip() {
		let e = parse_endpoint("1.1.1.1").unwrap();
		assert_eq!(e.protocol, Protocol::Udp);
		assert_eq!(e.address, "1.1.1.1:53");
		assert_eq!(e.hostname, "1.1.1.1");
		assert_eq!(e.canonical(), "1.1.1.1:53");
	}

	#[test]
	fn test_udp_with_port() {
		let e = parse_endpoint("8.8.8.8:5353").unwrap();
		assert_eq!(e.address, "8.8.8.8:5353");
	}

	#[test]
	fn test_tcp_prefix() {
		let e = parse_endpoint("tcp://9.9.9.9").unwrap();
		assert_eq!(e.protocol, Protocol::Tcp);
		assert_eq!(e.canonical(), "tcp://9.9.9.9:53");
	}

	#[test]
	fn test_dot_named_host() {
		let e = parse_endpoint("tls://dns.opendns.com").unwrap();
		assert_eq!(e.protocol, Protocol::Dot);
		assert_eq!(e.address, "dns.opendns.com:853");
		assert_eq!(e.hostname, "dns.opendns.com");
		assert_eq!(e.canonical(), "tls://dns.opendns.com:853");
	}

	#[test]
	fn test_doq_default_port() {
		let e = parse_endpoint("quic://dns.adguard-dns.com").unwrap();
		assert_eq!(e.protocol, Protocol::Doq);
		assert_eq!(e.canonical(), "quic://dns.adguard-dns.com:853");
	}

	#[test]
	fn test_doh_url() {
		let e = parse_endpoint("https://cloudflare-dns.com/dns-query").unwrap();
		assert_eq!(e.protocol, Protocol::Doh);
		assert_eq!(e.address, "https://cloudflare-dns.com/dns-query");
		assert_eq!(e.hostname, "cloudflare-dns.com");
	}

	#[test]
	fn test_doh_requires_https() {
		assert!(parse_endpoint("http://dns.google/dns-query").is_err());
	}

	#[test]
	fn test_doh_missing_host() {
		assert!(parse_endpoint("https:///dns-query").is_err());
	}

	#[test]
	fn test_ipv6_bare() {
		let e = parse_endpoint("2606:4700::1111").unwrap();
		assert_eq!(e.protocol, Protocol::Udp);
		assert_eq!(e.address, "[2606:4700::1111]:53");
		assert_eq!(e.hostname, "2606:4700::1111");
	}

	#[test]
	fn test_ipv6_bracketed_with_port() {
		let e = parse_endpoint("[2606:4700::1111]:5353").unwrap();
		assert_eq!(e.address, "[2606:4700::1111]:5353");
		assert_eq!(e.hostname, "2606:4700::1111");
	}

	#[test]
	fn test_bad_port_salvages_host() {
		let e = parse_endpoint("tls://dns.quad9.net:bad").unwrap();
		assert_eq!(e.address, "dns.quad9.net:853");
	}

	#[test]
	fn test_empty_input() {
		assert!(parse_endpoint("   ").is_err());
	}

	#[test]
	fn test_invalid_hostname_rejected() {
		assert!(parse_endpoint("not a host").is_err());
		assert!(parse_endpoint("-bad-.example.com").is_err());
		assert!(parse_endpoint("single-label").is_err());
	}

	#[test]
	fn test_localhost_allowed() {
		let e = parse_endpoint("localhost").unwrap();
		assert_eq!(e.address, "localhost:53");
	}

	#[test]
	fn test_numeric_hostname_rejected() {
		// Looks like an IP but is not one; too ambiguous to accept
		assert!(parse_endpoint("257.1.1.1").is_err());
	}

	#[test]
	fn test_roundtrip_canonical() {
		for input in ["1.1.1.1", "tcp://1.1.1.1", "tls://1.1.1.1", "quic://1.1.1.1",
			"https://dns.google/dns-query"] {
			let first = parse_endpoint(input).unwrap();
			let second = parse_endpoint(&first.canonical()).unwrap();
			assert_eq!(first, second, "canonical form of '{}' did not round-trip", input);
		}
	}

	#[test]
	fn test_dedup_by_canonical_form() {
		let inputs: Vec<String> = ["1.1.1.1", "1.1.1.1:53", "tls://1.1.1.1"]
			.iter()
			.map(|s| s.to_string())
			.collect();
		let endpoints = parse_and_dedup(&inputs);
		assert_eq!(endpoints.len(), 2);
		assert_eq!(endpoints[0].canonical(), "1.1.1.1:53");
		assert_eq!(endpoints[1].canonical(), "tls://1.1.1.1:853");
	}

	#[test]
	fn test_dedup_keeps_first_occurrence() {
		let inputs: Vec<String> = ["8.8.8.8", "bogus input", "8.8.8.8:53"]
			.iter()
			.map(|s| s.to_string())
			.collect();
		let endpoints = parse_and_dedup(&inputs);
		assert_eq!(endpoints.len(), 1);
	}

	#[test]
	fn test_defaults_parse_cleanly() {
		let inputs: Vec<String> = DEFAULT_ENDPOINTS.iter().map(|s| s.to_string()).collect();
		let endpoints = parse_and_dedup(&inputs);
		assert_eq!(endpoints.len(), DEFAULT_ENDPOINTS.len());
	}
}
