use std::net::IpAddr;

use anyhow::{anyhow, Result};
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RData;

use crate::resolver::is_valid_hostname;
use crate::transport::{QueryError, QueryReply};

/// Domain whose zone is signed; a validating resolver sets AD on it.
pub const DNSSEC_CHECK_DOMAIN: &str = "dnssec-ok.org.";
pub const NXDOMAIN_CHECK_PREFIX: &str = "nxdomain-test-";
pub const NXDOMAIN_CHECK_SUFFIX: &str = ".example.com.";
/// Placeholder. The rebinding check is only meaningful when this points at
/// a domain whose authoritative answer is a private-range IP; until then
/// most resolvers trivially pass.
pub const REBINDING_CHECK_DOMAIN: &str = "private.dns-rebinding-test.com.";
pub const DOTCOM_CHECK_PREFIX: &str = "resolver-bench-dotcom-";
pub const DOTCOM_CHECK_SUFFIX: &str = ".com.";

/// The behavioral checks that can run against each endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
	Dnssec,
	Nxdomain,
	Rebinding,
	Accuracy,
	Dotcom,
}

impl CheckKind {
	/// Human-readable name used in verbose error logging.
	pub fn label(self) -> &'static str {
		match self {
			CheckKind::Dnssec => "DNSSEC",
			CheckKind::Nxdomain => "NXDOMAIN",
			CheckKind::Rebinding => "rebinding",
			CheckKind::Accuracy => "accuracy",
			CheckKind::Dotcom => "dotcom",
		}
	}
}

/// The `(name, expected IP)` pair driving the accuracy check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccuracyCheck {
	pub domain: String,
	pub expected_ip: IpAddr,
}

/// Did the resolver validate DNSSEC and say so?
///
/// True only when a response arrived with the AD flag set. Errors count
/// as no support.
pub fn supports_dnssec(outcome: &Result<QueryReply, QueryError>) -> bool {
	match outcome {
		Ok(reply) => reply.message.authentic_data(),
		Err(_) => false,
	}
}

/// Did the resolver synthesize an answer for a name that cannot exist?
///
/// A genuine NXDOMAIN, a NOERROR with an empty answer section, and any
/// error all count as not hijacking.
pub fn hijacks_nxdomain(outcome: &Result<QueryReply, QueryError>) -> bool {
	match outcome {
		Ok(reply) => {
			reply.message.response_code() == ResponseCode::NoError
				&& !reply.message.answers().is_empty()
		}
		Err(_) => false,
	}
}

/// Did the resolver refuse to hand back a private-range answer?
///
/// Conservative: transport errors, non-success rcodes, and empty answers
/// all count as blocked. Only a NOERROR with answers marks the resolver
/// as allowing rebinding.
pub fn blocks_rebinding(outcome: &Result<QueryReply, QueryError>) -> bool {
	match outcome {
		Ok(reply) => {
			reply.message.response_code() != ResponseCode::NoError
				|| reply.message.answers().is_empty()
		}
		Err(_) => true,
	}
}

/// Does any A record in the answer match the expected IP?
pub fn is_accurate(outcome: &Result<QueryReply, QueryError>, expected_ip: IpAddr) -> bool {
	let reply = match outcome {
		Ok(reply) => reply,
		Err(_) => return false,
	};
	if reply.message.response_code() != ResponseCode::NoError {
		return false;
	}
	reply.message.answers().iter().any(|record| match record.data() {
		Some(RData::A(a)) => IpAddr::V4(a.0) == expected_ip,
		_ => false,
	})
}

/// Load the accuracy check file: whitespace-separated `name ip` pairs,
/// `#` comments, first well-formed line wins. The name is normalized to
/// its FQDN form.
pub fn load_accuracy_file(path: &str) -> Result<AccuracyCheck> {
	let content = std::fs::read_to_string(path)
		.map_err(|e| anyhow!("failed to read accuracy file '{}': {}", path, e))?;

	for (line_number, raw) in content.lines().enumerate() {
		let line = raw.trim();
		if line.is_empty() || line.starts_with('#') {
			continue;
		}

		let fields: Vec<&str> = line.split_whitespace().collect();
		if fields.len() != 2 {
			eprintln!(
				"Warning: skipping malformed line {} in accuracy file '{}': {}",
				line_number + 1,
				path,
				line
			);
			continue;
		}

		let domain = fields[0].trim_end_matches('.');
		if !is_valid_hostname(domain) {
			eprintln!(
				"Warning: skipping invalid domain on line {} in accuracy file '{}': {}",
				line_number + 1,
				path,
				fields[0]
			);
			continue;
		}

		let expected_ip: IpAddr = match fields[1].parse() {
			Ok(ip) => ip,
			Err(_) => {
				eprintln!(
					"Warning: skipping invalid IP on line {} in accuracy file '{}': {}",
					line_number + 1,
					path,
					fields[1]
				);
				continue;
			}
		};

		return Ok(AccuracyCheck {
			domain: format!("{}.", domain),
			expected_ip,
		});
	}

	Err(anyhow!("no valid 'name ip' pairs found in '{}'", path))
}
