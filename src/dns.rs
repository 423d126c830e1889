use anyhow::{anyhow, Result};
use hickory_proto::op::{Edns, Message, MessageType, Query};
use hickory_proto::rr::{Name, RecordType};
use rand::RngCore;

/// Build a DNS query message for the given domain and record type.
///
/// Sets recursion desired, the AD bit, and an EDNS0 OPT record with DO=1
/// and a 4096-byte UDP payload so validating resolvers can signal DNSSEC.
/// Returns the serialized query bytes and the transaction id.
pub fn build_query(domain: &str, rtype: RecordType) -> Result<(Vec<u8>, u16)> {
	let name = Name::from_ascii(domain)
		.map_err(|e| anyhow!("invalid domain name '{}': {}", domain, e))?;

	let txid: u16 = rand::random();
	let mut message = Message::new();
	message.set_id(txid);
	message.set_recursion_desired(true);
	message.set_authentic_data(true);
	message.add_query(Query::query(name, rtype));

	let edns = message.extensions_mut().get_or_insert_with(Edns::new);
	edns.set_max_payload(4096);
	edns.set_version(0);
	edns.set_dnssec_ok(true);

	let bytes = message
		.to_vec()
		.map_err(|e| anyhow!("failed to serialize DNS query: {}", e))?;
	Ok((bytes, txid))
}

/// Parse a DNS response, validating the transaction id and message type.
pub fn parse_response(bytes: &[u8], expected_txid: u16) -> Result<Message> {
	let message = Message::from_vec(bytes)
		.map_err(|e| anyhow!("failed to parse DNS response: {}", e))?;

	if message.id() != expected_txid {
		return Err(anyhow!(
			"txid mismatch: expected {}, got {}",
			expected_txid,
			message.id()
		));
	}
	if message.message_type() != MessageType::Response {
		return Err(anyhow!("received a query instead of a response"));
	}

	Ok(message)
}

/// Generate a unique query name: prefix + 16 hex chars + suffix.
///
/// Embeds 8 bytes of OS randomness so no two names within a run collide,
/// defeating recursor caches.
pub fn random_name(prefix: &str, suffix: &str) -> String {
	let mut bytes = [0u8; 8];
	rand::thread_rng().fill_bytes(&mut bytes);
	format!("{}{}{}", prefix, hex::encode(bytes), suffix)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;

	#[test]
	fn test_build_query_sets_txid() {
		let (bytes, txid) = build_query("example.com.", RecordType::A).unwrap();
		assert!(bytes.len() >= 12);
		// txid lives in the first two bytes, big-endian
		assert_eq!(bytes[0], (txid >> 8) as u8);
		assert_eq!(bytes[1], (txid & 0xff) as u8);
	}

	#[test]
	fn test_build_query_carries_edns_do() {
		let (bytes, txid) = build_query("example.com.", RecordType::A).unwrap();
		let message = Message::from_vec(&bytes).unwrap();
		assert_eq!(message.id(), txid);
		assert!(message.recursion_desired());
		assert!(message.authentic_data());
		let edns = message.extensions().as_ref().expect("OPT record missing");
		assert!(edns.dnssec_ok());
		assert_eq!(edns.max_payload(), 4096);
	}

	#[test]
	fn test_build_query_invalid_name() {
		assert!(build_query("exa mple.com.", RecordType::A).is_err());
	}

	#[test]
	fn test_parse_valid_response() {
		let (bytes, txid) = build_query("example.com.", RecordType::A).unwrap();
		let mut response = Message::from_vec(&bytes).unwrap();
		response.set_message_type(MessageType::Response);
		let response_bytes = response.to_vec().unwrap();

		let parsed = parse_response(&response_bytes, txid).unwrap();
		assert_eq!(parsed.id(), txid);
	}

	#[test]
	fn test_parse_txid_mismatch() {
		let (bytes, txid) = build_query("example.com.", RecordType::A).unwrap();
		let mut response = Message::from_vec(&bytes).unwrap();
		response.set_message_type(MessageType::Response);
		let response_bytes = response.to_vec().unwrap();

		let result = parse_response(&response_bytes, txid.wrapping_add(1));
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("txid mismatch"));
	}

	#[test]
	fn test_parse_rejects_query() {
		let (bytes, txid) = build_query("example.com.", RecordType::A).unwrap();
		assert!(parse_response(&bytes, txid).is_err());
	}

	#[test]
	fn test_parse_truncated_buffer() {
		let bytes = vec![0u8; 5];
		assert!(parse_response(&bytes, 0).is_err());
	}

	#[test]
	fn test_random_names_unique() {
		let mut seen = HashSet::new();
		for _ in 0..64 {
			let name = random_name("nxdomain-test-", ".example.com.");
			assert!(name.starts_with("nxdomain-test-"));
			assert!(name.ends_with(".example.com."));
			assert!(seen.insert(name));
		}
	}

	#[test]
	fn test_random_name_shape() {
		let name = random_name("p-", ".net.");
		// prefix + 16 hex chars + suffix
		assert_eq!(name.len(), 2 + 16 + 5);
	}
}
