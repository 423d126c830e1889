mod doh;
mod doq;
mod dot;
mod tcp;
mod udp;

pub use doq::QuicPool;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use hickory_proto::op::Message;
use hickory_proto::rr::RecordType;
use thiserror::Error;
use tokio_rustls::TlsConnector;

use crate::dns;
use crate::resolver::{Endpoint, Protocol};

/// Failure of a single query.
///
/// Timeouts are distinguished from other transport failures for reporting;
/// callers treat both as a failed attempt.
#[derive(Debug, Error)]
pub enum QueryError {
	#[error("query timed out after {0:?}")]
	Timeout(Duration),
	#[error(transparent)]
	Transport(#[from] anyhow::Error),
}

/// A successful query: wall-clock latency plus the parsed response.
///
/// Latency runs from immediately before the send to immediately after the
/// response is parsed, measured on the calling worker.
#[derive(Debug, Clone)]
pub struct QueryReply {
	pub latency: Duration,
	pub message: Message,
}

/// The seam between the scheduler and the wire.
///
/// One DNS question, one deadline, one outcome. Mocked in tests.
#[async_trait]
pub trait Querier: Send + Sync {
	async fn query(
		&self,
		endpoint: &Endpoint,
		domain: &str,
		rtype: RecordType,
		deadline: Duration,
	) -> Result<QueryReply, QueryError>;
}

/// Real transport dispatch across the five protocols.
///
/// Long-lived resources are created once per benchmark: an HTTP client per
/// DoH endpoint (keep-alive and TLS session reuse) and a shared QUIC
/// session pool for DoQ. UDP, TCP and DoT deliberately use a fresh socket
/// per query so the measurement includes transport setup.
pub struct DnsClient {
	tls_connector: TlsConnector,
	doh_clients: HashMap<String, reqwest::Client>,
	quic_pool: Arc<QuicPool>,
}

impl DnsClient {
	pub fn new(endpoints: &[Endpoint]) -> Result<Self> {
		let mut root_store = rustls::RootCertStore::empty();
		root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
		let tls_config = rustls::ClientConfig::builder()
			.with_root_certificates(root_store.clone())
			.with_no_client_auth();
		let tls_connector = TlsConnector::from(Arc::new(tls_config));

		let mut doh_clients = HashMap::new();
		for endpoint in endpoints {
			if endpoint.protocol == Protocol::Doh {
				doh_clients.insert(endpoint.address.clone(), doh::build_client()?);
			}
		}

		let quic_pool = Arc::new(QuicPool::new(root_store)?);

		Ok(Self {
			tls_connector,
			doh_clients,
			quic_pool,
		})
	}

	/// Shut down pooled resources. Idempotent.
	pub async fn shutdown(&self) {
		self.quic_pool.shutdown().await;
	}

	async fn exchange(
		&self,
		endpoint: &Endpoint,
		packet: &[u8],
		txid: u16,
		deadline: Duration,
	) -> Result<Vec<u8>> {
		match endpoint.protocol {
			Protocol::Udp => udp::exchange(&endpoint.address, packet, txid).await,
			Protocol::Tcp => tcp::exchange(&endpoint.address, packet).await,
			Protocol::Dot => {
				dot::exchange(&self.tls_connector, &endpoint.address, &endpoint.hostname, packet)
					.await
			}
			Protocol::Doh => {
				// The per-endpoint client is built up front; fall back to a
				// throwaway client if dispatch ever sees an unknown endpoint.
				match self.doh_clients.get(&endpoint.address) {
					Some(client) => {
						doh::exchange(client, &endpoint.address, packet, deadline).await
					}
					None => {
						let client = doh::build_client()?;
						doh::exchange(&client, &endpoint.address, packet, deadline).await
					}
				}
			}
			Protocol::Doq => {
				self.quic_pool
					.exchange(&endpoint.address, &endpoint.hostname, packet)
					.await
			}
		}
	}
}

#[async_trait]
impl Querier for DnsClient {
	async fn query(
		&self,
		endpoint: &Endpoint,
		domain: &str,
		rtype: RecordType,
		deadline: Duration,
	) -> Result<QueryReply, QueryError> {
		let (packet, txid) = dns::build_query(domain, rtype)?;

		let start = Instant::now();
		let bytes = match tokio::time::timeout(
			deadline,
			self.exchange(endpoint, &packet, txid, deadline),
		)
		.await
		{
			Ok(Ok(bytes)) => bytes,
			Ok(Err(e)) => return Err(QueryError::Transport(e)),
			Err(_) => return Err(QueryError::Timeout(deadline)),
		};

		let message = dns::parse_response(&bytes, txid).map_err(QueryError::Transport)?;
		Ok(QueryReply {
			latency: start.elapsed(),
			message,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_timeout_is_distinguished() {
		let timeout = QueryError::Timeout(Duration::from_secs(5));
		assert!(matches!(timeout, QueryError::Timeout(_)));
		assert!(timeout.to_string().contains("timed out"));

		let transport = QueryError::Transport(anyhow::anyhow!("connection refused"));
		assert!(!matches!(transport, QueryError::Timeout(_)));
		assert_eq!(transport.to_string(), "connection refused");
	}

	#[tokio::test]
	async fn test_unreachable_udp_fails_within_deadline() {
		// TEST-NET-1 is reserved and never answers; depending on the host
		// network this surfaces as a timeout or a send error, never success
		let endpoint = crate::resolver::parse_endpoint("192.0.2.1").unwrap();
		let client = DnsClient::new(std::slice::from_ref(&endpoint)).unwrap();
		let start = Instant::now();
		let result = client
			.query(&endpoint, "example.com.", RecordType::A, Duration::from_millis(100))
			.await;
		assert!(result.is_err());
		assert!(start.elapsed() < Duration::from_secs(2));
		client.shutdown().await;
	}
}
