use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tokio::net::lookup_host;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Pooled sessions per endpoint; beyond this, sessions are transient.
const MAX_POOLED_SESSIONS: usize = 10;
/// A pooled session is evicted once it has existed this long.
const CONNECTION_TTL: Duration = Duration::from_secs(30);
/// A pooled session is evicted once it has sat unused this long.
const MAX_IDLE_TIME: Duration = Duration::from_secs(15);
/// How often the sweeper looks for stale sessions.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);
/// Longest DNS message accepted on a DoQ stream.
const MAX_RESPONSE_BYTES: usize = 64 * 1024;

struct PooledSession {
	conn: quinn::Connection,
	created_at: Instant,
	last_used: Instant,
	in_use: bool,
}

type SessionMap = HashMap<String, Vec<PooledSession>>;

/// QUIC session pool for DoQ endpoints.
///
/// QUIC handshakes dominate per-query cost, so sessions are reused across
/// queries; each query still gets its own bidirectional stream. A
/// background sweeper evicts sessions that are closed, too old, or idle
/// too long.
pub struct QuicPool {
	endpoint: quinn::Endpoint,
	sessions: Arc<Mutex<SessionMap>>,
	shutdown_tx: watch::Sender<bool>,
	sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl QuicPool {
	/// Create the pool and start its sweeper. Must run inside a tokio
	/// runtime.
	pub fn new(roots: rustls::RootCertStore) -> Result<Self> {
		let mut crypto = rustls::ClientConfig::builder()
			.with_root_certificates(roots)
			.with_no_client_auth();
		crypto.alpn_protocols = vec![b"doq".to_vec()];

		let client_config = quinn::ClientConfig::new(Arc::new(
			quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
				.map_err(|e| anyhow!("failed to build QUIC TLS config: {}", e))?,
		));

		let bind_addr = "0.0.0.0:0".parse().expect("literal socket address");
		let mut endpoint = quinn::Endpoint::client(bind_addr)
			.context("failed to create QUIC client endpoint")?;
		endpoint.set_default_client_config(client_config);

		let sessions: Arc<Mutex<SessionMap>> = Arc::new(Mutex::new(HashMap::new()));
		let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

		let sweeper_sessions = sessions.clone();
		let sweeper = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
			ticker.tick().await; // first tick completes immediately
			loop {
				tokio::select! {
					_ = ticker.tick() => sweep(&sweeper_sessions).await,
					_ = shutdown_rx.changed() => {
						close_all(&sweeper_sessions).await;
						return;
					}
				}
			}
		});

		Ok(Self {
			endpoint,
			sessions,
			shutdown_tx,
			sweeper: Mutex::new(Some(sweeper)),
		})
	}

	/// One length-prefixed DNS exchange on a fresh bidirectional stream.
	///
	/// The caller enforces the deadline around this whole call, including
	/// session acquisition.
	pub async fn exchange(&self, address: &str, hostname: &str, packet: &[u8]) -> Result<Vec<u8>> {
		let (conn, pooled) = self.acquire(address, hostname).await?;
		let result = exchange_on(&conn, packet).await;
		if pooled {
			self.release(address, &conn).await;
		} else {
			conn.close(0u32.into(), b"done");
		}
		result
	}

	/// Hand out an open, not-in-use pooled session, or dial a new one.
	///
	/// The pool lock is held across the dial so the per-endpoint ceiling is
	/// never overshot; at the ceiling the new session is transient and the
	/// second element of the return value is false.
	async fn acquire(&self, address: &str, hostname: &str) -> Result<(quinn::Connection, bool)> {
		let addr = lookup_host(address)
			.await
			.with_context(|| format!("failed to resolve '{}'", address))?
			.next()
			.ok_or_else(|| anyhow!("no address found for '{}'", address))?;

		let mut sessions = self.sessions.lock().await;
		let entry = sessions.entry(address.to_string()).or_default();

		for session in entry.iter_mut() {
			if !session.in_use && session.conn.close_reason().is_none() {
				session.in_use = true;
				session.last_used = Instant::now();
				return Ok((session.conn.clone(), true));
			}
		}

		if entry.len() >= MAX_POOLED_SESSIONS {
			drop(sessions);
			let conn = self.dial(addr, hostname).await?;
			return Ok((conn, false));
		}

		let conn = self.dial(addr, hostname).await?;
		let now = Instant::now();
		sessions
			.entry(address.to_string())
			.or_default()
			.push(PooledSession {
				conn: conn.clone(),
				created_at: now,
				last_used: now,
				in_use: true,
			});
		Ok((conn, true))
	}

	/// Mark a pooled session as available again.
	async fn release(&self, address: &str, conn: &quinn::Connection) {
		let mut sessions = self.sessions.lock().await;
		if let Some(list) = sessions.get_mut(address) {
			for session in list.iter_mut() {
				if session.conn.stable_id() == conn.stable_id() {
					session.in_use = false;
					session.last_used = Instant::now();
					return;
				}
			}
		}
	}

	async fn dial(&self, addr: std::net::SocketAddr, hostname: &str) -> Result<quinn::Connection> {
		let connecting = self
			.endpoint
			.connect(addr, hostname)
			.with_context(|| format!("failed to start QUIC connection to {}", addr))?;
		connecting
			.await
			.with_context(|| format!("QUIC handshake with {} failed", addr))
	}

	/// Close every session, stop the sweeper, and drain the endpoint.
	/// Safe to call more than once.
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(true);
		if let Some(handle) = self.sweeper.lock().await.take() {
			let _ = handle.await;
		}
		close_all(&self.sessions).await;
		self.endpoint.close(0u32.into(), b"shutdown");
		self.endpoint.wait_idle().await;
	}
}

/// Evict sessions that are closed, older than the TTL, or idle too long.
/// In-use sessions are never touched.
async fn sweep(sessions: &Mutex<SessionMap>) {
	let mut sessions = sessions.lock().await;
	for list in sessions.values_mut() {
		list.retain(|session| {
			if session.in_use {
				return true;
			}
			if session.conn.close_reason().is_some() {
				return false;
			}
			if session.created_at.elapsed() > CONNECTION_TTL
				|| session.last_used.elapsed() > MAX_IDLE_TIME
			{
				session.conn.close(0u32.into(), b"idle");
				return false;
			}
			true
		});
	}
	sessions.retain(|_, list| !list.is_empty());
}

async fn close_all(sessions: &Mutex<SessionMap>) {
	let mut sessions = sessions.lock().await;
	for list in sessions.values() {
		for session in list {
			session.conn.close(0u32.into(), b"shutdown");
		}
	}
	sessions.clear();
}

async fn exchange_on(conn: &quinn::Connection, packet: &[u8]) -> Result<Vec<u8>> {
	let (mut send, mut recv) = conn
		.open_bi()
		.await
		.context("failed to open DoQ stream")?;

	let len = u16::try_from(packet.len())
		.map_err(|_| anyhow!("DNS query too large: {} bytes", packet.len()))?;
	send.write_all(&len.to_be_bytes())
		.await
		.context("failed to write DoQ length prefix")?;
	send.write_all(packet)
		.await
		.context("failed to write DoQ query")?;
	// Close the write half; the response arrives on the read half
	let _ = send.finish();

	let mut len_buf = [0u8; 2];
	recv.read_exact(&mut len_buf)
		.await
		.context("failed to read DoQ length prefix")?;
	let resp_len = u16::from_be_bytes(len_buf) as usize;
	if resp_len > MAX_RESPONSE_BYTES {
		return Err(anyhow!(
			"DoQ response too large: {} bytes (max {})",
			resp_len,
			MAX_RESPONSE_BYTES
		));
	}

	let mut buf = vec![0u8; resp_len];
	recv.read_exact(&mut buf)
		.await
		.context("failed to read DoQ response body")?;
	Ok(buf)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn test_roots() -> rustls::RootCertStore {
		let mut roots = rustls::RootCertStore::empty();
		roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
		roots
	}

	#[tokio::test]
	async fn test_shutdown_is_idempotent() {
		let pool = QuicPool::new(test_roots()).unwrap();
		pool.shutdown().await;
		pool.shutdown().await;
		assert!(pool.sweeper.lock().await.is_none());
	}

	#[tokio::test]
	async fn test_shutdown_stops_sweeper() {
		let pool = QuicPool::new(test_roots()).unwrap();
		pool.shutdown().await;
		// After shutdown the session map stays empty even if swept again
		sweep(&pool.sessions).await;
		assert!(pool.sessions.lock().await.is_empty());
	}

	#[tokio::test]
	#[ignore] // requires network access
	async fn test_doq_adguard_integration() {
		let pool = QuicPool::new(test_roots()).unwrap();
		let (packet, _txid) =
			crate::dns::build_query("example.com.", hickory_proto::rr::RecordType::A).unwrap();
		let result = pool
			.exchange("dns.adguard-dns.com:853", "dns.adguard-dns.com", &packet)
			.await;
		assert!(result.is_ok(), "DoQ exchange failed: {:?}", result.err());
		pool.shutdown().await;
	}
}
