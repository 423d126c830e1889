use anyhow::{anyhow, Context, Result};
use rustls::pki_types::ServerName;
use tokio::net::{lookup_host, TcpStream};
use tokio_rustls::TlsConnector;

use super::tcp::{read_prefixed, write_prefixed};

/// One length-prefixed DNS exchange over a fresh TLS connection.
///
/// TLS 1.2+ with SNI set to the endpoint's authority hostname and
/// certificate validation against the bundled root store. Same framing as
/// TCP. The caller enforces the deadline.
pub(super) async fn exchange(
	connector: &TlsConnector,
	address: &str,
	hostname: &str,
	packet: &[u8],
) -> Result<Vec<u8>> {
	let addr = lookup_host(address)
		.await
		.with_context(|| format!("failed to resolve '{}'", address))?
		.next()
		.ok_or_else(|| anyhow!("no address found for '{}'", address))?;

	let tcp_stream = TcpStream::connect(addr)
		.await
		.with_context(|| format!("failed to connect to {}", addr))?;

	let server_name = ServerName::try_from(hostname.to_string())
		.map_err(|_| anyhow!("invalid TLS server name '{}'", hostname))?;
	let mut tls_stream = connector
		.connect(server_name, tcp_stream)
		.await
		.with_context(|| format!("TLS handshake with '{}' failed", hostname))?;

	write_prefixed(&mut tls_stream, packet).await?;
	read_prefixed(&mut tls_stream).await
}
