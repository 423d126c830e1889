use anyhow::{anyhow, Context, Result};
use tokio::net::{lookup_host, UdpSocket};

/// Receive attempts before giving up on a matching transaction id.
const MAX_RECV_ATTEMPTS: usize = 3;

/// One UDP datagram exchange on a dedicated socket.
///
/// A fresh socket per query avoids response stealing between concurrent
/// workers targeting the same resolver. Datagrams whose transaction id
/// does not match are skipped; there is no retransmission and truncated
/// responses are not retried over TCP. The caller enforces the deadline.
pub(super) async fn exchange(address: &str, packet: &[u8], txid: u16) -> Result<Vec<u8>> {
	let addr = lookup_host(address)
		.await
		.with_context(|| format!("failed to resolve '{}'", address))?
		.next()
		.ok_or_else(|| anyhow!("no address found for '{}'", address))?;

	let bind_addr = if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
	let socket = UdpSocket::bind(bind_addr)
		.await
		.context("failed to bind UDP socket")?;

	socket
		.send_to(packet, addr)
		.await
		.with_context(|| format!("failed to send UDP query to {}", addr))?;

	// 4096 bytes to match the advertised EDNS0 payload size
	let mut buf = vec![0u8; 4096];
	for _ in 0..MAX_RECV_ATTEMPTS {
		let (len, _src) = socket
			.recv_from(&mut buf)
			.await
			.context("failed to receive UDP response")?;
		if len >= 2 && buf[..2] == txid.to_be_bytes() {
			return Ok(buf[..len].to_vec());
		}
		// Stray datagram from an earlier query; keep listening
	}

	Err(anyhow!("no response matching transaction id {}", txid))
}
