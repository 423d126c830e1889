use anyhow::{anyhow, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};

/// One length-prefixed DNS exchange over a fresh TCP connection.
///
/// RFC 1035 framing: a 2-byte big-endian length precedes each message.
/// The connection is dropped after a single round trip by intent, so the
/// measurement includes connection setup. The caller enforces the deadline.
pub(super) async fn exchange(address: &str, packet: &[u8]) -> Result<Vec<u8>> {
	let addr = lookup_host(address)
		.await
		.with_context(|| format!("failed to resolve '{}'", address))?
		.next()
		.ok_or_else(|| anyhow!("no address found for '{}'", address))?;

	let mut stream = TcpStream::connect(addr)
		.await
		.with_context(|| format!("failed to connect to {}", addr))?;

	write_prefixed(&mut stream, packet).await?;
	read_prefixed(&mut stream).await
}

/// Write a 2-byte length prefix followed by the message.
pub(super) async fn write_prefixed<S>(stream: &mut S, packet: &[u8]) -> Result<()>
where
	S: AsyncWriteExt + Unpin,
{
	let len = u16::try_from(packet.len())
		.map_err(|_| anyhow!("DNS query too large: {} bytes", packet.len()))?;
	stream
		.write_all(&len.to_be_bytes())
		.await
		.context("failed to write length prefix")?;
	stream
		.write_all(packet)
		.await
		.context("failed to write DNS query")?;
	stream.flush().await.context("failed to flush DNS query")?;
	Ok(())
}

/// Read a 2-byte length prefix followed by that many message bytes.
pub(super) async fn read_prefixed<S>(stream: &mut S) -> Result<Vec<u8>>
where
	S: AsyncReadExt + Unpin,
{
	let mut len_buf = [0u8; 2];
	stream
		.read_exact(&mut len_buf)
		.await
		.context("failed to read response length")?;
	let len = u16::from_be_bytes(len_buf) as usize;
	if len == 0 {
		return Err(anyhow!("server returned a zero-length response"));
	}

	let mut buf = vec![0u8; len];
	stream
		.read_exact(&mut buf)
		.await
		.context("failed to read response body")?;
	Ok(buf)
}
