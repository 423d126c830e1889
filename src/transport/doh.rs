use std::time::Duration;

use anyhow::{anyhow, Context, Result};

const CONTENT_TYPE: &str = "application/dns-message";
const USER_AGENT: &str = concat!(
	"resolver-bench/",
	env!("CARGO_PKG_VERSION"),
	" (+https://github.com/resolver-bench/resolver-bench)"
);

/// Build the long-lived HTTP client for one DoH endpoint.
///
/// Connection reuse (keep-alive, TLS session tickets) comes from the
/// client's internal pool; the per-request timeout is set at query time so
/// it always equals the configured deadline.
pub(super) fn build_client() -> Result<reqwest::Client> {
	reqwest::Client::builder()
		.use_rustls_tls()
		.build()
		.context("failed to create DoH HTTP client")
}

/// One RFC 8484 POST exchange.
///
/// The body is the packed DNS message; any non-2xx status is a failure.
pub(super) async fn exchange(
	client: &reqwest::Client,
	url: &str,
	packet: &[u8],
	deadline: Duration,
) -> Result<Vec<u8>> {
	let response = client
		.post(url)
		.timeout(deadline)
		.header("Content-Type", CONTENT_TYPE)
		.header("Accept", CONTENT_TYPE)
		.header("User-Agent", USER_AGENT)
		.body(packet.to_vec())
		.send()
		.await
		.with_context(|| format!("DoH request to '{}' failed", url))?;

	let status = response.status();
	if !status.is_success() {
		return Err(anyhow!("DoH server '{}' returned status {}", url, status));
	}

	let body = response
		.bytes()
		.await
		.context("failed to read DoH response body")?;
	Ok(body.to_vec())
}
