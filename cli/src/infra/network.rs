//! Network infrastructure: discovers the caller's public IPv4 address.

use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Service returning the caller's public IP as plain text.
pub const CHECK_IP_URL: &str = "https://checkip.amazonaws.com";

/// Fetch the caller's public address and return it as a `/32` CIDR block.
///
/// # Errors
///
/// Returns an error if the request fails or the body is not an IPv4 address.
pub async fn caller_cidr(url: &str) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .context("building HTTP client")?;
    let body = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .with_context(|| format!("querying {url}"))?
        .text()
        .await
        .with_context(|| format!("reading response from {url}"))?;
    let cidr = parse_ip_as_cidr(&body)?;
    tracing::debug!(%cidr, "resolved caller address");
    Ok(cidr)
}

fn parse_ip_as_cidr(body: &str) -> Result<String> {
    let ip: Ipv4Addr = body
        .trim()
        .parse()
        .with_context(|| format!("unexpected public IP response: {:?}", body.trim()))?;
    Ok(format!("{ip}/32"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trailing_newline() {
        assert_eq!(parse_ip_as_cidr("203.0.113.7\n").expect("parse"), "203.0.113.7/32");
    }

    #[test]
    fn rejects_html() {
        assert!(parse_ip_as_cidr("<html>rate limited</html>").is_err());
    }
}
