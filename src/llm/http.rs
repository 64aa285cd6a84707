//! Minimal HTTP POST helper shared by the provider adapters.
//!
//! Uses `curl` as a subprocess for HTTPS requests rather than pulling in a
//! full HTTP client stack. The status code is captured via `--write-out` on
//! a trailing line so adapters can classify failures with
//! [`ProviderError::from_status`].

use crate::llm::error::ProviderError;
use tracing::debug;

/// Response from a single HTTP POST attempt.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Execute exactly one JSON POST request.
///
/// `headers` are full `Name: value` strings. Timeouts surface as
/// [`ProviderError::Timeout`], other transport failures as
/// [`ProviderError::Connection`]. Non-2xx statuses are returned as data,
/// not errors; classification is the adapter's job.
pub async fn post_json(
    url: &str,
    headers: &[String],
    body: &str,
    timeout_secs: u64,
) -> Result<HttpResponse, ProviderError> {
    let mut args: Vec<String> = vec![
        "-s".into(),
        "-X".into(),
        "POST".into(),
        url.to_string(),
        "-H".into(),
        "Content-Type: application/json".into(),
    ];
    for header in headers {
        args.push("-H".into());
        args.push(header.clone());
    }
    args.extend([
        "-d".into(),
        body.to_string(),
        "--max-time".into(),
        timeout_secs.to_string(),
        "--write-out".into(),
        "\n%{http_code}".into(),
    ]);

    debug!(url, "Sending provider request ({} byte body)", body.len());

    let output = tokio::process::Command::new("curl")
        .args(&args)
        .output()
        .await
        .map_err(|e| ProviderError::Connection {
            message: format!("Failed to execute curl: {e}"),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        // curl exit 28 is the operation timeout
        if output.status.code() == Some(28)
            || stderr.contains("timed out")
            || stderr.contains("timeout")
        {
            return Err(ProviderError::Timeout { timeout_secs });
        }
        return Err(ProviderError::Connection {
            message: format!("curl failed: {stderr}"),
        });
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let (body, status_line) = raw.rsplit_once('\n').unwrap_or((raw.as_ref(), "0"));
    let status = status_line.trim().parse::<u16>().unwrap_or(0);

    Ok(HttpResponse {
        status,
        body: body.to_string(),
    })
}
