//! HTTP probe run before the browser logs in.

use std::time::Duration;

use tracing::debug;

use super::NavigatorError;

/// Fail with [`NavigatorError::Unreachable`] unless `url` answers an HTTP GET
/// without a server error inside `timeout`.
pub async fn check_reachable(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<(), NavigatorError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| NavigatorError::Unreachable {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    debug!(url, %status, "Reachability probe answered");

    if status.is_server_error() {
        return Err(NavigatorError::Unreachable {
            url: url.to_string(),
            reason: format!("server answered {}", status),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        let client = reqwest::Client::new();
        let err = check_reachable(&client, "http://127.0.0.1:9/login", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(err.is_auth());
        assert!(matches!(err, NavigatorError::Unreachable { ref url, .. } if url == "http://127.0.0.1:9/login"));
    }

    #[tokio::test]
    async fn test_malformed_url_is_unreachable() {
        let client = reqwest::Client::new();
        let err = check_reachable(&client, "not a url", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, NavigatorError::Unreachable { .. }));
    }
}
