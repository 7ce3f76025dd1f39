// ABOUTME: Periodic background fetch of a configured URL, logging each outcome
// ABOUTME: Keep-alive ping for free-tier hosting; independent of request handling

use std::time::Duration;
use tracing::{info, warn};

const FETCH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Fetch `api_url` every five minutes and log the result. The first tick
/// fires immediately, so the URL is hit once at startup. Never returns.
pub async fn run(api_url: String) {
    let client = reqwest::Client::new();
    let mut ticker = tokio::time::interval(FETCH_INTERVAL);
    loop {
        ticker.tick().await;
        fetch_and_log(&client, &api_url).await;
    }
}

async fn fetch_and_log(client: &reqwest::Client, url: &str) {
    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status();
            match response.text().await {
                Ok(body) => info!("Fetched {}: status {}, body: {}", url, status, body),
                Err(e) => warn!("Error reading body from {}: {}", url, e),
            }
        }
        Err(e) => warn!("Error fetching {}: {}", url, e),
    }
}
