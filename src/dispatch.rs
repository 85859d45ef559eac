use crate::record::StatRecord;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Upper bound on one collector call. A call that exceeds this is a failed
/// dispatch like any other; there is no retry here, the re-invocation cadence
/// is the retry mechanism.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Destination for assembled record batches.
///
/// The orchestrator only knows this seam; tests inject a scripted sink and
/// production wires in [`HttpCollector`].
#[async_trait]
pub trait StatSink: Send + Sync {
    /// Deliver one batch. `Ok(())` means the whole batch is confirmed
    /// accepted and the caller may advance its checkpoint.
    async fn send_batch(&self, records: &[StatRecord]) -> Result<()>;
}

#[derive(Serialize)]
struct BatchPayload<'a> {
    statistics: &'a [StatRecord],
}

/// HTTP client for the statistics collector's batch endpoint.
#[derive(Debug, Clone)]
pub struct HttpCollector {
    client: reqwest::Client,
    url: String,
}

impl HttpCollector {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DISPATCH_TIMEOUT)
            .build()
            .context("failed to build collector http client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl StatSink for HttpCollector {
    async fn send_batch(&self, records: &[StatRecord]) -> Result<()> {
        if records.is_empty() {
            return Err(anyhow!("cannot send empty batch"));
        }

        let response = self
            .client
            .post(&self.url)
            .json(&BatchPayload {
                statistics: records,
            })
            .send()
            .await
            .with_context(|| format!("failed to reach collector at {}", self.url))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(anyhow!("collector rejected batch: HTTP {status} - {snippet}"));
        }

        debug!(record_count = records.len(), "collector accepted batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn sample_record(route_id: i64) -> StatRecord {
        StatRecord {
            route_id,
            client_ip: "203.0.113.7".to_string(),
            file_path: Some("/media/x.mkv".to_string()),
            download_size: 1024,
            download_duration: 523,
            response_time: 201,
            success: true,
            user_agent: "Emby/4.8.0".to_string(),
        }
    }

    #[tokio::test]
    async fn posts_batch_and_accepts_http_200() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/statistics/record/batch")
                .header("content-type", "application/json")
                .json_body(serde_json::json!({
                    "statistics": [{
                        "routeId": 5,
                        "clientIp": "203.0.113.7",
                        "filePath": "/media/x.mkv",
                        "downloadSize": 1024,
                        "downloadDuration": 523,
                        "responseTime": 201,
                        "success": true,
                        "userAgent": "Emby/4.8.0",
                    }]
                }));
            then.status(200);
        });

        let collector = HttpCollector::new(server.url("/api/statistics/record/batch"))
            .expect("collector builds");
        collector
            .send_batch(&[sample_record(5)])
            .await
            .expect("batch accepted");

        mock.assert();
    }

    #[tokio::test]
    async fn non_200_status_is_a_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/batch");
            then.status(500).body("boom");
        });

        let collector = HttpCollector::new(server.url("/batch")).expect("collector builds");
        let err = collector
            .send_batch(&[sample_record(1)])
            .await
            .expect_err("500 must fail the batch");
        assert!(err.to_string().contains("500"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn accepted_status_other_than_200_is_still_a_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/batch");
            then.status(202);
        });

        let collector = HttpCollector::new(server.url("/batch")).expect("collector builds");
        assert!(collector.send_batch(&[sample_record(1)]).await.is_err());
    }

    #[tokio::test]
    async fn unreachable_collector_is_a_failure() {
        // Nothing listens on this port.
        let collector =
            HttpCollector::new("http://127.0.0.1:9/batch").expect("collector builds");
        assert!(collector.send_batch(&[sample_record(1)]).await.is_err());
    }

    #[tokio::test]
    async fn refuses_empty_batch() {
        let collector = HttpCollector::new("http://127.0.0.1:9/batch").expect("collector builds");
        assert!(collector.send_batch(&[]).await.is_err());
    }
}
