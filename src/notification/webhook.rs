//! A client for delivering messages to a webhook sink.

use crate::config::SinkConfig;
use crate::core::{Destination, DeliveryOutcome, Embed, Payload, SinkClient};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// The JSON body posted to the sink. Exactly one of the two shapes is set.
#[derive(Debug, Serialize, PartialEq)]
pub struct WebhookMessage<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<[&'a Embed; 1]>,
}

impl<'a> From<&'a Payload> for WebhookMessage<'a> {
    fn from(payload: &'a Payload) -> Self {
        match payload {
            Payload::Text(text) => Self {
                content: Some(text),
                embeds: None,
            },
            Payload::Embed(embed) => Self {
                content: None,
                embeds: Some([embed]),
            },
        }
    }
}

/// Rate-limit body some sinks send alongside, or instead of, the header.
#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

/// Fallback waits used when the sink gives no hint, and the ceiling on
/// any wait the sink asks for.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitFallbacks {
    pub rate_limited: Duration,
    pub edge_block: Duration,
    pub max_retry_after: Duration,
}

impl Default for RateLimitFallbacks {
    fn default() -> Self {
        Self {
            rate_limited: Duration::from_millis(5_000),
            edge_block: Duration::from_millis(10_000),
            max_retry_after: Duration::from_millis(600_000),
        }
    }
}

/// Delivers one message per call to a webhook destination.
pub struct WebhookClient {
    client: reqwest::Client,
    max_content_len: usize,
    fallbacks: RateLimitFallbacks,
}

impl WebhookClient {
    /// Creates a new `WebhookClient` whose requests time out after `timeout`.
    pub fn new(
        timeout: Duration,
        max_content_len: usize,
        fallbacks: RateLimitFallbacks,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            max_content_len,
            fallbacks,
        })
    }

    pub fn from_config(config: &SinkConfig) -> anyhow::Result<Self> {
        Self::new(
            config.timeout(),
            config.max_content_len,
            RateLimitFallbacks {
                rate_limited: Duration::from_millis(config.rate_limit_fallback_ms),
                edge_block: Duration::from_millis(config.edge_block_fallback_ms),
                max_retry_after: Duration::from_millis(config.max_retry_after_ms),
            },
        )
    }
}

#[async_trait]
impl SinkClient for WebhookClient {
    #[instrument(skip_all, fields(destination = %destination))]
    async fn attempt(&self, content: &Payload, destination: &Destination) -> DeliveryOutcome {
        if let Err(e) = content.check_limits(self.max_content_len) {
            warn!(error = %e, "Rejecting message before sending");
            return DeliveryOutcome::PermanentRejection;
        }

        let started = Instant::now();
        let response = self
            .client
            .post(&destination.url)
            .json(&WebhookMessage::from(content))
            .send()
            .await;
        metrics::histogram!("sink_request_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        let res = match response {
            Ok(res) => res,
            Err(e) => {
                let timeout = e.is_timeout();
                // Strip the URL so the webhook token never reaches the logs.
                error!(error = %e.without_url(), timeout, "HTTP request to sink failed");
                return DeliveryOutcome::TransientFailure;
            }
        };

        let status = res.status();
        let headers = res.headers().clone();
        let body = res.text().await.unwrap_or_default();
        let outcome = classify_response(status, &headers, &body, self.fallbacks);

        match outcome {
            DeliveryOutcome::Delivered => info!(status = %status, "Message delivered"),
            DeliveryOutcome::RateLimited { retry_after } => warn!(
                status = %status,
                retry_after_ms = retry_after.as_millis() as u64,
                "Sink rate limited the request"
            ),
            _ => error!(status = %status, body = %truncate(&body, 200), "Sink rejected the request"),
        }
        outcome
    }
}

/// Maps a sink response onto a [`DeliveryOutcome`].
///
/// A `retry-after` header wins over a body hint, which wins over the fallback.
/// An edge-proxy block is rate limiting with a longer fallback. Hints are
/// capped at `fallbacks.max_retry_after`; negative or unparsable ones are
/// ignored.
pub fn classify_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    fallbacks: RateLimitFallbacks,
) -> DeliveryOutcome {
    if status.is_success() {
        return DeliveryOutcome::Delivered;
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let fallback = if is_edge_block(body) {
            fallbacks.edge_block
        } else {
            fallbacks.rate_limited
        };
        let max = fallbacks.max_retry_after;
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .and_then(|secs| hint_to_wait(secs, max))
            .or_else(|| body_retry_after(body).and_then(|secs| hint_to_wait(secs, max)))
            .unwrap_or(fallback);
        debug!(retry_after_ms = retry_after.as_millis() as u64, "Parsed rate limit wait");
        return DeliveryOutcome::RateLimited { retry_after };
    }

    DeliveryOutcome::TransientFailure
}

/// Detects a block issued by the edge proxy rather than the sink's own limiter.
pub fn is_edge_block(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("cloudflare")
        && (body.contains("Error 1015") || body.contains("You are being rate limited"))
}

/// Converts a hint in seconds to a wait no longer than `max`.
fn hint_to_wait(secs: f64, max: Duration) -> Option<Duration> {
    if secs.is_nan() || secs < 0.0 {
        return None;
    }
    // Out of range for a Duration (including infinity) means "as long as allowed".
    Some(Duration::try_from_secs_f64(secs).map_or(max, |wait| wait.min(max)))
}

fn body_retry_after(body: &str) -> Option<f64> {
    let parsed: RateLimitBody = serde_json::from_str(body).ok()?;
    parsed.retry_after
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod webhook_client_tests {
    use super::*;
    use crate::core::EmbedField;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> WebhookClient {
        WebhookClient::new(Duration::from_secs(5), 2000, RateLimitFallbacks::default()).unwrap()
    }

    fn text(s: &str) -> Payload {
        Payload::Text(s.to_string())
    }

    async fn server_responding(template: ResponseTemplate) -> (MockServer, Destination) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(template)
            .mount(&server)
            .await;
        let dest = Destination::endpoint(format!("{}/webhook", server.uri()));
        (server, dest)
    }

    #[tokio::test]
    async fn test_text_message_is_delivered() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .and(body_json(json!({ "content": "hello" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        let dest = Destination::endpoint(format!("{}/webhook", server.uri()));

        // Act
        let outcome = client().attempt(&text("hello"), &dest).await;

        // Assert
        assert_eq!(outcome, DeliveryOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_embed_message_uses_embeds_array() {
        let server = MockServer::start().await;
        let embed = Embed {
            title: Some("Alert".to_string()),
            fields: vec![EmbedField {
                name: "Reason".to_string(),
                value: "no-ticket".to_string(),
                inline: false,
            }],
            timestamp: Some("2025-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .and(body_json(json!({
                "embeds": [{
                    "title": "Alert",
                    "fields": [{ "name": "Reason", "value": "no-ticket", "inline": false }],
                    "timestamp": "2025-01-01T00:00:00Z"
                }]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        let dest = Destination::endpoint(format!("{}/webhook", server.uri()));

        let outcome = client().attempt(&Payload::Embed(embed), &dest).await;

        assert_eq!(outcome, DeliveryOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_retry_after_header_is_authoritative() {
        let (_server, dest) = server_responding(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "3")
                .set_body_json(json!({ "retry_after": 9.0 })),
        )
        .await;

        let outcome = client().attempt(&text("hi"), &dest).await;

        assert_eq!(
            outcome,
            DeliveryOutcome::RateLimited {
                retry_after: Duration::from_millis(3000)
            }
        );
    }

    #[tokio::test]
    async fn test_fractional_body_hint_is_used_without_header() {
        let (_server, dest) =
            server_responding(ResponseTemplate::new(429).set_body_json(json!({ "retry_after": 0.75 })))
                .await;

        let outcome = client().attempt(&text("hi"), &dest).await;

        assert_eq!(
            outcome,
            DeliveryOutcome::RateLimited {
                retry_after: Duration::from_millis(750)
            }
        );
    }

    #[tokio::test]
    async fn test_rate_limit_without_hint_uses_fallback() {
        let (_server, dest) = server_responding(ResponseTemplate::new(429)).await;

        let outcome = client().attempt(&text("hi"), &dest).await;

        assert_eq!(
            outcome,
            DeliveryOutcome::RateLimited {
                retry_after: Duration::from_millis(5000)
            }
        );
    }

    #[tokio::test]
    async fn test_edge_block_uses_longer_fallback() {
        let body = "<html><title>Access denied | cloudflare</title>Error 1015 You are being rate limited</html>";
        let (_server, dest) =
            server_responding(ResponseTemplate::new(429).set_body_string(body)).await;

        let outcome = client().attempt(&text("hi"), &dest).await;

        assert_eq!(
            outcome,
            DeliveryOutcome::RateLimited {
                retry_after: Duration::from_millis(10_000)
            }
        );
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let (_server, dest) = server_responding(ResponseTemplate::new(500)).await;
        assert_eq!(
            client().attempt(&text("hi"), &dest).await,
            DeliveryOutcome::TransientFailure
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_transient() {
        // Bind and drop a server so its port is closed.
        let uri = {
            let server = MockServer::start().await;
            server.uri()
        };
        let dest = Destination::endpoint(format!("{}/webhook", uri));
        assert_eq!(
            client().attempt(&text("hi"), &dest).await,
            DeliveryOutcome::TransientFailure
        );
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let (_server, dest) = server_responding(
            ResponseTemplate::new(200).set_delay(Duration::from_secs(2)),
        )
        .await;
        let client = WebhookClient::new(
            Duration::from_millis(200),
            2000,
            RateLimitFallbacks::default(),
        )
        .unwrap();

        assert_eq!(
            client.attempt(&text("hi"), &dest).await,
            DeliveryOutcome::TransientFailure
        );
    }

    #[tokio::test]
    async fn test_oversized_content_is_rejected_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let dest = Destination::endpoint(format!("{}/webhook", server.uri()));

        let outcome = client().attempt(&text(&"a".repeat(2001)), &dest).await;

        assert_eq!(outcome, DeliveryOutcome::PermanentRejection);
    }

    #[test]
    fn test_edge_block_detection_requires_both_markers() {
        assert!(is_edge_block("cloudflare Error 1015"));
        assert!(is_edge_block("Cloudflare: You are being rate limited"));
        assert!(!is_edge_block("cloudflare"));
        assert!(!is_edge_block("{\"message\": \"You are being rate limited.\"}"));
    }

    #[test]
    fn test_invalid_retry_after_header_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "soon".parse().unwrap());
        assert_eq!(
            classify_response(
                StatusCode::TOO_MANY_REQUESTS,
                &headers,
                "",
                RateLimitFallbacks::default()
            ),
            DeliveryOutcome::RateLimited {
                retry_after: Duration::from_millis(5000)
            }
        );
    }

    fn classify_429(headers: &HeaderMap, body: &str) -> DeliveryOutcome {
        classify_response(
            StatusCode::TOO_MANY_REQUESTS,
            headers,
            body,
            RateLimitFallbacks::default(),
        )
    }

    fn limited_for(retry_after: Duration) -> DeliveryOutcome {
        DeliveryOutcome::RateLimited { retry_after }
    }

    #[test]
    fn test_huge_retry_after_is_capped() {
        for raw in ["1e20", "1e19", "inf", "86400"] {
            let mut headers = HeaderMap::new();
            headers.insert(RETRY_AFTER, raw.parse().unwrap());
            assert_eq!(
                classify_429(&headers, ""),
                limited_for(Duration::from_secs(600)),
                "retry-after: {raw}"
            );
        }
        assert_eq!(
            classify_429(&HeaderMap::new(), r#"{"retry_after": 1e300}"#),
            limited_for(Duration::from_secs(600))
        );
    }

    #[test]
    fn test_negative_or_nan_hints_use_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "-5".parse().unwrap());
        assert_eq!(classify_429(&headers, ""), limited_for(Duration::from_secs(5)));

        headers.insert(RETRY_AFTER, "NaN".parse().unwrap());
        assert_eq!(classify_429(&headers, ""), limited_for(Duration::from_secs(5)));

        assert_eq!(
            classify_429(&HeaderMap::new(), r#"{"retry_after": -1.5}"#),
            limited_for(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_negative_header_falls_back_to_body_hint() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "-1".parse().unwrap());
        assert_eq!(
            classify_429(&headers, r#"{"retry_after": 2}"#),
            limited_for(Duration::from_secs(2))
        );
    }

    #[tokio::test]
    async fn test_retry_after_header_beats_edge_block_fallback() {
        let body = "<html>cloudflare Error 1015 You are being rate limited</html>";
        let (_server, dest) = server_responding(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "2")
                .set_body_string(body),
        )
        .await;

        let outcome = client().attempt(&text("hi"), &dest).await;

        assert_eq!(outcome, limited_for(Duration::from_secs(2)));
    }
}
