use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{Notifier, SendOptions};
use crate::error::SinkError;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Bot API `sendMessage` sink.
#[derive(Clone)]
pub struct TelegramNotifier {
    token: String,
    api_base: String,
    client: Client,
    timeout: Duration,
}

impl TelegramNotifier {
    pub fn new(token: String) -> Self {
        Self {
            token,
            api_base: DEFAULT_API_BASE.to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Point at another Bot API server (self-hosted or a test double).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Connection level failures are noise, everything else is reported.
fn classify_request_error(e: reqwest::Error) -> SinkError {
    // The token is part of the URL; keep it out of logs.
    let e = e.without_url();
    if e.is_timeout() || e.is_connect() || e.is_request() {
        SinkError::Transient(e.to_string())
    } else {
        SinkError::Fatal(e.to_string())
    }
}

/// Gateway errors are transient; rate limits and bad requests are not.
pub fn classify_status(status: StatusCode, description: Option<&str>) -> Option<SinkError> {
    if status.is_success() {
        return None;
    }
    let msg = format!(
        "telegram answered {status}: {}",
        description.unwrap_or("no description")
    );
    if status.is_server_error() {
        Some(SinkError::Transient(msg))
    } else {
        Some(SinkError::Fatal(msg))
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, channel: &str, text: &str, opts: SendOptions) -> Result<(), SinkError> {
        let body = serde_json::json!({
            "chat_id": channel,
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": opts.disable_link_preview,
        });

        let rsp = self
            .client
            .post(self.endpoint())
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = rsp.status();
        let reply: Option<ApiReply> = rsp.json().await.ok();
        let description = reply.as_ref().and_then(|r| r.description.as_deref());

        if let Some(err) = classify_status(status, description) {
            return Err(err);
        }
        if reply.is_some_and(|r| !r.ok) {
            return Err(SinkError::Fatal("telegram replied ok=false".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let e = classify_status(StatusCode::BAD_GATEWAY, None).unwrap();
        assert!(e.is_transient());
    }

    #[test]
    fn client_errors_and_rate_limits_are_fatal() {
        let e = classify_status(StatusCode::BAD_REQUEST, Some("can't parse entities")).unwrap();
        assert_eq!(
            e,
            SinkError::Fatal("telegram answered 400 Bad Request: can't parse entities".into())
        );
        assert!(!classify_status(StatusCode::TOO_MANY_REQUESTS, None)
            .unwrap()
            .is_transient());
    }

    #[test]
    fn success_is_not_an_error() {
        assert!(classify_status(StatusCode::OK, None).is_none());
    }

    #[test]
    fn endpoint_contains_token_and_trimmed_base() {
        let n = TelegramNotifier::new("123:abc".into()).with_api_base("http://localhost:8081/");
        assert_eq!(n.endpoint(), "http://localhost:8081/bot123:abc/sendMessage");
    }

    #[tokio::test]
    async fn unreachable_api_is_transient() {
        // Port 9 (discard) on localhost is closed on any sane test machine.
        let n = TelegramNotifier::new("t".into())
            .with_api_base("http://127.0.0.1:9")
            .with_timeout(2);
        let err = n.send("chan", "hi", SendOptions::default()).await.unwrap_err();
        assert!(err.is_transient(), "{err:?}");
        if let SinkError::Transient(msg) = err {
            assert!(!msg.contains("/bott/"), "token leaked: {msg}");
        }
    }
}
