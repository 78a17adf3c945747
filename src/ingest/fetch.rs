// src/ingest/fetch.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::FetchError;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/117.0";

const ACCEPT_HTML: &str = "text/html;charset=utf-8,application/xhtml+xml;charset=utf-8,\
                           application/xml;q=0.9;charset=utf-8,image/avif,image/webp,*/*;q=0.8";

/// One GET of a listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    /// Request with the browser-like header set both sites expect.
    /// Encoding negotiation and `Host` are left to the client.
    pub fn browser(url: impl Into<String>, user_agent: &str) -> Self {
        Self {
            url: url.into(),
            headers: vec![
                ("Accept".into(), ACCEPT_HTML.into()),
                ("Accept-Language".into(), "en-US,en;q=0.5".into()),
                ("Upgrade-Insecure-Requests".into(), "1".into()),
                ("User-Agent".into(), user_agent.into()),
            ],
        }
    }

    fn header_map(&self) -> Result<HeaderMap, FetchError> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            let header_err = |reason: String| FetchError::Header {
                name: name.clone(),
                reason,
            };
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| header_err(e.to_string()))?;
            let value = HeaderValue::from_str(value).map_err(|e| header_err(e.to_string()))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedPage, FetchError>;
}

/// `reqwest` backed fetcher. Single attempt, no retry.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedPage, FetchError> {
        let rsp = self
            .client
            .get(&req.url)
            .headers(req.header_map()?)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: req.url.clone(),
                source,
            })?;

        let status = rsp.status().as_u16();
        if status != 200 {
            // Soft error pages often still contain the result list.
            tracing::warn!(url = %req.url, status, "unexpected status, parsing anyway");
        }

        let body = rsp.text().await.map_err(|source| FetchError::Body {
            url: req.url.clone(),
            source,
        })?;

        Ok(FetchedPage { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_headers_are_valid() {
        let req = FetchRequest::browser("https://www.immowelt.de/suche", DEFAULT_USER_AGENT);
        let map = req.header_map().unwrap();
        assert_eq!(map.get("user-agent").unwrap(), DEFAULT_USER_AGENT);
        assert!(map.get("accept").unwrap().to_str().unwrap().starts_with("text/html"));
        assert!(map.get("accept-encoding").is_none());
    }

    #[test]
    fn invalid_header_is_reported() {
        let mut req = FetchRequest::browser("https://x.test", DEFAULT_USER_AGENT);
        req.headers.push(("Bad Name".into(), "v".into()));
        assert!(matches!(req.header_map(), Err(FetchError::Header { .. })));
    }
}
