//! HTTP access to the source (Aleph holds and items feeds) and destination
//! (CaiaSoft).
//!
//! The API key is passed in by the caller; it is sent as a header and never
//! logged.

use anyhow::{bail, Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

/// Status and raw body of a completed request.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

impl HttpReply {
    /// Only 200 counts as success for both systems.
    pub fn ensure_ok(&self, method: &str, url: &str) -> Result<()> {
        if self.status != StatusCode::OK {
            bail!(
                "{method} to '{url}' failed with a status code of {}",
                self.status.as_u16()
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CaiaHttp {
    http: reqwest::Client,
}

impl CaiaHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// GET `url`, appending `query` pairs when there are any.
    pub async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpReply> {
        tracing::info!(url, "querying source");
        let mut req = self.http.get(url).header(CONTENT_TYPE, "application/json");
        if !query.is_empty() {
            req = req.query(query);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("GET request failed: {url}"))?;
        read_reply(resp, url).await
    }

    pub async fn post_json(&self, url: &str, api_key: &str, body: String) -> Result<HttpReply> {
        tracing::info!(url, "sending POST request");
        let resp = self
            .http
            .post(url)
            .header("X-API-Key", api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .with_context(|| format!("POST request failed: {url}"))?;
        read_reply(resp, url).await
    }
}

async fn read_reply(resp: reqwest::Response, url: &str) -> Result<HttpReply> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .with_context(|| format!("read response body failed: {url}"))?;
    tracing::debug!(url, status = status.as_u16(), bytes = body.len(), "request completed");
    Ok(HttpReply { status, body })
}
