use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;

use hotelrag_core::config::CommentStoreConfig;
use hotelrag_core::traits::CommentSource;
use hotelrag_core::types::Comment;

/// Paged reads from a PostgREST-style records endpoint using `Range` headers.
pub struct RestCommentSource {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl RestCommentSource {
    pub fn new(base_url: &str, table: &str, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;
        let url = format!("{}/api/database/records/{}?select=*", base_url.trim_end_matches('/'), table);
        Ok(Self { http, url, api_key })
    }

    /// `None` when no store URL is configured.
    pub fn from_config(cfg: &CommentStoreConfig) -> Result<Option<Self>> {
        match cfg.base_url.as_deref() {
            Some(base) if !base.trim().is_empty() => Ok(Some(Self::new(base, &cfg.table, cfg.api_key.clone())?)),
            _ => Ok(None),
        }
    }

    pub fn url(&self) -> &str { &self.url }
}

#[async_trait]
impl CommentSource for RestCommentSource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<Comment>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut req = self
            .http
            .get(&self.url)
            .header("Range-Unit", "items")
            .header("Range", format!("{}-{}", offset, offset + limit - 1));
        if let Some(key) = &self.api_key {
            req = req.header("apikey", key).bearer_auth(key);
        }
        let resp = req.send().await.with_context(|| format!("GET {}", self.url))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("comment store returned {}: {}", status, body);
        }
        resp.json::<Vec<Comment>>().await.context("decoding comment page")
    }
}
