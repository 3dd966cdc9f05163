//! reqwest transport with an optional local response cache

use super::{Response, ResponseCache, Transport};
use crate::error::{KillboardError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, CACHE_CONTROL};
use std::time::Duration;

pub struct HttpTransport {
    client: reqwest::Client,
    cache: Option<ResponseCache>,
    default_ttl: Duration,
    /// Last network body eligible for caching, held until confirmed
    pending: Option<PendingEntry>,
}

struct PendingEntry {
    url: String,
    body: Vec<u8>,
    fetched_at: i64,
    ttl: Duration,
}

impl HttpTransport {
    /// Arguments:
    /// - `user_agent`: sent with every request (zKillboard asks for one)
    /// - `cache`: local response cache, or None to always hit the network
    /// - `default_ttl`: freshness for responses without a `max-age`
    pub fn new(user_agent: &str, cache: Option<ResponseCache>, default_ttl: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| KillboardError::Transport {
                url: String::new(),
                reason: format!("cannot build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            cache,
            default_ttl,
            pending: None,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&mut self, url: &str) -> Result<Response> {
        let now = chrono::Utc::now().timestamp();
        self.pending = None;

        if let Some(cache) = self.cache.as_mut() {
            if let Some(body) = cache.get_fresh(url, now)? {
                log::debug!("Cache hit: {}", url);
                return Ok(Response {
                    status: 200,
                    body,
                    from_cache: true,
                });
            }
        }

        let transport_error = |e: reqwest::Error| KillboardError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let ttl = freshness(response.headers()).unwrap_or(self.default_ttl);
        let body = response.bytes().await.map_err(transport_error)?.to_vec();

        if self.cache.is_some() && (200..300).contains(&status) && !body.is_empty() && !ttl.is_zero() {
            self.pending = Some(PendingEntry {
                url: url.to_string(),
                body: body.clone(),
                fetched_at: now,
                ttl,
            });
        }

        Ok(Response {
            status,
            body,
            from_cache: false,
        })
    }

    fn confirm(&mut self, url: &str) -> Result<()> {
        let entry = match self.pending.take() {
            Some(entry) if entry.url == url => entry,
            other => {
                self.pending = other;
                return Ok(());
            }
        };

        if let Some(cache) = self.cache.as_mut() {
            cache.store(&entry.url, &entry.body, entry.fetched_at, entry.ttl)?;
        }
        Ok(())
    }
}

/// Freshness lifetime from `Cache-Control`, if the server stated one.
fn freshness(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(CACHE_CONTROL)?.to_str().ok()?;

    let mut max_age = None;
    for directive in value.split(',').map(str::trim) {
        if directive.eq_ignore_ascii_case("no-store") || directive.eq_ignore_ascii_case("no-cache") {
            return Some(Duration::ZERO);
        }
        if let Some(secs) = directive.strip_prefix("max-age=") {
            max_age = secs.trim_matches('"').parse().ok().map(Duration::from_secs);
        }
    }
    max_age
}
