//! Upstream retrieval: zKillboard listings, ESI killmail details and names
//!
//! All calls go through one `Fetcher`, one at a time. Before each request the
//! fetcher waits `Pacing::request_delay` unless the previous response came
//! from the local response cache. A failed attempt (transport error, non-2xx
//! status, or a body that is not usable JSON) is retried exactly once after
//! `Pacing::retry_backoff`; a second failure aborts the run.
//!
//! ## Endpoints
//!
//! - listing: `{zkill}/characterID/{id}/page/{n}/`
//! - detail: `{esi}/killmails/{id}/{hash}/?datasource=tranquility`
//! - names: `{esi}/universe/types/{id}/`, `{esi}/universe/systems/{id}/`,
//!   `{esi}/characters/{id}/`, `{esi}/corporations/{id}/`,
//!   `{esi}/alliances/{id}/`

pub mod http;
pub mod response_cache;

pub use http::HttpTransport;
pub use response_cache::ResponseCache;

use crate::config::Pacing;
use crate::error::{KillboardError, Result};
use crate::model::KillDetail;
use crate::names::{NameCategory, NameLookup};
use async_trait::async_trait;
use serde_json::Value;
use tokio::time::sleep;

/// Raw HTTP answer as seen by the fetcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
    /// Served from the local response cache without touching the network
    pub from_cache: bool,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Opaque `GET url` capability with its own freshness policy.
#[async_trait]
pub trait Transport: Send {
    async fn get(&mut self, url: &str) -> Result<Response>;

    /// The body last returned for `url` was usable. Caching transports keep
    /// it only after this call.
    fn confirm(&mut self, _url: &str) -> Result<()> {
        Ok(())
    }
}

/// URL roots of the two upstream APIs.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub zkill_base: String,
    pub esi_base: String,
}

impl Endpoints {
    pub fn new(zkill_base: impl Into<String>, esi_base: impl Into<String>) -> Self {
        Self {
            zkill_base: zkill_base.into(),
            esi_base: esi_base.into(),
        }
    }

    /// Listing base for one character; pages are appended by `fetch_all_pages`.
    pub fn character_listing(&self, character_id: u64) -> String {
        format!("{}/characterID/{}", self.zkill_base, character_id)
    }

    pub fn killmail_detail(&self, killmail_id: u64, hash: &str) -> String {
        format!(
            "{}/killmails/{}/{}/?datasource=tranquility",
            self.esi_base, killmail_id, hash
        )
    }

    pub fn name(&self, category: NameCategory, id: u64) -> String {
        let path = match category {
            NameCategory::ShipType => "universe/types",
            NameCategory::SolarSystem => "universe/systems",
            NameCategory::Character => "characters",
            NameCategory::Corporation => "corporations",
            NameCategory::Alliance => "alliances",
        };
        format!("{}/{}/{}/?datasource=tranquility", self.esi_base, path, id)
    }
}

fn page_url(base_url: &str, page: u32) -> String {
    format!("{}/page/{}/", base_url.trim_end_matches('/'), page)
}

/// Counters for the end-of-run report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub requests: usize,
    pub cache_hits: usize,
    /// Requests preceded by the politeness delay
    pub paced_waits: usize,
    pub retries: usize,
}

pub struct Fetcher<T> {
    transport: T,
    endpoints: Endpoints,
    pacing: Pacing,
    last_call_cache_hit: bool,
    stats: FetchStats,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, endpoints: Endpoints, pacing: Pacing) -> Self {
        Self {
            transport,
            endpoints,
            pacing,
            // The first request of a run has nobody to be polite to.
            last_call_cache_hit: true,
            stats: FetchStats::default(),
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn stats(&self) -> FetchStats {
        self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch `base_url/page/N/` for N = 1, 2, ... until a page holds no
    /// records. Returns the non-empty pages in order.
    pub async fn fetch_all_pages(&mut self, base_url: &str) -> Result<Vec<Vec<Value>>> {
        let mut pages = Vec::new();
        let mut page = 1;

        loop {
            let url = page_url(base_url, page);
            log::info!("📡 Fetching listing page {}: {}", page, url);

            let records = match self.fetch_json(&url, Value::is_array).await? {
                Value::Array(records) => records,
                _ => return Err(KillboardError::Garbage { url }),
            };

            if records.is_empty() {
                log::debug!("Listing {} exhausted after {} pages", base_url, pages.len());
                break;
            }

            log::debug!("   └─ {} records on page {}", records.len(), page);
            pages.push(records);
            page += 1;
        }

        Ok(pages)
    }

    /// Fetch the ESI breakdown of one killmail.
    pub async fn fetch_detail(&mut self, killmail_id: u64, hash: &str) -> Result<KillDetail> {
        let url = self.endpoints.killmail_detail(killmail_id, hash);
        log::info!("📡 Fetching killmail detail: {}", url);

        let value = self.fetch_json(&url, Value::is_object).await?;
        serde_json::from_value(value).map_err(|e| {
            KillboardError::malformed(format!("detail for killmail {} does not parse: {}", killmail_id, e))
        })
    }

    /// GET `url` and parse the body as JSON accepted by `accept`, retrying
    /// once after the backoff.
    async fn fetch_json(&mut self, url: &str, accept: fn(&Value) -> bool) -> Result<Value> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let failure = match self.request(url).await {
                Ok(response) if response.is_success() => {
                    match serde_json::from_slice::<Value>(&response.body) {
                        Ok(value) if accept(&value) => {
                            if !response.from_cache {
                                self.transport.confirm(url)?;
                            }
                            return Ok(value);
                        }
                        _ => KillboardError::Garbage { url: url.to_string() },
                    }
                }
                Ok(response) => KillboardError::UpstreamStatus {
                    url: url.to_string(),
                    status: response.status,
                },
                Err(e) => e,
            };

            if attempt >= 2 {
                log::error!("❌ Giving up on {}: {}", url, failure);
                return Err(failure);
            }

            log::warn!(
                "⏳ Request failed ({}), retrying once in {}ms",
                failure,
                self.pacing.retry_backoff.as_millis()
            );
            self.stats.retries += 1;
            if !self.pacing.retry_backoff.is_zero() {
                sleep(self.pacing.retry_backoff).await;
            }
        }
    }

    async fn request(&mut self, url: &str) -> Result<Response> {
        if !self.last_call_cache_hit {
            self.stats.paced_waits += 1;
            if !self.pacing.request_delay.is_zero() {
                sleep(self.pacing.request_delay).await;
            }
        }

        let result = self.transport.get(url).await;
        self.stats.requests += 1;

        self.last_call_cache_hit = match &result {
            Ok(response) => response.from_cache,
            Err(_) => false,
        };
        if self.last_call_cache_hit {
            self.stats.cache_hits += 1;
        }

        result
    }
}

#[async_trait]
impl<T: Transport> NameLookup for Fetcher<T> {
    async fn lookup_name(&mut self, category: NameCategory, id: u64) -> Result<String> {
        let url = self.endpoints.name(category, id);
        log::info!("📡 Resolving {} {}: {}", category.as_str(), id, url);

        let value = self.fetch_json(&url, Value::is_object).await?;
        value
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                KillboardError::malformed(format!("{} {} has no name in {}", category.as_str(), id, url))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTransport;
    use serde_json::json;

    fn endpoints() -> Endpoints {
        Endpoints::new("https://zkb.test/api", "https://esi.test/latest")
    }

    fn fetcher(transport: ScriptedTransport) -> Fetcher<ScriptedTransport> {
        Fetcher::new(transport, endpoints(), Pacing::immediate())
    }

    fn listing_entry(id: u64) -> Value {
        json!({ "killmail_id": id, "zkb": { "hash": format!("h{}", id), "totalValue": 1000.0 } })
    }

    #[test]
    fn test_endpoint_urls() {
        let e = endpoints();
        assert_eq!(e.character_listing(90000001), "https://zkb.test/api/characterID/90000001");
        assert_eq!(page_url(&e.character_listing(7), 3), "https://zkb.test/api/characterID/7/page/3/");
        assert_eq!(
            e.killmail_detail(55, "abc"),
            "https://esi.test/latest/killmails/55/abc/?datasource=tranquility"
        );
        assert_eq!(
            e.name(NameCategory::SolarSystem, 30000142),
            "https://esi.test/latest/universe/systems/30000142/?datasource=tranquility"
        );
        assert_eq!(
            e.name(NameCategory::Alliance, 99),
            "https://esi.test/latest/alliances/99/?datasource=tranquility"
        );
    }

    #[tokio::test]
    async fn test_pages_until_empty() {
        let base = "https://zkb.test/api/characterID/7";
        let mut transport = ScriptedTransport::default();
        transport.json(&page_url(base, 1), json!([listing_entry(1), listing_entry(2)]));
        transport.json(&page_url(base, 2), json!([listing_entry(3)]));
        transport.json(&page_url(base, 3), json!([]));

        let mut fetcher = fetcher(transport);
        let pages = fetcher.fetch_all_pages(base).await.unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].len(), 2);
        assert_eq!(pages[1][0]["killmail_id"], 3);
        assert_eq!(fetcher.transport().calls.len(), 3);
        assert_eq!(fetcher.stats().retries, 0);
    }

    #[tokio::test]
    async fn test_garbage_twice_is_fatal() {
        let base = "https://zkb.test/api/characterID/7";
        let mut transport = ScriptedTransport::default();
        transport.json(&page_url(base, 1), json!([listing_entry(1)]));
        transport.raw(&page_url(base, 2), 200, b"");
        transport.raw(&page_url(base, 2), 200, b"<html>busy</html>");

        let mut fetcher = fetcher(transport);
        let err = fetcher.fetch_all_pages(base).await.unwrap_err();

        assert!(matches!(err, KillboardError::Garbage { .. }));
        assert_eq!(fetcher.stats().retries, 1);
        assert_eq!(fetcher.transport().calls.len(), 3);
        assert_eq!(fetcher.transport().confirmed, vec![page_url(base, 1)]);
    }

    #[tokio::test]
    async fn test_only_accepted_bodies_are_confirmed() {
        let base = "https://zkb.test/api/characterID/7";
        let mut transport = ScriptedTransport::default();
        transport.raw(&page_url(base, 1), 200, b"<html>zkill is busy</html>");
        transport.json(&page_url(base, 1), json!([listing_entry(1)]));
        transport.json(&page_url(base, 2), json!({ "error": "not a page" }));
        transport.cached_json(&page_url(base, 2), json!([]));

        let mut fetcher = fetcher(transport);
        let pages = fetcher.fetch_all_pages(base).await.unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(fetcher.stats().retries, 2);
        // page 2 came from the cache on retry, nothing to confirm
        assert_eq!(fetcher.transport().confirmed, vec![page_url(base, 1)]);
    }

    #[tokio::test]
    async fn test_single_retry_recovers() {
        let base = "https://zkb.test/api/characterID/7";
        let mut transport = ScriptedTransport::default();
        transport.raw(&page_url(base, 1), 502, b"bad gateway");
        transport.json(&page_url(base, 1), json!([listing_entry(1)]));
        transport.json(&page_url(base, 2), json!([]));

        let mut fetcher = fetcher(transport);
        let pages = fetcher.fetch_all_pages(base).await.unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(fetcher.stats().retries, 1);
    }

    #[tokio::test]
    async fn test_two_failures_abort() {
        let url = endpoints().killmail_detail(55, "abc");
        let mut transport = ScriptedTransport::default();
        transport.raw(&url, 503, b"");
        transport.raw(&url, 500, b"");
        transport.json(&url, json!({ "never": "reached" }));

        let mut fetcher = fetcher(transport);
        let err = fetcher.fetch_detail(55, "abc").await.unwrap_err();

        assert!(matches!(err, KillboardError::UpstreamStatus { status: 500, .. }));
        assert_eq!(fetcher.transport().calls.len(), 2);
    }

    #[tokio::test]
    async fn test_pacing_skipped_after_cache_hit() {
        let a = "https://esi.test/a";
        let b = "https://esi.test/b";
        let c = "https://esi.test/c";
        let mut transport = ScriptedTransport::default();
        transport.cached_json(a, json!({ "name": "A" }));
        transport.json(b, json!({ "name": "B" }));
        transport.json(c, json!({ "name": "C" }));

        let mut fetcher = fetcher(transport);
        fetcher.fetch_json(a, Value::is_object).await.unwrap();
        fetcher.fetch_json(b, Value::is_object).await.unwrap();
        fetcher.fetch_json(c, Value::is_object).await.unwrap();

        let stats = fetcher.stats();
        assert_eq!(stats.requests, 3);
        assert_eq!(stats.cache_hits, 1);
        // first request and the one after the cache hit go straight out
        assert_eq!(stats.paced_waits, 1);
    }

    #[tokio::test]
    async fn test_lookup_name() {
        let url = endpoints().name(NameCategory::ShipType, 603);
        let mut transport = ScriptedTransport::default();
        transport.json(&url, json!({ "name": "Merlin", "group_id": 25 }));

        let mut fetcher = fetcher(transport);
        assert_eq!(fetcher.lookup_name(NameCategory::ShipType, 603).await.unwrap(), "Merlin");
    }

    #[tokio::test]
    async fn test_detail_with_wrong_shape_is_malformed() {
        let url = endpoints().killmail_detail(55, "abc");
        let mut transport = ScriptedTransport::default();
        transport.json(&url, json!({ "killmail_id": 55, "attackers": "none" }));

        let mut fetcher = fetcher(transport);
        let err = fetcher.fetch_detail(55, "abc").await.unwrap_err();
        assert!(matches!(err, KillboardError::Malformed(_)));
    }
}
