use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "https://www.sankavollerei.com";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Both home lists, fetched together. A failure of either call discards both.
pub struct HomePage {
    pub ongoing: Value,
    pub completed: Value,
}

/// Client for the upstream content API. Every endpoint is a GET returning a
/// JSON envelope of shape `{ data: T | { <field>: T } }`; the exact field
/// names are inferred from observed responses, not a published contract, so
/// each endpoint method names the fields it tries.
pub struct UpstreamClient {
    http: Client,
    base_url: String,
}

impl UpstreamClient {
    pub fn new() -> Result<Self> {
        Self::with_base(DEFAULT_BASE_URL)
    }

    pub fn with_base(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to create upstream HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetches both home lists concurrently, all-or-nothing.
    pub async fn home(&self, page: u32) -> Result<HomePage> {
        let ongoing_path = format!("/anime/ongoing-anime?page={page}");
        let completed_path = format!("/anime/complete-anime?page={page}");
        let (ongoing, completed) = tokio::try_join!(
            self.fetch(&ongoing_path, &["animeList"]),
            self.fetch(&completed_path, &["animeList"]),
        )?;
        Ok(HomePage { ongoing, completed })
    }

    pub async fn schedule(&self) -> Option<Value> {
        self.get("/anime/schedule", &[]).await
    }

    pub async fn search(&self, query: &str) -> Option<Value> {
        let slug = search_slug(query);
        self.get(&format!("/anime/search/{slug}"), &["animeList"])
            .await
    }

    pub async fn genre(&self, slug: &str, page: u32) -> Option<Value> {
        self.get(&format!("/anime/genre/{slug}?page={page}"), &["animeList"])
            .await
    }

    pub async fn library(&self) -> Option<Value> {
        self.get("/anime/unlimited", &["list"]).await
    }

    pub async fn detail(&self, slug: &str) -> Option<Value> {
        self.get(&format!("/anime/anime/{slug}"), &[]).await
    }

    pub async fn episode(&self, slug: &str) -> Option<Value> {
        self.get(&format!("/anime/episode/{slug}"), &[]).await
    }

    pub async fn stream_server(&self, server_id: &str) -> Option<Value> {
        self.get(&format!("/anime/server/{server_id}"), &[]).await
    }

    /// Batch pages often live under a rewritten slug; if the plain slug yields
    /// nothing, retry exactly once with `-sub-indo` -> `-batch-sub-indo`.
    pub async fn batch(&self, slug: &str) -> Option<Value> {
        if let Some(found) = self.get(&format!("/anime/batch/{slug}"), &[]).await {
            return Some(found);
        }
        let fallback = batch_slug_fallback(slug)?;
        info!("batch slug {slug} empty, retrying as {fallback}");
        self.get(&format!("/anime/batch/{fallback}"), &[]).await
    }

    /// Best-effort fetch: any failure is logged and surfaces as `None`, which
    /// routes render as an empty page. Upstream errors never reach the user.
    async fn get(&self, path: &str, fields: &[&str]) -> Option<Value> {
        match self.fetch(path, fields).await {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(err) => {
                warn!("upstream request for {path} failed: {err:#}");
                None
            }
        }
    }

    async fn fetch(&self, path: &str, fields: &[&str]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        info!("upstream request: {url}");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request failed for {path}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("upstream HTTP {status} for {path}");
        }
        let body: Value = response
            .json()
            .await
            .with_context(|| format!("failed to parse upstream response for {path}"))?;
        Ok(extract(body, fields))
    }
}

/// Unwraps the upstream envelope by an explicit, ordered rule chain:
/// `data.<field>` for each listed field, then `data`, then the body itself.
/// A rule only applies when its target is present and non-null.
fn extract(body: Value, fields: &[&str]) -> Value {
    for field in fields {
        if let Some(inner) = body.get("data").and_then(|data| data.get(field))
            && !inner.is_null()
        {
            return inner.clone();
        }
    }
    if let Some(data) = body.get("data")
        && !data.is_null()
    {
        return data.clone();
    }
    body
}

/// Builds the search path segment: trimmed, whitespace joined with `+`.
pub fn search_slug(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join("+")
}

/// The one-shot batch slug rewrite; `None` when the slug has no rewrite point.
fn batch_slug_fallback(slug: &str) -> Option<String> {
    slug.contains("-sub-indo")
        .then(|| slug.replacen("-sub-indo", "-batch-sub-indo", 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_slug_joins_whitespace_with_plus() {
        assert_eq!(search_slug("one piece"), "one+piece");
        assert_eq!(search_slug("  one   piece  "), "one+piece");
        assert_eq!(search_slug("naruto"), "naruto");
    }

    #[test]
    fn batch_fallback_rewrites_sub_indo_once() {
        assert_eq!(
            batch_slug_fallback("x-sub-indo").as_deref(),
            Some("x-batch-sub-indo")
        );
        assert_eq!(batch_slug_fallback("x-raw"), None);
    }

    #[test]
    fn extract_prefers_named_field_then_data_then_body() {
        let enveloped = json!({"data": {"animeList": [1, 2], "page": 3}});
        assert_eq!(extract(enveloped, &["animeList"]), json!([1, 2]));

        let plain_data = json!({"data": [4, 5]});
        assert_eq!(extract(plain_data, &["animeList"]), json!([4, 5]));

        let bare = json!([6]);
        assert_eq!(extract(bare, &["animeList"]), json!([6]));
    }

    #[test]
    fn extract_skips_null_targets() {
        let null_field = json!({"data": {"animeList": null, "list": [1]}});
        assert_eq!(extract(null_field, &["animeList", "list"]), json!([1]));

        let null_data = json!({"data": null});
        assert_eq!(extract(null_data.clone(), &[]), null_data);
    }

    #[tokio::test]
    async fn search_builds_plus_joined_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/anime/search/one+piece")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":{"animeList":[{"title":"One Piece"}]}}"#)
            .create_async()
            .await;

        let client = UpstreamClient::with_base(&server.url()).unwrap();
        let results = client.search("one piece").await.unwrap();
        assert_eq!(results[0]["title"], "One Piece");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn batch_retries_exactly_once_with_rewritten_slug() {
        let mut server = mockito::Server::new_async().await;
        let miss = server
            .mock("GET", "/anime/batch/x-sub-indo")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;
        let hit = server
            .mock("GET", "/anime/batch/x-batch-sub-indo")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":{"title":"X Batch"}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = UpstreamClient::with_base(&server.url()).unwrap();
        let batch = client.batch("x-sub-indo").await.unwrap();
        assert_eq!(batch["title"], "X Batch");
        miss.assert_async().await;
        hit.assert_async().await;
    }

    #[tokio::test]
    async fn batch_without_rewrite_point_does_not_retry() {
        let mut server = mockito::Server::new_async().await;
        let miss = server
            .mock("GET", "/anime/batch/x-raw")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let client = UpstreamClient::with_base(&server.url()).unwrap();
        assert!(client.batch("x-raw").await.is_none());
        miss.assert_async().await;
    }

    #[tokio::test]
    async fn home_fails_when_either_list_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/anime/ongoing-anime?page=1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":{"animeList":[{"title":"Ongoing"}]}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/anime/complete-anime?page=1")
            .with_status(500)
            .create_async()
            .await;

        let client = UpstreamClient::with_base(&server.url()).unwrap();
        assert!(client.home(1).await.is_err());
    }

    #[tokio::test]
    async fn home_returns_both_lists_when_both_succeed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/anime/ongoing-anime?page=2")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":{"animeList":[{"title":"Ongoing"}]}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/anime/complete-anime?page=2")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":[{"title":"Done"}]}"#)
            .create_async()
            .await;

        let client = UpstreamClient::with_base(&server.url()).unwrap();
        let home = client.home(2).await.unwrap();
        assert_eq!(home.ongoing[0]["title"], "Ongoing");
        assert_eq!(home.completed[0]["title"], "Done");
    }

    #[tokio::test]
    async fn non_success_status_reads_as_absent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/anime/anime/gone")
            .with_status(503)
            .create_async()
            .await;

        let client = UpstreamClient::with_base(&server.url()).unwrap();
        assert!(client.detail("gone").await.is_none());
    }
}
