//! List endpoints: structured search queries and binary ID lists.
//!
//! Each filter dimension (artist, group, series, character, type, tag) has
//! its own list endpoint returning matching gallery IDs as a packed
//! big-endian u32 sequence. A multi-term query fetches one list per
//! populated dimension and **intersects** the results: AND semantics
//! across dimensions, which surprises users expecting OR but is how the
//! site itself combines filters.

use futures_util::future::try_join_all;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::fetch::{FetchError, SafeRequest};
use crate::idset;

use super::{HitomiClient, HitomiError};

/// A structured set of filter terms resolved against the list endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    /// Artist names (one list fetch each).
    pub artists: Vec<String>,
    /// Circle/group names.
    pub groups: Vec<String>,
    /// Series names.
    pub series: Vec<String>,
    /// Character names.
    pub characters: Vec<String>,
    /// Tag names.
    pub tags: Vec<String>,
    /// Gallery type (doujinshi, manga, …); at most one.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Language scope applied to every list URL; "all" means unscoped.
    pub language: String,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            artists: Vec::new(),
            groups: Vec::new(),
            series: Vec::new(),
            characters: Vec::new(),
            tags: Vec::new(),
            kind: None,
            language: "all".to_string(),
        }
    }
}

impl SearchQuery {
    /// Builds one list URL per populated filter dimension, deduplicated in
    /// order. An empty query falls back to the language index list.
    #[must_use]
    pub fn list_urls(&self, ltn: &Url) -> Vec<Url> {
        let language = if self.language.is_empty() {
            "all"
        } else {
            self.language.as_str()
        };

        let mut urls: Vec<Url> = Vec::new();

        for artist in &self.artists {
            push_unique(
                &mut urls,
                ltn,
                &format!("artist/{}-{language}.nozomi", urlencoding::encode(artist)),
            );
        }
        for group in &self.groups {
            push_unique(
                &mut urls,
                ltn,
                &format!("group/{}-{language}.nozomi", urlencoding::encode(group)),
            );
        }
        for series in &self.series {
            push_unique(
                &mut urls,
                ltn,
                &format!("series/{}-{language}.nozomi", urlencoding::encode(series)),
            );
        }
        for character in &self.characters {
            push_unique(
                &mut urls,
                ltn,
                &format!("character/{}-{language}.nozomi", urlencoding::encode(character)),
            );
        }
        if let Some(kind) = &self.kind {
            push_unique(
                &mut urls,
                ltn,
                &format!("type/{}-{language}.nozomi", urlencoding::encode(kind)),
            );
        }
        for tag in &self.tags {
            push_unique(
                &mut urls,
                ltn,
                &format!("tag/{}-{language}.nozomi", urlencoding::encode(tag)),
            );
        }

        if urls.is_empty() {
            push_unique(
                &mut urls,
                ltn,
                &format!("index-{}.nozomi", urlencoding::encode(language)),
            );
        }

        urls
    }
}

fn push_unique(urls: &mut Vec<Url>, ltn: &Url, path: &str) {
    if let Ok(url) = ltn.join(path) {
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
}

/// Decodes a packed big-endian u32 ID list. Trailing bytes that do not
/// fill a full word are ignored.
#[must_use]
pub fn extract_gallery_ids(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

impl HitomiClient {
    /// Resolves a search query into gallery IDs by fetching every relevant
    /// list and intersecting the results.
    ///
    /// # Errors
    ///
    /// Any individual list fetch failure aborts the whole resolution; there
    /// are no partial results.
    pub async fn search(
        &self,
        query: &SearchQuery,
        safe: &SafeRequest,
    ) -> Result<Vec<u32>, HitomiError> {
        let urls = query.list_urls(&self.endpoints.ltn);
        debug!(lists = urls.len(), "resolving search query");

        let fetches = urls.iter().map(|url| self.fetch_id_list(url, safe));
        let lists = try_join_all(fetches).await?;

        let ids = idset::intersect(&lists);
        info!(lists = lists.len(), matched = ids.len(), "search query resolved");
        Ok(ids)
    }

    async fn fetch_id_list(&self, url: &Url, safe: &SafeRequest) -> Result<Vec<u32>, HitomiError> {
        info!(%url, "fetching gallery ID list");
        let response = safe
            .send(|| {
                let request = self.http.get(url.clone()).headers(self.list_headers());
                let url = url.clone();
                async move {
                    request
                        .send()
                        .await
                        .map_err(|e| FetchError::network(url.as_str(), e))
                }
            })
            .await?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| HitomiError::body(url.as_str(), e))?;
        Ok(extract_gallery_ids(&bytes))
    }

    pub(super) fn list_headers(&self) -> HeaderMap {
        self.headers.clone()
    }
}
