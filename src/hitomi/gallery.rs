//! Gallery metadata and per-asset download tasks.
//!
//! A gallery download needs two documents from the metadata host: the
//! sharding document (`gg.js`), which routes each asset hash to one of the
//! rotating content subdomains, and the gallery record
//! (`galleries/<id>.js`), a JS assignment wrapping a JSON payload. From
//! those this module builds one [`DownloadTask`] per image (plus one for
//! the video when the gallery declares one); the orchestrator decides
//! which to run.

use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, RANGE, REFERER};
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::fetch::FetchError;

use super::{HitomiClient, HitomiError};

/// Accept header sent with image requests.
const IMAGE_ACCEPT: &str = "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8";

#[allow(clippy::unwrap_used)]
static DIRECTORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"b:\s*'(\d+)/'").unwrap());

#[allow(clippy::unwrap_used)]
static CASE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"case\s+(\d+):").unwrap());

#[allow(clippy::unwrap_used)]
static POOL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"o\s*=\s*(\d+);").unwrap());

/// Routing rule extracted from the site's sharding document.
///
/// Each asset hash maps to a numeric bucket (its last three hex digits,
/// permuted); the bucket selects one of two subdomain pools depending on
/// whether it appears in the document's case list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardingRule {
    /// Path token shared by every image URL.
    pub directory: String,
    /// Buckets routed to the match pool.
    pub cases: Vec<String>,
    /// Subdomain pool for buckets outside the case list.
    pub default_pool: u32,
    /// Subdomain pool for buckets inside the case list.
    pub match_pool: u32,
}

impl ShardingRule {
    /// Extracts the routing tokens from the raw sharding document.
    ///
    /// # Errors
    ///
    /// Fails when any of the three token families is missing; the document
    /// format drifts occasionally and a silent default would route every
    /// request at the wrong host.
    pub fn parse(text: &str) -> Result<Self, HitomiError> {
        let directory = DIRECTORY_RE
            .captures(text)
            .map(|captures| captures[1].to_string())
            .ok_or(HitomiError::Sharding {
                reason: "missing directory token".to_string(),
            })?;

        let cases: Vec<String> = CASE_RE
            .captures_iter(text)
            .map(|captures| captures[1].to_string())
            .collect();

        let pools: Vec<u32> = POOL_RE
            .captures_iter(text)
            .filter_map(|captures| captures[1].parse().ok())
            .collect();
        let (default_pool, match_pool) = match pools.as_slice() {
            [default_pool, match_pool, ..] => (*default_pool, *match_pool),
            _ => {
                return Err(HitomiError::Sharding {
                    reason: "missing subdomain pool values".to_string(),
                });
            }
        };

        Ok(Self {
            directory,
            cases,
            default_pool,
            match_pool,
        })
    }

    /// Computes the numeric bucket for a content hash: the last hex digit
    /// followed by the two before it, read as one hex number.
    ///
    /// # Errors
    ///
    /// Fails when the hash is shorter than three characters or not hex.
    pub fn bucket(&self, hash: &str) -> Result<String, HitomiError> {
        let tail: Vec<char> = hash.chars().rev().take(3).collect();
        let (&last, pair) = match tail.split_first() {
            Some(parts) if tail.len() == 3 => parts,
            _ => {
                return Err(HitomiError::Sharding {
                    reason: format!("invalid hash format: {hash}"),
                });
            }
        };
        // pair is reversed (last-to-first); restore source order.
        let digits: String = std::iter::once(last)
            .chain(pair.iter().rev().copied())
            .collect();
        let value = u32::from_str_radix(&digits, 16).map_err(|_| HitomiError::Sharding {
            reason: format!("invalid hash format: {hash}"),
        })?;
        Ok(value.to_string())
    }

    /// Builds the full image URL for a content hash.
    ///
    /// `images_template` carries a `{subdomain}` placeholder, substituted
    /// with `w<pool + 1>` per the case-list routing.
    ///
    /// # Errors
    ///
    /// Fails on malformed hashes or when the substituted URL does not parse.
    pub fn image_url(&self, images_template: &str, hash: &str) -> Result<Url, HitomiError> {
        let bucket = self.bucket(hash)?;
        let pool = if self.cases.contains(&bucket) {
            self.match_pool
        } else {
            self.default_pool
        };
        let subdomain = format!("w{}", pool + 1);
        let base = images_template.replace("{subdomain}", &subdomain);
        let full = format!("{base}/{}/{bucket}/{hash}.webp", self.directory);
        Url::parse(&full).map_err(|e| HitomiError::Sharding {
            reason: format!("bad image URL {full}: {e}"),
        })
    }
}

/// One file entry in a gallery record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryFile {
    /// Content hash; drives the download URL.
    pub hash: String,
    /// Display name, e.g. `01.jpg`.
    pub name: String,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Non-zero when an AVIF encoding exists.
    #[serde(default)]
    pub hasavif: u8,
}

/// Artist reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtistRef {
    /// Artist name.
    pub artist: String,
    /// Site-relative listing URL.
    #[serde(default)]
    pub url: String,
}

/// Circle/group reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRef {
    /// Group name.
    pub group: String,
    /// Site-relative listing URL.
    #[serde(default)]
    pub url: String,
}

/// Character reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterRef {
    /// Character name.
    pub character: String,
    /// Site-relative listing URL.
    #[serde(default)]
    pub url: String,
}

/// Parody/series reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParodyRef {
    /// Parody (series) name.
    pub parody: String,
    /// Site-relative listing URL.
    #[serde(default)]
    pub url: String,
}

/// Tag reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRef {
    /// Tag name.
    pub tag: String,
    /// Site-relative listing URL.
    #[serde(default)]
    pub url: String,
    /// "1" when the tag is male-scoped.
    #[serde(default)]
    pub male: Option<String>,
    /// "1" when the tag is female-scoped.
    #[serde(default)]
    pub female: Option<String>,
}

/// Fetched metadata record for one gallery. Read-only once obtained;
/// fetched fresh per run, never cached across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryInfo {
    /// Gallery ID as the site serves it (a JSON string).
    pub id: String,
    /// Canonical title.
    pub title: String,
    /// Localized title, when present.
    #[serde(default)]
    pub japanese_title: Option<String>,
    /// Gallery type (doujinshi, manga, …).
    #[serde(rename = "type")]
    pub kind: String,
    /// Language name, e.g. "japanese".
    #[serde(default)]
    pub language: Option<String>,
    /// Upload timestamp, `YYYY-MM-DD hh:mm:ss±TZ`.
    #[serde(default)]
    pub date: Option<String>,
    /// Publication date, `YYYY-MM-DD`.
    #[serde(default)]
    pub datepublished: Option<String>,
    /// File entries in page order.
    pub files: Vec<GalleryFile>,
    /// Video asset name, for video galleries.
    #[serde(default)]
    pub videofilename: Option<String>,
    /// Artists, when credited.
    #[serde(default)]
    pub artists: Option<Vec<ArtistRef>>,
    /// Circles/groups, when credited.
    #[serde(default)]
    pub groups: Option<Vec<GroupRef>>,
    /// Characters appearing in the gallery.
    #[serde(default)]
    pub characters: Option<Vec<CharacterRef>>,
    /// Parody/series references.
    #[serde(default)]
    pub parodys: Option<Vec<ParodyRef>>,
    /// Tags.
    #[serde(default)]
    pub tags: Option<Vec<TagRef>>,
}

impl GalleryInfo {
    /// Localized title when present, canonical title otherwise.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.japanese_title.as_deref().unwrap_or(&self.title)
    }

    /// Upload date, falling back to the publication date.
    #[must_use]
    pub fn upload_date(&self) -> Option<chrono::NaiveDate> {
        parse_date(self.date.as_deref()).or_else(|| parse_date(self.datepublished.as_deref()))
    }

    /// Publication date, falling back to the upload date.
    #[must_use]
    pub fn published_date(&self) -> Option<chrono::NaiveDate> {
        parse_date(self.datepublished.as_deref()).or_else(|| parse_date(self.date.as_deref()))
    }
}

/// Parses the leading `YYYY-MM-DD` of a site date string.
fn parse_date(value: Option<&str>) -> Option<chrono::NaiveDate> {
    let value = value?;
    let prefix = value.get(..10)?;
    chrono::NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

/// A fetched gallery: the validated record plus the raw JSON payload as
/// served, preserved for the `galleries.json` sidecar.
#[derive(Debug, Clone)]
pub struct GalleryRecord {
    /// Validated metadata.
    pub info: GalleryInfo,
    /// Raw payload exactly as the site served it.
    pub raw: serde_json::Value,
}

/// Kind discriminator for a [`DownloadTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// A sharded image asset.
    Image,
    /// The gallery's video asset.
    Video,
}

/// Asset attributes available to filename templates.
#[derive(Debug, Clone)]
pub struct FileDescriptor {
    /// Display name including extension.
    pub name: String,
    /// Content hash, absent for video assets.
    pub hash: Option<String>,
    /// Pixel width, absent for video assets.
    pub width: Option<u32>,
    /// Pixel height, absent for video assets.
    pub height: Option<u32>,
}

/// One downloadable asset: a descriptor plus a re-invocable request.
///
/// The request is rebuilt on every [`fetch`](DownloadTask::fetch) call so
/// the retry loop can safely re-issue it; concurrency is bounded by the
/// caller's shared limiter, not here.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// Image or video.
    pub kind: TaskKind,
    /// Attributes for filename templating.
    pub file: FileDescriptor,
    client: reqwest::Client,
    url: Url,
    headers: HeaderMap,
}

impl DownloadTask {
    /// The resolved download URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Issues one GET attempt for this asset.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] on transport failure; status
    /// handling is the request pipeline's job.
    pub async fn fetch(&self) -> Result<Response, FetchError> {
        self.client
            .get(self.url.clone())
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| FetchError::network(self.url.as_str(), e))
    }
}

impl HitomiClient {
    /// Fetches the sharding document and parses the routing rule.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, non-success statuses, or unextractable
    /// routing tokens.
    pub async fn sharding_rule(&self) -> Result<ShardingRule, HitomiError> {
        let mut url = self
            .endpoints
            .ltn
            .join("gg.js")
            .map_err(|e| HitomiError::Sharding {
                reason: format!("bad sharding URL: {e}"),
            })?;
        // Cache-buster: the document rotates server-side.
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        url.set_query(Some(&format!("_={millis}")));

        let text = self.fetch_text(&url).await?;
        ShardingRule::parse(&text)
    }

    /// Fetches and validates a gallery record.
    ///
    /// # Errors
    ///
    /// A metadata payload that does not match the expected shape is a
    /// fatal [`HitomiError::MetadataParse`], never a silent default-fill.
    pub async fn gallery_record(&self, id: u32) -> Result<GalleryRecord, HitomiError> {
        let url = self
            .endpoints
            .ltn
            .join(&format!("galleries/{id}.js"))
            .map_err(|e| HitomiError::invalid_url(format!("galleries/{id}.js"), e.to_string()))?;
        let text = self.fetch_text(&url).await?;

        let json = text.trim();
        let json = json.strip_prefix("var galleryinfo =").unwrap_or(json);
        let json = json.trim();
        let json = json.strip_suffix(';').unwrap_or(json);

        let raw: serde_json::Value =
            serde_json::from_str(json).map_err(|e| HitomiError::MetadataParse {
                id,
                message: e.to_string(),
            })?;
        let info: GalleryInfo =
            serde_json::from_value(raw.clone()).map_err(|e| HitomiError::MetadataParse {
                id,
                message: e.to_string(),
            })?;

        debug!(id, files = info.files.len(), "gallery record fetched");
        Ok(GalleryRecord { info, raw })
    }

    /// Fetches a gallery's metadata and builds its full, unfiltered task
    /// list (one per image, plus the video when declared). Filtering is
    /// the orchestrator's responsibility.
    ///
    /// # Errors
    ///
    /// Propagates sharding, metadata, and transport failures.
    pub async fn fetch_gallery(
        &self,
        id: u32,
    ) -> Result<(GalleryRecord, Vec<DownloadTask>), HitomiError> {
        let (rule, record) = tokio::try_join!(self.sharding_rule(), self.gallery_record(id))?;

        let referer = self
            .endpoints
            .referer
            .join(&format!("reader/{id}.html"))
            .map_err(|e| HitomiError::invalid_url(format!("reader/{id}.html"), e.to_string()))?;

        let mut tasks = Vec::with_capacity(record.info.files.len() + 1);
        for file in &record.info.files {
            let url = rule.image_url(&self.endpoints.images, &file.hash)?;
            tasks.push(DownloadTask {
                kind: TaskKind::Image,
                file: FileDescriptor {
                    name: file.name.clone(),
                    hash: Some(file.hash.clone()),
                    width: Some(file.width),
                    height: Some(file.height),
                },
                client: self.http.clone(),
                url,
                headers: self.asset_headers(&referer, false),
            });
        }

        if let Some(video) = &record.info.videofilename {
            let url = self
                .endpoints
                .streaming
                .join(&format!("videos/{video}"))
                .map_err(|e| HitomiError::invalid_url(format!("videos/{video}"), e.to_string()))?;
            tasks.push(DownloadTask {
                kind: TaskKind::Video,
                file: FileDescriptor {
                    name: video.clone(),
                    hash: None,
                    width: None,
                    height: None,
                },
                client: self.http.clone(),
                url,
                headers: self.asset_headers(&referer, true),
            });
        }

        Ok((record, tasks))
    }

    async fn fetch_text(&self, url: &Url) -> Result<String, HitomiError> {
        let response = self
            .http
            .get(url.clone())
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|e| FetchError::network(url.as_str(), e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url.as_str(), status.as_u16()).into());
        }
        response
            .text()
            .await
            .map_err(|e| HitomiError::body(url.as_str(), e))
    }

    fn asset_headers(&self, referer: &Url, range: bool) -> HeaderMap {
        let mut headers = self.headers.clone();
        if let Ok(accept) = HeaderValue::from_str(IMAGE_ACCEPT) {
            headers.insert(ACCEPT, accept);
        }
        if let Ok(value) = HeaderValue::from_str(referer.as_str()) {
            headers.insert(REFERER, value);
        }
        if range {
            headers.insert(RANGE, HeaderValue::from_static("bytes=0-"));
        }
        headers
    }
}
