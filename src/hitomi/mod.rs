//! Site client: input resolution, list endpoints, gallery metadata, and
//! per-asset download tasks.
//!
//! The host splits its surface across several domains: an `ltn` host serves
//! the sharding document, gallery metadata, and the binary ID lists; image
//! bytes come from rotating `w<n>` content subdomains selected per asset
//! hash; videos stream from a dedicated host. [`Endpoints`] captures those
//! bases explicitly so tests can point every one of them at a local server.

pub mod gallery;
pub mod list;
pub mod url;

use reqwest::header::HeaderMap;
use thiserror::Error;

use crate::fetch::{FetchError, SafeRequest};
use crate::headers;

pub use self::gallery::{
    DownloadTask, FileDescriptor, GalleryFile, GalleryInfo, GalleryRecord, ShardingRule, TaskKind,
};
pub use self::list::SearchQuery;
pub use self::url::ParsedInput;

/// Domain hosting gallery content and metadata.
pub const CONTENTS_DOMAIN: &str = "gold-usergeneratedcontent.net";

/// Public site host accepted in input URLs.
pub const SITE_HOST: &str = "hitomi.la";

/// Errors from resolving inputs or fetching gallery data.
#[derive(Debug, Error)]
pub enum HitomiError {
    /// The input URL is malformed or not a recognized site URL shape.
    #[error("invalid gallery URL {url}: {reason}")]
    InvalidUrl {
        /// The offending input.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A numeric input does not fit a 32-bit gallery ID.
    #[error("gallery ID out of range: {input}")]
    IdOutOfRange {
        /// The offending input.
        input: String,
    },

    /// The sharding document could not be parsed.
    #[error("failed to parse sharding document: {reason}")]
    Sharding {
        /// Which token extraction failed.
        reason: String,
    },

    /// Gallery metadata did not match the expected shape.
    #[error("malformed metadata for gallery {id}: {message}")]
    MetadataParse {
        /// The gallery whose metadata failed validation.
        id: u32,
        /// The deserializer's issue description.
        message: String,
    },

    /// Reading a response body failed mid-stream.
    #[error("failed to read response body from {url}: {source}")]
    Body {
        /// The URL whose body failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// A request through the pipeline failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl HitomiError {
    pub(crate) fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn body(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Body {
            url: url.into(),
            source,
        }
    }
}

/// Base URLs for every host the site spreads itself across.
///
/// `images` is a template; `{subdomain}` is substituted with the sharded
/// `w<n>` host per asset. All bases other than `images` must end with a
/// trailing slash so relative joins resolve underneath them.
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Metadata host: sharding document, `galleries/<id>.js`, ID lists.
    pub ltn: ::url::Url,
    /// Image host template, e.g. `https://{subdomain}.example.net`.
    pub images: String,
    /// Video streaming host.
    pub streaming: ::url::Url,
    /// Base for per-gallery reader referer headers.
    pub referer: ::url::Url,
}

impl Default for Endpoints {
    // Static known-good URLs; construction cannot fail.
    #[allow(clippy::unwrap_used)]
    fn default() -> Self {
        Self {
            ltn: ::url::Url::parse(&format!("https://ltn.{CONTENTS_DOMAIN}/")).unwrap(),
            images: format!("https://{{subdomain}}.{CONTENTS_DOMAIN}"),
            streaming: ::url::Url::parse(&format!("https://streaming.{CONTENTS_DOMAIN}/")).unwrap(),
            referer: ::url::Url::parse(&format!("https://{SITE_HOST}/")).unwrap(),
        }
    }
}

/// Client for the content host, carrying the shared HTTP client, endpoint
/// bases, and the browser-like default headers the host expects.
#[derive(Debug, Clone)]
pub struct HitomiClient {
    http: reqwest::Client,
    endpoints: Endpoints,
    headers: HeaderMap,
}

impl HitomiClient {
    /// Creates a site client over an existing HTTP client.
    ///
    /// The HTTP client is injected rather than built here so proxy and
    /// timeout configuration stay a caller concern (and tests can supply
    /// their own).
    #[must_use]
    pub fn new(http: reqwest::Client, endpoints: Endpoints) -> Self {
        Self {
            http,
            endpoints,
            headers: headers::browser_headers(),
        }
    }

    /// Returns the configured endpoint bases.
    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Resolves raw input (numeric ID, gallery URL, list/search URL) into a
    /// list of gallery IDs.
    ///
    /// Pure numeric input never touches the network. Multi-term queries
    /// fetch one ID list per filter dimension and intersect them (AND
    /// semantics).
    ///
    /// # Errors
    ///
    /// Fails on malformed or unsupported URLs, IDs outside the u32 range,
    /// and any list-fetch failure (no partial results).
    pub async fn resolve(
        &self,
        input: &str,
        safe: &SafeRequest,
    ) -> Result<Vec<u32>, HitomiError> {
        if !input.is_empty() && input.bytes().all(|b| b.is_ascii_digit()) {
            let id = input
                .parse::<u32>()
                .map_err(|_| HitomiError::IdOutOfRange {
                    input: input.to_string(),
                })?;
            return Ok(vec![id]);
        }

        match url::parse_url(input)? {
            ParsedInput::Gallery(id) => Ok(vec![id]),
            ParsedInput::Query(query) => self.search(&query, safe).await,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints_point_at_contents_domain() {
        let endpoints = Endpoints::default();
        assert_eq!(
            endpoints.ltn.as_str(),
            "https://ltn.gold-usergeneratedcontent.net/"
        );
        assert!(endpoints.images.contains("{subdomain}"));
        assert!(endpoints.streaming.as_str().starts_with("https://streaming."));
    }

    #[tokio::test]
    async fn test_resolve_numeric_input_is_offline() {
        let client = HitomiClient::new(reqwest::Client::new(), Endpoints::default());
        let safe = crate::fetch::SafeRequest::new();
        let ids = client.resolve("3287639", &safe).await.expect("numeric id");
        assert_eq!(ids, vec![3_287_639]);
    }

    #[tokio::test]
    async fn test_resolve_numeric_overflow_is_fatal() {
        let client = HitomiClient::new(reqwest::Client::new(), Endpoints::default());
        let safe = crate::fetch::SafeRequest::new();
        let result = client.resolve("99999999999", &safe).await;
        assert!(matches!(result, Err(HitomiError::IdOutOfRange { .. })));
    }
}
