//! Input URL classification.
//!
//! The site exposes three URL families: gallery pages
//! (`/{doujinshi,manga,…}/…-<id>.html`), list pages
//! (`/{artist,group,series,character,type,tag}/<value>-<language>`), and
//! search/index pages (`/search.html?…`, `/index-<language>.html`). The
//! first yields a single gallery ID; the others yield a [`SearchQuery`]
//! resolved against the list endpoints.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::list::SearchQuery;
use super::{HitomiError, SITE_HOST};

/// Path prefixes of list pages, one per filter dimension.
const LIST_DIRS: [&str; 6] = ["artist", "group", "series", "character", "type", "tag"];

/// Path prefixes of gallery pages.
const GALLERY_DIRS: [&str; 6] = ["cg", "doujinshi", "manga", "gamecg", "imageset", "anime"];

#[allow(clippy::unwrap_used)]
static GALLERY_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(\d+)(?:\.html)?$").unwrap());

// Longest prefix first so "character" is not shadowed by shorter names.
#[allow(clippy::unwrap_used)]
static LIST_QUERY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(character|artist|series|group|type|tag)/([^/]+)-([^/-]+?)(?:\.html)?/?$")
        .unwrap()
});

#[allow(clippy::unwrap_used)]
static INDEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/index-(.+?)\.html$").unwrap());

/// Result of classifying an input URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInput {
    /// A single gallery page.
    Gallery(u32),
    /// A list, search, or index page to resolve via the list endpoints.
    Query(SearchQuery),
}

/// Classifies a site URL into a gallery ID or a search query.
///
/// # Errors
///
/// Fails when the URL is malformed, is not on the site host, or none of
/// the recognized path shapes match.
pub fn parse_url(input: &str) -> Result<ParsedInput, HitomiError> {
    let parsed = Url::parse(input)
        .map_err(|e| HitomiError::invalid_url(input, e.to_string()))?;

    if parsed.host_str() != Some(SITE_HOST) {
        return Err(HitomiError::invalid_url(input, "unexpected host"));
    }

    let path = parsed.path();

    if starts_with_any(path, &LIST_DIRS) {
        return parse_list_url(input, path).map(ParsedInput::Query);
    }
    if path.starts_with("/search") {
        return parse_search_url(input, &parsed).map(ParsedInput::Query);
    }
    if let Some(captures) = INDEX_RE.captures(path) {
        let language = percent_decode(&captures[1]);
        return Ok(ParsedInput::Query(SearchQuery {
            language,
            ..SearchQuery::default()
        }));
    }
    if starts_with_any(path, &GALLERY_DIRS) {
        return parse_gallery_url(input, path).map(ParsedInput::Gallery);
    }

    Err(HitomiError::invalid_url(input, "unrecognized URL path"))
}

fn starts_with_any(path: &str, dirs: &[&str]) -> bool {
    dirs.iter()
        .any(|dir| path.strip_prefix('/').is_some_and(|rest| {
            rest.strip_prefix(dir)
                .is_some_and(|tail| tail.starts_with('/') || tail.is_empty())
        }))
}

fn parse_gallery_url(input: &str, path: &str) -> Result<u32, HitomiError> {
    let captures = GALLERY_ID_RE
        .captures(path)
        .ok_or_else(|| HitomiError::invalid_url(input, "unable to extract gallery ID"))?;
    captures[1]
        .parse::<u32>()
        .map_err(|_| HitomiError::IdOutOfRange {
            input: input.to_string(),
        })
}

fn parse_list_url(input: &str, path: &str) -> Result<SearchQuery, HitomiError> {
    let captures = LIST_QUERY_RE
        .captures(path)
        .ok_or_else(|| HitomiError::invalid_url(input, "unable to extract list query"))?;

    let dimension = &captures[1];
    let value = percent_decode(&captures[2]);
    let language = percent_decode(&captures[3]);

    let mut query = SearchQuery::default();
    if language != "all" {
        query.language = language;
    }
    match dimension {
        "artist" => query.artists.push(value),
        "group" => query.groups.push(value),
        "series" => query.series.push(value),
        "character" => query.characters.push(value),
        "type" => query.kind = Some(value),
        "tag" => query.tags.push(value),
        _ => return Err(HitomiError::invalid_url(input, "unsupported list type")),
    }
    Ok(query)
}

fn parse_search_url(input: &str, parsed: &Url) -> Result<SearchQuery, HitomiError> {
    // Search terms live in the query-string key: `/search.html?tag:glasses%20language:japanese`.
    let raw = parsed
        .query()
        .map(|query| query.split('=').next().unwrap_or(query).to_string())
        .filter(|query| !query.is_empty())
        .ok_or_else(|| HitomiError::invalid_url(input, "no search keywords found"))?;

    let raw = percent_decode(&raw);
    let mut query = SearchQuery::default();
    for term in raw.split(|c: char| c.is_whitespace() || c == '+') {
        let Some((key, rest)) = term.split_once(':') else {
            continue;
        };
        let value = rest.replace('_', " ").trim().to_string();
        if value.is_empty() {
            continue;
        }
        match key.to_ascii_lowercase().as_str() {
            "artist" => query.artists.push(value),
            "group" => query.groups.push(value),
            "series" => query.series.push(value),
            "character" => query.characters.push(value),
            "tag" => query.tags.push(value),
            "language" => query.language = value,
            "type" => query.kind = Some(value),
            _ => {}
        }
    }
    Ok(query)
}

fn percent_decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}
