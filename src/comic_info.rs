//! ComicInfo.xml sidecar generation.
//!
//! Emits the fixed-order element set comic readers expect, populated from
//! a gallery record. Element order is stable for a given input so
//! regeneration can compare old and new documents byte-for-byte.

use std::io;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;

use crate::hitomi::GalleryInfo;

/// Errors from ComicInfo generation.
#[derive(Debug, Error)]
pub enum ComicInfoError {
    /// XML serialization failure.
    #[error("XML write error: {0}")]
    Xml(#[from] io::Error),

    /// The generated document was not valid UTF-8 (cannot happen for
    /// UTF-8 inputs; surfaced rather than swallowed).
    #[error("generated document is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// One `<Page>` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComicPage {
    /// 1-based page number.
    pub image: usize,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
}

/// The subset of the ComicInfo schema this tool populates.
#[derive(Debug, Clone, Default)]
pub struct ComicInfo {
    /// Book title.
    pub title: Option<String>,
    /// Localized series name.
    pub localized_series: Option<String>,
    /// Issue number.
    pub number: Option<u32>,
    /// Total issues in the series.
    pub count: Option<u32>,
    /// Volume number.
    pub volume: Option<u32>,
    /// Genre.
    pub genre: Option<String>,
    /// Page count.
    pub page_count: Option<usize>,
    /// BCP-47 language code.
    pub language_iso: Option<String>,
    /// Source URLs.
    pub web: Vec<String>,
    /// Publication date.
    pub date: Option<chrono::NaiveDate>,
    /// Age rating label.
    pub age_rating: Option<String>,
    /// Series groupings (parodies).
    pub series_group: Vec<String>,
    /// Format label.
    pub format: Option<String>,
    /// Writers/artists.
    pub writer: Vec<String>,
    /// Publishers/circles.
    pub publisher: Vec<String>,
    /// Characters.
    pub characters: Vec<String>,
    /// Tags.
    pub tags: Vec<String>,
    /// Scan provenance note.
    pub scan_information: Option<String>,
    /// Per-page dimension entries.
    pub pages: Vec<ComicPage>,
}

impl ComicInfo {
    /// Serializes the document with the XML declaration and two-space
    /// indentation.
    ///
    /// # Errors
    ///
    /// Surfaces serialization failures; writing to an in-memory buffer
    /// makes these effectively unreachable.
    pub fn to_xml(&self) -> Result<String, ComicInfoError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(xml_err)?;
        writer
            .write_event(Event::Start(BytesStart::new("ComicInfo")))
            .map_err(xml_err)?;

        if let Some(title) = &self.title {
            text_element(&mut writer, "Title", title)?;
        }
        if let Some(series) = &self.localized_series {
            text_element(&mut writer, "LocalizedSeries", series)?;
        }
        if let Some(number) = self.number {
            text_element(&mut writer, "Number", &number.to_string())?;
        }
        if let Some(count) = self.count {
            text_element(&mut writer, "Count", &count.to_string())?;
        }
        if let Some(volume) = self.volume {
            text_element(&mut writer, "Volume", &volume.to_string())?;
        }
        if let Some(genre) = &self.genre {
            text_element(&mut writer, "Genre", genre)?;
        }
        if let Some(page_count) = self.page_count {
            text_element(&mut writer, "PageCount", &page_count.to_string())?;
        }
        if let Some(language) = &self.language_iso {
            text_element(&mut writer, "LanguageISO", language)?;
        }
        if !self.web.is_empty() {
            text_element(&mut writer, "Web", &self.web.join(", "))?;
        }
        if let Some(date) = self.date {
            use chrono::Datelike;
            text_element(&mut writer, "Year", &date.year().to_string())?;
            text_element(&mut writer, "Month", &date.month().to_string())?;
            text_element(&mut writer, "Day", &date.day().to_string())?;
        }
        if let Some(rating) = &self.age_rating {
            text_element(&mut writer, "AgeRating", rating)?;
        }
        if !self.series_group.is_empty() {
            text_element(&mut writer, "SeriesGroup", &self.series_group.join(", "))?;
        }
        if let Some(format) = &self.format {
            text_element(&mut writer, "Format", format)?;
        }
        if !self.writer.is_empty() {
            text_element(&mut writer, "Writer", &self.writer.join(", "))?;
        }
        if !self.publisher.is_empty() {
            text_element(&mut writer, "Publisher", &self.publisher.join(", "))?;
        }
        if !self.characters.is_empty() {
            text_element(&mut writer, "Characters", &self.characters.join(", "))?;
        }
        if !self.tags.is_empty() {
            text_element(&mut writer, "Tags", &self.tags.join(", "))?;
        }
        if let Some(scan) = &self.scan_information {
            text_element(&mut writer, "ScanInformation", scan)?;
        }
        for page in &self.pages {
            writer
                .write_event(Event::Start(BytesStart::new("Page")))
                .map_err(xml_err)?;
            text_element(&mut writer, "Image", &page.image.to_string())?;
            text_element(&mut writer, "ImageWidth", &page.width.to_string())?;
            text_element(&mut writer, "ImageHeight", &page.height.to_string())?;
            writer
                .write_event(Event::End(BytesEnd::new("Page")))
                .map_err(xml_err)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("ComicInfo")))
            .map_err(xml_err)?;
        Ok(String::from_utf8(writer.into_inner())?)
    }
}

fn text_element<W: io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> Result<(), io::Error> {
    writer
        .create_element(name)
        .write_text_content(BytesText::new(value))
        .map_err(xml_err)?;
    Ok(())
}

fn xml_err<E: Into<Box<dyn std::error::Error + Send + Sync>>>(error: E) -> io::Error {
    io::Error::other(error)
}

/// Maps a gallery record into the ComicInfo document this tool emits.
#[must_use]
pub fn from_gallery(info: &GalleryInfo) -> ComicInfo {
    let genre = if info.kind.is_empty() {
        "imageset".to_string()
    } else {
        info.kind.clone()
    };

    ComicInfo {
        title: Some(info.display_title().to_string()),
        localized_series: Some(info.title.clone()),
        number: Some(1),
        count: Some(1),
        volume: Some(1),
        genre: Some(genre.clone()),
        page_count: Some(info.files.len()),
        language_iso: info
            .language
            .as_deref()
            .map(|language| language_to_bcp47(language).to_string()),
        web: vec![format!("https://hitomi.la/gallery/{}.html", info.id)],
        date: info.published_date(),
        age_rating: Some("R18+".to_string()),
        series_group: info
            .parodys
            .iter()
            .flatten()
            .map(|parody| parody.parody.clone())
            .collect(),
        format: Some(genre),
        writer: info
            .artists
            .iter()
            .flatten()
            .map(|artist| artist.artist.clone())
            .collect(),
        publisher: info
            .groups
            .iter()
            .flatten()
            .map(|group| group.group.clone())
            .collect(),
        characters: info
            .characters
            .iter()
            .flatten()
            .map(|character| character.character.clone())
            .collect(),
        tags: info
            .tags
            .iter()
            .flatten()
            .map(|tag| tag.tag.clone())
            .collect(),
        scan_information: Some("Source: hitomi.la".to_string()),
        pages: info
            .files
            .iter()
            .enumerate()
            .map(|(index, file)| ComicPage {
                image: index + 1,
                width: file.width,
                height: file.height,
            })
            .collect(),
    }
}

/// Maps the site's language names onto BCP-47 codes; unknown names map to
/// `und`.
#[must_use]
pub fn language_to_bcp47(name: &str) -> &'static str {
    match name {
        "indonesian" => "id-ID",
        "javanese" => "jv-ID",
        "catalan" => "ca-ES",
        "cebuano" => "ceb-PH",
        "czech" => "cs-CZ",
        "danish" => "da-DK",
        "german" => "de-DE",
        "estonian" => "et-EE",
        "english" => "en-US",
        "spanish" => "es-ES",
        "esperanto" => "eo",
        "french" => "fr-FR",
        "hindi" => "hi-IN",
        "icelandic" => "is-IS",
        "italian" => "it-IT",
        "latin" => "la",
        "hungarian" => "hu-HU",
        "dutch" => "nl-NL",
        "norwegian" => "nb-NO",
        "polish" => "pl-PL",
        "portuguese" => "pt-PT",
        "romanian" => "ro-RO",
        "albanian" => "sq-AL",
        "slovak" => "sk-SK",
        "serbian" => "sr-Latn-RS",
        "finnish" => "fi-FI",
        "swedish" => "sv-SE",
        "tagalog" => "tl-PH",
        "vietnamese" => "vi-VN",
        "turkish" => "tr-TR",
        "greek" => "el-GR",
        "bulgarian" => "bg-BG",
        "mongolian" => "mn-MN",
        "russian" => "ru-RU",
        "ukrainian" => "uk-UA",
        "hebrew" => "he-IL",
        "arabic" => "ar-SA",
        "persian" => "fa-IR",
        "thai" => "th-TH",
        "burmese" => "my-MM",
        "korean" => "ko-KR",
        "chinese" => "zh-Hans-CN",
        "japanese" => "ja-JP",
        _ => "und",
    }
}
