//! Placeholder expansion for output paths and asset filenames.
//!
//! Gallery-level tokens (`{id}`, `{title}`, dates, `{now_*}`, `{random}`)
//! shape the destination path; file-level tokens (`{no}`, `{name}`,
//! `{ext}`, dimensions, `{hash}`) shape each asset's name inside it.
//! Every occurrence of a token is replaced, not just the first.

use chrono::{Datelike, Local, Timelike};
use rand::Rng;

use crate::hitomi::{FileDescriptor, GalleryInfo};

/// Expands gallery-level tokens in an output path template.
#[must_use]
pub fn fill_gallery_placeholders(template: &str, info: &GalleryInfo) -> String {
    let date = info.upload_date();
    let now = Local::now();
    let random: u32 = rand::thread_rng().gen_range(0..1_000_000_000);

    template
        .replace("{id}", &info.id)
        .replace("{title}", &info.title)
        .replace("{type}", &info.kind)
        .replace("{language}", info.language.as_deref().unwrap_or("all"))
        .replace(
            "{year}",
            &date.map_or_else(|| "0000".to_string(), |d| format!("{:04}", d.year())),
        )
        .replace(
            "{month}",
            &date.map_or_else(|| "00".to_string(), |d| format!("{:02}", d.month())),
        )
        .replace(
            "{day}",
            &date.map_or_else(|| "00".to_string(), |d| format!("{:02}", d.day())),
        )
        .replace("{now_year}", &format!("{:04}", now.year()))
        .replace("{now_month}", &format!("{:02}", now.month()))
        .replace("{now_day}", &format!("{:02}", now.day()))
        .replace("{now_hour}", &format!("{:02}", now.hour()))
        .replace("{now_minute}", &format!("{:02}", now.minute()))
        .replace("{now_second}", &format!("{:02}", now.second()))
        .replace("{random}", &format!("{random:09}"))
}

/// Expands file-level tokens for the asset at `index` out of `total`.
///
/// `{no}` is the 1-based position, zero-padded to the width of `total`;
/// `{name}`/`{ext}` split the source filename at its final dot (the
/// extension keeps the dot); dimensions and `{hash}` fall back to
/// `"unknown"` for assets without them (video).
#[must_use]
pub fn fill_filename_placeholders(
    template: &str,
    index: usize,
    total: usize,
    file: &FileDescriptor,
) -> String {
    let (base, ext) = split_extension(&file.name);
    let width = total.to_string().len();
    let no = format!("{:0width$}", index + 1);

    template
        .replace("{index}", &index.to_string())
        .replace("{no}", &no)
        .replace("{name}", base)
        .replace("{ext}", ext)
        .replace(
            "{height}",
            &file
                .height
                .map_or_else(|| "unknown".to_string(), |h| h.to_string()),
        )
        .replace(
            "{width}",
            &file
                .width
                .map_or_else(|| "unknown".to_string(), |w| w.to_string()),
        )
        .replace("{hash}", file.hash.as_deref().unwrap_or("unknown"))
}

/// Splits `name.ext` into (`name`, `.ext`); no-dot names have an empty
/// extension. A leading dot is part of the base name, not an extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn gallery(json: &str) -> GalleryInfo {
        serde_json::from_str(json).unwrap()
    }

    fn image_file(name: &str) -> FileDescriptor {
        FileDescriptor {
            name: name.to_string(),
            hash: Some("cafe".to_string()),
            width: Some(1280),
            height: Some(1810),
        }
    }

    #[test]
    fn test_filename_no_is_one_based_and_padded_to_total_width() {
        let name = fill_filename_placeholders("{no}_{name}{ext}", 5, 100, &image_file("image.jpg"));
        assert_eq!(name, "006_image.jpg");
    }

    #[test]
    fn test_filename_tokens() {
        let name = fill_filename_placeholders(
            "{index}-{no}-{name}-{ext}-{width}x{height}-{hash}",
            0,
            9,
            &image_file("page.webp"),
        );
        assert_eq!(name, "0-1-page-.webp-1280x1810-cafe");
    }

    #[test]
    fn test_filename_video_fallbacks_to_unknown() {
        let file = FileDescriptor {
            name: "movie.mp4".to_string(),
            hash: None,
            width: None,
            height: None,
        };
        let name = fill_filename_placeholders("{hash}_{width}{ext}", 0, 1, &file);
        assert_eq!(name, "unknown_unknown.mp4");
    }

    #[test]
    fn test_filename_replaces_every_occurrence() {
        let name = fill_filename_placeholders("{no}{no}{ext}", 0, 5, &image_file("a.png"));
        assert_eq!(name, "11.png");
    }

    #[test]
    fn test_filename_without_extension() {
        let name = fill_filename_placeholders("{name}{ext}", 0, 1, &image_file("plain"));
        assert_eq!(name, "plain");
    }

    #[test]
    fn test_gallery_tokens() {
        let info = gallery(
            r#"{"id":"3287639","title":"A Title","type":"manga","language":"japanese",
                "files":[],"date":"2023-08-10 05:57:00-05"}"#,
        );
        let path = fill_gallery_placeholders("{id}/{title}-{type}-{language}-{year}{month}{day}", &info);
        assert_eq!(path, "3287639/A Title-manga-japanese-20230810");
    }

    #[test]
    fn test_gallery_id_replaced_everywhere() {
        let info = gallery(r#"{"id":"7","title":"t","type":"manga","files":[]}"#);
        assert_eq!(fill_gallery_placeholders("{id}/{id}.cbz", &info), "7/7.cbz");
    }

    #[test]
    fn test_gallery_random_is_nine_digits() {
        let info = gallery(r#"{"id":"7","title":"t","type":"manga","files":[]}"#);
        let out = fill_gallery_placeholders("{random}", &info);
        assert_eq!(out.len(), 9);
        assert!(out.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_gallery_missing_date_pads_zeroes() {
        let info = gallery(r#"{"id":"7","title":"t","type":"manga","files":[]}"#);
        assert_eq!(fill_gallery_placeholders("{year}-{month}-{day}", &info), "0000-00-00");
    }

    #[test]
    fn test_split_extension_edge_cases() {
        assert_eq!(split_extension("a.jpg"), ("a", ".jpg"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("noext"), ("noext", ""));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
    }
}
