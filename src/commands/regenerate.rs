//! ComicInfo regeneration over an existing library.
//!
//! Walks a library tree for extracted galleries (directories holding a
//! `galleries.json`) and archived ones (`.zip`/`.cbz`), re-derives
//! `ComicInfo.xml` from the stored raw metadata, and writes a refreshed
//! copy into the output tree for every gallery whose document changed.
//! Unchanged galleries are left alone, so reruns after a mapping tweak
//! only touch what the tweak affected.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::cli::RegenerateArgs;
use crate::comic_info;
use crate::hitomi::GalleryInfo;
use crate::output::is_archive_path;
use crate::progress::Progress;

const METADATA_NAME: &str = "galleries.json";
const COMIC_INFO_NAME: &str = "ComicInfo.xml";

enum Target {
    /// A directory-layout gallery (holds a `galleries.json`).
    Dir(PathBuf),
    /// An archived gallery.
    Archive(PathBuf),
}

/// Scans the input tree and refreshes stale ComicInfo documents into the
/// output tree.
///
/// # Errors
///
/// Fails on unreadable inputs, malformed stored metadata, or output IO
/// errors.
pub fn run_regenerate_command(args: &RegenerateArgs) -> anyhow::Result<()> {
    let targets = find_targets(&args.input)?;
    info!(galleries = targets.len(), "scanning library for stale ComicInfo documents");

    let progress = Progress::new(args.quiet);
    let overall = progress.overall(targets.len());

    let mut refreshed = 0usize;
    for target in &targets {
        let changed = match target {
            Target::Dir(dir) => regenerate_dir(dir, &args.input, &args.output)
                .with_context(|| format!("regenerating {}", dir.display()))?,
            Target::Archive(path) => regenerate_archive(path, &args.input, &args.output)
                .with_context(|| format!("regenerating {}", path.display()))?,
        };
        if changed {
            refreshed += 1;
        }
        overall.inc(1);
    }
    overall.finish_and_clear();

    info!(scanned = targets.len(), refreshed, "regeneration complete");
    Ok(())
}

fn find_targets(input: &Path) -> anyhow::Result<Vec<Target>> {
    let mut targets = Vec::new();
    for entry in WalkDir::new(input) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if name == METADATA_NAME {
            if let Some(parent) = entry.path().parent() {
                targets.push(Target::Dir(parent.to_path_buf()));
            }
        } else if is_archive_path(&name) {
            targets.push(Target::Archive(entry.path().to_path_buf()));
        }
    }
    Ok(targets)
}

fn relative_output(path: &Path, input_root: &Path, output_root: &Path) -> PathBuf {
    match path.strip_prefix(input_root) {
        Ok(relative) => output_root.join(relative),
        Err(_) => output_root.join(path),
    }
}

fn regenerate_dir(dir: &Path, input_root: &Path, output_root: &Path) -> anyhow::Result<bool> {
    let raw = std::fs::read_to_string(dir.join(METADATA_NAME))?;
    let info: GalleryInfo = serde_json::from_str(&raw)
        .with_context(|| format!("malformed {METADATA_NAME} in {}", dir.display()))?;
    let fresh = comic_info::from_gallery(&info).to_xml()?;

    let current = std::fs::read_to_string(dir.join(COMIC_INFO_NAME)).unwrap_or_default();
    if current == fresh {
        debug!(path = %dir.display(), "ComicInfo up to date");
        return Ok(false);
    }

    let out_dir = relative_output(dir, input_root, output_root);
    copy_dir_contents(dir, &out_dir)?;
    std::fs::write(out_dir.join(COMIC_INFO_NAME), fresh)?;
    info!(path = %out_dir.display(), "ComicInfo refreshed");
    Ok(true)
}

fn copy_dir_contents(from: &Path, to: &Path) -> anyhow::Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .unwrap_or_else(|_| entry.path());
        let destination = to.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)?;
        } else {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}

fn regenerate_archive(
    archive_path: &Path,
    input_root: &Path,
    output_root: &Path,
) -> anyhow::Result<bool> {
    let mut archive = zip::ZipArchive::new(File::open(archive_path)?)?;

    let raw = read_entry(&mut archive, METADATA_NAME)
        .with_context(|| format!("no {METADATA_NAME} in {}", archive_path.display()))?;
    let info: GalleryInfo = serde_json::from_slice(&raw)
        .with_context(|| format!("malformed {METADATA_NAME} in {}", archive_path.display()))?;
    let fresh = comic_info::from_gallery(&info).to_xml()?;

    let current = read_entry(&mut archive, COMIC_INFO_NAME).unwrap_or_default();
    if current == fresh.as_bytes() {
        debug!(path = %archive_path.display(), "ComicInfo up to date");
        return Ok(false);
    }

    let out_path = relative_output(archive_path, input_root, output_root);
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = zip::ZipWriter::new(File::create(&out_path)?);

    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        if entry.name() == COMIC_INFO_NAME {
            continue;
        }
        writer.raw_copy_file(entry)?;
    }
    writer.start_file(
        COMIC_INFO_NAME,
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
    )?;
    writer.write_all(fresh.as_bytes())?;
    writer.finish()?;

    info!(path = %out_path.display(), "ComicInfo refreshed");
    Ok(true)
}

fn read_entry(
    archive: &mut zip::ZipArchive<File>,
    name: &str,
) -> anyhow::Result<Vec<u8>> {
    let mut entry = archive.by_name(name)?;
    let mut contents = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
    entry.read_to_end(&mut contents)?;
    Ok(contents)
}
