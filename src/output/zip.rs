//! Zip/CBZ sink backend.
//!
//! Text entries (sidecars) are Deflated; streamed bodies are Stored,
//! since images and video arrive already compressed and deflating them
//! again only burns CPU for near-zero gain. Entry writes serialize through the
//! archive writer's mutex; bodies are buffered fully before the lock is
//! taken so downloads still overlap.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use super::{SinkBackend, SinkError};

#[derive(Debug)]
pub(crate) struct ZipBackend {
    path: PathBuf,
    writer: Mutex<Option<zip::ZipWriter<std::fs::File>>>,
}

impl ZipBackend {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            writer: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<zip::ZipWriter<std::fs::File>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append_entry(
        &self,
        name: &str,
        data: &[u8],
        method: CompressionMethod,
    ) -> Result<(), SinkError> {
        let mut guard = self.lock();
        let writer = guard.as_mut().ok_or_else(|| {
            SinkError::io(
                &self.path,
                std::io::Error::other("archive writer not prepared"),
            )
        })?;

        let options = SimpleFileOptions::default().compression_method(method);
        writer
            .start_file(name, options)
            .map_err(|e| SinkError::zip(&self.path, e))?;
        writer
            .write_all(data)
            .map_err(|e| SinkError::io(&self.path, e))
    }
}

#[async_trait]
impl SinkBackend for ZipBackend {
    async fn prepare(&self) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SinkError::io(parent, e))?;
            }
        }
        let file = std::fs::File::create(&self.path).map_err(|e| SinkError::io(&self.path, e))?;
        *self.lock() = Some(zip::ZipWriter::new(file));
        Ok(())
    }

    async fn write_text(&self, name: &str, contents: &str) -> Result<(), SinkError> {
        self.append_entry(name, contents.as_bytes(), CompressionMethod::Deflated)
    }

    async fn write_stream(
        &self,
        name: &str,
        response: reqwest::Response,
    ) -> Result<(), SinkError> {
        let bytes = response.bytes().await.map_err(|e| SinkError::Body {
            name: name.to_string(),
            source: e,
        })?;
        self.append_entry(name, &bytes, CompressionMethod::Stored)
    }

    async fn finalize(&self) -> Result<(), SinkError> {
        let writer = self.lock().take();
        if let Some(writer) = writer {
            let mut file = writer.finish().map_err(|e| SinkError::zip(&self.path, e))?;
            file.flush().map_err(|e| SinkError::io(&self.path, e))?;
        }
        Ok(())
    }
}
