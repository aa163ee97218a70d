//! Directory sink backend.

use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::{SinkBackend, SinkError};

/// Writes session entries as plain files under a base directory.
///
/// Streamed bodies go straight to disk chunk by chunk; nothing is
/// buffered in memory beyond the transport's own chunks.
#[derive(Debug)]
pub(crate) struct DirBackend {
    base: PathBuf,
}

impl DirBackend {
    pub(crate) fn new(base: PathBuf) -> Self {
        Self { base }
    }

    fn entry_path(&self, name: &str) -> PathBuf {
        self.base.join(name)
    }
}

#[async_trait]
impl SinkBackend for DirBackend {
    async fn prepare(&self) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(&self.base)
            .await
            .map_err(|e| SinkError::io(&self.base, e))
    }

    async fn write_text(&self, name: &str, contents: &str) -> Result<(), SinkError> {
        let path = self.entry_path(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SinkError::io(parent, e))?;
        }
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| SinkError::io(&path, e))
    }

    async fn write_stream(
        &self,
        name: &str,
        response: reqwest::Response,
    ) -> Result<(), SinkError> {
        let path = self.entry_path(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SinkError::io(parent, e))?;
        }

        let file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| SinkError::io(&path, e))?;
        let mut writer = BufWriter::new(file);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| SinkError::Body {
                name: name.to_string(),
                source: e,
            })?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| SinkError::io(&path, e))?;
        }
        writer.flush().await.map_err(|e| SinkError::io(&path, e))
    }

    async fn finalize(&self) -> Result<(), SinkError> {
        // Every write flushed itself; nothing to seal.
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prepare_creates_nested_directories() {
        let temp = tempfile::tempdir().unwrap();
        let base = temp.path().join("a/b/c");
        let backend = DirBackend::new(base.clone());
        backend.prepare().await.unwrap();
        assert!(base.is_dir());
    }

    #[tokio::test]
    async fn test_write_text_creates_file() {
        let temp = tempfile::tempdir().unwrap();
        let backend = DirBackend::new(temp.path().to_path_buf());
        backend.write_text("meta.json", "{}").await.unwrap();
        assert_eq!(
            std::fs::read_to_string(temp.path().join("meta.json")).unwrap(),
            "{}"
        );
    }

    #[tokio::test]
    async fn test_write_text_creates_parent_for_nested_name() {
        let temp = tempfile::tempdir().unwrap();
        let backend = DirBackend::new(temp.path().to_path_buf());
        backend.write_text("sub/meta.json", "{}").await.unwrap();
        assert!(temp.path().join("sub/meta.json").is_file());
    }
}
