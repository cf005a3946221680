use std::path::Path;

use super::ByteWriteFilter2;
use tokio::{fs::File, io::AsyncWriteExt};

/// Appends every received buffer to a file.
pub struct FileWriteFilter {
    file: File,
}

impl FileWriteFilter {
    pub fn new(file: File) -> Self {
        Self { file }
    }

    pub async fn create<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(Self::new(File::create(path).await?))
    }
}

#[async_trait::async_trait]
impl ByteWriteFilter2 for FileWriteFilter {
    async fn start(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn write(&mut self, bytes: bytes::Bytes) -> anyhow::Result<()> {
        self.file.write_all(&bytes).await?;
        self.file.flush().await?;

        Ok(())
    }
}
