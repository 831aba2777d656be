//! Byte sources an upload reads its parts from.

use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Where the bytes of an upload come from. Parts are read on demand, so a
/// file source never holds more than one part in memory.
#[derive(Debug, Clone)]
pub enum PartSource {
    File { path: PathBuf, size: u64 },
    Memory(Bytes),
}

impl PartSource {
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(PartSource::File {
            size: metadata.len(),
            path,
        })
    }

    pub fn size(&self) -> u64 {
        match self {
            PartSource::File { size, .. } => *size,
            PartSource::Memory(bytes) => bytes.len() as u64,
        }
    }

    /// Read `len` bytes starting at `offset`. Fails if the source is shorter.
    pub async fn read_range(&self, offset: u64, len: usize) -> std::io::Result<Bytes> {
        match self {
            PartSource::Memory(bytes) => {
                let start = usize::try_from(offset).map_err(|_| out_of_range(offset, len))?;
                let end = start
                    .checked_add(len)
                    .filter(|end| *end <= bytes.len())
                    .ok_or_else(|| out_of_range(offset, len))?;
                Ok(bytes.slice(start..end))
            }
            PartSource::File { path, .. } => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(offset)).await?;
                let mut buf = vec![0u8; len];
                file.read_exact(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

fn out_of_range(offset: u64, len: usize) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("Range {}+{} is past the end of the source", offset, len),
    )
}

/// Content type from the file extension. Unknown extensions are sent as
/// `application/octet-stream`, which the server rejects.
pub fn guess_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("mpeg") | Some("mpg") => "video/mpeg",
        _ => "application/octet-stream",
    }
}
