use crate::signing::{SignedTarget, UrlSigner};
use crate::traits::{
    ByteStream, ObjectStore, PresignedUrl, StorageError, StorageResult, StoredPart,
};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use transfat_core::models::PartETag;
use uuid::Uuid;

const MULTIPART_DIR: &str = ".multipart";
const KEY_FILE: &str = "key";

/// Filesystem object store.
///
/// Objects live at `{base_path}/{key}`. In-progress multipart uploads keep
/// their parts under `{base_path}/.multipart/{upload_id}/` until completion.
/// Presigned URLs point back at this server's `/storage` routes and carry an
/// HMAC signature.
#[derive(Clone)]
pub struct LocalObjectStore {
    base_path: PathBuf,
    public_base_url: String,
    signer: UrlSigner,
}

impl LocalObjectStore {
    /// # Arguments
    /// * `base_path` - Root directory for objects (e.g., "/var/lib/transfat")
    /// * `public_base_url` - Externally reachable origin of this server
    /// * `signing_secret` - HMAC key for presigned URLs
    pub async fn new(
        base_path: impl Into<PathBuf>,
        public_base_url: String,
        signing_secret: &str,
    ) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(base_path.join(MULTIPART_DIR))
            .await
            .map_err(|e| {
                StorageError::ConfigError(format!(
                    "Failed to create storage directory {}: {}",
                    base_path.display(),
                    e
                ))
            })?;

        Ok(LocalObjectStore {
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signer: UrlSigner::new(signing_secret.as_bytes().to_vec()),
        })
    }

    /// Convert storage key to filesystem path, rejecting keys that could
    /// escape the base directory or collide with multipart scratch space.
    fn key_to_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty()
            || key.starts_with('/')
            || key.starts_with(MULTIPART_DIR)
            || key.split('/').any(|seg| seg == ".." || seg == "." || seg.is_empty())
        {
            return Err(StorageError::InvalidKey(format!(
                "Storage key contains invalid segments: {}",
                key
            )));
        }
        Ok(self.base_path.join(key))
    }

    fn upload_dir(&self, upload_id: &str) -> StorageResult<PathBuf> {
        Uuid::parse_str(upload_id)
            .map_err(|_| StorageError::UploadNotFound(upload_id.to_string()))?;
        Ok(self.base_path.join(MULTIPART_DIR).join(upload_id))
    }

    fn part_path(dir: &Path, part_number: i32) -> PathBuf {
        dir.join(format!("{:05}.part", part_number))
    }

    fn etag_path(dir: &Path, part_number: i32) -> PathBuf {
        dir.join(format!("{:05}.etag", part_number))
    }

    /// Loads the key recorded for an open upload and checks it matches.
    async fn open_upload(&self, key: &str, upload_id: &str) -> StorageResult<PathBuf> {
        let dir = self.upload_dir(upload_id)?;
        let stored_key = match fs::read_to_string(dir.join(KEY_FILE)).await {
            Ok(k) => k,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::UploadNotFound(upload_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        if stored_key != key {
            return Err(StorageError::InvalidKey(format!(
                "Key does not match multipart upload {}",
                upload_id
            )));
        }
        Ok(dir)
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn compute_etag(data: &[u8]) -> String {
        let digest = Sha256::digest(data);
        hex::encode(&digest[..16])
    }

    fn encode_key_path(key: &str) -> String {
        key.split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn expiry_timestamp(expires_in: Duration) -> i64 {
        Utc::now().timestamp() + expires_in.as_secs() as i64
    }

    /// Validate a part upload URL's signature and expiry.
    pub fn verify_part_signature(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires: i64,
        signature: &str,
    ) -> StorageResult<()> {
        let target = SignedTarget::UploadPart {
            key,
            upload_id,
            part_number,
        };
        self.signer
            .verify(&target, expires, signature, Utc::now().timestamp())
    }

    /// Validate an object download URL's signature and expiry.
    pub fn verify_get_signature(&self, key: &str, expires: i64, signature: &str) -> StorageResult<()> {
        let target = SignedTarget::GetObject { key };
        self.signer
            .verify(&target, expires, signature, Utc::now().timestamp())
    }

    /// Store one part of an open multipart upload and return its ETag.
    /// Re-sending a part number replaces the earlier bytes.
    pub async fn write_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> StorageResult<String> {
        let dir = self.open_upload(key, upload_id).await?;
        let etag = Self::compute_etag(&data);
        let size = data.len();

        let tmp = dir.join(format!("{:05}.tmp-{}", part_number, Uuid::new_v4().simple()));
        let mut file = fs::File::create(&tmp).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create part {}: {}", part_number, e))
        })?;
        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write part {}: {}", part_number, e))
        })?;
        file.sync_all().await?;
        drop(file);

        // Rename after the bytes are durable so a listing never sees a torn part.
        fs::write(Self::etag_path(&dir, part_number), &etag).await?;
        fs::rename(&tmp, Self::part_path(&dir, part_number)).await?;

        tracing::debug!(
            key = %key,
            upload_id = %upload_id,
            part_number,
            size_bytes = size,
            "Local multipart part stored"
        );

        Ok(etag)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    fn bucket(&self) -> &str {
        "local"
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        _content_type: &str,
    ) -> StorageResult<String> {
        self.key_to_path(key)?;
        let upload_id = Uuid::new_v4().to_string();
        let dir = self.upload_dir(&upload_id)?;
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(KEY_FILE), key).await?;

        tracing::info!(key = %key, upload_id = %upload_id, "Local multipart upload created");
        Ok(upload_id)
    }

    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> StorageResult<PresignedUrl> {
        self.key_to_path(key)?;
        self.upload_dir(upload_id)?;
        let expires = Self::expiry_timestamp(expires_in);
        let signature = self.signer.sign(
            &SignedTarget::UploadPart {
                key,
                upload_id,
                part_number,
            },
            expires,
        )?;
        let url = format!(
            "{}/storage/parts/{}/{}?key={}&expires={}&signature={}",
            self.public_base_url,
            upload_id,
            part_number,
            urlencoding::encode(key),
            expires,
            signature
        );
        Ok(PresignedUrl::new(url, expires_in))
    }

    async fn list_parts(&self, key: &str, upload_id: &str) -> StorageResult<Vec<StoredPart>> {
        let dir = self.open_upload(key, upload_id).await?;
        let mut parts = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(number) = name
                .to_str()
                .and_then(|n| n.strip_suffix(".part"))
                .and_then(|n| n.parse::<i32>().ok())
            else {
                continue;
            };
            let e_tag = fs::read_to_string(Self::etag_path(&dir, number)).await?;
            let size = entry.metadata().await?.len();
            parts.push(StoredPart {
                part_number: number,
                e_tag,
                size,
            });
        }
        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartETag],
    ) -> StorageResult<()> {
        let start = std::time::Instant::now();
        let dir = self.open_upload(key, upload_id).await?;
        if parts.is_empty() {
            return Err(StorageError::InvalidPart(
                "At least one part is required".to_string(),
            ));
        }

        for part in parts {
            let expected = fs::read_to_string(Self::etag_path(&dir, part.part_number))
                .await
                .map_err(|_| {
                    StorageError::InvalidPart(format!("Part {} was never uploaded", part.part_number))
                })?;
            if expected != part.e_tag.trim_matches('"') {
                return Err(StorageError::InvalidPart(format!(
                    "ETag mismatch for part {}",
                    part.part_number
                )));
            }
        }

        let target = self.key_to_path(key)?;
        self.ensure_parent_dir(&target).await?;
        let tmp = target.with_extension(format!("assembling-{}", upload_id));
        let mut out = fs::File::create(&tmp).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create {}: {}", tmp.display(), e))
        })?;

        let mut total = 0u64;
        for part in parts {
            let mut src = fs::File::open(Self::part_path(&dir, part.part_number)).await?;
            total += tokio::io::copy(&mut src, &mut out).await?;
        }
        out.sync_all().await?;
        drop(out);

        fs::rename(&tmp, &target).await?;
        fs::remove_dir_all(&dir).await?;

        tracing::info!(
            key = %key,
            upload_id = %upload_id,
            parts = parts.len(),
            size_bytes = total,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local multipart upload completed"
        );
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        match self.open_upload(key, upload_id).await {
            Ok(dir) => {
                fs::remove_dir_all(&dir).await?;
                Ok(())
            }
            Err(StorageError::UploadNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn get_object(&self, key: &str) -> StorageResult<ByteStream> {
        let path = self.key_to_path(key)?;

        let file = match fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => {
                return Err(StorageError::DownloadFailed(format!(
                    "Failed to open file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let stream = tokio_util::io::ReaderStream::new(file).map(|result| {
            result.map_err(|e| StorageError::DownloadFailed(format!("Failed to read chunk: {}", e)))
        });
        Ok(Box::pin(stream))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn put_object(&self, key: &str, data: Bytes, _content_type: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        let size = data.len();
        self.ensure_parent_dir(&path).await?;

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;
        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;
        file.sync_all().await?;

        tracing::debug!(key = %key, size_bytes = size, "Local storage put successful");
        Ok(())
    }

    async fn presign_get_url(
        &self,
        key: &str,
        expires_in: Duration,
    ) -> StorageResult<PresignedUrl> {
        self.key_to_path(key)?;
        let expires = Self::expiry_timestamp(expires_in);
        let signature = self.signer.sign(&SignedTarget::GetObject { key }, expires)?;
        let url = format!(
            "{}/storage/objects/{}?expires={}&signature={}",
            self.public_base_url,
            Self::encode_key_path(key),
            expires,
            signature
        );
        Ok(PresignedUrl::new(url, expires_in))
    }

    async fn delete_object(&self, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to delete file {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
