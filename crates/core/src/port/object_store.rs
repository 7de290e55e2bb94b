// Object Store Port - external blob storage contract
//
// The engine persists artifact references only; the bytes live behind this
// interface (MinIO/S3 in production).

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::ArtifactKind;
use crate::error::Result;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the bucket if it does not exist.
    async fn ensure_bucket(&self, bucket: &str) -> Result<()>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Presigned download URL valid for `ttl`.
    async fn presign(&self, bucket: &str, key: &str, ttl: Duration) -> Result<String>;
}

/// Object key convention: `{kind}/{job_id}/{task_key}` followed by either
/// `/{filename}` or `/{task_key}{ext}`.
pub fn object_key(
    kind: ArtifactKind,
    job_id: Uuid,
    task_key: &str,
    filename: Option<&str>,
    ext: Option<&str>,
) -> String {
    let base = format!("{kind}/{job_id}/{task_key}");
    if let Some(filename) = filename {
        return format!("{base}/{filename}");
    }
    if let Some(ext) = ext {
        return format!("{base}/{task_key}{ext}");
    }
    format!("{base}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_with_filename() {
        let job = Uuid::nil();
        let key = object_key(ArtifactKind::Output, job, "transcode", Some("out.mp4"), None);
        assert_eq!(
            key,
            format!("output/{job}/transcode/out.mp4")
        );
    }

    #[test]
    fn key_with_extension() {
        let job = Uuid::nil();
        let key = object_key(ArtifactKind::Log, job, "ingest", None, Some(".log"));
        assert_eq!(key, format!("log/{job}/ingest/ingest.log"));
    }

    #[test]
    fn key_bare_prefix() {
        let job = Uuid::nil();
        let key = object_key(ArtifactKind::Input, job, "ingest", None, None);
        assert_eq!(key, format!("input/{job}/ingest/"));
    }

    #[test]
    fn filename_wins_over_extension() {
        let job = Uuid::nil();
        let key = object_key(ArtifactKind::Output, job, "t", Some("a.bin"), Some(".mp4"));
        assert!(key.ends_with("/a.bin"));
    }
}
