use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use url::Url;
use uuid::Uuid;

/// Read access to result artifacts, as the reply listener sees it.
///
/// Workers upload artifacts to whatever bucket they were provisioned
/// with and only send URLs back, so reads are keyed by (bucket, key)
/// rather than a single configured bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn read_text(&self, bucket: &str, key: &str) -> Result<String, StorageError>;
}

/// S3 client covering the buckets the worker pool writes to.
///
/// Credentials and endpoint are shared; a `Bucket` handle is built per
/// call because the target bucket comes from reply-message URLs.
pub struct S3Storage {
    region: Region,
    credentials: Credentials,
}

impl S3Storage {
    pub fn new(
        region: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            region,
            credentials,
        })
    }

    fn bucket(&self, name: &str) -> Result<Box<Bucket>, StorageError> {
        Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(|e| StorageError::Config(e.to_string()))
    }

    /// Upload bytes under a uuid-prefixed key so repeated uploads of the
    /// same filename never overwrite each other. Returns the stored key.
    pub async fn upload(
        &self,
        bucket: &str,
        file_name: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError> {
        let key = format!("{}-{}", Uuid::new_v4(), file_name);
        self.bucket(bucket)?
            .put_object_with_content_type(&key, data, content_type)
            .await
            .map_err(StorageError::S3)?;
        Ok(key)
    }

    /// Download an object's bytes.
    pub async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .bucket(bucket)?
            .get_object(key)
            .await
            .map_err(StorageError::S3)?;
        Ok(response.to_vec())
    }

    /// Delete an object.
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.bucket(bucket)?
            .delete_object(key)
            .await
            .map_err(StorageError::S3)?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn read_text(&self, bucket: &str, key: &str) -> Result<String, StorageError> {
        let bytes = self.download(bucket, key).await?;
        String::from_utf8(bytes).map_err(|e| StorageError::NotText(e.to_string()))
    }
}

/// Where an artifact lives, extracted from a virtual-hosted-style S3 URL.
///
/// `https://bucket1.s3.amazonaws.com/results/x.geojson` resolves to
/// bucket `bucket1`, key `results/x.geojson`: the bucket is the first
/// label of the host, the key is the path with its leading slash
/// stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocation {
    pub bucket: String,
    pub key: String,
}

impl ArtifactLocation {
    pub fn parse(artifact_url: &str) -> Result<Self, StorageError> {
        let parsed = Url::parse(artifact_url)
            .map_err(|e| StorageError::BadArtifactUrl(format!("{artifact_url}: {e}")))?;

        let host = parsed
            .host_str()
            .ok_or_else(|| StorageError::BadArtifactUrl(format!("{artifact_url}: no host")))?;

        let bucket = host
            .split('.')
            .next()
            .filter(|label| !label.is_empty())
            .ok_or_else(|| {
                StorageError::BadArtifactUrl(format!("{artifact_url}: no bucket in host"))
            })?;

        let key = parsed.path().trim_start_matches('/');
        if key.is_empty() {
            return Err(StorageError::BadArtifactUrl(format!(
                "{artifact_url}: no object key"
            )));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("Object is not valid UTF-8 text: {0}")]
    NotText(String),

    #[error("Cannot resolve artifact URL: {0}")]
    BadArtifactUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_virtual_hosted_url() {
        let loc = ArtifactLocation::parse("https://bucket1.s3.amazonaws.com/x.geojson").unwrap();
        assert_eq!(loc.bucket, "bucket1");
        assert_eq!(loc.key, "x.geojson");
    }

    #[test]
    fn test_parse_keeps_nested_key() {
        let loc =
            ArtifactLocation::parse("https://results.s3.us-east-1.amazonaws.com/jobs/42/pci.geojson")
                .unwrap();
        assert_eq!(loc.bucket, "results");
        assert_eq!(loc.key, "jobs/42/pci.geojson");
    }

    #[test]
    fn test_parse_single_label_host() {
        // MinIO-style endpoints can expose a bare hostname.
        let loc = ArtifactLocation::parse("http://outputs/result.geojson").unwrap();
        assert_eq!(loc.bucket, "outputs");
        assert_eq!(loc.key, "result.geojson");
    }

    #[test]
    fn test_parse_rejects_missing_key() {
        assert!(ArtifactLocation::parse("https://bucket1.s3.amazonaws.com/").is_err());
        assert!(ArtifactLocation::parse("https://bucket1.s3.amazonaws.com").is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ArtifactLocation::parse("not a url").is_err());
        assert!(ArtifactLocation::parse("").is_err());
    }
}
