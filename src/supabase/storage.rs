//! Object uploads to a storage bucket

use async_trait::async_trait;
use reqwest::Method;

use super::SupabaseBackend;
use crate::error::{Result, ZestyError};
use crate::repository::{ObjectStorage, ObjectUpload};

impl SupabaseBackend {
    /// Public URL of an object in a public bucket
    pub fn public_object_url(&self, bucket: &str, path: &str) -> Result<String> {
        Ok(self
            .client
            .endpoint(&format!("storage/v1/object/public/{bucket}/{path}"))?
            .to_string())
    }
}

#[async_trait]
impl ObjectStorage for SupabaseBackend {
    async fn upload_object(&self, upload: &ObjectUpload) -> Result<String> {
        if upload.path.contains("..") {
            return Err(ZestyError::Storage(format!("refusing object path {}", upload.path)));
        }
        let url = self
            .client
            .endpoint(&format!("storage/v1/object/{}/{}", upload.bucket, upload.path))?;
        let request = self
            .client
            .request(Method::POST, url)
            .header(reqwest::header::CONTENT_TYPE, &upload.content_type)
            .header("x-upsert", "false")
            .body(upload.bytes.clone());
        self.client.send_empty("upload_object", request).await.map_err(|e| match e {
            ZestyError::Backend { status, message } => ZestyError::Storage(format!("{status}: {message}")),
            other => other,
        })?;
        tracing::info!(bucket = %upload.bucket, path = %upload.path, bytes = upload.bytes.len(), "Uploaded object");
        self.public_object_url(&upload.bucket, &upload.path)
    }
}
