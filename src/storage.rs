use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::errors::ServiceError;

/// Object-store contract consumed by the payment-proof upload flow.
///
/// `put_object` stores the bytes under `bucket/object_name` and returns a
/// publicly resolvable URL. Implementations create the bucket lazily.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        object_name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, ServiceError>;
}

/// HTTP client against an S3-style bucket API.
#[derive(Clone)]
pub struct HttpObjectStore {
    client: Client,
    config: StorageConfig,
}

impl HttpObjectStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn object_url(&self, bucket: &str, object_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            bucket,
            object_name
        )
    }

    fn public_url(&self, bucket: &str, object_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.public_base_url().trim_end_matches('/'),
            bucket,
            object_name
        )
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), ServiceError> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), bucket);
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("bucket create: {}", e)))?;

        // 409 means another writer created it first; that is fine.
        if response.status().is_success() || response.status() == StatusCode::CONFLICT {
            info!(bucket, "storage bucket ready");
            Ok(())
        } else {
            Err(ServiceError::ExternalServiceError(format!(
                "bucket create returned {}",
                response.status()
            )))
        }
    }

    async fn upload(
        &self,
        bucket: &str,
        object_name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<StatusCode, ServiceError> {
        let response = self
            .client
            .put(self.object_url(bucket, object_name))
            .bearer_auth(&self.config.api_key)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("object upload: {}", e)))?;

        Ok(response.status())
    }
}

#[async_trait]
impl BlobStorage for HttpObjectStore {
    #[instrument(skip(self, bytes), fields(bucket, object_name, size = bytes.len()))]
    async fn put_object(
        &self,
        bucket: &str,
        object_name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, ServiceError> {
        let status = self
            .upload(bucket, object_name, bytes.clone(), content_type)
            .await?;

        let status = if status == StatusCode::NOT_FOUND {
            // Bucket does not exist yet; create it and retry once.
            warn!(bucket, "bucket missing, creating");
            self.create_bucket(bucket).await?;
            self.upload(bucket, object_name, bytes, content_type).await?
        } else {
            status
        };

        if status.is_success() {
            Ok(self.public_url(bucket, object_name))
        } else {
            Err(ServiceError::ExternalServiceError(format!(
                "object upload returned {}",
                status
            )))
        }
    }
}

/// Object name for a payment proof, qualified by upload time so repeated
/// uploads for the same order never collide.
pub fn proof_object_name(order_id: Uuid, uploaded_at: DateTime<Utc>, content_type: &str) -> String {
    format!(
        "{}-{}.{}",
        order_id,
        uploaded_at.timestamp_millis(),
        extension_for(content_type)
    )
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn proof_names_are_time_qualified() {
        let order_id = Uuid::new_v4();
        let t1 = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let t2 = t1 + chrono::Duration::milliseconds(250);

        let a = proof_object_name(order_id, t1, "image/png");
        let b = proof_object_name(order_id, t2, "image/png");

        assert_ne!(a, b);
        assert!(a.starts_with(&order_id.to_string()));
        assert!(a.ends_with(".png"));
    }

    #[test]
    fn unknown_content_types_fall_back_to_bin() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("application/octet-stream"), "bin");
    }
}
