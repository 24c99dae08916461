//! S3 / MinIO template store.
//!
//! Keys mirror the filesystem layout under a `templates/` prefix:
//! `templates/{id}/template_v{n}.pdf`, `templates/{id}/thumbnail.png` and
//! `templates/{id}/schemas/v{n}.json`.

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::info;

use super::{
    parse_version_file_name, template_file_name, validate_template_id, version_file_name,
    StorageError, TemplateStore,
};
use crate::config::S3Settings;
use crate::schema::FormSchema;

const KEY_PREFIX: &str = "templates";

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
pub async fn build_s3_client(settings: &S3Settings) -> S3Client {
    let credentials = Credentials::new(
        &settings.access_key_id,
        &settings.secret_access_key,
        None,
        None,
        "reforge-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&settings.endpoint)
        .load()
        .await;

    S3Client::new(&s3_config)
}

fn template_key(template_id: &str, version: u32) -> String {
    format!("{KEY_PREFIX}/{template_id}/{}", template_file_name(version))
}

fn thumbnail_key(template_id: &str) -> String {
    format!("{KEY_PREFIX}/{template_id}/thumbnail.png")
}

fn schema_prefix(template_id: &str) -> String {
    format!("{KEY_PREFIX}/{template_id}/schemas/")
}

fn schema_key(template_id: &str, version: u32) -> String {
    format!("{}{}", schema_prefix(template_id), version_file_name(version))
}

#[derive(Clone)]
pub struct S3TemplateStore {
    client: S3Client,
    bucket: String,
}

impl S3TemplateStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let e = e.into_service_error();
                if e.is_not_found() {
                    Ok(false)
                } else {
                    Err(StorageError::S3(format!("head {key} failed: {e}")))
                }
            }
        }
    }

    async fn get(&self, key: &str, missing: &str) -> Result<Bytes, StorageError> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let e = e.into_service_error();
                if e.is_no_such_key() {
                    StorageError::NotFound(missing.to_string())
                } else {
                    StorageError::S3(format!("get {key} failed: {e}"))
                }
            })?;
        let body = object
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(format!("reading {key} failed: {e}")))?;
        Ok(body.into_bytes())
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::S3(format!("upload {key} failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for S3TemplateStore {
    async fn save(&self, template_id: &str, schema: &FormSchema) -> Result<(), StorageError> {
        validate_template_id(template_id)?;
        let key = schema_key(template_id, schema.version);
        if self.exists(&key).await? {
            return Err(StorageError::VersionExists {
                template_id: template_id.to_string(),
                version: schema.version,
            });
        }
        let body = Bytes::from(serde_json::to_vec_pretty(schema)?);
        self.put(&key, body, "application/json").await?;
        info!(
            "Uploaded schema v{} for template '{template_id}' to s3://{}/{key}",
            schema.version, self.bucket
        );
        Ok(())
    }

    async fn load(&self, template_id: &str) -> Result<FormSchema, StorageError> {
        let version = self
            .latest_version(template_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(template_id.to_string()))?;
        let raw = self
            .get(&schema_key(template_id, version), template_id)
            .await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    async fn save_file(
        &self,
        template_id: &str,
        version: u32,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        validate_template_id(template_id)?;
        let key = template_key(template_id, version);
        self.put(&key, Bytes::copy_from_slice(bytes), "application/pdf").await?;
        Ok(format!("s3://{}/{key}", self.bucket))
    }

    async fn load_file(&self, template_id: &str, version: u32) -> Result<Vec<u8>, StorageError> {
        validate_template_id(template_id)?;
        let missing = format!("{template_id} v{version} file");
        let body = self
            .get(&template_key(template_id, version), &missing)
            .await?;
        Ok(body.to_vec())
    }

    async fn save_thumbnail(&self, template_id: &str, png: &[u8]) -> Result<String, StorageError> {
        validate_template_id(template_id)?;
        let key = thumbnail_key(template_id);
        self.put(&key, Bytes::copy_from_slice(png), "image/png").await?;
        Ok(format!("s3://{}/{key}", self.bucket))
    }

    async fn latest_version(&self, template_id: &str) -> Result<Option<u32>, StorageError> {
        validate_template_id(template_id)?;
        let prefix = schema_prefix(template_id);
        let mut latest = None;
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StorageError::S3(format!("list {prefix} failed: {e}")))?;

            for object in page.contents() {
                let version = object
                    .key()
                    .and_then(|key| key.strip_prefix(prefix.as_str()))
                    .and_then(parse_version_file_name);
                latest = latest.max(version);
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(latest)
    }
}
