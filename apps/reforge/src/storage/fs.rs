//! Local-disk template store.
//!
//! ```text
//! {root}/{template_id}/template_v{n}.pdf
//! {root}/{template_id}/thumbnail.png
//! {root}/{template_id}/schemas/v{n}.json
//! ```

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{
    parse_version_file_name, template_file_name, validate_template_id, version_file_name,
    StorageError, TemplateStore,
};
use crate::schema::FormSchema;

const THUMBNAIL_FILE: &str = "thumbnail.png";
const SCHEMA_DIR: &str = "schemas";

#[derive(Debug, Clone)]
pub struct FsTemplateStore {
    root: PathBuf,
}

impl FsTemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn template_dir(&self, template_id: &str) -> Result<PathBuf, StorageError> {
        validate_template_id(template_id)?;
        Ok(self.root.join(template_id))
    }

    /// Where the PDF behind schema `version` of `template_id` lives on disk.
    pub fn template_path(&self, template_id: &str, version: u32) -> Result<PathBuf, StorageError> {
        Ok(self
            .template_dir(template_id)?
            .join(template_file_name(version)))
    }

    /// Loads one specific schema version.
    pub async fn load_version(
        &self,
        template_id: &str,
        version: u32,
    ) -> Result<FormSchema, StorageError> {
        let path = self
            .template_dir(template_id)?
            .join(SCHEMA_DIR)
            .join(version_file_name(version));
        let raw = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(format!("{template_id} v{version}")),
            _ => StorageError::Io(e),
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

#[async_trait]
impl TemplateStore for FsTemplateStore {
    async fn save(&self, template_id: &str, schema: &FormSchema) -> Result<(), StorageError> {
        let dir = self.template_dir(template_id)?.join(SCHEMA_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(version_file_name(schema.version));
        let body = serde_json::to_vec_pretty(schema)?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StorageError::VersionExists {
                    template_id: template_id.to_string(),
                    version: schema.version,
                },
                _ => StorageError::Io(e),
            })?;
        file.write_all(&body).await?;
        file.flush().await?;

        info!(
            "Saved schema v{} for template '{template_id}' to {}",
            schema.version,
            path.display()
        );
        Ok(())
    }

    async fn load(&self, template_id: &str) -> Result<FormSchema, StorageError> {
        let version = self
            .latest_version(template_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(template_id.to_string()))?;
        self.load_version(template_id, version).await
    }

    async fn save_file(
        &self,
        template_id: &str,
        version: u32,
        bytes: &[u8],
    ) -> Result<String, StorageError> {
        let dir = self.template_dir(template_id)?;
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(template_file_name(version));
        tokio::fs::write(&path, bytes).await?;
        debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(path.display().to_string())
    }

    async fn load_file(&self, template_id: &str, version: u32) -> Result<Vec<u8>, StorageError> {
        let path = self.template_path(template_id, version)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound(format!("{template_id} v{version} file")),
            _ => StorageError::Io(e),
        })
    }

    async fn save_thumbnail(&self, template_id: &str, png: &[u8]) -> Result<String, StorageError> {
        let dir = self.template_dir(template_id)?;
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(THUMBNAIL_FILE);
        tokio::fs::write(&path, png).await?;
        Ok(path.display().to_string())
    }

    async fn latest_version(&self, template_id: &str) -> Result<Option<u32>, StorageError> {
        let dir = self.template_dir(template_id)?.join(SCHEMA_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut latest = None;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(version) = entry.file_name().to_str().and_then(parse_version_file_name) {
                latest = latest.max(Some(version));
            }
        }
        Ok(latest)
    }
}
