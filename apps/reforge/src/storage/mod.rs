//! Template persistence.
//!
//! Every template has a series of schema versions, each paired with the PDF
//! it was built from. `load` always answers with the latest version; saving a
//! schema version that already exists is an error, never an overwrite. The
//! schema write claims a version, so a PDF is only stored once its schema
//! is.

pub mod fs;
pub mod s3;
pub mod thumbnail;

use async_trait::async_trait;
use thiserror::Error;

use crate::schema::FormSchema;

pub use fs::FsTemplateStore;
pub use s3::S3TemplateStore;
pub use thumbnail::{NoThumbnails, PdftoppmThumbnailer, ThumbnailRenderer};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("template '{0}' not found")]
    NotFound(String),

    #[error("schema version {version} of '{template_id}' already exists")]
    VersionExists { template_id: String, version: u32 },

    #[error("invalid template id '{0}'")]
    InvalidId(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema (de)serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("S3 error: {0}")]
    S3(String),
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Persists `schema` under its own `version`.
    async fn save(&self, template_id: &str, schema: &FormSchema) -> Result<(), StorageError>;

    /// Latest schema version of `template_id`.
    async fn load(&self, template_id: &str) -> Result<FormSchema, StorageError>;

    /// Stores the template PDF that schema `version` was built from and
    /// returns where it landed.
    async fn save_file(
        &self,
        template_id: &str,
        version: u32,
        bytes: &[u8],
    ) -> Result<String, StorageError>;

    async fn load_file(&self, template_id: &str, version: u32) -> Result<Vec<u8>, StorageError>;

    /// Stores a PNG preview of the template's first page.
    async fn save_thumbnail(&self, template_id: &str, png: &[u8]) -> Result<String, StorageError>;

    /// Highest stored schema version, `None` for an unknown template.
    async fn latest_version(&self, template_id: &str) -> Result<Option<u32>, StorageError>;
}

/// Template ids become path segments and object keys, so only
/// `[A-Za-z0-9_-]` is accepted.
pub fn validate_template_id(template_id: &str) -> Result<(), StorageError> {
    let valid = !template_id.is_empty()
        && template_id.len() <= 128
        && template_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidId(template_id.to_string()))
    }
}

/// File name of a stored schema version.
pub(crate) fn version_file_name(version: u32) -> String {
    format!("v{version}.json")
}

/// File name of the template PDF paired with a schema version.
pub(crate) fn template_file_name(version: u32) -> String {
    format!("template_v{version}.pdf")
}

/// Inverse of `version_file_name`. Anything else in a schema directory is
/// ignored.
pub(crate) fn parse_version_file_name(name: &str) -> Option<u32> {
    name.strip_prefix('v')?.strip_suffix(".json")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_id_validation() {
        assert!(validate_template_id("cv-2024_a").is_ok());
        assert!(validate_template_id("").is_err());
        assert!(validate_template_id("../etc").is_err());
        assert!(validate_template_id("a/b").is_err());
    }

    #[test]
    fn test_version_file_names() {
        assert_eq!(version_file_name(3), "v3.json");
        assert_eq!(template_file_name(3), "template_v3.pdf");
        assert_eq!(parse_version_file_name("v12.json"), Some(12));
        assert_eq!(parse_version_file_name("v12.json.tmp"), None);
        assert_eq!(parse_version_file_name("latest.json"), None);
    }
}
