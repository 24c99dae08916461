//! Template upload: extract, classify, build and persist the next schema
//! version, store the PDF under that version, then render a preview.
//!
//! The schema write claims the version. A failed or lost claim therefore
//! leaves the previous version and its PDF untouched.

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::extraction::TextSpan;
use crate::schema::FormSchema;
use crate::state::Services;
use crate::storage::validate_template_id;

/// Everything an upload produced.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub template_id: String,
    pub version: u32,
    pub location: String,
    pub schema: FormSchema,
    /// True when the template could not be read and the fallback schema
    /// was stored instead.
    pub degraded: bool,
    /// Structured failure body for a degraded ingest.
    pub failure: Option<Value>,
    /// Why remote classification was bypassed, if it was.
    pub classification_fallback: Option<String>,
    pub thumbnail: Option<String>,
}

pub async fn ingest_template(
    services: &Services,
    template_id: &str,
    template_name: &str,
    bytes: Vec<u8>,
) -> Result<IngestOutcome, AppError> {
    validate_template_id(template_id)?;

    let version = services
        .store
        .latest_version(template_id)
        .await?
        .map_or(1, |latest| latest + 1);

    let extractor = services.extractor.clone();
    let pdf = bytes.clone();
    let extracted = tokio::task::spawn_blocking(move || extractor.extract(&pdf))
        .await
        .context("span extraction task failed")?;

    let spans: Result<Vec<TextSpan>, AppError> = match extracted {
        Ok(spans) if spans.is_empty() => Err(AppError::UnprocessableEntity(
            "template contains no extractable text".to_string(),
        )),
        Ok(spans) => Ok(spans),
        Err(e) => Err(e.into()),
    };

    let (schema, failure, classification_fallback) = match spans {
        Ok(spans) => {
            info!(
                "Extracted {} spans from template '{template_id}'",
                spans.len()
            );
            let outcome = services.classifier.classify(&spans, template_name).await;
            let schema = services.schema_builder.build(
                template_id,
                version,
                outcome.areas,
                &outcome.strategy,
            );
            (schema, None, outcome.fallback_reason)
        }
        Err(e) => {
            warn!("Template '{template_id}' is unreadable, storing fallback schema: {e}");
            let mut schema = services.schema_builder.fallback(template_id);
            schema.version = version;
            (schema, Some(e.to_failure_json()), None)
        }
    };

    services.store.save(template_id, &schema).await?;
    let location = services
        .store
        .save_file(template_id, version, &bytes)
        .await?;
    let degraded = schema.metadata.degraded;
    let thumbnail = if degraded {
        None
    } else {
        render_thumbnail(services, template_id, &bytes).await
    };

    info!(
        "Ingested template '{template_id}' v{version}: {} sections, {} fields ({} strategy)",
        schema.metadata.total_sections, schema.metadata.total_fields, schema.metadata.strategy
    );

    Ok(IngestOutcome {
        template_id: template_id.to_string(),
        version,
        location,
        schema,
        degraded,
        failure,
        classification_fallback,
        thumbnail,
    })
}

/// Renders page one from a scratch copy and hands the PNG to the store.
/// Any failure just means no thumbnail.
async fn render_thumbnail(services: &Services, template_id: &str, pdf: &[u8]) -> Option<String> {
    let scratch = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => {
            warn!("No scratch directory for thumbnail: {e}");
            return None;
        }
    };
    let pdf_path = scratch.path().join("template.pdf");
    if let Err(e) = tokio::fs::write(&pdf_path, pdf).await {
        warn!("Could not stage template for thumbnail: {e}");
        return None;
    }

    let image = services.thumbnails.render_first_page(&pdf_path).await?;
    let png = match tokio::fs::read(&image).await {
        Ok(png) => png,
        Err(e) => {
            warn!("Could not read thumbnail {}: {e}", image.display());
            return None;
        }
    };
    match services.store.save_thumbnail(template_id, &png).await {
        Ok(location) => Some(location),
        Err(e) => {
            warn!("Could not store thumbnail for '{template_id}': {e}");
            None
        }
    }
}
