//! Document generation from a stored template and user data.

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::reconstruct::ReconstructionResult;
use crate::state::Services;
use crate::storage::validate_template_id;

#[derive(Debug, Clone, Serialize)]
pub struct GenerateOutcome {
    pub template_id: String,
    pub schema_version: u32,
    #[serde(flatten)]
    pub result: ReconstructionResult,
}

pub async fn generate_document(
    services: &Services,
    template_id: &str,
    data: Value,
) -> Result<GenerateOutcome, AppError> {
    validate_template_id(template_id)?;
    if !data.is_object() {
        return Err(AppError::Validation(
            "user data must be a JSON object".to_string(),
        ));
    }

    let schema = services.store.load(template_id).await?;
    if schema.metadata.degraded {
        warn!("Template '{template_id}' has a degraded schema; output may be sparse");
    }
    let template = services
        .store
        .load_file(template_id, schema.version)
        .await?;

    let reconstructor = services.reconstructor.clone();
    let schema_version = schema.version;
    let result = tokio::task::spawn_blocking(move || {
        reconstructor.reconstruct(&template, &schema, &data)
    })
    .await
    .context("reconstruction task failed")??;

    info!(
        "Generated document from '{template_id}' v{schema_version}: {} fields written, {} skipped, {} errors",
        result.fields_written,
        result.fields_skipped.len(),
        result.field_errors.len()
    );
    if result.has_overflow() {
        warn!(
            "Overflow in sections: {:?}",
            result.overflow.iter().map(|o| &o.section).collect::<Vec<_>>()
        );
    }

    Ok(GenerateOutcome {
        template_id: template_id.to_string(),
        schema_version,
        result,
    })
}
