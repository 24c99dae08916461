use std::sync::Arc;

use tracing::info;

use crate::classification::remote::RemoteClassifier;
use crate::classification::{ClassificationStrategy, ClassifierChain, RuleClassifier};
use crate::config::Config;
use crate::errors::AppError;
use crate::extraction::SpanExtractor;
use crate::llm_client::LlmClient;
use crate::reconstruct::pipeline::DocumentReconstructor;
use crate::reconstruct::LayoutConfig;
use crate::schema::builder::SchemaBuilder;
use crate::storage::s3::build_s3_client;
use crate::storage::{
    FsTemplateStore, NoThumbnails, PdftoppmThumbnailer, S3TemplateStore, TemplateStore,
    ThumbnailRenderer,
};
use crate::style::StyleResolver;

/// Long-lived pipeline components shared by every ingest and generate call.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn TemplateStore>,
    pub extractor: SpanExtractor,
    pub classifier: ClassifierChain,
    pub schema_builder: SchemaBuilder,
    pub reconstructor: Arc<DocumentReconstructor>,
    pub thumbnails: Arc<dyn ThumbnailRenderer>,
}

impl Services {
    pub async fn from_config(config: &Config) -> Result<Self, AppError> {
        let store: Arc<dyn TemplateStore> = match &config.s3 {
            Some(s3) => {
                let client = build_s3_client(s3).await;
                info!("Template store: s3://{}", s3.bucket);
                Arc::new(S3TemplateStore::new(client, s3.bucket.clone()))
            }
            None => {
                info!("Template store: {}", config.storage_dir.display());
                Arc::new(FsTemplateStore::new(config.storage_dir.clone()))
            }
        };

        let remote: Option<Arc<dyn ClassificationStrategy>> = match &config.anthropic_api_key {
            Some(key) => {
                let mut llm = LlmClient::new(
                    key.clone(),
                    config.llm_model.clone(),
                    config.classify_timeout,
                )?;
                if let Some(endpoint) = &config.anthropic_base_url {
                    llm = llm.with_endpoint(endpoint.clone());
                }
                info!("LLM client initialized (model: {})", llm.model());
                Some(Arc::new(RemoteClassifier::new(
                    llm,
                    config.classify_max_spans,
                )))
            }
            None => {
                info!("ANTHROPIC_API_KEY not set, classifying with rules only");
                None
            }
        };
        let classifier =
            ClassifierChain::new(remote, RuleClassifier::default(), config.classify_timeout);

        let layout = match &config.layout_config_path {
            Some(path) => {
                info!("Layout config loaded from {}", path.display());
                LayoutConfig::from_json_file(path)?
            }
            None => LayoutConfig::default(),
        };

        let thumbnails: Arc<dyn ThumbnailRenderer> = if config.thumbnails_enabled {
            Arc::new(PdftoppmThumbnailer::new(config.pdftoppm_path.clone()))
        } else {
            Arc::new(NoThumbnails)
        };

        Ok(Self {
            store,
            extractor: SpanExtractor::new(),
            classifier,
            schema_builder: SchemaBuilder::new(),
            reconstructor: Arc::new(DocumentReconstructor::new(layout, StyleResolver::new())),
            thumbnails,
        })
    }

    /// Filesystem-backed services with rule classification and no
    /// thumbnails.
    pub fn local(store: Arc<dyn TemplateStore>) -> Self {
        Self {
            store,
            extractor: SpanExtractor::new(),
            classifier: ClassifierChain::rules_only(RuleClassifier::default()),
            schema_builder: SchemaBuilder::new(),
            reconstructor: Arc::new(DocumentReconstructor::new(
                LayoutConfig::default(),
                StyleResolver::new(),
            )),
            thumbnails: Arc::new(NoThumbnails),
        }
    }
}
