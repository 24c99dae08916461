mod classification;
mod config;
mod errors;
mod extraction;
mod layout;
mod llm_client;
mod reconstruct;
mod schema;
mod state;
mod storage;
mod style;
mod templates;

use std::path::Path;

use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::errors::AppError;
use crate::state::Services;
use crate::templates::{generate_document, ingest_template};

fn cli() -> Command {
    Command::new("reforge")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Turns PDF resume templates into reusable schemas and regenerates them with new data")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("ingest")
                .about("Store a template PDF and derive its form schema")
                .arg(Arg::new("pdf").help("Path to the template PDF").required(true).index(1))
                .arg(
                    Arg::new("name")
                        .long("name")
                        .short('n')
                        .help("Display name passed to the classifier (default: file stem)"),
                )
                .arg(
                    Arg::new("template-id")
                        .long("template-id")
                        .short('t')
                        .help("Template id (default: derived from the file name)"),
                ),
        )
        .subcommand(
            Command::new("generate")
                .about("Fill a stored template with user data")
                .arg(Arg::new("template-id").help("Stored template id").required(true).index(1))
                .arg(Arg::new("data").help("Path to the user data JSON").required(true).index(2))
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .help("Where to write the generated PDF")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("Print extracted spans and their classification without storing anything")
                .arg(Arg::new("pdf").help("Path to a PDF").required(true).index(1)),
        )
        .subcommand(
            Command::new("schema")
                .about("Print the latest stored schema of a template")
                .arg(Arg::new("template-id").help("Stored template id").required(true).index(1)),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    // Load configuration first (fails on an incomplete S3 group or bad numbers)
    let config = Config::from_env()?;

    // Initialize structured logging; stdout carries command output
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting reforge v{}", env!("CARGO_PKG_VERSION"));

    let outcome = match Services::from_config(&config).await {
        Ok(services) => run(&services, &matches).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", serde_json::to_string_pretty(&e.to_failure_json())?);
            std::process::exit(1);
        }
    }
}

async fn run(services: &Services, matches: &ArgMatches) -> Result<Value, AppError> {
    match matches.subcommand() {
        Some(("ingest", args)) => {
            let pdf = required(args, "pdf")?;
            let path = Path::new(pdf);
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("template");
            let template_id = args
                .get_one::<String>("template-id")
                .cloned()
                .unwrap_or_else(|| derive_template_id(stem));
            let name = args
                .get_one::<String>("name")
                .map(String::as_str)
                .unwrap_or(stem);

            let bytes = read_input(path).await?;
            to_json(&ingest_template(services, &template_id, name, bytes).await?)
        }
        Some(("generate", args)) => {
            let template_id = required(args, "template-id")?;
            let data_path = Path::new(required(args, "data")?);
            let output = required(args, "output")?;

            let data: Value = serde_json::from_slice(&read_input(data_path).await?).map_err(|e| {
                AppError::Validation(format!("{} is not valid JSON: {e}", data_path.display()))
            })?;
            let outcome = generate_document(services, template_id, data).await?;
            tokio::fs::write(output, &outcome.result.document)
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!("writing {output} failed: {e}")))?;
            info!("Wrote {} bytes to {output}", outcome.result.document.len());
            to_json(&outcome)
        }
        Some(("inspect", args)) => {
            let path = Path::new(required(args, "pdf")?);
            let bytes = read_input(path).await?;
            let extractor = services.extractor.clone();
            let spans = tokio::task::spawn_blocking(move || extractor.extract(&bytes))
                .await
                .map_err(|e| AppError::Internal(e.into()))??;
            let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("template");
            let classification = services.classifier.classify(&spans, name).await;
            Ok(json!({
                "spans": spans,
                "classification": classification,
            }))
        }
        Some(("schema", args)) => {
            let template_id = required(args, "template-id")?;
            to_json(&services.store.load(template_id).await?)
        }
        _ => Err(AppError::Validation("unknown command".to_string())),
    }
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str, AppError> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| AppError::Validation(format!("missing argument <{name}>")))
}

async fn read_input(path: &Path) -> Result<Vec<u8>, AppError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| AppError::Validation(format!("cannot read {}: {e}", path.display())))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(e.into()))
}

/// Lowercase file stem with anything outside `[a-z0-9_-]` turned into `-`,
/// capped at 64 chars; a random id when nothing usable is left.
fn derive_template_id(stem: &str) -> String {
    let id: String = stem
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .take(64)
        .collect();
    let id = id.trim_matches('-').to_string();
    if id.is_empty() {
        uuid::Uuid::new_v4().simple().to_string()
    } else {
        id
    }
}
