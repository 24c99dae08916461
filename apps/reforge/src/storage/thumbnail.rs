//! First-page preview images. Best-effort: a missing binary or a failed
//! render is logged and answered with `None`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

#[async_trait]
pub trait ThumbnailRenderer: Send + Sync {
    /// Renders page one of `pdf_path` into the same directory and returns
    /// the image path.
    async fn render_first_page(&self, pdf_path: &Path) -> Option<PathBuf>;
}

/// Used when thumbnails are switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoThumbnails;

#[async_trait]
impl ThumbnailRenderer for NoThumbnails {
    async fn render_first_page(&self, _pdf_path: &Path) -> Option<PathBuf> {
        None
    }
}

/// Shells out to poppler's `pdftoppm`.
#[derive(Debug, Clone)]
pub struct PdftoppmThumbnailer {
    binary: PathBuf,
    /// Longest side of the image, in pixels.
    scale_to: u32,
}

impl PdftoppmThumbnailer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            scale_to: 400,
        }
    }

    /// `pdftoppm` appends `.png` to the prefix it is given.
    fn output_prefix(pdf_path: &Path) -> PathBuf {
        pdf_path.with_file_name("thumbnail")
    }
}

#[async_trait]
impl ThumbnailRenderer for PdftoppmThumbnailer {
    async fn render_first_page(&self, pdf_path: &Path) -> Option<PathBuf> {
        let prefix = Self::output_prefix(pdf_path);
        let output = Command::new(&self.binary)
            .args(["-png", "-f", "1", "-l", "1", "-singlefile", "-scale-to"])
            .arg(self.scale_to.to_string())
            .arg(pdf_path)
            .arg(&prefix)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let image = prefix.with_extension("png");
                if tokio::fs::try_exists(&image).await.unwrap_or(false) {
                    debug!("Thumbnail written to {}", image.display());
                    Some(image)
                } else {
                    warn!("pdftoppm reported success but {} is missing", image.display());
                    None
                }
            }
            Ok(output) => {
                warn!(
                    "Thumbnail render failed for {}: {}",
                    pdf_path.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                None
            }
            Err(e) => {
                warn!("Could not run {}: {e}", self.binary.display());
                None
            }
        }
    }
}
