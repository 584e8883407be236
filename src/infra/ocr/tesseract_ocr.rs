use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::OcrConfig;
use crate::core::shipment::{OcrEngine, OcrError};

/// Runs the `tesseract` CLI on label photos and reads the text from stdout.
pub struct TesseractOcr {
    binary: PathBuf,
    languages: String,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            languages: config.languages.clone(),
        }
    }

    /// Returns the installed version line, or an error if the binary cannot run.
    pub async fn version(&self) -> Result<String, OcrError> {
        let output = Command::new(&self.binary).arg("--version").output().await?;
        if !output.status.success() {
            return Err(OcrError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        // Older releases print the version banner on stderr.
        let banner = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };
        Ok(String::from_utf8_lossy(&banner)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string())
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image: &Path) -> Result<String, OcrError> {
        tracing::debug!(image = %image.display(), languages = %self.languages, "Running tesseract");

        let output = Command::new(&self.binary)
            .arg(image)
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(OcrError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
