// Process configuration, read once at startup from the environment (and `.env`).
// Every component receives the slice it needs at construction.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::spreadsheet::AppendStrategy;

const DEFAULT_SCOPES: &str = "offline_access Files.ReadWrite.All Sites.ReadWrite.All User.Read";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing {0} environment variable")]
    Missing(&'static str),
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// OAuth application registration at the identity provider.
#[derive(Clone)]
pub struct IdentityConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: String,
}

/// Which workbook, sheet and table rows go to.
#[derive(Debug, Clone)]
pub struct WorkbookConfig {
    pub file_name: String,
    pub worksheet: String,
    pub table_name: String,
}

#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub binary: PathBuf,
    pub languages: String,
}

#[derive(Clone)]
pub struct AppConfig {
    pub identity: IdentityConfig,
    pub workbook: WorkbookConfig,
    pub strategy: AppendStrategy,
    pub ocr: OcrConfig,
    pub token_cache_path: PathBuf,
    pub upload_dir: PathBuf,
    pub bind_addr: String,
    pub http_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let or_default = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let identity = IdentityConfig {
            tenant_id: required("TENANT_ID")?,
            client_id: required("CLIENT_ID")?,
            client_secret: required("CLIENT_SECRET")?,
            redirect_uri: required("REDIRECT_URI")?,
            scopes: or_default("SCOPES", DEFAULT_SCOPES),
        };

        let workbook = WorkbookConfig {
            file_name: or_default("FILE_NAME", "유축기출고.xlsx"),
            worksheet: or_default("WORKSHEET_NAME", "유축기출고"),
            table_name: or_default("TABLE_NAME", "출고내역"),
        };

        let strategy = match or_default("APPEND_STRATEGY", "range").to_lowercase().as_str() {
            "range" => AppendStrategy::DirectRange,
            "table" => AppendStrategy::TableRow {
                table: workbook.table_name.clone(),
            },
            _ => {
                return Err(ConfigError::Invalid {
                    var: "APPEND_STRATEGY",
                    value: or_default("APPEND_STRATEGY", ""),
                })
            }
        };

        let timeout_raw = or_default("HTTP_TIMEOUT_SECS", "20");
        let http_timeout = timeout_raw
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or(ConfigError::Invalid {
                var: "HTTP_TIMEOUT_SECS",
                value: timeout_raw,
            })?;

        Ok(Self {
            identity,
            workbook,
            strategy,
            ocr: OcrConfig {
                binary: PathBuf::from(or_default("TESSERACT_BIN", "tesseract")),
                languages: or_default("OCR_LANGUAGES", "kor+eng"),
            },
            token_cache_path: PathBuf::from(or_default(
                "TOKEN_CACHE_PATH",
                "data/token_cache.json",
            )),
            upload_dir: get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            bind_addr: or_default("BIND_ADDR", "0.0.0.0:8000"),
            http_timeout,
        })
    }
}
