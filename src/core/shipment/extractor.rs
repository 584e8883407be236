use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::shipment_models::{device_model_for, ShipmentRecord, UNKNOWN_MODEL};

/// Korean mobile number: carrier prefix, 3-4 digit middle block, 4 digit tail.
/// Separators are spaces or dashes; a doubled dash left over from label
/// cleanup is tolerated.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(01[016789])[-\s]{0,2}([0-9]{3,4})[-\s]{0,2}([0-9]{4})")
        .expect("phone pattern is valid")
});

/// Courier invoice: twelve digits in 4-4-4 groups, dashes optional.
static INVOICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[0-9]{4}-?[0-9]{4}-?[0-9]{4}\b").expect("invoice pattern is valid")
});

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Failed to start OCR engine: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("OCR engine exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

/// Anything that can turn a label photo into raw text.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: &Path) -> Result<String, OcrError>;
}

/// Fields carried by the QR sticker on the device box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrFields {
    pub device_id: String,
    pub device_model: String,
}

/// Fields read off the courier label text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFields {
    pub renter_name: String,
    pub phone: String,
    pub address: String,
    pub invoice_number: String,
}

/// Splits a QR payload into model prefix and device id.
///
/// The first two characters select the model; the rest is the device id.
/// Payloads shorter than two characters yield an empty id and the unknown model.
pub fn parse_qr(qr_text: &str) -> QrFields {
    let mut chars = qr_text.chars();
    let prefix: String = chars.by_ref().take(2).collect();

    if prefix.chars().count() < 2 {
        return QrFields {
            device_id: String::new(),
            device_model: UNKNOWN_MODEL.to_string(),
        };
    }

    QrFields {
        device_id: chars.collect(),
        device_model: device_model_for(&prefix).to_string(),
    }
}

/// Strips separators and re-inserts one dash after the carrier prefix.
fn normalize_phone(caps: &regex::Captures<'_>) -> String {
    format!("{}-{}{}", &caps[1], &caps[2], &caps[3])
}

/// Scans OCR lines once for the first phone number and the first invoice number.
///
/// The lines directly above and below the phone number are taken as the renter
/// name and address. The two scans are independent and may hit different lines.
pub fn scan_lines(text: &str) -> LabelFields {
    let lines: Vec<&str> = text.lines().collect();
    let mut fields = LabelFields::default();
    let mut phone_found = false;
    let mut invoice_found = false;

    for (i, line) in lines.iter().enumerate() {
        if !phone_found {
            if let Some(caps) = PHONE_RE.captures(line) {
                phone_found = true;
                fields.phone = normalize_phone(&caps);
                if i > 0 {
                    fields.renter_name = lines[i - 1].trim().to_string();
                }
                if let Some(next) = lines.get(i + 1) {
                    fields.address = next.trim().to_string();
                }
            }
        }

        if !invoice_found {
            if let Some(m) = INVOICE_RE.find(line) {
                invoice_found = true;
                fields.invoice_number = m.as_str().replace('-', "");
            }
        }

        if phone_found && invoice_found {
            break;
        }
    }

    fields
}

pub fn assemble(qr: QrFields, label: LabelFields, ship_date: NaiveDate) -> ShipmentRecord {
    ShipmentRecord {
        ship_date: ship_date.format("%Y-%m-%d").to_string(),
        renter_name: label.renter_name,
        phone: label.phone,
        address: label.address,
        device_id: qr.device_id,
        device_model: qr.device_model,
        invoice_number: label.invoice_number,
    }
}

/// Builds shipment records from a QR payload and a photographed courier label.
pub struct RecordExtractor {
    ocr: Arc<dyn OcrEngine>,
}

impl RecordExtractor {
    pub fn new(ocr: Arc<dyn OcrEngine>) -> Self {
        Self { ocr }
    }

    /// Extracts a record dated today (local time).
    pub async fn extract(&self, qr_text: &str, image: &Path) -> ShipmentRecord {
        self.extract_on(qr_text, image, Local::now().date_naive())
            .await
    }

    /// Extracts a record with an explicit ship date.
    ///
    /// OCR failures are logged and treated as an empty label, so this never fails.
    pub async fn extract_on(
        &self,
        qr_text: &str,
        image: &Path,
        ship_date: NaiveDate,
    ) -> ShipmentRecord {
        let qr = parse_qr(qr_text);

        let text = match self.ocr.recognize(image).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(image = %image.display(), "OCR failed, label fields left empty: {}", e);
                String::new()
            }
        };

        let label = scan_lines(&text);
        if label.phone.is_empty() && label.invoice_number.is_empty() {
            tracing::warn!(image = %image.display(), "No phone or invoice number found on label");
        }

        assemble(qr, label, ship_date)
    }
}
