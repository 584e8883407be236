use serde::Serialize;

/// Label written when the QR prefix is not one of the known device codes.
pub const UNKNOWN_MODEL: &str = "알 수 없음";

/// Number of spreadsheet columns a record occupies (A..G).
pub const RECORD_COLUMNS: usize = 7;

/// QR prefix → breast-pump model rented out under that code.
const DEVICE_MODELS: [(&str, &str); 8] = [
    ("SM", "심포니"),
    ("LT", "락티나"),
    ("SW", "스윙"),
    ("MX", "스윙맥스"),
    ("FR", "프리스타일"),
    ("SP", "스펙트라"),
    ("GS", "각시밀"),
    ("CM", "시밀레"),
];

/// Resolves a two-character QR prefix to its model label.
pub fn device_model_for(prefix: &str) -> &'static str {
    DEVICE_MODELS
        .iter()
        .find(|(code, _)| *code == prefix)
        .map(|(_, model)| *model)
        .unwrap_or(UNKNOWN_MODEL)
}

/// One outgoing rental shipment, as read off the QR sticker and the courier label.
///
/// Every field is a plain string and defaults to empty when extraction finds
/// nothing, so a record is always complete enough to be written as a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentRecord {
    pub ship_date: String,
    pub renter_name: String,
    pub phone: String,
    pub address: String,
    pub device_id: String,
    pub device_model: String,
    pub invoice_number: String,
}

impl ShipmentRecord {
    /// Cells in sheet column order: date, renter, phone, address, device id,
    /// device model, invoice number.
    pub fn to_row(&self) -> Vec<String> {
        let cells: [String; RECORD_COLUMNS] = [
            self.ship_date.clone(),
            self.renter_name.clone(),
            self.phone.clone(),
            self.address.clone(),
            self.device_id.clone(),
            self.device_model.clone(),
            self.invoice_number.clone(),
        ];
        Vec::from(cells)
    }
}
