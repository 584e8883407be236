pub mod extractor;
pub mod shipment_models;

pub use extractor::{OcrEngine, OcrError, RecordExtractor};
pub use shipment_models::ShipmentRecord;
