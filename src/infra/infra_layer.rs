// The infra module contains implementations of core traits.
// Each external system gets its own submodule.

#[path = "graph/graph_workbook_client.rs"]
pub mod graph;

#[path = "identity/microsoft_identity_client.rs"]
pub mod identity;

#[path = "ocr/tesseract_ocr.rs"]
pub mod ocr;

#[path = "token_store/file_token_store.rs"]
pub mod token_store;
