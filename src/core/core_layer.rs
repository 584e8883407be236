// The core module contains the business logic: extracting shipment records,
// keeping a bearer token available, and appending rows to the workbook.
// Nothing here knows about HTTP routing, reqwest or the filesystem.

#[path = "auth/auth_service.rs"]
pub mod auth;

#[path = "shipment/mod.rs"]
pub mod shipment;

#[path = "spreadsheet/spreadsheet_service.rs"]
pub mod spreadsheet;
