pub mod database;
pub mod error;
pub mod scans;
pub mod schema;

pub use database::Database;
pub use error::StoreError;
pub use scans::{NewScan, ScanQuery, ScanRepo, ScanRow, ScanUpdate};
