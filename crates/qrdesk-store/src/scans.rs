use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use qrdesk_core::ids::ScanId;

use crate::database::Database;
use crate::error::StoreError;

const COLUMNS: &str = "id, qr_data, scan_type, file_path, scanned_at, printed, printed_at, printer_id";

/// A stored scan record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRow {
    pub id: ScanId,
    pub qr_data: String,
    pub scan_type: String,
    pub file_path: Option<String>,
    pub scanned_at: String,
    pub printed: bool,
    pub printed_at: Option<String>,
    pub printer_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NewScan {
    pub qr_data: String,
    pub scan_type: String,
    pub printer_id: Option<String>,
}

impl NewScan {
    pub fn new(qr_data: impl Into<String>, scan_type: impl Into<String>) -> Self {
        Self {
            qr_data: qr_data.into(),
            scan_type: scan_type.into(),
            printer_id: None,
        }
    }

    pub fn with_printer_id(mut self, printer_id: Option<String>) -> Self {
        self.printer_id = printer_id;
        self
    }
}

/// Pagination and time window for [`ScanRepo::list`]. Both bounds are inclusive.
#[derive(Clone, Debug)]
pub struct ScanQuery {
    pub skip: u32,
    pub limit: u32,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Default for ScanQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 100,
            start: None,
            end: None,
        }
    }
}

/// Partial update. `None` leaves a column untouched.
#[derive(Clone, Debug, Default)]
pub struct ScanUpdate {
    pub printed: Option<bool>,
    pub printer_id: Option<String>,
}

pub struct ScanRepo {
    db: Database,
}

impl ScanRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, scan), fields(scan_type = %scan.scan_type))]
    pub fn create(&self, scan: NewScan) -> Result<ScanRow, StoreError> {
        let row = ScanRow {
            id: ScanId::new(),
            qr_data: scan.qr_data,
            scan_type: scan.scan_type,
            file_path: None,
            scanned_at: timestamp(Utc::now()),
            printed: false,
            printed_at: None,
            printer_id: scan.printer_id,
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO scans (id, qr_data, scan_type, scanned_at, printed, printer_id)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![
                    row.id.as_str(),
                    row.qr_data,
                    row.scan_type,
                    row.scanned_at,
                    row.printer_id
                ],
            )?;
            Ok(())
        })?;

        tracing::debug!(scan_id = %row.id, "scan stored");
        Ok(row)
    }

    #[instrument(skip(self), fields(scan_id = %id))]
    pub fn get(&self, id: &ScanId) -> Result<ScanRow, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM scans WHERE id = ?1"),
                [id.as_str()],
                map_row,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("scan {id}")))
        })
    }

    /// Newest first.
    #[instrument(skip(self))]
    pub fn list(&self, query: &ScanQuery) -> Result<Vec<ScanRow>, StoreError> {
        let start = query.start.map(timestamp);
        let end = query.end.map(timestamp);

        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM scans
                 WHERE (?1 IS NULL OR scanned_at >= ?1)
                   AND (?2 IS NULL OR scanned_at <= ?2)
                 ORDER BY scanned_at DESC, id DESC
                 LIMIT ?3 OFFSET ?4"
            ))?;
            let rows = stmt
                .query_map(params![start, end, query.limit, query.skip], map_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    #[instrument(skip(self), fields(scan_id = %id))]
    pub fn set_file_path(&self, id: &ScanId, file_path: &str) -> Result<ScanRow, StoreError> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE scans SET file_path = ?1 WHERE id = ?2",
                params![file_path, id.as_str()],
            )?)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("scan {id}")));
        }
        self.get(id)
    }

    /// Apply a partial update. Setting `printed` to true stamps `printed_at`;
    /// setting it to false clears it.
    #[instrument(skip(self, update), fields(scan_id = %id))]
    pub fn update(&self, id: &ScanId, update: &ScanUpdate) -> Result<ScanRow, StoreError> {
        let printed_at = update
            .printed
            .map(|printed| printed.then(|| timestamp(Utc::now())));

        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE scans SET
                    printed = COALESCE(?1, printed),
                    printed_at = CASE WHEN ?1 IS NULL THEN printed_at ELSE ?2 END,
                    printer_id = COALESCE(?3, printer_id)
                 WHERE id = ?4",
                params![
                    update.printed,
                    printed_at.flatten(),
                    update.printer_id,
                    id.as_str()
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("scan {id}")));
        }
        self.get(id)
    }

    pub fn mark_printed(&self, id: &ScanId) -> Result<ScanRow, StoreError> {
        self.update(
            id,
            &ScanUpdate {
                printed: Some(true),
                printer_id: None,
            },
        )
    }

    /// Delete a scan, returning the removed record.
    #[instrument(skip(self), fields(scan_id = %id))]
    pub fn delete(&self, id: &ScanId) -> Result<ScanRow, StoreError> {
        let row = self.get(id)?;
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM scans WHERE id = ?1", [id.as_str()])?;
            Ok(())
        })?;
        Ok(row)
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<ScanRow> {
    Ok(ScanRow {
        id: ScanId::from_raw(row.get::<_, String>(0)?),
        qr_data: row.get(1)?,
        scan_type: row.get(2)?,
        file_path: row.get(3)?,
        scanned_at: row.get(4)?,
        printed: row.get(5)?,
        printed_at: row.get(6)?,
        printer_id: row.get(7)?,
    })
}

// Fixed width and always UTC, so stored values sort lexicographically.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}
