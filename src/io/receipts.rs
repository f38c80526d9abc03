//! Session receipt egress - writes completed sessions to file
//!
//! Receipts are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::domain::session::SessionRecord;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Egress writer for session receipts
pub struct ReceiptWriter {
    file_path: String,
}

impl ReceiptWriter {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "receipts_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write a session receipt to the file.
    /// Returns true if successful, false otherwise
    pub fn write_record(&self, record: &SessionRecord) -> bool {
        let json = record.to_json();

        match self.append_line(&json) {
            Ok(()) => {
                info!(
                    sid = %record.sid,
                    outcome = %record.outcome.as_str(),
                    collected = %record.collected.len(),
                    dispensed = %record.dispensed,
                    "receipt_written"
                );
                true
            }
            Err(e) => {
                error!(
                    sid = %record.sid,
                    error = %e,
                    "receipt_write_failed"
                );
                false
            }
        }
    }

    /// Append a line to the receipt file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "receipt_appended");

        Ok(())
    }
}
