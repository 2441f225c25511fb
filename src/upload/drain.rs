//! # Upload Drain
//!
//! Pushes stored rows to the endpoint, oldest file first, and deletes each
//! file once every row in it has been accepted.
//!
//! The first failed upload aborts the whole pass. The file being drained
//! and every later file stay on the medium, so the next pass starts over
//! from the oldest pending file. Rows accepted before the failure are sent
//! again on that pass; the endpoint must tolerate duplicates.

use std::vec;
use tracing::{debug, info, warn};

use super::RowUploader;
use crate::error::{PayloadDefect, Result};
use crate::storage::{DateKey, DurableLog};

/// Classify a stored line before upload.
///
/// Blank lines and lines containing letters (header lines) are never sent.
/// Valid rows come back with the line terminator stripped; empty trailing
/// fields are kept.
///
/// # Examples
///
/// ```
/// use field_telemetry_node::upload::drain::check_row;
/// use field_telemetry_node::error::PayloadDefect;
///
/// assert!(check_row("2025-03-09,07:05:03,27.3").is_ok());
/// assert_eq!(check_row("date,time,Temp10"), Err(PayloadDefect::HeaderLike));
/// assert_eq!(check_row("  "), Err(PayloadDefect::Empty));
/// ```
pub fn check_row(row: &str) -> std::result::Result<&str, PayloadDefect> {
    let row = row.trim_end_matches(['\r', '\n']);
    if row.trim().is_empty() {
        Err(PayloadDefect::Empty)
    } else if row.chars().any(|c| c.is_alphabetic()) {
        Err(PayloadDefect::HeaderLike)
    } else {
        Ok(row)
    }
}

/// One step of a drain pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainItem {
    /// A row to upload; `line` is 1-based within the file
    Row { key: DateKey, line: usize, row: String },
    /// A line that is never uploaded
    Skipped { key: DateKey, line: usize, defect: PayloadDefect },
    /// Every line of the file has been yielded
    EndOfFile(DateKey),
}

/// Lazy walk over the lines of pending files, in file order.
///
/// Each file is read only when the walk reaches it. Dropping the iterator
/// cancels the walk; nothing on the medium changes.
pub struct PendingRows<'a> {
    log: &'a DurableLog,
    files: vec::IntoIter<DateKey>,
    current: Option<(DateKey, std::iter::Enumerate<vec::IntoIter<String>>)>,
}

impl<'a> PendingRows<'a> {
    pub fn new(log: &'a DurableLog, files: Vec<DateKey>) -> Self {
        Self {
            log,
            files: files.into_iter(),
            current: None,
        }
    }
}

impl Iterator for PendingRows<'_> {
    type Item = Result<DrainItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() {
            let key = self.files.next()?;
            match self.log.read_rows(key) {
                Ok(rows) => self.current = Some((key, rows.into_iter().enumerate())),
                Err(e) => return Some(Err(e)),
            }
        }

        let (key, lines) = self.current.as_mut()?;
        let key = *key;
        match lines.next() {
            Some((index, row)) => {
                let line = index + 1;
                Some(Ok(match check_row(&row) {
                    Ok(valid) => DrainItem::Row {
                        key,
                        line,
                        row: valid.to_string(),
                    },
                    Err(defect) => DrainItem::Skipped { key, line, defect },
                }))
            }
            None => {
                self.current = None;
                Some(Ok(DrainItem::EndOfFile(key)))
            }
        }
    }
}

/// Where and why a drain pass stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainAbort {
    pub key: DateKey,
    pub line: usize,
    pub reason: String,
}

/// Outcome of one drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub files_listed: usize,
    pub files_drained: usize,
    pub rows_sent: usize,
    pub rows_skipped: usize,
    pub aborted: Option<DrainAbort>,
}

impl DrainReport {
    /// True iff every listed file was fully drained and deleted.
    ///
    /// An empty listing is complete.
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none() && self.files_drained == self.files_listed
    }
}

/// Drain driver
#[derive(Debug, Clone, Copy)]
pub struct UploadDrain {
    max_files: usize,
}

impl UploadDrain {
    /// Drain at most `max_files` pending files per pass.
    pub fn new(max_files: usize) -> Self {
        Self { max_files }
    }

    /// Run one pass over `log`.
    ///
    /// # Errors
    ///
    /// Storage failures (listing, reading or deleting) are returned as
    /// errors. Upload failures are not errors; they end the pass and are
    /// recorded in [`DrainReport::aborted`].
    pub async fn run<U>(&self, log: &DurableLog, uploader: &mut U) -> Result<DrainReport>
    where
        U: RowUploader + ?Sized,
    {
        let files = log.list_pending(self.max_files)?;
        let mut report = DrainReport {
            files_listed: files.len(),
            ..Default::default()
        };

        if files.is_empty() {
            debug!("Nothing to drain");
            return Ok(report);
        }
        info!("Draining {} file(s)", files.len());

        for item in PendingRows::new(log, files) {
            match item? {
                DrainItem::Row { key, line, row } => match uploader.send(&row).await {
                    Ok(()) => report.rows_sent += 1,
                    Err(e) => {
                        warn!("Upload failed at {} line {}: {}", key, line, e);
                        report.aborted = Some(DrainAbort {
                            key,
                            line,
                            reason: e.to_string(),
                        });
                        return Ok(report);
                    }
                },
                DrainItem::Skipped { key, line, defect } => {
                    debug!("Skipping {} line {} ({})", key, line, defect.code());
                    report.rows_skipped += 1;
                }
                DrainItem::EndOfFile(key) => {
                    log.remove_file(key)?;
                    report.files_drained += 1;
                }
            }
        }

        info!(
            "Drain complete: {} file(s), {} row(s) sent",
            report.files_drained, report.rows_sent
        );
        Ok(report)
    }
}
