//! # Durable Log
//!
//! Append-only, day-partitioned row store.
//!
//! Each day gets one file named `<prefix>YYYYMMDD.<ext>` (e.g.
//! `DATA_20250309.CSV`). The date part is fixed-width and zero-padded, so
//! sorting file names lexicographically sorts them chronologically. No file
//! handle is kept between calls: every append opens, writes, syncs and
//! closes.

use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{Result, TelemetryError};
use crate::record::Delimiter;

/// Last year whose key still fits four digits
const MAX_YEAR: i32 = 9999;

/// Day key of a log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    /// Wrap a date, rejecting years the four-digit name cannot order.
    pub fn new(date: NaiveDate) -> Result<Self> {
        if !(0..=MAX_YEAR).contains(&date.year()) {
            return Err(TelemetryError::InvalidDateKey(format!(
                "year {} outside 0000-{}",
                date.year(),
                MAX_YEAR
            )));
        }
        Ok(Self(date))
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// `<prefix>YYYYMMDD.<extension>`
    pub fn file_name(&self, prefix: &str, extension: &str) -> String {
        format!("{}{}.{}", prefix, self, extension)
    }

    /// Inverse of [`file_name`](Self::file_name); `None` for foreign files.
    pub fn parse_file_name(name: &str, prefix: &str, extension: &str) -> Option<Self> {
        let stem = name.strip_prefix(prefix)?.strip_suffix(extension)?.strip_suffix('.')?;
        if stem.len() != 8 || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year = stem[0..4].parse().ok()?;
        let month = stem[4..6].parse().ok()?;
        let day = stem[6..8].parse().ok()?;
        Self::new(NaiveDate::from_ymd_opt(year, month, day)?).ok()
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}{:02}{:02}",
            self.0.year(),
            self.0.month(),
            self.0.day()
        )
    }
}

fn unavailable(path: &Path, e: std::io::Error) -> TelemetryError {
    TelemetryError::StorageUnavailable(format!("{}: {}", path.display(), e))
}

fn ends_with_newline(file: &mut fs::File) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Day-partitioned append-only store of pending rows
#[derive(Debug, Clone)]
pub struct DurableLog {
    root: PathBuf,
    prefix: String,
    extension: &'static str,
    header: String,
}

impl DurableLog {
    /// Open (creating if needed) the log directory.
    ///
    /// # Arguments
    ///
    /// * `root` - Directory holding the day files
    /// * `prefix` - File name prefix (e.g. "DATA_")
    /// * `delimiter` - Row delimiter; picks the file extension
    /// * `header` - Line written at the top of every new day file
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::StorageUnavailable` if the directory cannot
    /// be created or is not a directory
    pub fn open(
        root: impl Into<PathBuf>,
        prefix: impl Into<String>,
        delimiter: Delimiter,
        header: impl Into<String>,
    ) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| unavailable(&root, e))?;

        let metadata = fs::metadata(&root).map_err(|e| unavailable(&root, e))?;
        if !metadata.is_dir() {
            return Err(TelemetryError::StorageUnavailable(format!(
                "{} is not a directory",
                root.display()
            )));
        }
        if metadata.permissions().readonly() {
            return Err(TelemetryError::StorageUnavailable(format!(
                "{} is read-only",
                root.display()
            )));
        }

        info!("Durable log at {}", root.display());
        Ok(Self {
            root,
            prefix: prefix.into(),
            extension: delimiter.extension(),
            header: header.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of the file for `key`.
    pub fn path_for(&self, key: DateKey) -> PathBuf {
        self.root.join(key.file_name(&self.prefix, self.extension))
    }

    /// Append one row to the file for `key`.
    ///
    /// A new file gets the header line first. A last line left without its
    /// terminator (power loss mid-write) is closed off before the row, so
    /// the new row always starts on its own line. The row is synced before
    /// the file is closed.
    ///
    /// # Errors
    ///
    /// Returns `TelemetryError::StorageUnavailable` if the file cannot be
    /// opened or written; the row is lost in that case.
    pub fn append(&self, row: &str, key: DateKey) -> Result<()> {
        let path = self.path_for(key);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| unavailable(&path, e))?;

        let len = file.metadata().map_err(|e| unavailable(&path, e))?.len();

        let mut buf = String::with_capacity(self.header.len() + row.len() + 3);
        if len == 0 {
            buf.push_str(&self.header);
            buf.push('\n');
        } else if !ends_with_newline(&mut file).map_err(|e| unavailable(&path, e))? {
            warn!("Unterminated last line in {}", path.display());
            buf.push('\n');
        }
        buf.push_str(row.trim_end_matches(['\r', '\n']));
        buf.push('\n');

        file.write_all(buf.as_bytes()).map_err(|e| unavailable(&path, e))?;
        file.sync_data().map_err(|e| unavailable(&path, e))?;

        debug!("Appended row to {}", path.display());
        Ok(())
    }

    /// Pending day files, oldest first, at most `max`.
    pub fn list_pending(&self, max: usize) -> Result<Vec<DateKey>> {
        let entries = fs::read_dir(&self.root).map_err(|e| unavailable(&self.root, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| unavailable(&self.root, e))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if DateKey::parse_file_name(&name, &self.prefix, self.extension).is_some() {
                names.push(name);
            }
        }

        // Name order is date order by construction
        names.sort();
        Ok(names
            .iter()
            .filter_map(|name| DateKey::parse_file_name(name, &self.prefix, self.extension))
            .take(max)
            .collect())
    }

    /// All lines of the file for `key`, CR/LF stripped.
    pub fn read_rows(&self, key: DateKey) -> Result<Vec<String>> {
        let path = self.path_for(key);
        let contents = fs::read_to_string(&path).map_err(|e| unavailable(&path, e))?;
        Ok(contents
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect())
    }

    /// Delete a fully drained file.
    pub fn remove_file(&self, key: DateKey) -> Result<()> {
        let path = self.path_for(key);
        fs::remove_file(&path).map_err(|e| unavailable(&path, e))?;
        info!("Removed drained file {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HEADER: &str = "date,time,lat,lon,alt,Temp10,Moist10,IR_Temp";

    fn key(y: i32, m: u32, d: u32) -> DateKey {
        DateKey::new(NaiveDate::from_ymd_opt(y, m, d).unwrap()).unwrap()
    }

    fn open_log(dir: &TempDir) -> DurableLog {
        DurableLog::open(dir.path(), "DATA_", Delimiter::Comma, HEADER).unwrap()
    }

    #[test]
    fn test_file_name_is_zero_padded() {
        assert_eq!(key(2025, 3, 9).file_name("DATA_", "CSV"), "DATA_20250309.CSV");
        assert_eq!(key(987, 1, 1).file_name("DATA_", "CSV"), "DATA_09870101.CSV");
    }

    #[test]
    fn test_name_order_matches_date_order() {
        let dates = [
            key(2024, 12, 31),
            key(2025, 1, 1),
            key(2025, 1, 31),
            key(2025, 2, 1),
            key(2025, 9, 30),
            key(2025, 10, 1),
            key(2099, 12, 31),
            key(1999, 12, 31),
        ];
        for a in &dates {
            for b in &dates {
                let by_name = a.file_name("DATA_", "CSV").cmp(&b.file_name("DATA_", "CSV"));
                assert_eq!(by_name, a.cmp(b), "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_year_out_of_range_rejected() {
        let date = NaiveDate::from_ymd_opt(10000, 1, 1).unwrap();
        assert!(matches!(DateKey::new(date), Err(TelemetryError::InvalidDateKey(_))));
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            DateKey::parse_file_name("DATA_20250309.CSV", "DATA_", "CSV"),
            Some(key(2025, 3, 9))
        );
        assert_eq!(DateKey::parse_file_name("DATA_20250309.TSV", "DATA_", "CSV"), None);
        assert_eq!(DateKey::parse_file_name("DATA_2025039.CSV", "DATA_", "CSV"), None);
        assert_eq!(DateKey::parse_file_name("DATA_20251339.CSV", "DATA_", "CSV"), None);
        assert_eq!(DateKey::parse_file_name("test.csv", "DATA_", "CSV"), None);
    }

    #[test]
    fn test_append_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir);
        let day = key(2025, 3, 9);

        log.append("2025-03-09,07:00:00,0.000000,0.000000,0.0,21.5,10,", day).unwrap();
        log.append("2025-03-09,08:00:00,0.000000,0.000000,0.0,21.6,11,", day).unwrap();

        let rows = log.read_rows(day).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], HEADER);
        assert!(rows[2].starts_with("2025-03-09,08:00:00"));
    }

    #[test]
    fn test_append_after_torn_line_starts_new_line() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir);
        let day = key(2025, 3, 9);

        let torn = format!("{}\n2025-03-09,07:00:00,0.000000,0.000000,0.0,21.5,10,\n2025-03-09,07:3", HEADER);
        fs::write(log.path_for(day), torn).unwrap();

        log.append("2025-03-09,08:00:00,0.000000,0.000000,0.0,21.6,11,", day).unwrap();

        let rows = log.read_rows(day).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[2], "2025-03-09,07:3");
        assert_eq!(rows[3], "2025-03-09,08:00:00,0.000000,0.000000,0.0,21.6,11,");
    }

    #[test]
    fn test_append_to_separate_days() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir);

        log.append("a", key(2025, 3, 9)).unwrap();
        log.append("b", key(2025, 3, 10)).unwrap();

        assert!(log.path_for(key(2025, 3, 9)).exists());
        assert!(log.path_for(key(2025, 3, 10)).exists());
        assert_eq!(log.read_rows(key(2025, 3, 10)).unwrap()[1], "b");
    }

    #[test]
    fn test_list_pending_sorted_and_capped() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir);
        for k in [key(2025, 2, 1), key(2024, 12, 31), key(2025, 1, 15)] {
            log.append("1", k).unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();
        fs::write(dir.path().join("DATA_20250101.TSV"), "other delimiter").unwrap();

        assert_eq!(
            log.list_pending(32).unwrap(),
            vec![key(2024, 12, 31), key(2025, 1, 15), key(2025, 2, 1)]
        );
        assert_eq!(log.list_pending(2).unwrap(), vec![key(2024, 12, 31), key(2025, 1, 15)]);
    }

    #[test]
    fn test_remove_file() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir);
        let day = key(2025, 3, 9);
        log.append("1", day).unwrap();

        log.remove_file(day).unwrap();
        assert!(log.list_pending(32).unwrap().is_empty());
        assert!(matches!(log.remove_file(day), Err(TelemetryError::StorageUnavailable(_))));
    }

    #[test]
    fn test_missing_directory_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let log = open_log(&dir);
        fs::remove_dir_all(dir.path()).unwrap();

        assert!(matches!(
            log.append("1", key(2025, 3, 9)),
            Err(TelemetryError::StorageUnavailable(_))
        ));
        assert!(matches!(log.list_pending(32), Err(TelemetryError::StorageUnavailable(_))));
    }

    #[test]
    fn test_open_on_regular_file_fails() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not_a_dir");
        fs::write(&file, "x").unwrap();

        assert!(matches!(
            DurableLog::open(&file, "DATA_", Delimiter::Comma, HEADER),
            Err(TelemetryError::StorageUnavailable(_))
        ));
    }
}
