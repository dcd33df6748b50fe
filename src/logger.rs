//! CSV logging of remote device status.
//!
//! Each cycle stamps `logger_time`, fetches the whole tree, and appends
//! one row: the stamp, then a name/people/image triple per device.
//! Consumed fields are reset to sentinels so the next cycle can tell a
//! fresh value from a stale one: a count resets to `WAITING`, and a
//! sentinel that is still there a cycle later escalates to `FAILED`.
//!
//! The first cycle after startup is collected and reset but not written;
//! whatever was in the database predates this logger run.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::remote::{ImageStatus, PeopleField, StampedTime, StatusStore};

/// Append-only CSV file with a lazily written header.
pub struct CsvLog {
    file: File,
    header_pending: bool,
}

impl CsvLog {
    /// Open (or create) the log. The header is written together with the
    /// first row, sized to that row's device count.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .with_context(|| format!("open csv log {}", path.display()))?;
        let len = file.metadata().context("stat csv log")?.len();
        Ok(Self {
            file,
            header_pending: len == 0,
        })
    }

    /// Append one row, flushing and syncing so a power cut loses at most
    /// the row being written.
    pub fn append_row(&mut self, row: &[String]) -> Result<()> {
        if self.header_pending {
            let header = header_for_row(row.len());
            self.write_line(&header)?;
            self.header_pending = false;
        }
        self.write_line(row)?;
        self.file.flush().context("flush csv log")?;
        self.file.sync_all().context("sync csv log")?;
        Ok(())
    }

    fn write_line<S: AsRef<str>>(&mut self, cells: &[S]) -> Result<()> {
        let line = cells
            .iter()
            .map(|cell| quote_cell(cell.as_ref()))
            .collect::<Vec<_>>()
            .join(",");
        self.file
            .write_all(line.as_bytes())
            .context("write csv row")?;
        self.file.write_all(b"\n").context("write csv row")?;
        Ok(())
    }
}

fn header_for_row(row_len: usize) -> Vec<String> {
    let mut header = vec!["date".to_string(), "time".to_string()];
    let devices = row_len.saturating_sub(2) / 3;
    for _ in 0..devices {
        header.push("location/device".to_string());
        header.push("people".to_string());
        header.push("image".to_string());
    }
    header
}

fn quote_cell(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// Run one logging cycle against the store.
///
/// Returns the row for this cycle. Errors if the snapshot holds no
/// devices, so callers can retry until the counters come online.
pub fn collect_cycle(store: &dyn StatusStore, stamp: &StampedTime) -> Result<Vec<String>> {
    store.update_logger_time(stamp)?;
    let snapshot = store.fetch_snapshot()?;
    if snapshot.devices.is_empty() {
        return Err(anyhow!("no devices in remote snapshot"));
    }

    let mut row = vec![stamp.date.clone(), stamp.time.clone()];
    for (device, status) in &snapshot.devices {
        row.push(device.clone());

        match &status.people {
            Some(PeopleField::Count(n)) => {
                row.push(n.to_string());
                store.reset_people(device, &PeopleField::waiting())?;
            }
            Some(PeopleField::Status(s)) => {
                // Sentinel survived a full cycle; the counter is stalled.
                row.push(s.clone());
                store.reset_people(device, &PeopleField::failed())?;
            }
            None => {
                row.push(String::new());
                store.reset_people(device, &PeopleField::waiting())?;
            }
        }

        match &status.last_image_captured {
            Some(record) if record.image_status == ImageStatus::Available => {
                row.push(record.image_file_name.clone());
                store.reset_image_status(device, ImageStatus::Pulled, "")?;
            }
            Some(record) => {
                row.push(record.image_file_name.clone());
                store.reset_image_status(device, ImageStatus::Waiting, "")?;
            }
            None => {
                row.push(String::new());
                store.reset_image_status(device, ImageStatus::Waiting, "")?;
            }
        }
    }
    Ok(row)
}

/// Cycle state: tracks the startup discard.
#[derive(Default)]
pub struct LoggerSession {
    first_cycle_done: bool,
}

impl LoggerSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one cycle. `None` means the row was the startup flush and
    /// must not be written.
    pub fn run_cycle(
        &mut self,
        store: &dyn StatusStore,
        stamp: &StampedTime,
    ) -> Result<Option<Vec<String>>> {
        let row = collect_cycle(store, stamp)?;
        if !self.first_cycle_done {
            self.first_cycle_done = true;
            log::info!("flushing stale pre-start data, first row discarded");
            return Ok(None);
        }
        Ok(Some(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{ImageRecord, InMemoryStatusDb};

    fn stamp() -> StampedTime {
        StampedTime {
            date: "2024-03-01".to_string(),
            time: "12:35:00".to_string(),
        }
    }

    fn seeded_store() -> InMemoryStatusDb {
        let store = InMemoryStatusDb::new();
        store
            .update_count("lobby", &stamp(), &PeopleField::Count(3))
            .unwrap();
        store
            .update_image_record(
                "lobby",
                &ImageRecord {
                    date: "2024-03-01".to_string(),
                    time: "12:30:05".to_string(),
                    image_status: ImageStatus::Available,
                    image_file_name: "2024-03-01_12:30:05-count:3-0.jpg".to_string(),
                },
            )
            .unwrap();
        store
    }

    #[test]
    fn cycle_records_and_resets_fields() -> Result<()> {
        let store = seeded_store();
        let row = collect_cycle(&store, &stamp())?;
        assert_eq!(
            row,
            vec![
                "2024-03-01".to_string(),
                "12:35:00".to_string(),
                "lobby".to_string(),
                "3".to_string(),
                "2024-03-01_12:30:05-count:3-0.jpg".to_string(),
            ]
        );

        let snapshot = store.fetch_snapshot()?;
        let device = &snapshot.devices["lobby"];
        assert_eq!(device.people, Some(PeopleField::waiting()));
        let image = device.last_image_captured.as_ref().unwrap();
        assert_eq!(image.image_status, ImageStatus::Pulled);
        assert_eq!(image.image_file_name, "");
        assert_eq!(snapshot.logger_time, Some(stamp()));
        Ok(())
    }

    #[test]
    fn surviving_sentinel_escalates_to_failed() -> Result<()> {
        let store = seeded_store();
        collect_cycle(&store, &stamp())?;
        // Device never pushed a new count; the sentinel is logged as-is.
        let row = collect_cycle(&store, &stamp())?;
        assert_eq!(row[3], "WAITING");
        let snapshot = store.fetch_snapshot()?;
        assert_eq!(
            snapshot.devices["lobby"].people,
            Some(PeopleField::failed())
        );
        Ok(())
    }

    #[test]
    fn empty_snapshot_is_an_error() {
        let store = InMemoryStatusDb::new();
        assert!(collect_cycle(&store, &stamp()).is_err());
    }

    #[test]
    fn session_discards_first_cycle() -> Result<()> {
        let store = seeded_store();
        let mut session = LoggerSession::new();
        assert!(session.run_cycle(&store, &stamp())?.is_none());
        store.update_count("lobby", &stamp(), &PeopleField::Count(5))?;
        let row = session.run_cycle(&store, &stamp())?.expect("second row");
        assert_eq!(row[3], "5");
        Ok(())
    }

    #[test]
    fn csv_quotes_cells_with_commas() {
        assert_eq!(quote_cell("plain"), "plain");
        assert_eq!(quote_cell("a,b"), "\"a,b\"");
        assert_eq!(quote_cell("say \"hi\""), "\"say \"\"hi\"\"\"");
    }
}
