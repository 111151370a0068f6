use crate::event::{EventHandler, RecorderEvent};
use parking_lot::Mutex;
use std::{
    fs::{File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

/// First path of `filename`, `filename-1`, `filename-2`, ... inside `directory` which does not exist yet
pub fn available_path(directory: &Path, filename: &str) -> PathBuf {
    let mut path = directory.join(filename);
    let mut count = 1u32;

    while path.exists() {
        path = directory.join(format!("{filename}-{count}"));
        count += 1;
    }

    path
}

/// Append-only event log, one JSON object per line
pub struct JsonEventLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonEventLog {
    pub fn create(path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;

        log::debug!("created event log {}", path.display());

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, event: &RecorderEvent) -> io::Result<()> {
        let mut writer = self.writer.lock();

        serde_json::to_writer(&mut *writer, event)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl EventHandler for JsonEventLog {
    fn handle_event(&self, event: RecorderEvent) -> bool {
        match self.write(&event) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("failed to write event to {}: {e}", self.path.display());
                false
            }
        }
    }

    fn close(&self) {
        if let Err(e) = self.writer.lock().flush() {
            log::warn!("failed to flush {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;
    use std::fs;

    #[test]
    fn collision_appends_counter() {
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(
            available_path(dir.path(), "metadata.json"),
            dir.path().join("metadata.json")
        );

        fs::write(dir.path().join("metadata.json"), "").unwrap();
        assert_eq!(
            available_path(dir.path(), "metadata.json"),
            dir.path().join("metadata.json-1")
        );

        fs::write(dir.path().join("metadata.json-1"), "").unwrap();
        assert_eq!(
            available_path(dir.path(), "metadata.json"),
            dir.path().join("metadata.json-2")
        );
    }

    #[test]
    fn one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonEventLog::create(dir.path().join("metadata.json")).unwrap();

        assert!(log.handle_event(RecorderEvent::new(EventType::RecordingStarted, 1)));
        assert!(log.handle_event(RecorderEvent::new(EventType::RecordingEnded, 2)));
        log.close();

        let content = fs::read_to_string(log.path()).unwrap();
        let records: Vec<RecorderEvent> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, EventType::RecordingStarted);
        assert_eq!(records[1].ssrc, 2);
    }

    #[test]
    fn existing_file_is_not_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        fs::write(&path, "previous").unwrap();

        assert!(JsonEventLog::create(path.clone()).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
    }
}
