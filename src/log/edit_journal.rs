/// Edit journal
///
/// Every mutation applied to a firmware image is recorded with:
/// - Timestamp
/// - Operation name and description
/// - The image that was written
/// - The backup taken just before the write
///
/// The journal can be exported as human-readable text or JSON, and each
/// entry is appended to the configured journal file as it happens.

use calmap_io::Backup;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

/// A single journal entry representing one applied edit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Sequential edit number (1-based)
    pub sequence: usize,
    pub timestamp: DateTime<Local>,
    pub operation: String,
    pub description: String,
    /// Image file that was modified
    pub image: String,
    /// Where the pre-edit content went
    pub backup: String,
}

impl JournalEntry {
    pub fn to_text(&self) -> String {
        format!(
            "[{:03}] {} | {} | {}\n      Image:  {}\n      Backup: {}",
            self.sequence,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.operation,
            self.description,
            self.image,
            self.backup
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditJournal {
    pub session_id: String,
    pub session_start: DateTime<Local>,
    pub software_version: String,
    pub entries: Vec<JournalEntry>,
}

impl EditJournal {
    pub fn new() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            session_start: Local::now(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            entries: Vec::new(),
        }
    }

    /// Record an applied edit and return the new entry
    pub fn record(
        &mut self,
        operation: &str,
        description: &str,
        image: &Path,
        backup: &Backup,
    ) -> &JournalEntry {
        let seq = self.entries.len() + 1;
        self.entries.push(JournalEntry {
            sequence: seq,
            timestamp: Local::now(),
            operation: operation.to_string(),
            description: description.to_string(),
            image: image.display().to_string(),
            backup: backup.to_string(),
        });
        ::log::info!("[EDIT {:03}] {}: {}", seq, operation, description);
        &self.entries[seq - 1]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Export as human-readable text
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str("═══════════════════════════════════════════════════════════════\n");
        out.push_str("  ECU Calibration Edit Journal\n");
        out.push_str("═══════════════════════════════════════════════════════════════\n");
        out.push_str(&format!("  Session ID:  {}\n", self.session_id));
        out.push_str(&format!(
            "  Started:     {}\n",
            self.session_start.format("%Y-%m-%d %H:%M:%S")
        ));
        out.push_str(&format!("  Software:    ecumap v{}\n", self.software_version));
        out.push_str(&format!("  Edits:       {}\n", self.entries.len()));
        out.push_str("───────────────────────────────────────────────────────────────\n\n");

        for entry in &self.entries {
            out.push_str(&entry.to_text());
            out.push_str("\n\n");
        }
        out
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("JSON error: {}", e))
    }

    pub fn save_json(&self, path: &Path) -> io::Result<()> {
        std::fs::write(path, self.to_json())
    }

    /// Append one entry to a running journal file, one JSON object per line,
    /// tagged with this session's id.
    pub fn append_entry(&self, entry: &JournalEntry, path: &Path) -> io::Result<()> {
        let line = serde_json::json!({
            "session_id": self.session_id,
            "entry": entry,
        });
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        file.sync_all()
    }
}

impl Default for EditJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_journal_records_in_order() {
        let mut journal = EditJournal::new();
        assert!(journal.is_empty());

        let backup = Backup::File(PathBuf::from("/tmp/ecu.bin.backup"));
        journal.record("Scale Table", "Main Fuel Map x1.05", Path::new("/tmp/ecu.bin"), &backup);
        journal.record("Write Param", "Rev Limiter = 7000", Path::new("/tmp/ecu.bin"), &backup);
        assert_eq!(journal.len(), 2);
        assert_eq!(journal.entries[0].sequence, 1);
        assert_eq!(journal.entries[1].sequence, 2);
        assert_eq!(journal.entries[1].backup, "/tmp/ecu.bin.backup");
    }

    #[test]
    fn test_text_and_json_export() {
        let mut journal = EditJournal::new();
        journal.record("Write Cell", "Main Fuel Map [0,0] = 4.20", Path::new("ecu.bin"), &Backup::Memory(0));
        let text = journal.to_text();
        assert!(text.contains("Main Fuel Map [0,0] = 4.20"));
        assert!(text.contains(&journal.session_id));

        let parsed: EditJournal = serde_json::from_str(&journal.to_json()).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].operation, "Write Cell");
    }

    #[test]
    fn test_append_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("journal.jsonl");
        let mut journal = EditJournal::new();
        let backup = Backup::Memory(0);
        let first = journal.record("A", "first", Path::new("ecu.bin"), &backup).clone();
        journal.append_entry(&first, &path).unwrap();
        let second = journal.record("B", "second", Path::new("ecu.bin"), &backup).clone();
        journal.append_entry(&second, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let v: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(v["entry"]["operation"], "B");
    }
}
