use prettytable::{format, Cell, Row, Table};

use crate::mood::format_confidence;
use crate::storage::MoodRecord;
use crate::utils::{format_bytes, truncate};

/// Placeholder shown when the store is empty
pub const EMPTY_HISTORY: &str = "No records found. Upload or capture an image to view history.";

/// Header line above the history listing
pub fn total_entries_line(count: usize) -> String {
    format!("Total Entries: {}", count)
}

/// Stored records rendered as a table, newest first
pub struct HistoryReport<'a> {
    records: &'a [MoodRecord],
}

impl<'a> HistoryReport<'a> {
    pub fn new(records: &'a [MoodRecord]) -> Self {
        Self { records }
    }

    pub fn build_table(&self) -> Table {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BOX_CHARS);

        table.add_row(Row::new(vec![
            Cell::new("ID"),
            Cell::new("Filename"),
            Cell::new("Mood"),
            Cell::new("Confidence"),
            Cell::new("Timestamp"),
            Cell::new("Size"),
        ]));

        for record in self.records {
            Self::add_record_row(&mut table, record);
        }
        table
    }

    fn add_record_row(table: &mut Table, record: &MoodRecord) {
        table.add_row(Row::new(vec![
            Cell::new(&record.record_id.to_string()),
            Cell::new(&truncate(&record.filename, 40)),
            Cell::new(&format!("{} {}", record.mood, record.mood.emoji())),
            Cell::new(&format_confidence(record.confidence)),
            Cell::new(&record.created_at),
            Cell::new(&format_bytes(record.image.len())),
        ]));
    }

    pub fn print(&self) {
        println!("{}", total_entries_line(self.records.len()));
        if self.records.is_empty() {
            println!("{}", EMPTY_HISTORY);
            return;
        }
        println!();
        self.build_table().printstd();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mood::Mood;

    fn record(id: i64, filename: &str) -> MoodRecord {
        MoodRecord {
            record_id: id,
            filename: filename.to_string(),
            mood: Mood::Happy,
            confidence: 0.87,
            image: vec![0; 2048],
            created_at: "2024-01-01 10:00:00".to_string(),
        }
    }

    #[test]
    fn test_table_has_header_and_one_row_per_record() {
        let records = vec![record(2, "b.jpg"), record(1, "a.jpg")];
        let table = HistoryReport::new(&records).build_table();
        assert_eq!(table.len(), 3);

        let rendered = table.to_string();
        assert!(rendered.contains("Confidence"));
        assert!(rendered.contains("87.00%"));
        assert!(rendered.contains("Happy 😊"));
        assert!(rendered.contains("2.0 KB"));
    }

    #[test]
    fn test_total_entries_line() {
        assert_eq!(total_entries_line(0), "Total Entries: 0");
        assert_eq!(total_entries_line(12), "Total Entries: 12");
    }
}
