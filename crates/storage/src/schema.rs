//! Table Schemas
//!
//! One table per frame variant. Field columns come straight from the
//! decoder layouts so the stored shape cannot drift from what is decoded.

use frame_decoder::{layout, FieldSpec};
use frame_protocol::FrameVariant;

/// Columns every table carries ahead of the decoded fields
const LEADING: [&str; 3] = ["id", "device_id", "frame_hex"];
/// Columns every table carries after the decoded fields
const TRAILING: [&str; 2] = ["active_alarms", "received_time"];

/// Capture time column, also the default sort key for realtime reads
pub const TIME_COLUMN: &str = "received_time";

/// Storage layout of one frame variant
#[derive(Debug)]
pub struct TableSchema {
    pub variant: FrameVariant,
    /// SQL table name
    pub name: &'static str,
    /// Default `device_id` value
    pub device_tag: &'static str,
}

/// All tables, in variant order
pub static TABLES: [TableSchema; 3] = [
    TableSchema {
        variant: FrameVariant::Lop1Frame1,
        name: "lop1_frame1",
        device_tag: "LOP1_frame1",
    },
    TableSchema {
        variant: FrameVariant::Lop1Frame2,
        name: "lop1_frame2",
        device_tag: "LOP1_frame2",
    },
    TableSchema {
        variant: FrameVariant::Lop2,
        name: "lop2_frame",
        device_tag: "LOP2_frame",
    },
];

impl TableSchema {
    pub fn for_variant(variant: FrameVariant) -> &'static TableSchema {
        match variant {
            FrameVariant::Lop1Frame1 => &TABLES[0],
            FrameVariant::Lop1Frame2 => &TABLES[1],
            FrameVariant::Lop2 => &TABLES[2],
        }
    }

    /// Look a table up by its SQL name
    pub fn by_name(name: &str) -> Option<&'static TableSchema> {
        TABLES.iter().find(|t| t.name == name)
    }

    /// Decoded field columns
    pub fn fields(&self) -> &'static [FieldSpec] {
        layout(self.variant)
    }

    /// Every column in table order
    pub fn columns(&self) -> Vec<&'static str> {
        LEADING
            .iter()
            .copied()
            .chain(self.fields().iter().map(|f| f.name))
            .chain(TRAILING.iter().copied())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        LEADING.contains(&name)
            || TRAILING.contains(&name)
            || self.fields().iter().any(|f| f.name == name)
    }

    pub fn create_table_sql(&self) -> String {
        let mut sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
             id INTEGER PRIMARY KEY AUTOINCREMENT,\n    \
             device_id TEXT DEFAULT '{}',\n    \
             frame_hex TEXT NOT NULL",
            self.name, self.device_tag
        );
        for field in self.fields() {
            let kind = if field.is_integer() { "INTEGER" } else { "REAL" };
            sql.push_str(&format!(",\n    {} {}", field.name, kind));
        }
        sql.push_str(",\n    active_alarms TEXT");
        sql.push_str(",\n    received_time DATETIME DEFAULT (datetime('now','localtime'))\n)");
        sql
    }

    pub fn create_index_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{0}_time ON {0} ({1} DESC)",
            self.name, TIME_COLUMN
        )
    }

    /// Positional insert of everything but `id`
    pub fn insert_sql(&self) -> String {
        let columns: Vec<&str> = self.columns().into_iter().skip(1).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name,
            columns.join(", "),
            placeholders
        )
    }
}
