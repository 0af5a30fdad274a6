//! Durable memory store.
//!
//! Maps a [`MemoryObject`] to one SQLite row: flat summary columns used for
//! indexing plus three JSON payloads holding the structured, semantic and
//! visual sub-records.
//!
//! # Storage layout
//!
//! | column              | type    | description                                  |
//! |---------------------|---------|----------------------------------------------|
//! | id                  | TEXT    | `mem_…` primary key                          |
//! | name                | TEXT    | Lowercased display name (indexed)            |
//! | entity_type         | TEXT    | `concept`, `device_component`, …             |
//! | device              | TEXT    | Optional device label (indexed)              |
//! | updated_at          | TEXT    | RFC-3339 µs, structured record last update   |
//! | structured_payload  | TEXT    | JSON [`StructuredRecord`]                    |
//! | semantic_payload    | TEXT    | JSON [`SemanticRecord`]                      |
//! | visuals_payload     | TEXT    | JSON array of [`VisualRecord`]               |
//! | usage_count         | INTEGER | Number of counted uses                       |
//! | last_accessed_at    | TEXT    | RFC-3339 µs, last counted use                |
//!
//! Each operation opens its own connection and drops it before returning.

use std::path::{Path, PathBuf};

use mnemos_types::{
    MemoryObject, SemanticRecord, StructuredRecord, VisualRecord, format_timestamp,
    parse_timestamp,
};
use rusqlite::{Connection, params};
use tracing::debug;

use crate::MemoryError;

/// SQLite-backed durable tier of the memory system.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    path: PathBuf,
}

/// Raw column values of one `memories` row, before decoding.
struct RawRow {
    id: String,
    structured: String,
    semantic: String,
    visuals: String,
    usage_count: i64,
    last_accessed_at: String,
}

impl MemoryStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, MemoryError> {
        let conn = Connection::open(&self.path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<(), MemoryError> {
        let conn = self.connect()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memories (
                id                 TEXT NOT NULL PRIMARY KEY,
                name               TEXT NOT NULL,
                entity_type        TEXT NOT NULL,
                device             TEXT,
                updated_at         TEXT NOT NULL,
                structured_payload TEXT NOT NULL,
                semantic_payload   TEXT NOT NULL,
                visuals_payload    TEXT NOT NULL,
                usage_count        INTEGER NOT NULL DEFAULT 0,
                last_accessed_at   TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_memories_name ON memories(name);
            CREATE INDEX IF NOT EXISTS idx_memories_device ON memories(device);",
        )?;
        Ok(())
    }

    /// Insert or update the row keyed by the memory's identity.
    ///
    /// An update keeps the row's original position, so [`load_all`] returns
    /// memories in creation order.
    ///
    /// [`load_all`]: MemoryStore::load_all
    pub fn upsert(&self, memory: &MemoryObject) -> Result<(), MemoryError> {
        let structured = serde_json::to_string(&memory.structured)?;
        let semantic = serde_json::to_string(&memory.semantic)?;
        let visuals = serde_json::to_string(memory.visuals())?;
        let usage_count = i64::try_from(memory.usage_count()).unwrap_or(i64::MAX);

        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO memories
                 (id, name, entity_type, device, updated_at,
                  structured_payload, semantic_payload, visuals_payload,
                  usage_count, last_accessed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                name               = excluded.name,
                entity_type        = excluded.entity_type,
                device             = excluded.device,
                updated_at         = excluded.updated_at,
                structured_payload = excluded.structured_payload,
                semantic_payload   = excluded.semantic_payload,
                visuals_payload    = excluded.visuals_payload,
                usage_count        = excluded.usage_count,
                last_accessed_at   = excluded.last_accessed_at",
            params![
                memory.id().as_str(),
                memory.structured.name.to_lowercase(),
                memory.structured.entity_type.as_str(),
                memory.structured.device,
                format_timestamp(&memory.structured.base.updated_at),
                structured,
                semantic,
                visuals,
                usage_count,
                format_timestamp(&memory.last_accessed_at()),
            ],
        )?;
        debug!(id = %memory.id(), usage = memory.usage_count(), "memory row written");
        Ok(())
    }

    /// Decode every stored row, oldest first.
    ///
    /// Fails with [`MemoryError::CorruptRow`] on the first row that cannot be
    /// decoded; no row is ever skipped.
    pub fn load_all(&self) -> Result<Vec<MemoryObject>, MemoryError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, structured_payload, semantic_payload, visuals_payload,
                    usage_count, last_accessed_at
             FROM memories
             ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RawRow {
                id: row.get(0)?,
                structured: row.get(1)?,
                semantic: row.get(2)?,
                visuals: row.get(3)?,
                usage_count: row.get(4)?,
                last_accessed_at: row.get(5)?,
            })
        })?;

        let mut memories = Vec::new();
        for row in rows {
            memories.push(decode_row(row?)?);
        }
        Ok(memories)
    }

    /// Delete the row for `id`. Returns whether a row was removed.
    pub fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Number of stored rows.
    pub fn count(&self) -> Result<usize, MemoryError> {
        let conn = self.connect()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }
}

fn decode_row(row: RawRow) -> Result<MemoryObject, MemoryError> {
    let RawRow {
        id,
        structured,
        semantic,
        visuals,
        usage_count,
        last_accessed_at,
    } = row;
    let corrupt = |reason: String| MemoryError::CorruptRow {
        id: id.clone(),
        reason,
    };

    let structured: StructuredRecord = serde_json::from_str(&structured)
        .map_err(|e| corrupt(format!("structured payload: {e}")))?;
    let semantic: SemanticRecord = serde_json::from_str(&semantic)
        .map_err(|e| corrupt(format!("semantic payload: {e}")))?;
    let visuals: Vec<VisualRecord> = serde_json::from_str(&visuals)
        .map_err(|e| corrupt(format!("visuals payload: {e}")))?;
    let usage_count = u64::try_from(usage_count)
        .map_err(|_| corrupt(format!("negative usage count {usage_count}")))?;
    let last_accessed_at = parse_timestamp(&last_accessed_at).map_err(|e| corrupt(e.to_string()))?;

    let memory_id = structured.base.id().clone();
    if memory_id.as_str() != id {
        return Err(corrupt(format!("structured payload belongs to {memory_id}")));
    }
    MemoryObject::from_parts(
        memory_id,
        structured,
        semantic,
        visuals,
        usage_count,
        last_accessed_at,
    )
    .map_err(|e| corrupt(e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
