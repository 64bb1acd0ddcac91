//! SQLite store for classes, frames and detected objects.
//!
//! Schema:
//! - `Classes(class_id, class_name)`: seeded verbatim from the class catalog
//! - `Frames(frame_id, timestamp, frame_number)`: one row per distinct
//!   `(timestamp, frame_number)` that carries at least one detection
//! - `Objects(object_id, class_id → Classes, frame_id → Frames, bbox, confidence)`

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::catalog::ClassCatalog;
use crate::error::BirdcountError;
use crate::open_db_connection;
use crate::record::DetectionRecord;

const PROGRESS_EVERY_ROWS: usize = 50;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS Classes (
      class_id INTEGER PRIMARY KEY,
      class_name TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS Frames (
      frame_id INTEGER PRIMARY KEY AUTOINCREMENT,
      timestamp TEXT NOT NULL,
      frame_number INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS Objects (
      object_id INTEGER PRIMARY KEY AUTOINCREMENT,
      class_id INTEGER NOT NULL,
      frame_id INTEGER NOT NULL,
      bounding_box_coordinate_0 REAL NOT NULL,
      bounding_box_coordinate_1 REAL NOT NULL,
      bounding_box_coordinate_2 REAL NOT NULL,
      bounding_box_coordinate_3 REAL NOT NULL,
      confidence REAL NOT NULL,
      FOREIGN KEY (class_id) REFERENCES Classes (class_id),
      FOREIGN KEY (frame_id) REFERENCES Frames (frame_id)
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_frames_identity ON Frames(timestamp, frame_number);
    CREATE INDEX IF NOT EXISTS idx_objects_frame ON Objects(frame_id);
"#;

const DROP_SCHEMA: &str = r#"
    DROP TABLE IF EXISTS Objects;
    DROP TABLE IF EXISTS Frames;
    DROP TABLE IF EXISTS Classes;
"#;

/// Row counts written by one `populate` call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PopulateStats {
    pub classes: usize,
    pub frames_inserted: usize,
    pub frames_reused: usize,
    pub objects: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FrameRow {
    pub frame_id: i64,
    pub timestamp: String,
    pub frame_number: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectRow {
    pub object_id: i64,
    pub class_id: i64,
    pub frame_id: i64,
    pub bounding_box: [f64; 4],
    pub confidence: f64,
}

pub struct DetectionStore {
    pub conn: Connection,
}

impl DetectionStore {
    /// Destroy any store at `db_path` and create an empty one.
    pub fn reinitialize(db_path: &Path) -> Result<Self> {
        if !is_memory_path(db_path) {
            remove_store_files(db_path)?;
            if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let store = Self::open(db_path)?;
        store.conn.execute_batch(DROP_SCHEMA)?;
        store.ensure_schema()?;
        log::info!("store: reinitialized {}", db_path.display());
        Ok(store)
    }

    /// Open (or create) a store without discarding existing rows.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = open_db_connection(&db_path.to_string_lossy())
            .with_context(|| format!("opening store {}", db_path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn ensure_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Insert the catalog and all detection records in one transaction.
    ///
    /// Records are grouped by `(timestamp, frame_number)` in ascending key
    /// order; each group resolves its frame row once, then inserts its objects
    /// in record order. Any failure rolls the whole batch back.
    pub fn populate(
        &mut self,
        catalog: &ClassCatalog,
        records: Vec<DetectionRecord>,
    ) -> Result<PopulateStats> {
        let mut groups: BTreeMap<(i64, i64), Vec<DetectionRecord>> = BTreeMap::new();
        for record in records {
            groups.entry(record.frame_key()).or_default().push(record);
        }

        let tx = self.conn.transaction()?;
        let mut stats = PopulateStats::default();

        {
            let mut insert_class =
                tx.prepare("INSERT INTO Classes (class_id, class_name) VALUES (?1, ?2)")?;
            for entry in catalog.entries() {
                insert_class
                    .execute(params![entry.class_id, entry.class_name])
                    .with_context(|| {
                        format!("inserting class {} '{}'", entry.class_id, entry.class_name)
                    })?;
                stats.classes += 1;
            }
        }

        {
            let mut insert_object = tx.prepare(
                r#"
                INSERT INTO Objects (
                  class_id, frame_id,
                  bounding_box_coordinate_0, bounding_box_coordinate_1,
                  bounding_box_coordinate_2, bounding_box_coordinate_3,
                  confidence
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;

            for ((timestamp_ms, frame_number), group) in groups {
                let (frame_id, inserted) =
                    frame_id_for(&tx, &timestamp_ms.to_string(), frame_number)?;
                if inserted {
                    stats.frames_inserted += 1;
                } else {
                    stats.frames_reused += 1;
                }

                for record in group {
                    let class_id = catalog.class_id(&record.class_name).ok_or_else(|| {
                        BirdcountError::UnknownClassName {
                            class_name: record.class_name.clone(),
                        }
                    })?;
                    insert_object.execute(params![
                        class_id,
                        frame_id,
                        f64::from(record.bbox.x1),
                        f64::from(record.bbox.y1),
                        f64::from(record.bbox.x2),
                        f64::from(record.bbox.y2),
                        f64::from(record.confidence),
                    ])?;
                    stats.objects += 1;
                    if stats.objects % PROGRESS_EVERY_ROWS == 0 {
                        log::info!("store: inserted {} objects so far", stats.objects);
                    }
                }
            }
        }

        tx.commit()?;
        log::info!(
            "store: committed {} classes, {} frames, {} objects",
            stats.classes,
            stats.frames_inserted,
            stats.objects
        );
        Ok(stats)
    }

    pub fn class_count(&self) -> Result<i64> {
        self.count_rows("Classes")
    }

    pub fn frame_count(&self) -> Result<i64> {
        self.count_rows("Frames")
    }

    pub fn object_count(&self) -> Result<i64> {
        self.count_rows("Objects")
    }

    fn count_rows(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    pub fn frames(&self) -> Result<Vec<FrameRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT frame_id, timestamp, frame_number FROM Frames ORDER BY frame_id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(FrameRow {
                frame_id: row.get(0)?,
                timestamp: row.get(1)?,
                frame_number: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn objects(&self) -> Result<Vec<ObjectRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT object_id, class_id, frame_id,
                   bounding_box_coordinate_0, bounding_box_coordinate_1,
                   bounding_box_coordinate_2, bounding_box_coordinate_3,
                   confidence
            FROM Objects
            ORDER BY object_id ASC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ObjectRow {
                object_id: row.get(0)?,
                class_id: row.get(1)?,
                frame_id: row.get(2)?,
                bounding_box: [row.get(3)?, row.get(4)?, row.get(5)?, row.get(6)?],
                confidence: row.get(7)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Objects whose class or frame reference does not resolve.
    pub fn dangling_object_count(&self) -> Result<i64> {
        Ok(self.conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM Objects o
            LEFT JOIN Classes c ON o.class_id = c.class_id
            LEFT JOIN Frames f ON o.frame_id = f.frame_id
            WHERE c.class_id IS NULL OR f.frame_id IS NULL
            "#,
            [],
            |row| row.get(0),
        )?)
    }
}

/// Look up the frame row for `(timestamp, frame_number)`, inserting it when
/// absent. Returns the id and whether a row was inserted.
fn frame_id_for(conn: &Connection, timestamp: &str, frame_number: i64) -> Result<(i64, bool)> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT frame_id FROM Frames WHERE timestamp = ?1 AND frame_number = ?2",
            params![timestamp, frame_number],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(frame_id) = existing {
        return Ok((frame_id, false));
    }
    conn.execute(
        "INSERT INTO Frames (timestamp, frame_number) VALUES (?1, ?2)",
        params![timestamp, frame_number],
    )?;
    Ok((conn.last_insert_rowid(), true))
}

/// In-memory databases and URIs have no files to delete.
fn is_memory_path(path: &Path) -> bool {
    let raw = path.to_string_lossy();
    raw == ":memory:" || raw.starts_with("file:")
}

fn remove_store_files(db_path: &Path) -> Result<()> {
    let mut targets = vec![db_path.to_path_buf()];
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut side = db_path.as_os_str().to_owned();
        side.push(suffix);
        targets.push(side.into());
    }
    for target in targets {
        match std::fs::remove_file(&target) {
            Ok(()) => log::debug!("store: removed {}", target.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("removing {}", target.display()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ClassEntry;
    use crate::detect::BoundingBox;

    fn catalog() -> ClassCatalog {
        ClassCatalog::new(vec![
            ClassEntry {
                class_id: 0,
                class_name: "person".to_string(),
            },
            ClassEntry {
                class_id: 14,
                class_name: "bird".to_string(),
            },
        ])
    }

    fn record(class_name: &str, timestamp_ms: i64, frame_number: i64) -> DetectionRecord {
        DetectionRecord {
            class_name: class_name.to_string(),
            confidence: 0.5,
            bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0),
            timestamp_ms,
            frame_number,
        }
    }

    #[test]
    fn shared_frame_key_produces_one_frame_row() -> Result<()> {
        let mut store = DetectionStore::open_in_memory()?;
        let stats = store.populate(
            &catalog(),
            vec![record("bird", 1000, 5), record("bird", 1000, 5)],
        )?;
        assert_eq!(stats.frames_inserted, 1);
        assert_eq!(stats.objects, 2);
        assert_eq!(store.frame_count()?, 1);
        assert_eq!(
            store.frames()?,
            vec![FrameRow {
                frame_id: 1,
                timestamp: "1000".to_string(),
                frame_number: 5,
            }]
        );
        Ok(())
    }

    #[test]
    fn distinct_frame_keys_produce_distinct_rows() -> Result<()> {
        let mut store = DetectionStore::open_in_memory()?;
        store.populate(
            &catalog(),
            vec![record("bird", 1000, 5), record("bird", 1200, 6)],
        )?;
        assert_eq!(store.frame_count()?, 2);
        assert_eq!(store.object_count()?, 2);
        Ok(())
    }

    #[test]
    fn existing_frame_row_is_reused() -> Result<()> {
        let mut store = DetectionStore::open_in_memory()?;
        store.conn.execute(
            "INSERT INTO Frames (timestamp, frame_number) VALUES ('1000', 5)",
            [],
        )?;
        let stats = store.populate(&catalog(), vec![record("bird", 1000, 5)])?;
        assert_eq!(stats.frames_reused, 1);
        assert_eq!(stats.frames_inserted, 0);
        assert_eq!(store.frame_count()?, 1);
        assert_eq!(store.objects()?[0].frame_id, 1);
        Ok(())
    }

    #[test]
    fn unknown_class_rolls_back_everything() -> Result<()> {
        let mut store = DetectionStore::open_in_memory()?;
        let err = store
            .populate(
                &catalog(),
                vec![record("bird", 0, 0), record("heron", 500, 1)],
            )
            .err()
            .expect("expected error");
        assert!(matches!(
            err.downcast_ref::<BirdcountError>(),
            Some(BirdcountError::UnknownClassName { class_name }) if class_name == "heron"
        ));
        assert_eq!(store.class_count()?, 0);
        assert_eq!(store.frame_count()?, 0);
        assert_eq!(store.object_count()?, 0);
        Ok(())
    }

    #[test]
    fn objects_keep_coordinates_and_references() -> Result<()> {
        let mut store = DetectionStore::open_in_memory()?;
        store.populate(&catalog(), vec![record("person", 40, 2)])?;
        let objects = store.objects()?;
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].class_id, 0);
        assert_eq!(objects[0].bounding_box, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(objects[0].confidence, 0.5);
        assert_eq!(store.dangling_object_count()?, 0);
        Ok(())
    }

    #[test]
    fn foreign_keys_are_enforced() -> Result<()> {
        let store = DetectionStore::open_in_memory()?;
        let result = store.conn.execute(
            r#"
            INSERT INTO Objects (class_id, frame_id,
              bounding_box_coordinate_0, bounding_box_coordinate_1,
              bounding_box_coordinate_2, bounding_box_coordinate_3, confidence)
            VALUES (99, 99, 0, 0, 1, 1, 0.5)
            "#,
            [],
        );
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn groups_are_inserted_in_key_order() -> Result<()> {
        let mut store = DetectionStore::open_in_memory()?;
        store.populate(
            &catalog(),
            vec![
                record("bird", 10_000, 3),
                record("bird", 900, 1),
                record("bird", 2_000, 2),
            ],
        )?;
        let order: Vec<(String, i64)> = store
            .frames()?
            .into_iter()
            .map(|f| (f.timestamp, f.frame_number))
            .collect();
        assert_eq!(
            order,
            vec![
                ("900".to_string(), 1),
                ("2000".to_string(), 2),
                ("10000".to_string(), 3)
            ]
        );
        Ok(())
    }

    #[test]
    fn shared_memory_store_is_visible_to_second_connection() -> Result<()> {
        let uri = crate::shared_memory_uri();
        let mut store = DetectionStore::reinitialize(Path::new(&uri))?;
        store.populate(&catalog(), vec![record("bird", 3000, 1)])?;

        let reader = DetectionStore::open(Path::new(&uri))?;
        assert_eq!(reader.object_count()?, 1);
        assert_eq!(reader.frames()?[0].timestamp, "3000");
        Ok(())
    }

    #[test]
    fn reinitialize_discards_prior_rows() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db_path = dir.path().join("nested").join("birds.db");
        {
            let mut store = DetectionStore::reinitialize(&db_path)?;
            store.populate(&catalog(), vec![record("bird", 0, 0)])?;
        }
        {
            let store = DetectionStore::open(&db_path)?;
            assert_eq!(store.object_count()?, 1);
        }
        let store = DetectionStore::reinitialize(&db_path)?;
        assert_eq!(store.class_count()?, 0);
        assert_eq!(store.object_count()?, 0);
        Ok(())
    }
}
