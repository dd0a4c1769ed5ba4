use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{Peak, Quad, QuadId, QuadRow, RecordId};

/// Read side of the catalog as the matcher sees it: resolve a range-query
/// hit back to its stored quad, fetch reference peaks near an offset, and
/// resolve record titles.
pub trait Catalog {
    fn quad_row(&self, quad_id: QuadId) -> Result<Option<QuadRow>>;

    /// Reference peaks of `record_id` with `x_lo <= x <= x_hi`, sorted by
    /// `x`, then `y`.
    fn peaks_between(&self, record_id: RecordId, x_lo: i64, x_hi: i64) -> Result<Vec<Peak>>;

    fn title(&self, record_id: RecordId) -> Result<Option<String>>;
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS records (
        id INTEGER PRIMARY KEY,
        title TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS quads (
        quadid INTEGER PRIMARY KEY,
        recordid INTEGER NOT NULL REFERENCES records(id),
        ax INTEGER NOT NULL,
        ay INTEGER NOT NULL,
        cx INTEGER NOT NULL,
        cy INTEGER NOT NULL,
        dx INTEGER NOT NULL,
        dy INTEGER NOT NULL,
        bx INTEGER NOT NULL,
        \"by\" INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS peaks (
        recordid INTEGER NOT NULL REFERENCES records(id),
        x INTEGER NOT NULL,
        y INTEGER NOT NULL,
        PRIMARY KEY (recordid, x, y)
    ) WITHOUT ROWID;
";

/// SQLite-backed catalog holding records, their un-normalized quads, and
/// their reference peaks. Writes happen once per record, inside one
/// transaction; afterwards the tables are only read.
pub struct SqliteCatalog {
    conn: Connection,
}

impl SqliteCatalog {
    /// Opens (or creates) a catalog at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// An ephemeral catalog; used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteCatalog { conn })
    }

    pub fn record_id_by_title(&self, title: &str) -> Result<Option<RecordId>> {
        let id = self
            .conn
            .query_row("SELECT id FROM records WHERE title = ?1", params![title], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(id)
    }

    /// Stores one record: its title, every reference peak, and every
    /// selected quad, atomically. Returns the new record id and the quad
    /// ids in the order the quads were given, or `None` when the title is
    /// already present (a soft error; nothing is written).
    pub fn store_record(
        &mut self,
        title: &str,
        peaks: &[Peak],
        quads: &[Quad],
    ) -> Result<Option<(RecordId, Vec<QuadId>)>> {
        if self.record_id_by_title(title)?.is_some() {
            log::warn!("record exists: {title:?}");
            return Ok(None);
        }

        let tx = self.conn.transaction()?;
        tx.execute("INSERT INTO records (title) VALUES (?1)", params![title])?;
        let record_id = tx.last_insert_rowid();

        let mut quad_ids = Vec::with_capacity(quads.len());
        {
            let mut insert_peak =
                tx.prepare("INSERT INTO peaks (recordid, x, y) VALUES (?1, ?2, ?3)")?;
            for p in peaks {
                insert_peak.execute(params![record_id, p.x, p.y])?;
            }

            let mut insert_quad = tx.prepare(
                "INSERT INTO quads (recordid, ax, ay, cx, cy, dx, dy, bx, \"by\")
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for q in quads {
                insert_quad.execute(params![
                    record_id, q.a.x, q.a.y, q.c.x, q.c.y, q.d.x, q.d.y, q.b.x, q.b.y
                ])?;
                quad_ids.push(tx.last_insert_rowid());
            }
        }
        tx.commit()?;

        log::info!(
            "stored {title:?} as record {record_id}: {} peaks, {} quads",
            peaks.len(),
            quads.len()
        );
        Ok(Some((record_id, quad_ids)))
    }

    /// Streams every stored quad; the engine bulk-loads the spatial index
    /// from this on open.
    pub fn for_each_quad(&self, mut f: impl FnMut(QuadId, &Quad)) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "SELECT quadid, ax, ay, cx, cy, dx, dy, bx, \"by\" FROM quads ORDER BY quadid",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let quad_id: QuadId = row.get(0)?;
            let quad = Quad::new(
                Peak::new(row.get(1)?, row.get(2)?),
                Peak::new(row.get(3)?, row.get(4)?),
                Peak::new(row.get(5)?, row.get(6)?),
                Peak::new(row.get(7)?, row.get(8)?),
            );
            f(quad_id, &quad);
        }
        Ok(())
    }

    pub fn record_count(&self) -> Result<u64> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

impl Catalog for SqliteCatalog {
    fn quad_row(&self, quad_id: QuadId) -> Result<Option<QuadRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT recordid, ax, ay, cx, cy, dx, dy, bx, \"by\"
                 FROM quads WHERE quadid = ?1",
                params![quad_id],
                |row| {
                    Ok(QuadRow {
                        quad_id,
                        record_id: row.get(0)?,
                        quad: Quad::new(
                            Peak::new(row.get(1)?, row.get(2)?),
                            Peak::new(row.get(3)?, row.get(4)?),
                            Peak::new(row.get(5)?, row.get(6)?),
                            Peak::new(row.get(7)?, row.get(8)?),
                        ),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn peaks_between(&self, record_id: RecordId, x_lo: i64, x_hi: i64) -> Result<Vec<Peak>> {
        let mut stmt = self.conn.prepare(
            "SELECT x, y FROM peaks
             WHERE recordid = ?1 AND x BETWEEN ?2 AND ?3
             ORDER BY x, y",
        )?;
        let peaks = stmt
            .query_map(params![record_id, x_lo, x_hi], |row| {
                Ok(Peak::new(row.get(0)?, row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(peaks)
    }

    fn title(&self, record_id: RecordId) -> Result<Option<String>> {
        let title = self
            .conn
            .query_row("SELECT title FROM records WHERE id = ?1", params![record_id], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(title)
    }
}
