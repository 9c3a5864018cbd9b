//! Schema evolution and maintenance operations
//!
//! The freshness (`time`) column is added lazily to existing stores;
//! specification support is schema-time only. Bulk import from another
//! store runs inside a single transaction and is the one operation with
//! cross-row atomicity.

use super::sql;
use super::{TileStore, UNKNOWN};
use crate::error::{Result, TileStoreError};
use rusqlite::Connection;
use std::path::Path;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn};

impl TileStore {
    /// Whether the physical schema has the freshness column
    pub fn has_time_column(&self) -> Result<bool> {
        self.with_conn(|conn| sql::column_exists(conn, "tiles", "time"))
    }

    /// Whether the store both declares and physically supports freshness
    /// times (`timecolumn=yes` in the metadata plus the actual column)
    pub fn is_tile_time_supported(&self) -> bool {
        let cached = self.cached_time_supported.load(Ordering::Acquire);
        if cached != UNKNOWN {
            return cached > 0;
        }
        if !self.is_opened() {
            return false;
        }

        let supported = match self.obtain_meta() {
            Ok(meta) => {
                meta.time_column()
                    .is_some_and(|value| value.eq_ignore_ascii_case("yes"))
                    && self.has_time_column().unwrap_or(false)
            }
            Err(_) => false,
        };

        self.cached_time_supported
            .store(i32::from(supported), Ordering::Release);
        supported
    }

    /// Migrate the schema to carry per-tile freshness times
    ///
    /// Adds the nullable `time` column only if absent, then records the
    /// capability in the metadata. Existing rows keep a NULL time. On
    /// migration failure the store stays usable, just without freshness
    /// support.
    pub fn enable_tile_time_support(&self, force: bool) -> Result<()> {
        if !self.is_opened() {
            return Err(TileStoreError::NotOpened);
        }
        if self.is_tile_time_supported() && !force {
            return Ok(());
        }

        if !self.has_time_column()? {
            self.with_conn(|conn| {
                conn.execute_batch("ALTER TABLE tiles ADD COLUMN time INTEGER")
                    .map_err(|e| {
                        error!(path = ?self.path(), error = %e, "failed to add time column");
                        TileStoreError::Migration(e.to_string())
                    })
            })?;
        }

        let mut meta = self.obtain_meta()?;
        meta.set_time_column("yes");
        self.store_meta(&meta)?;

        self.cached_time_supported.store(1, Ordering::Release);
        info!(path = ?self.path(), "enabled tile time support");
        Ok(())
    }

    /// Whether the physical schema has the specification column
    pub fn has_specification_column(&self) -> Result<bool> {
        self.with_conn(|conn| sql::column_exists(conn, "tiles", "variant"))
    }

    /// Whether tile keys may carry a non-zero specification
    pub fn is_tile_specification_supported(&self) -> bool {
        let cached = self.cached_specification_supported.load(Ordering::Acquire);
        if cached != UNKNOWN {
            return cached > 0;
        }
        if !self.is_opened() {
            return false;
        }

        let supported = self.has_specification_column().unwrap_or(false);
        self.cached_specification_supported
            .store(i32::from(supported), Ordering::Release);
        supported
    }

    /// Merge another store's rows into this one, preferring newer tiles
    ///
    /// All-or-nothing: the other database is attached, rows are merged in
    /// one transaction (replacing local rows only when the incoming tile
    /// carries a newer freshness time, inserting rows absent locally), and
    /// the attachment is dropped again. `specification_column` names the
    /// specification column in the attached database when its rows are
    /// discriminated; it requires specification support locally.
    pub fn update_tile_data_from(
        &self,
        path: &Path,
        specification_column: Option<&str>,
    ) -> Result<()> {
        if !self.is_opened() {
            return Err(TileStoreError::NotOpened);
        }
        if specification_column.is_some() && !self.is_tile_specification_supported() {
            return Err(TileStoreError::SpecificationNotSupported);
        }
        let time_supported = self.is_tile_time_supported();
        let specification_supported = self.is_tile_specification_supported();
        let path_text = path.to_string_lossy().into_owned();

        self.with_conn(|conn| {
            conn.execute("ATTACH DATABASE ?1 AS other", [path_text.as_str()])?;

            let merged = Self::merge_attached(
                conn,
                &path_text,
                time_supported,
                specification_supported,
                specification_column,
            );

            if let Err(e) = conn.execute_batch("DETACH DATABASE other") {
                warn!(path = %path_text, error = %e, "failed to detach merged database");
            }
            merged
        })?;

        self.recompute_min_max_zoom()?;
        self.recompute_bboxes31()?;

        info!(path = %path_text, "merged tile data");
        Ok(())
    }

    fn merge_attached(
        conn: &Connection,
        path_text: &str,
        time_supported: bool,
        specification_supported: bool,
        specification_column: Option<&str>,
    ) -> Result<()> {
        let merge_error = |reason: String| TileStoreError::Merge {
            path: path_text.to_string(),
            reason,
        };

        let other_column = |column: &str| -> Result<bool> {
            let mut stmt = conn.prepare("PRAGMA other.table_info(tiles)")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let name: String = row.get(1)?;
                if name == column {
                    return Ok(true);
                }
            }
            Ok(false)
        };

        if !other_column("image")? {
            return Err(merge_error("no tiles table in attached database".into()));
        }
        if let Some(column) = specification_column {
            if !other_column(column)? {
                return Err(merge_error(format!("no '{}' column in attached tiles", column)));
            }
        }
        let other_has_time = other_column("time")?;

        let (variant_insert, variant_select, variant_join) = match specification_column {
            Some(column) => (
                ", variant",
                format!(", o.{}", sql::quote_ident(column)),
                format!(" AND t.variant = o.{}", sql::quote_ident(column)),
            ),
            None if specification_supported => ("", String::new(), " AND t.variant = 0".into()),
            None => ("", String::new(), String::new()),
        };

        let merge = if time_supported && other_has_time {
            format!(
                "INSERT OR REPLACE INTO main.tiles (x, y, z{variant_insert}, image, time)
                 SELECT o.x, o.y, o.z{variant_select}, o.image, o.time
                 FROM other.tiles AS o
                 LEFT JOIN main.tiles AS t
                   ON t.x = o.x AND t.y = o.y AND t.z = o.z{variant_join}
                 WHERE t.x IS NULL OR IFNULL(o.time, 0) > IFNULL(t.time, 0)"
            )
        } else {
            format!(
                "INSERT OR IGNORE INTO main.tiles (x, y, z{variant_insert}, image)
                 SELECT o.x, o.y, o.z{variant_select}, o.image FROM other.tiles AS o"
            )
        };

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(&merge)?;
        tx.commit()?;

        Ok(())
    }

    /// Reclaim free space by rewriting the whole database file
    ///
    /// Blocking; intended for maintenance windows, not the hot path.
    pub fn compact(&self) -> Result<()> {
        if !self.is_opened() {
            return Err(TileStoreError::NotOpened);
        }

        info!(path = ?self.path(), "compacting tile store");
        self.with_conn(|conn| {
            conn.execute_batch("VACUUM")?;
            Ok(())
        })
    }
}
