//! Tile read/write/delete operations
//!
//! Every operation translates logical coordinates through the store's
//! coordinate-convention flags before touching SQL, and triggers the
//! targeted derived-cache recompute afterwards. Batch operations chunk
//! their id lists to respect SQLite's bound-parameter limit; on error a
//! batch is partially applied (only the merge in `maintenance` is
//! transactional).

use super::sql::BATCH_CHUNK_SIZE;
use super::TileStore;
use crate::error::{Result, TileStoreError};
use crate::transform;
use crate::types::{BBox31, TileId, TileKey, TileRecord, ZoomLevel, MAX_ZOOM_LEVEL, MIN_ZOOM_LEVEL};
use rusqlite::{params, OptionalExtension};
use tracing::info;

/// A tile row in physical (on-disk) addressing
struct PhysicalKey {
    x: i32,
    y: i32,
    z: i32,
    specification: Option<i64>,
}

impl TileStore {
    fn require_open(&self) -> Result<()> {
        if self.is_opened() {
            Ok(())
        } else {
            Err(TileStoreError::NotOpened)
        }
    }

    fn zoom_in_range(&self, zoom: ZoomLevel) -> bool {
        zoom >= self.get_min_zoom() && zoom <= self.get_max_zoom()
    }

    /// Reject zoom values outside the representable 0..=31 range
    fn checked_zoom(&self, zoom: ZoomLevel) -> Result<()> {
        if zoom > MAX_ZOOM_LEVEL {
            Err(TileStoreError::InvalidZoom(zoom))
        } else {
            Ok(())
        }
    }

    /// Gate a specification value against the store's schema
    fn checked_specification(&self, specification: i64) -> Result<Option<i64>> {
        if self.is_tile_specification_supported() {
            Ok(Some(specification))
        } else if specification != 0 {
            Err(TileStoreError::SpecificationNotSupported)
        } else {
            Ok(None)
        }
    }

    /// Translate a logical key into the on-disk row encoding
    fn physical_key(&self, key: &TileKey) -> Result<PhysicalKey> {
        self.checked_zoom(key.zoom)?;
        let specification = self.checked_specification(key.specification)?;
        let y = if self.is_inverted_y() {
            transform::invert_y(key.y, key.zoom)
        } else {
            key.y
        };
        let z = transform::physical_zoom(key.zoom, self.inverted_zoom());
        Ok(PhysicalKey {
            x: key.x,
            y,
            z,
            specification,
        })
    }

    /// Whether the store holds no tiles at all
    pub fn is_empty(&self) -> Result<bool> {
        self.require_open()?;
        self.with_conn(|conn| {
            let row = conn
                .query_row("SELECT 1 FROM tiles LIMIT 1", [], |_| Ok(()))
                .optional()?;
            Ok(row.is_none())
        })
    }

    /// Whether a payload exists for the key
    ///
    /// A zoom outside the declared range short-circuits to `false`.
    pub fn contains_tile_data(&self, key: &TileKey) -> Result<bool> {
        self.require_open()?;
        if !self.zoom_in_range(key.zoom) {
            return Ok(false);
        }
        let row = self.physical_key(key)?;

        self.with_conn(|conn| {
            let found = match row.specification {
                Some(specification) => conn
                    .query_row(
                        "SELECT 1 FROM tiles WHERE x = ?1 AND y = ?2 AND z = ?3 AND variant = ?4 LIMIT 1",
                        params![row.x, row.y, row.z, specification],
                        |_| Ok(()),
                    )
                    .optional()?,
                None => conn
                    .query_row(
                        "SELECT 1 FROM tiles WHERE x = ?1 AND y = ?2 AND z = ?3 LIMIT 1",
                        params![row.x, row.y, row.z],
                        |_| Ok(()),
                    )
                    .optional()?,
            };
            Ok(found.is_some())
        })
    }

    /// Freshness time of a stored tile
    ///
    /// `None` when the store has no time support, the row is missing, or
    /// the row predates time support (NULL is never coerced to 0).
    pub fn obtain_tile_time(&self, key: &TileKey) -> Result<Option<i64>> {
        self.require_open()?;
        if !self.is_tile_time_supported() || !self.zoom_in_range(key.zoom) {
            return Ok(None);
        }
        let row = self.physical_key(key)?;

        self.with_conn(|conn| {
            let time: Option<Option<i64>> = match row.specification {
                Some(specification) => conn
                    .query_row(
                        "SELECT time FROM tiles WHERE x = ?1 AND y = ?2 AND z = ?3 AND variant = ?4",
                        params![row.x, row.y, row.z, specification],
                        |r| r.get(0),
                    )
                    .optional()?,
                None => conn
                    .query_row(
                        "SELECT time FROM tiles WHERE x = ?1 AND y = ?2 AND z = ?3",
                        params![row.x, row.y, row.z],
                        |r| r.get(0),
                    )
                    .optional()?,
            };
            Ok(time.flatten())
        })
    }

    /// Payload and freshness time for the key, or `None` when absent
    pub fn obtain_tile_data(&self, key: &TileKey) -> Result<Option<TileRecord>> {
        self.require_open()?;
        if !self.zoom_in_range(key.zoom) {
            return Ok(None);
        }
        let time_supported = self.is_tile_time_supported();
        let row = self.physical_key(key)?;

        self.with_conn(|conn| {
            let mut select = String::from(if time_supported {
                "SELECT image, time FROM tiles WHERE x = ?1 AND y = ?2 AND z = ?3"
            } else {
                "SELECT image FROM tiles WHERE x = ?1 AND y = ?2 AND z = ?3"
            });
            let record = if let Some(specification) = row.specification {
                select.push_str(" AND variant = ?4");
                conn.query_row(&select, params![row.x, row.y, row.z, specification], |r| {
                    let data: Option<Vec<u8>> = r.get(0)?;
                    let time: Option<i64> = if time_supported { r.get(1)? } else { None };
                    Ok(TileRecord::new(data.unwrap_or_default(), time))
                })
                .optional()?
            } else {
                conn.query_row(&select, params![row.x, row.y, row.z], |r| {
                    let data: Option<Vec<u8>> = r.get(0)?;
                    let time: Option<i64> = if time_supported { r.get(1)? } else { None };
                    Ok(TileRecord::new(data.unwrap_or_default(), time))
                })
                .optional()?
            };
            Ok(record)
        })
    }

    /// Copy a tile payload into a caller-provided buffer
    ///
    /// Returns whether the tile was found; the buffer is cleared first.
    pub fn read_tile_data(&self, key: &TileKey, out: &mut Vec<u8>) -> Result<bool> {
        match self.obtain_tile_data(key)? {
            Some(record) => {
                out.clear();
                out.extend_from_slice(&record.data);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Insert or replace a tile payload
    ///
    /// The freshness time is bound only when the store has time support.
    /// Widens the cached zoom range if needed and recomputes the touched
    /// zoom's bounding box.
    pub fn store_tile_data(&self, key: &TileKey, data: &[u8], time: Option<i64>) -> Result<()> {
        self.require_open()?;
        let time_supported = self.is_tile_time_supported();
        let row = self.physical_key(key)?;

        self.with_conn(|conn| {
            match (row.specification, time_supported) {
                (Some(specification), true) => conn.execute(
                    "INSERT OR REPLACE INTO tiles (x, y, z, variant, image, time)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![row.x, row.y, row.z, specification, data, time],
                )?,
                (Some(specification), false) => conn.execute(
                    "INSERT OR REPLACE INTO tiles (x, y, z, variant, image)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![row.x, row.y, row.z, specification, data],
                )?,
                (None, true) => conn.execute(
                    "INSERT OR REPLACE INTO tiles (x, y, z, image, time)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![row.x, row.y, row.z, data, time],
                )?,
                (None, false) => conn.execute(
                    "INSERT OR REPLACE INTO tiles (x, y, z, image)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![row.x, row.y, row.z, data],
                )?,
            };
            Ok(())
        })?;

        // First write into an undeclared range seeds the metadata bounds
        let declared = self
            .obtain_meta()
            .map(|meta| meta.min_zoom().is_some() && meta.max_zoom().is_some())
            .unwrap_or(false);
        if !declared || !self.zoom_in_range(key.zoom) {
            self.recompute_min_max_zoom()?;
        }
        self.recompute_zoom_bbox31(key.zoom)?;

        Ok(())
    }

    /// Remove one tile
    pub fn remove_tile_data(&self, key: &TileKey) -> Result<()> {
        self.require_open()?;
        let row = self.physical_key(key)?;

        self.with_conn(|conn| {
            match row.specification {
                Some(specification) => conn.execute(
                    "DELETE FROM tiles WHERE x = ?1 AND y = ?2 AND z = ?3 AND variant = ?4",
                    params![row.x, row.y, row.z, specification],
                )?,
                None => conn.execute(
                    "DELETE FROM tiles WHERE x = ?1 AND y = ?2 AND z = ?3",
                    params![row.x, row.y, row.z],
                )?,
            };
            Ok(())
        })?;

        self.recompute_min_max_zoom()?;
        self.recompute_zoom_bbox31(key.zoom)?;

        Ok(())
    }

    /// Remove every tile in the store
    pub fn remove_all_tiles_data(&self) -> Result<()> {
        self.require_open()?;
        info!(path = ?self.path(), "removing all tiles");

        self.with_conn(|conn| {
            conn.execute("DELETE FROM tiles", [])?;
            Ok(())
        })?;

        self.recompute_min_max_zoom()?;
        self.recompute_bboxes31()?;

        Ok(())
    }

    /// Remove every tile at one zoom level
    pub fn remove_tiles_data_at_zoom(&self, zoom: ZoomLevel) -> Result<()> {
        self.require_open()?;
        self.checked_zoom(zoom)?;
        let z = transform::physical_zoom(zoom, self.inverted_zoom());

        self.with_conn(|conn| {
            conn.execute("DELETE FROM tiles WHERE z = ?1", [z])?;
            Ok(())
        })?;

        self.recompute_min_max_zoom()?;
        self.recompute_zoom_bbox31(zoom)?;

        Ok(())
    }

    /// Remove every tile above the given zoom level
    pub fn remove_bigger_tiles_data(&self, zoom: ZoomLevel) -> Result<()> {
        self.require_open()?;
        self.checked_zoom(zoom)?;
        let inverted_zoom = self.inverted_zoom();
        let z = transform::physical_zoom(zoom, inverted_zoom);
        // With inverted numbering, larger logical zooms sit below the pivot
        let delete = if inverted_zoom > 0 {
            "DELETE FROM tiles WHERE z < ?1"
        } else {
            "DELETE FROM tiles WHERE z > ?1"
        };

        self.with_conn(|conn| {
            conn.execute(delete, [z])?;
            Ok(())
        })?;

        self.recompute_min_max_zoom()?;
        self.recompute_bboxes31()?;

        Ok(())
    }

    /// Remove a list of tiles at one zoom, chunked per statement
    pub fn remove_tiles_data_by_ids(
        &self,
        ids: &[TileId],
        zoom: ZoomLevel,
        specification: i64,
    ) -> Result<()> {
        self.require_open()?;
        self.checked_zoom(zoom)?;
        if ids.is_empty() {
            return Ok(());
        }
        let specification = self.checked_specification(specification)?;
        let inverted_y = self.is_inverted_y();
        let z = transform::physical_zoom(zoom, self.inverted_zoom());

        for chunk in ids.chunks(BATCH_CHUNK_SIZE) {
            let mut values: Vec<i64> = Vec::with_capacity(chunk.len() * 2 + 2);
            values.push(i64::from(z));
            for id in chunk {
                values.push(i64::from(id.x));
                let y = if inverted_y {
                    transform::invert_y(id.y, zoom)
                } else {
                    id.y
                };
                values.push(i64::from(y));
            }

            let tuples = vec!["(?, ?)"; chunk.len()].join(", ");
            let mut delete = format!(
                "DELETE FROM tiles WHERE z = ? AND (x, y) IN (VALUES {})",
                tuples
            );
            if let Some(specification) = specification {
                delete.push_str(" AND variant = ?");
                values.push(specification);
            }

            self.with_conn(|conn| {
                conn.execute(&delete, rusqlite::params_from_iter(values.iter()))?;
                Ok(())
            })?;
        }

        self.recompute_min_max_zoom()?;
        self.recompute_zoom_bbox31(zoom)?;

        Ok(())
    }

    /// Remove tiles whose freshness time is older than the cutoff
    ///
    /// Rows without freshness info (NULL time) are kept.
    pub fn remove_older_tiles_data(&self, cutoff: i64) -> Result<()> {
        self.require_open()?;
        if !self.is_tile_time_supported() {
            return Ok(());
        }

        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM tiles WHERE time IS NOT NULL AND time < ?1",
                [cutoff],
            )?;
            Ok(())
        })?;

        self.recompute_min_max_zoom()?;
        self.recompute_bboxes31()?;

        Ok(())
    }

    /// Remove every tile carrying exactly the given specification
    pub fn remove_specific_tiles_data(&self, specification: i64) -> Result<()> {
        self.require_open()?;
        if !self.is_tile_specification_supported() {
            return Err(TileStoreError::SpecificationNotSupported);
        }

        self.with_conn(|conn| {
            conn.execute("DELETE FROM tiles WHERE variant = ?1", [specification])?;
            Ok(())
        })?;

        self.recompute_min_max_zoom()?;
        self.recompute_bboxes31()?;

        Ok(())
    }

    /// Remove payload generations older than the given specification
    pub fn remove_previous_tiles_data(&self, specification: i64) -> Result<()> {
        self.require_open()?;
        if !self.is_tile_specification_supported() {
            return Err(TileStoreError::SpecificationNotSupported);
        }

        self.with_conn(|conn| {
            conn.execute("DELETE FROM tiles WHERE variant < ?1", [specification])?;
            Ok(())
        })?;

        self.recompute_min_max_zoom()?;
        self.recompute_bboxes31()?;

        Ok(())
    }

    /// Remove tiles covered by a quantized box at one zoom
    ///
    /// `strict` shifts the near (top/left) bounds in by one row, so tiles
    /// touching that boundary survive; non-strict instead extends the far
    /// bounds by one row. The quantization mirrors the tile-span
    /// quantization used when the boxes were computed.
    pub fn remove_tiles_data_in_bbox(
        &self,
        bbox31: &BBox31,
        zoom: ZoomLevel,
        strict: bool,
    ) -> Result<()> {
        self.require_open()?;

        self.delete_bbox_rows(bbox31, zoom, strict)?;

        self.recompute_min_max_zoom()?;
        self.recompute_zoom_bbox31(zoom)?;

        Ok(())
    }

    /// Remove tiles covered by a quantized box at every zoom level
    pub fn remove_tiles_data_in_bbox_all_zooms(&self, bbox31: &BBox31, strict: bool) -> Result<()> {
        self.require_open()?;

        for zoom in MIN_ZOOM_LEVEL..=MAX_ZOOM_LEVEL {
            self.delete_bbox_rows(bbox31, zoom, strict)?;
        }

        self.recompute_min_max_zoom()?;
        self.recompute_bboxes31()?;

        Ok(())
    }

    fn delete_bbox_rows(&self, bbox31: &BBox31, zoom: ZoomLevel, strict: bool) -> Result<()> {
        self.checked_zoom(zoom)?;
        let shift = u32::from(31 - zoom);
        // A full-extent box dequantizes to one past the last tile row, so
        // the edge arithmetic runs in i64. The far bounds clamp to the
        // zoom's grid; the near bounds may legitimately fall one past it,
        // which makes the range empty under strictness.
        let last_row = (1i64 << zoom) - 1;
        let edge = i64::from(strict);
        let mut top = ((i64::from(bbox31.top) >> shift) + edge).max(0);
        let left = ((i64::from(bbox31.left) >> shift) + edge).max(0);
        let mut bottom = ((i64::from(bbox31.bottom) >> shift) + (1 - edge)).min(last_row);
        let right = ((i64::from(bbox31.right) >> shift) + (1 - edge)).min(last_row);

        if self.is_inverted_y() {
            top = last_row - top;
            bottom = last_row - bottom;
            std::mem::swap(&mut top, &mut bottom);
        }
        let z = transform::physical_zoom(zoom, self.inverted_zoom());

        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM tiles WHERE y >= ?1 AND x >= ?2 AND y <= ?3 AND x <= ?4 AND z = ?5",
                params![top, left, bottom, right, z],
            )?;
            Ok(())
        })?;

        Ok(())
    }

    /// Logical ids of every tile at one zoom
    pub fn get_tile_ids(&self, zoom: ZoomLevel, specification: i64) -> Result<Vec<TileId>> {
        self.require_open()?;
        self.checked_zoom(zoom)?;
        let specification = self.checked_specification(specification)?;
        let inverted_y = self.is_inverted_y();
        let z = transform::physical_zoom(zoom, self.inverted_zoom());

        self.with_conn(|conn| {
            let mut select = String::from("SELECT x, y FROM tiles WHERE z = ?1");
            if specification.is_some() {
                select.push_str(" AND variant = ?2");
            }
            let mut stmt = conn.prepare(&select)?;

            let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<TileId> {
                let x: i32 = row.get(0)?;
                let y: i32 = row.get(1)?;
                Ok(TileId::new(x, if inverted_y { transform::invert_y(y, zoom) } else { y }))
            };
            let rows = match specification {
                Some(specification) => stmt.query_map(params![z, specification], map_row)?,
                None => stmt.query_map(params![z], map_row)?,
            };

            let mut ids = Vec::new();
            for id in rows {
                ids.push(id?);
            }
            Ok(ids)
        })
    }

    /// Total payload size in bytes of the given tiles, chunked per query
    pub fn get_tiles_size(
        &self,
        ids: &[TileId],
        zoom: ZoomLevel,
        specification: i64,
    ) -> Result<u64> {
        self.require_open()?;
        self.checked_zoom(zoom)?;
        if ids.is_empty() {
            return Ok(0);
        }
        let specification = self.checked_specification(specification)?;
        let inverted_y = self.is_inverted_y();
        let z = transform::physical_zoom(zoom, self.inverted_zoom());

        let mut total: u64 = 0;
        for chunk in ids.chunks(BATCH_CHUNK_SIZE) {
            let mut values: Vec<i64> = Vec::with_capacity(chunk.len() * 2 + 2);
            values.push(i64::from(z));
            for id in chunk {
                values.push(i64::from(id.x));
                let y = if inverted_y {
                    transform::invert_y(id.y, zoom)
                } else {
                    id.y
                };
                values.push(i64::from(y));
            }

            let tuples = vec!["(?, ?)"; chunk.len()].join(", ");
            let mut select = format!(
                "SELECT SUM(LENGTH(image)) FROM tiles WHERE z = ? AND (x, y) IN (VALUES {})",
                tuples
            );
            if let Some(specification) = specification {
                select.push_str(" AND variant = ?");
                values.push(specification);
            }

            let size: Option<i64> = self.with_conn(|conn| {
                Ok(conn.query_row(&select, rusqlite::params_from_iter(values.iter()), |row| {
                    row.get(0)
                })?)
            })?;
            total += size.unwrap_or(0).max(0) as u64;
        }

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Meta;
    use crate::types::MAX_ZOOM_LEVEL;
    use tempfile::TempDir;

    /// Store with standard numbering and top-origin Y, so physical rows
    /// equal logical coordinates
    fn plain_store() -> TileStore {
        let store = TileStore::in_memory();
        store.open(false).unwrap();
        let mut meta = Meta::new();
        meta.set_tile_numbering("OSM");
        store.store_meta(&meta).unwrap();
        store
    }

    #[test]
    fn test_round_trip_default_settings() {
        // Scenario: default store, no specification, no inversion flags
        let store = TileStore::in_memory();
        store.open(false).unwrap();

        let key = TileKey::new(5, 3, 4);
        store.store_tile_data(&key, &[0x01, 0x02], None).unwrap();

        assert!(store.contains_tile_data(&key).unwrap());
        let record = store.obtain_tile_data(&key).unwrap().unwrap();
        assert_eq!(record.data, vec![0x01, 0x02]);
        assert_eq!(record.time, None);

        assert_eq!(store.get_min_zoom(), 4);
        assert_eq!(store.get_max_zoom(), 4);
        assert!(!store.is_empty().unwrap());
    }

    #[test]
    fn test_missing_tile_reads_as_none() {
        let store = plain_store();
        let key = TileKey::new(1, 2, 3);
        store.store_tile_data(&key, b"x", None).unwrap();

        assert!(!store.contains_tile_data(&TileKey::new(2, 2, 3)).unwrap());
        assert!(store
            .obtain_tile_data(&TileKey::new(2, 2, 3))
            .unwrap()
            .is_none());

        let mut buf = vec![0xAA];
        assert!(!store.read_tile_data(&TileKey::new(2, 2, 3), &mut buf).unwrap());
        assert!(store.read_tile_data(&key, &mut buf).unwrap());
        assert_eq!(buf, b"x");
    }

    #[test]
    fn test_out_of_declared_range_reads_false() {
        let store = plain_store();
        let mut meta = store.obtain_meta().unwrap();
        meta.set_min_zoom(4);
        meta.set_max_zoom(6);
        store.store_meta(&meta).unwrap();

        // Never queried: zoom 2 is outside the declared range
        assert!(!store.contains_tile_data(&TileKey::new(0, 0, 2)).unwrap());
        assert!(store.obtain_tile_data(&TileKey::new(0, 0, 2)).unwrap().is_none());
    }

    #[test]
    fn test_specifications_coexist_per_cell() {
        // Scenario: two payload sets sharing one geographic cell
        let store = TileStore::in_memory();
        store.open(true).unwrap();
        assert!(store.is_tile_specification_supported());

        let a = TileKey::new(1, 1, 2).with_specification(10);
        let b = TileKey::new(1, 1, 2).with_specification(20);
        store.store_tile_data(&a, b"A", None).unwrap();
        store.store_tile_data(&b, b"B", None).unwrap();

        assert_eq!(store.obtain_tile_data(&a).unwrap().unwrap().data, b"A");
        assert_eq!(store.obtain_tile_data(&b).unwrap().unwrap().data, b"B");

        store.remove_specific_tiles_data(10).unwrap();
        assert!(store.obtain_tile_data(&a).unwrap().is_none());
        assert_eq!(store.obtain_tile_data(&b).unwrap().unwrap().data, b"B");
    }

    #[test]
    fn test_remove_previous_specifications() {
        let store = TileStore::in_memory();
        store.open(true).unwrap();

        for specification in [10, 20, 30] {
            let key = TileKey::new(0, 0, 1).with_specification(specification);
            store.store_tile_data(&key, b"v", None).unwrap();
        }
        store.remove_previous_tiles_data(30).unwrap();

        assert!(store
            .obtain_tile_data(&TileKey::new(0, 0, 1).with_specification(10))
            .unwrap()
            .is_none());
        assert!(store
            .obtain_tile_data(&TileKey::new(0, 0, 1).with_specification(30))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_specification_rejected_without_column() {
        let store = plain_store();
        let key = TileKey::new(0, 0, 1).with_specification(7);
        let err = store.store_tile_data(&key, b"x", None).unwrap_err();
        assert!(matches!(err, TileStoreError::SpecificationNotSupported));

        let err = store.remove_specific_tiles_data(7).unwrap_err();
        assert!(matches!(err, TileStoreError::SpecificationNotSupported));
    }

    #[test]
    fn test_inverted_y_physical_row() {
        // Scenario: inverted_y dataset, logical y=2 at zoom 3 lands on row 5
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("inverted.sqlite");

        let store = TileStore::new(&path);
        store.open(false).unwrap();
        let mut meta = Meta::new();
        meta.set_tile_numbering("OSM");
        meta.set_inverted_y(1);
        store.store_meta(&meta).unwrap();

        let key = TileKey::new(4, 2, 3);
        store.store_tile_data(&key, b"tile", None).unwrap();
        assert_eq!(store.obtain_tile_data(&key).unwrap().unwrap().data, b"tile");
        store.close(false).unwrap();

        let conn = rusqlite::Connection::open(&path).unwrap();
        let y: i64 = conn
            .query_row("SELECT y FROM tiles WHERE x = 4 AND z = 3", [], |r| r.get(0))
            .unwrap();
        assert_eq!(y, 5);
    }

    #[test]
    fn test_round_trip_under_legacy_conventions() {
        // BigPlanet numbering (absent tilenumbering key) plus inverted Y
        let store = TileStore::in_memory();
        store.open(false).unwrap();
        let mut meta = Meta::new();
        meta.set_inverted_y(1);
        store.store_meta(&meta).unwrap();

        let key = TileKey::new(9, 6, 5);
        store.store_tile_data(&key, b"payload", None).unwrap();
        assert_eq!(
            store.obtain_tile_data(&key).unwrap().unwrap().data,
            b"payload"
        );
        assert_eq!(store.get_min_zoom(), 5);
        assert_eq!(store.get_max_zoom(), 5);

        // The row is stored in the dataset's own numbering: z = 17 - 5
        let ids = store.get_tile_ids(5, 0).unwrap();
        assert_eq!(ids, vec![TileId::new(9, 6)]);
    }

    #[test]
    fn test_zoom_range_follows_stores_and_deletes() {
        let store = plain_store();

        store
            .store_tile_data(&TileKey::new(0, 0, 3), b"a", None)
            .unwrap();
        store
            .store_tile_data(&TileKey::new(0, 0, 9), b"b", None)
            .unwrap();
        assert_eq!(store.get_min_zoom(), 3);
        assert_eq!(store.get_max_zoom(), 9);

        store.remove_tile_data(&TileKey::new(0, 0, 3)).unwrap();
        assert_eq!(store.get_min_zoom(), 9);
        assert_eq!(store.get_max_zoom(), 9);

        store.remove_all_tiles_data().unwrap();
        assert!(store.is_empty().unwrap());
        assert_eq!(store.get_min_zoom(), MIN_ZOOM_LEVEL);
        assert_eq!(store.get_max_zoom(), MAX_ZOOM_LEVEL);
    }

    #[test]
    fn test_remove_at_zoom_and_bigger() {
        let store = plain_store();
        for zoom in [2u8, 4, 6] {
            store
                .store_tile_data(&TileKey::new(1, 1, zoom), b"z", None)
                .unwrap();
        }

        store.remove_tiles_data_at_zoom(4).unwrap();
        assert!(store.obtain_tile_data(&TileKey::new(1, 1, 4)).unwrap().is_none());
        assert!(store.obtain_tile_data(&TileKey::new(1, 1, 2)).unwrap().is_some());

        store.remove_bigger_tiles_data(2).unwrap();
        assert!(store.obtain_tile_data(&TileKey::new(1, 1, 6)).unwrap().is_none());
        assert!(store.obtain_tile_data(&TileKey::new(1, 1, 2)).unwrap().is_some());
    }

    #[test]
    fn test_batched_id_removal_spans_chunks() {
        let store = plain_store();
        let zoom = 9;
        let mut ids = Vec::new();
        for x in 0..60 {
            for y in 0..25 {
                ids.push(TileId::new(x, y));
                store
                    .store_tile_data(&TileKey::new(x, y, zoom), b"t", None)
                    .unwrap();
            }
        }
        assert!(ids.len() > BATCH_CHUNK_SIZE);

        store.remove_tiles_data_by_ids(&ids, zoom, 0).unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_tile_ids_and_sizes() {
        let store = plain_store();
        store
            .store_tile_data(&TileKey::new(1, 1, 4), &[0u8; 10], None)
            .unwrap();
        store
            .store_tile_data(&TileKey::new(2, 1, 4), &[0u8; 32], None)
            .unwrap();
        store
            .store_tile_data(&TileKey::new(0, 0, 5), &[0u8; 100], None)
            .unwrap();

        let mut ids = store.get_tile_ids(4, 0).unwrap();
        ids.sort_by_key(|id| (id.x, id.y));
        assert_eq!(ids, vec![TileId::new(1, 1), TileId::new(2, 1)]);

        let size = store.get_tiles_size(&ids, 4, 0).unwrap();
        assert_eq!(size, 42);

        // Ids absent from the table contribute nothing
        let size = store
            .get_tiles_size(&[TileId::new(9, 9)], 4, 0)
            .unwrap();
        assert_eq!(size, 0);
    }

    #[test]
    fn test_bbox_recompute_matches_tile_span() {
        let store = plain_store();
        store
            .store_tile_data(&TileKey::new(5, 3, 4), b"a", None)
            .unwrap();
        store
            .store_tile_data(&TileKey::new(6, 4, 4), b"b", None)
            .unwrap();

        let expected = BBox31::from_tile_span(4, 5, 6, 3, 4);
        assert_eq!(store.get_zoom_bbox31(4), Some(expected));

        // Idempotent: recomputing without intervening writes changes nothing
        let first = store.recompute_bboxes31().unwrap();
        let second = store.recompute_bboxes31().unwrap();
        assert_eq!(first, second);
        assert_eq!(store.get_zoom_bbox31(4), Some(expected));
        assert_eq!(store.get_bbox31(), Some(expected));
    }

    #[test]
    fn test_aggregate_bbox_unions_zooms() {
        let store = plain_store();
        store
            .store_tile_data(&TileKey::new(1, 1, 3), b"a", None)
            .unwrap();
        store
            .store_tile_data(&TileKey::new(10, 10, 6), b"b", None)
            .unwrap();

        let z3 = BBox31::from_tile_span(3, 1, 1, 1, 1);
        let z6 = BBox31::from_tile_span(6, 10, 10, 10, 10);
        assert_eq!(store.get_zoom_bbox31(3), Some(z3));
        assert_eq!(store.get_zoom_bbox31(6), Some(z6));
        assert_eq!(store.get_bbox31(), Some(z3.enlarged_to_include(&z6)));
    }

    #[test]
    fn test_bbox_removal_strictness() {
        // Scenario: a box spanning tiles 8..=10 at zoom 5; strict keeps the
        // near-edge row, non-strict takes the boundary as well
        let bbox = BBox31::from_tile_span(5, 8, 10, 8, 10);

        let strict = plain_store();
        for x in 7..=11 {
            for y in 7..=11 {
                strict
                    .store_tile_data(&TileKey::new(x, y, 5), b"t", None)
                    .unwrap();
            }
        }
        strict.remove_tiles_data_in_bbox(&bbox, 5, true).unwrap();
        assert!(strict.contains_tile_data(&TileKey::new(7, 7, 5)).unwrap());
        assert!(strict.contains_tile_data(&TileKey::new(8, 8, 5)).unwrap());
        assert!(!strict.contains_tile_data(&TileKey::new(9, 9, 5)).unwrap());
        assert!(!strict.contains_tile_data(&TileKey::new(10, 10, 5)).unwrap());
        assert!(strict.contains_tile_data(&TileKey::new(11, 11, 5)).unwrap());

        let loose = plain_store();
        for x in 7..=11 {
            for y in 7..=11 {
                loose
                    .store_tile_data(&TileKey::new(x, y, 5), b"t", None)
                    .unwrap();
            }
        }
        loose.remove_tiles_data_in_bbox(&bbox, 5, false).unwrap();
        assert!(loose.contains_tile_data(&TileKey::new(7, 7, 5)).unwrap());
        assert!(!loose.contains_tile_data(&TileKey::new(8, 8, 5)).unwrap());
        assert!(!loose.contains_tile_data(&TileKey::new(11, 11, 5)).unwrap());
    }

    #[test]
    fn test_bbox_removal_all_zooms() {
        let store = plain_store();
        store
            .store_tile_data(&TileKey::new(2, 2, 2), b"a", None)
            .unwrap();
        store
            .store_tile_data(&TileKey::new(9, 9, 5), b"b", None)
            .unwrap();

        // A box covering everything, non-strict
        let bbox = BBox31::new(0, 0, i32::MAX, i32::MAX);
        store.remove_tiles_data_in_bbox_all_zooms(&bbox, false).unwrap();
        assert!(store.is_empty().unwrap());
        assert_eq!(store.get_bbox31(), None);
    }

    #[test]
    fn test_full_extent_bbox_removal_at_deepest_zoom() {
        // The full box dequantizes one past the last row at zoom 31, which
        // must not wrap the bound arithmetic
        let bbox = BBox31::new(0, 0, i32::MAX, i32::MAX);

        let store = plain_store();
        store
            .store_tile_data(&TileKey::new(0, 0, 31), b"corner", None)
            .unwrap();
        store
            .store_tile_data(&TileKey::new(i32::MAX, i32::MAX, 31), b"far", None)
            .unwrap();
        store.remove_tiles_data_in_bbox(&bbox, 31, false).unwrap();
        assert!(store.is_empty().unwrap());

        // Strict shifts the near bounds in by one row, keeping the origin
        // corner and still reaching the far one
        let store = plain_store();
        store
            .store_tile_data(&TileKey::new(0, 0, 31), b"corner", None)
            .unwrap();
        store
            .store_tile_data(&TileKey::new(i32::MAX, i32::MAX, 31), b"far", None)
            .unwrap();
        store.remove_tiles_data_in_bbox(&bbox, 31, true).unwrap();
        assert!(store.contains_tile_data(&TileKey::new(0, 0, 31)).unwrap());
        assert!(!store
            .contains_tile_data(&TileKey::new(i32::MAX, i32::MAX, 31))
            .unwrap());
    }

    #[test]
    fn test_full_extent_bbox_removal_inverted_y() {
        let store = TileStore::in_memory();
        store.open(false).unwrap();
        let mut meta = Meta::new();
        meta.set_tile_numbering("OSM");
        meta.set_inverted_y(1);
        store.store_meta(&meta).unwrap();

        store
            .store_tile_data(&TileKey::new(1, 1, 31), b"deep", None)
            .unwrap();
        let bbox = BBox31::new(0, 0, i32::MAX, i32::MAX);
        store.remove_tiles_data_in_bbox(&bbox, 31, false).unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_strict_edge_sliver_removes_nothing() {
        // A one-tile-high box on the grid's bottom edge has no interior,
        // so strict removal must leave the edge row alone
        let store = plain_store();
        store
            .store_tile_data(&TileKey::new(3, 3, 2), b"edge", None)
            .unwrap();

        let bbox = BBox31::from_tile_span(2, 3, 3, 3, 3);
        store.remove_tiles_data_in_bbox(&bbox, 2, true).unwrap();
        assert!(store.contains_tile_data(&TileKey::new(3, 3, 2)).unwrap());
    }

    #[test]
    fn test_zoom_above_range_is_rejected() {
        let store = plain_store();
        let bbox = BBox31::new(0, 0, 100, 100);

        let err = store
            .remove_tiles_data_in_bbox(&bbox, 40, true)
            .unwrap_err();
        assert!(matches!(err, TileStoreError::InvalidZoom(40)));

        let err = store.remove_tiles_data_at_zoom(40).unwrap_err();
        assert!(matches!(err, TileStoreError::InvalidZoom(40)));

        let err = store.get_tile_ids(40, 0).unwrap_err();
        assert!(matches!(err, TileStoreError::InvalidZoom(40)));

        let err = store
            .store_tile_data(&TileKey::new(0, 0, 40), b"x", None)
            .unwrap_err();
        assert!(matches!(err, TileStoreError::InvalidZoom(40)));
    }
}
