//! The tile store: one SQLite-backed, tile-addressed persistent cache
//!
//! A [`TileStore`] owns a single connection bound to a filesystem path (or
//! held purely in memory), the cached dataset [`Meta`], and a set of
//! derived caches (zoom range, coordinate-convention flags, per-zoom
//! bounding boxes) that are lazily recomputed from the table and
//! invalidated together whenever the metadata is rewritten or the store is
//! reopened. All public operations are synchronous and may be called from
//! multiple threads.

mod crud;
mod maintenance;
pub(crate) mod sql;

use crate::error::{Result, TileStoreError};
use crate::meta::Meta;
use crate::transform;
use crate::types::{
    is_valid_zoom, BBox31, ZoomLevel, MAX_ZOOM_LEVEL, MIN_ZOOM_LEVEL, ZOOM_LEVELS_COUNT,
};
use parking_lot::{Mutex, RwLock};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use tracing::{error, info, warn};

/// Sentinel for "not yet computed" in the derived-scalar atomics
const UNKNOWN: i32 = i32::MIN;

/// Cached quantized bounding boxes, one per zoom plus the aggregate
#[derive(Debug, Clone)]
struct BBoxCache {
    overall: Option<BBox31>,
    per_zoom: [Option<BBox31>; ZOOM_LEVELS_COUNT],
}

impl BBoxCache {
    fn empty() -> Self {
        Self {
            overall: None,
            per_zoom: [None; ZOOM_LEVELS_COUNT],
        }
    }
}

/// SQLite-backed key-value store mapping tile coordinates to payloads
pub struct TileStore {
    path: Option<PathBuf>,

    conn: Mutex<Option<Connection>>,
    opened: AtomicBool,

    meta: Mutex<Option<Meta>>,

    // Derived scalars, UNKNOWN until first use after invalidation
    cached_min_zoom: AtomicI32,
    cached_max_zoom: AtomicI32,
    cached_inverted_zoom: AtomicI32,
    cached_inverted_y: AtomicI32,
    cached_time_supported: AtomicI32,
    cached_specification_supported: AtomicI32,

    bboxes: RwLock<BBoxCache>,
}

impl TileStore {
    /// Create a store bound to a database file; nothing is touched on disk
    /// until [`TileStore::open`]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_path(Some(path.into()))
    }

    /// Create a store held purely in memory
    pub fn in_memory() -> Self {
        Self::with_path(None)
    }

    fn with_path(path: Option<PathBuf>) -> Self {
        Self {
            path,
            conn: Mutex::new(None),
            opened: AtomicBool::new(false),
            meta: Mutex::new(None),
            cached_min_zoom: AtomicI32::new(UNKNOWN),
            cached_max_zoom: AtomicI32::new(UNKNOWN),
            cached_inverted_zoom: AtomicI32::new(UNKNOWN),
            cached_inverted_y: AtomicI32::new(UNKNOWN),
            cached_time_supported: AtomicI32::new(UNKNOWN),
            cached_specification_supported: AtomicI32::new(UNKNOWN),
            bboxes: RwLock::new(BBoxCache::empty()),
        }
    }

    /// Database file path, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_opened(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    /// Open the store, creating the schema if needed
    ///
    /// Idempotent; a second call on an opened store is a no-op.
    /// `with_specification` shapes the primary key as `(x, y, z, variant)`
    /// instead of `(x, y, z)`, but only when the `tiles` table is being
    /// created here; on a pre-existing table the flag is ignored and
    /// specification support is re-derived from the actual schema.
    pub fn open(&self, with_specification: bool) -> Result<()> {
        if self.is_opened() {
            return Ok(());
        }

        let mut guard = self.conn.lock();
        if guard.is_some() {
            return Ok(());
        }

        let conn = match &self.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        conn.execute_batch("PRAGMA encoding = 'UTF-8'")?;

        // Probe before DDL so an existing large dataset is not re-indexed
        let had_tiles = sql::table_exists(&conn, "tiles")?;
        let meta = if sql::table_exists(&conn, "info")? {
            Some(sql::read_meta(&conn)?)
        } else {
            None
        };

        let ddl_result = if with_specification && !had_tiles {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS tiles (
                    x INTEGER NOT NULL,
                    y INTEGER NOT NULL,
                    z INTEGER NOT NULL,
                    variant INTEGER NOT NULL DEFAULT 0,
                    image BLOB,
                    PRIMARY KEY (x, y, z, variant)
                )",
            )
        } else {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS tiles (
                    x INTEGER NOT NULL,
                    y INTEGER NOT NULL,
                    z INTEGER NOT NULL,
                    image BLOB,
                    PRIMARY KEY (x, y, z)
                )",
            )
            .and_then(|_| {
                if had_tiles {
                    Ok(())
                } else {
                    conn.execute_batch(
                        "CREATE INDEX IF NOT EXISTS tiles_xyz_index ON tiles (x, y, z)",
                    )
                }
            })
        };
        if let Err(e) = ddl_result {
            error!(path = ?self.path, error = %e, "failed to create tiles schema");
            return Err(e.into());
        }

        let specification_supported = sql::column_exists(&conn, "tiles", "variant")?;

        self.reset_derived_caches();
        self.cached_specification_supported
            .store(i32::from(specification_supported), Ordering::Release);
        *self.meta.lock() = meta;
        *guard = Some(conn);
        self.opened.store(true, Ordering::Release);

        info!(path = ?self.path, specification_supported, "opened tile store");
        Ok(())
    }

    /// Close the store
    ///
    /// Flushes the cached metadata back to disk, then compacts the file,
    /// but only when compaction was requested and the metadata declares a
    /// download `url`: offline/imported datasets are typically large and
    /// already well-packed, while online caches reclaim space from expired
    /// rows.
    pub fn close(&self, compact: bool) -> Result<()> {
        if !self.is_opened() {
            return Ok(());
        }

        let mut guard = self.conn.lock();
        let Some(conn) = guard.as_ref() else {
            return Ok(());
        };

        let meta = self.meta.lock().clone();
        if let Some(meta) = &meta {
            sql::write_meta(conn, meta)?;
        }

        let online = meta
            .as_ref()
            .and_then(|m| m.url())
            .is_some_and(|url| !url.is_empty());
        if compact && online {
            info!(path = ?self.path, "compacting online tile cache on close");
            conn.execute_batch("VACUUM")?;
        }

        self.reset_derived_caches();
        *self.meta.lock() = None;
        self.opened.store(false, Ordering::Release);
        *guard = None;

        info!(path = ?self.path, "closed tile store");
        Ok(())
    }

    /// Run a closure against the live connection
    ///
    /// The connection mutex is held for the duration of the closure; the
    /// closure must not re-enter any locking store method.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(TileStoreError::NotOpened)?;
        f(conn)
    }

    /// Clear every derived cache; the next access recomputes from disk
    fn reset_derived_caches(&self) {
        self.cached_min_zoom.store(UNKNOWN, Ordering::Release);
        self.cached_max_zoom.store(UNKNOWN, Ordering::Release);
        self.cached_inverted_zoom.store(UNKNOWN, Ordering::Release);
        self.cached_inverted_y.store(UNKNOWN, Ordering::Release);
        self.cached_time_supported.store(UNKNOWN, Ordering::Release);
        self.cached_specification_supported
            .store(UNKNOWN, Ordering::Release);
        *self.bboxes.write() = BBoxCache::empty();
    }

    // ---- metadata ----

    /// Dataset metadata, cached after the first read
    ///
    /// Absence of the `info` table is not an error and yields an empty map.
    pub fn obtain_meta(&self) -> Result<Meta> {
        if !self.is_opened() {
            return Err(TileStoreError::NotOpened);
        }

        if let Some(meta) = self.meta.lock().clone() {
            return Ok(meta);
        }

        let meta = self.with_conn(|conn| {
            if sql::table_exists(conn, "info")? {
                sql::read_meta(conn)
            } else {
                Ok(Meta::new())
            }
        })?;

        *self.meta.lock() = Some(meta.clone());
        Ok(meta)
    }

    /// Replace the on-disk metadata row and the in-memory cache
    ///
    /// The `info` table is rebuilt from the key set actually present.
    /// Every derived cache is invalidated, since zoom bounds and
    /// coordinate conventions may have changed.
    pub fn store_meta(&self, meta: &Meta) -> Result<()> {
        if !self.is_opened() {
            return Err(TileStoreError::NotOpened);
        }

        self.with_conn(|conn| sql::write_meta(conn, meta))?;
        *self.meta.lock() = Some(meta.clone());
        self.reset_derived_caches();
        // Specification support is schema-bound, not meta-bound; keep it
        if let Ok(has_column) = self.has_specification_column() {
            self.cached_specification_supported
                .store(i32::from(has_column), Ordering::Release);
        }

        Ok(())
    }

    /// Whether the dataset is classified as a cache of network-fetched
    /// tiles (metadata declares a download `url`)
    pub fn is_online_tile_source(&self) -> bool {
        self.obtain_meta()
            .ok()
            .and_then(|meta| meta.url().map(|url| !url.is_empty()))
            .unwrap_or(false)
    }

    // ---- coordinate-convention flags ----

    /// Zoom-numbering offset declared by the metadata; 0 means standard
    pub(crate) fn inverted_zoom(&self) -> i32 {
        let cached = self.cached_inverted_zoom.load(Ordering::Acquire);
        if cached != UNKNOWN {
            return cached;
        }

        let value = match self.obtain_meta() {
            Ok(meta) => {
                if let Some(name) = meta.tile_numbering() {
                    if name != transform::TILE_NUMBERING_BIG_PLANET {
                        warn!(numbering = name, "tile numbering scheme assumed standard");
                    }
                }
                transform::inverted_zoom_value(meta.tile_numbering())
            }
            // Historical default dataset convention
            Err(_) => transform::BIG_PLANET_INVERTED_ZOOM,
        };

        self.cached_inverted_zoom.store(value, Ordering::Release);
        value
    }

    /// Whether rows are stored with a bottom-origin (TMS) Y axis
    pub(crate) fn is_inverted_y(&self) -> bool {
        let cached = self.cached_inverted_y.load(Ordering::Acquire);
        if cached != UNKNOWN {
            return cached > 0;
        }

        let value = match self.obtain_meta() {
            Ok(meta) => i32::from(meta.inverted_y().unwrap_or(0) > 0),
            Err(_) => 0,
        };

        self.cached_inverted_y.store(value, Ordering::Release);
        value > 0
    }

    // ---- zoom range ----

    /// Smallest zoom the dataset declares, translated to logical numbering
    pub fn get_min_zoom(&self) -> ZoomLevel {
        let cached = self.cached_min_zoom.load(Ordering::Acquire);
        if cached != UNKNOWN {
            return cached as ZoomLevel;
        }

        let value = self.declared_zoom_bound(true);
        self.cached_min_zoom.store(i32::from(value), Ordering::Release);
        value
    }

    /// Largest zoom the dataset declares, translated to logical numbering
    pub fn get_max_zoom(&self) -> ZoomLevel {
        let cached = self.cached_max_zoom.load(Ordering::Acquire);
        if cached != UNKNOWN {
            return cached as ZoomLevel;
        }

        let value = self.declared_zoom_bound(false);
        self.cached_max_zoom.store(i32::from(value), Ordering::Release);
        value
    }

    /// Read one zoom bound from the metadata, falling back to the
    /// engine-wide extreme when either key is missing or out of range
    fn declared_zoom_bound(&self, lower: bool) -> ZoomLevel {
        let fallback = if lower { MIN_ZOOM_LEVEL } else { MAX_ZOOM_LEVEL };

        let Ok(meta) = self.obtain_meta() else {
            return fallback;
        };
        let (Some(declared_min), Some(declared_max)) = (meta.min_zoom(), meta.max_zoom()) else {
            return fallback;
        };

        let inverted_zoom = self.inverted_zoom();
        let value = if inverted_zoom > 0 {
            // The metadata carries the dataset's own (inverted) numbering
            i64::from(inverted_zoom) - if lower { declared_max } else { declared_min }
        } else if lower {
            declared_min
        } else {
            declared_max
        };

        if is_valid_zoom(value) {
            value as ZoomLevel
        } else {
            fallback
        }
    }

    /// Recompute the zoom range from the tile table and write it back into
    /// the metadata, so the declared and actual ranges never diverge
    pub fn recompute_min_max_zoom(&self) -> Result<()> {
        let (physical_min, physical_max) = self.with_conn(|conn| {
            Ok(conn.query_row("SELECT MIN(z), MAX(z) FROM tiles", [], |row| {
                Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, Option<i64>>(1)?))
            })?)
        })?;

        let mut meta = self.obtain_meta()?;
        let (logical_min, logical_max) = match (physical_min, physical_max) {
            (Some(physical_min), Some(physical_max)) => {
                // The metadata keeps the dataset's own numbering
                meta.set_min_zoom(physical_min);
                meta.set_max_zoom(physical_max);

                let inverted_zoom = self.inverted_zoom();
                let (lo, hi) = if inverted_zoom > 0 {
                    (physical_max, physical_min)
                } else {
                    (physical_min, physical_max)
                };
                (
                    transform::logical_zoom(lo, inverted_zoom).unwrap_or(MIN_ZOOM_LEVEL),
                    transform::logical_zoom(hi, inverted_zoom).unwrap_or(MAX_ZOOM_LEVEL),
                )
            }
            _ => {
                // No rows left: fall back to the full range
                meta.set_min_zoom(i64::from(MIN_ZOOM_LEVEL));
                meta.set_max_zoom(i64::from(MAX_ZOOM_LEVEL));
                (MIN_ZOOM_LEVEL, MAX_ZOOM_LEVEL)
            }
        };

        // Written directly: only the zoom keys changed, so the convention
        // flags and bounding-box caches stay valid
        self.with_conn(|conn| sql::write_meta(conn, &meta))?;
        *self.meta.lock() = Some(meta);

        self.cached_min_zoom
            .store(i32::from(logical_min), Ordering::Release);
        self.cached_max_zoom
            .store(i32::from(logical_max), Ordering::Release);

        Ok(())
    }

    // ---- bounding boxes ----

    /// Cached aggregate bounding box over all populated zooms
    pub fn get_bbox31(&self) -> Option<BBox31> {
        self.bboxes.read().overall
    }

    /// Cached bounding box of one zoom level
    pub fn get_zoom_bbox31(&self, zoom: ZoomLevel) -> Option<BBox31> {
        self.bboxes.read().per_zoom.get(zoom as usize).copied().flatten()
    }

    /// Cached per-zoom bounding boxes
    pub fn get_bboxes31(&self) -> [Option<BBox31>; ZOOM_LEVELS_COUNT] {
        self.bboxes.read().per_zoom
    }

    /// Recompute every per-zoom box and the aggregate, returning the
    /// aggregate
    pub fn recompute_bbox31(&self) -> Result<Option<BBox31>> {
        self.recompute_bboxes31()
    }

    /// Recompute the bounding box of one zoom from the table, then refresh
    /// the aggregate as the union of the cached boxes within the zoom range
    pub fn recompute_zoom_bbox31(&self, zoom: ZoomLevel) -> Result<Option<BBox31>> {
        if zoom > MAX_ZOOM_LEVEL {
            return Err(TileStoreError::InvalidZoom(zoom));
        }
        let inverted_y = self.is_inverted_y();
        let physical_z = transform::physical_zoom(zoom, self.inverted_zoom());

        let span = self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT MIN(x), MAX(x), MIN(y), MAX(y) FROM tiles WHERE z = ?1",
                [physical_z],
                |row| {
                    Ok((
                        row.get::<_, Option<i64>>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )?)
        })?;

        let bbox = match span {
            (Some(min_x), Some(max_x), Some(min_y), Some(max_y)) => Some(Self::tile_span_bbox31(
                zoom, inverted_y, min_x, max_x, min_y, max_y,
            )),
            _ => None,
        };

        let (min_zoom, max_zoom) = (self.get_min_zoom(), self.get_max_zoom());
        {
            let mut cache = self.bboxes.write();
            cache.per_zoom[zoom as usize] = bbox;

            cache.overall = None;
            for z in min_zoom..=max_zoom {
                cache.overall = BBox31::union(cache.overall, cache.per_zoom[z as usize]);
            }
        }

        Ok(bbox)
    }

    /// Recompute every populated zoom's bounding box with one grouped scan
    pub fn recompute_bboxes31(&self) -> Result<Option<BBox31>> {
        let inverted_y = self.is_inverted_y();
        let inverted_zoom = self.inverted_zoom();

        let mut per_zoom = [None; ZOOM_LEVELS_COUNT];
        let mut overall = None;

        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT z, MIN(x), MAX(x), MIN(y), MAX(y) FROM tiles GROUP BY z")?;
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let physical_z: i64 = row.get(0)?;
                let Some(zoom) = transform::logical_zoom(physical_z, inverted_zoom) else {
                    warn!(physical_z, "skipping zoom outside representable range");
                    continue;
                };

                let min_x: i64 = row.get(1)?;
                let max_x: i64 = row.get(2)?;
                let min_y: i64 = row.get(3)?;
                let max_y: i64 = row.get(4)?;
                if min_x < 0 || min_y < 0 {
                    warn!(zoom, "skipping negative tile coordinates");
                    continue;
                }

                let bbox =
                    Self::tile_span_bbox31(zoom, inverted_y, min_x, max_x, min_y, max_y);
                per_zoom[zoom as usize] = Some(bbox);
                overall = BBox31::union(overall, Some(bbox));
            }
            Ok(())
        })?;

        let mut cache = self.bboxes.write();
        cache.per_zoom = per_zoom;
        cache.overall = overall;

        Ok(overall)
    }

    /// Quantize a physical-row tile span into the shared 31-bit space,
    /// restoring top-origin Y ordering first when the store is inverted
    fn tile_span_bbox31(
        zoom: ZoomLevel,
        inverted_y: bool,
        min_x: i64,
        max_x: i64,
        mut min_y: i64,
        mut max_y: i64,
    ) -> BBox31 {
        if inverted_y {
            min_y = i64::from(transform::invert_y(min_y as i32, zoom));
            max_y = i64::from(transform::invert_y(max_y as i32, zoom));
            std::mem::swap(&mut min_y, &mut max_y);
        }
        BBox31::from_tile_span(zoom, min_x as i32, max_x as i32, min_y as i32, max_y as i32)
    }
}

impl Drop for TileStore {
    fn drop(&mut self) {
        if self.is_opened() {
            if let Err(e) = self.close(false) {
                warn!(path = ?self.path, error = %e, "failed to close tile store on drop");
            }
        }
    }
}
