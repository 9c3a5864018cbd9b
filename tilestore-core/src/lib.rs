//! tilestore-core - Tile-Addressed Persistent Cache Store
//!
//! An embedded, SQLite-backed key-value store mapping tile coordinates
//! `(x, y, zoom[, specification])` to opaque binary payloads (compressed
//! raster images, elevation grids, GIS-derived imagery), with a side
//! metadata table describing the dataset.
//!
//! # Architecture
//!
//! - **Coordinate transforms**: legacy on-disk conventions (TMS Y axis,
//!   BigPlanet zoom numbering) are declared in the metadata and applied
//!   transparently at the query boundary
//! - **Metadata**: a single-row, dynamic-column `info` table cached in
//!   memory and replaced wholesale on store
//! - **Derived caches**: zoom range and per-zoom bounding boxes, lazily
//!   recomputed and invalidated together under mutation
//! - **Maintenance**: lazy freshness-column migration and selective
//!   compaction driven by dataset provenance
//!
//! Payload bytes are never interpreted; producers (raster pipelines, tile
//! downloaders) and consumers (tile providers feeding a renderer) agree on
//! the format out of band.

pub mod meta;
pub mod store;
pub mod transform;

mod error;
mod types;

pub use error::{Result, TileStoreError};
pub use meta::Meta;
pub use store::TileStore;
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
