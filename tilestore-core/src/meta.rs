//! Dataset metadata: an open string-keyed map persisted as the single row
//! of the `info` table
//!
//! The column set of the on-disk table equals whatever key set was last
//! stored, so the map is the source of truth and the typed accessors below
//! are mere parse/format wrappers. A missing or unparsable key reads as
//! `None`; callers fall back to their documented defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known metadata keys, spelled the way legacy datasets spell them
pub mod keys {
    pub const TITLE: &str = "title";
    pub const RULE: &str = "rule";
    pub const REFERER: &str = "referer";
    pub const USER_AGENT: &str = "useragent";
    pub const RANDOMS: &str = "randoms";
    pub const URL: &str = "url";
    pub const MIN_ZOOM: &str = "minzoom";
    pub const MAX_ZOOM: &str = "maxzoom";
    pub const ELLIPSOID: &str = "ellipsoid";
    pub const INVERTED_Y: &str = "inverted_y";
    pub const TIME_COLUMN: &str = "timecolumn";
    pub const EXPIRE_MINUTES: &str = "expireminutes";
    pub const TILE_NUMBERING: &str = "tilenumbering";
    pub const TILE_SIZE: &str = "tilesize";
}

/// Metadata describing one tile dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Meta {
    /// Raw key/value pairs; keys become `info` table columns on store
    pub values: BTreeMap<String, String>,
}

impl Meta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw string value for a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Set a raw string value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key)?.trim().parse().ok()
    }

    fn set_i64(&mut self, key: &str, value: i64) {
        self.set(key, value.to_string());
    }

    pub fn title(&self) -> Option<&str> {
        self.get(keys::TITLE)
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.set(keys::TITLE, title);
    }

    pub fn rule(&self) -> Option<&str> {
        self.get(keys::RULE)
    }

    pub fn set_rule(&mut self, rule: impl Into<String>) {
        self.set(keys::RULE, rule);
    }

    pub fn referer(&self) -> Option<&str> {
        self.get(keys::REFERER)
    }

    pub fn set_referer(&mut self, referer: impl Into<String>) {
        self.set(keys::REFERER, referer);
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.get(keys::USER_AGENT)
    }

    pub fn set_user_agent(&mut self, user_agent: impl Into<String>) {
        self.set(keys::USER_AGENT, user_agent);
    }

    pub fn randoms(&self) -> Option<&str> {
        self.get(keys::RANDOMS)
    }

    pub fn set_randoms(&mut self, randoms: impl Into<String>) {
        self.set(keys::RANDOMS, randoms);
    }

    /// Download URL template; its presence classifies the dataset as an
    /// online cache rather than a curated offline extract
    pub fn url(&self) -> Option<&str> {
        self.get(keys::URL)
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.set(keys::URL, url);
    }

    /// Declared minimum zoom, in the dataset's own zoom numbering
    pub fn min_zoom(&self) -> Option<i64> {
        self.get_i64(keys::MIN_ZOOM)
    }

    pub fn set_min_zoom(&mut self, min_zoom: i64) {
        self.set_i64(keys::MIN_ZOOM, min_zoom);
    }

    /// Declared maximum zoom, in the dataset's own zoom numbering
    pub fn max_zoom(&self) -> Option<i64> {
        self.get_i64(keys::MAX_ZOOM)
    }

    pub fn set_max_zoom(&mut self, max_zoom: i64) {
        self.set_i64(keys::MAX_ZOOM, max_zoom);
    }

    pub fn ellipsoid(&self) -> Option<i64> {
        self.get_i64(keys::ELLIPSOID)
    }

    pub fn set_ellipsoid(&mut self, ellipsoid: i64) {
        self.set_i64(keys::ELLIPSOID, ellipsoid);
    }

    /// Non-zero means rows are stored with a TMS (bottom-origin) Y axis
    pub fn inverted_y(&self) -> Option<i64> {
        self.get_i64(keys::INVERTED_Y)
    }

    pub fn set_inverted_y(&mut self, inverted_y: i64) {
        self.set_i64(keys::INVERTED_Y, inverted_y);
    }

    /// `"yes"` (case-insensitive) means the `time` column carries data
    pub fn time_column(&self) -> Option<&str> {
        self.get(keys::TIME_COLUMN)
    }

    pub fn set_time_column(&mut self, time_column: impl Into<String>) {
        self.set(keys::TIME_COLUMN, time_column);
    }

    pub fn expire_minutes(&self) -> Option<i64> {
        self.get_i64(keys::EXPIRE_MINUTES)
    }

    pub fn set_expire_minutes(&mut self, expire_minutes: i64) {
        self.set_i64(keys::EXPIRE_MINUTES, expire_minutes);
    }

    /// Zoom numbering scheme name; absent means the legacy default
    pub fn tile_numbering(&self) -> Option<&str> {
        self.get(keys::TILE_NUMBERING)
    }

    pub fn set_tile_numbering(&mut self, tile_numbering: impl Into<String>) {
        self.set(keys::TILE_NUMBERING, tile_numbering);
    }

    pub fn tile_size(&self) -> Option<i64> {
        self.get_i64(keys::TILE_SIZE)
    }

    pub fn set_tile_size(&mut self, tile_size: i64) {
        self.set_i64(keys::TILE_SIZE, tile_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let mut meta = Meta::new();
        assert!(meta.is_empty());
        assert_eq!(meta.min_zoom(), None);

        meta.set_min_zoom(4);
        meta.set_max_zoom(17);
        meta.set_url("https://tiles.example.com/{z}/{x}/{y}.png");
        meta.set_inverted_y(1);

        assert_eq!(meta.min_zoom(), Some(4));
        assert_eq!(meta.max_zoom(), Some(17));
        assert_eq!(meta.inverted_y(), Some(1));
        assert!(meta.url().unwrap().starts_with("https://"));
        assert_eq!(meta.get("minzoom"), Some("4"));
    }

    #[test]
    fn test_unparsable_integer_reads_as_none() {
        let mut meta = Meta::new();
        meta.set(keys::MIN_ZOOM, "not-a-number");
        assert_eq!(meta.min_zoom(), None);

        meta.set(keys::MAX_ZOOM, " 12 ");
        assert_eq!(meta.max_zoom(), Some(12));
    }
}
