mod args;

use anyhow::{bail, Context};
use args::{Args, Command};
use clap::Parser;
use serde_json::json;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tilestore_core::{TileKey, TileStore};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    match Args::parse().command {
        Command::Info { database } => info(&database),
        Command::Get {
            database,
            x,
            y,
            zoom,
            specification,
            output,
        } => get(&database, x, y, zoom, specification, output.as_deref()),
        Command::Put {
            database,
            x,
            y,
            zoom,
            input,
            specification,
            time,
        } => put(&database, x, y, zoom, &input, specification, time),
        Command::Remove {
            database,
            x,
            y,
            zoom,
            specification,
        } => with_store(&database, false, |store| {
            let key = TileKey::new(x, y, zoom).with_specification(specification);
            store.remove_tile_data(&key)?;
            Ok(())
        }),
        Command::RemoveZoom { database, zoom } => with_store(&database, false, |store| {
            store.remove_tiles_data_at_zoom(zoom)?;
            Ok(())
        }),
        Command::RemoveOlder { database, cutoff } => with_store(&database, false, |store| {
            store.remove_older_tiles_data(cutoff)?;
            Ok(())
        }),
        Command::RemoveAll { database } => with_store(&database, false, |store| {
            store.remove_all_tiles_data()?;
            Ok(())
        }),
        Command::Merge {
            database,
            source,
            specification_column,
        } => with_store(&database, specification_column.is_some(), |store| {
            store.update_tile_data_from(&source, specification_column.as_deref())?;
            Ok(())
        }),
        Command::Vacuum { database } => with_store(&database, false, |store| {
            store.compact()?;
            Ok(())
        }),
    }
}

/// Open the store, run one operation, close without compaction
fn with_store(
    database: &Path,
    with_specification: bool,
    op: impl FnOnce(&TileStore) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let store = TileStore::new(database);
    store
        .open(with_specification)
        .with_context(|| format!("opening {}", database.display()))?;
    let result = op(&store);
    store.close(false)?;
    result
}

fn info(database: &Path) -> anyhow::Result<()> {
    with_store(database, false, |store| {
        let meta = store.obtain_meta()?;
        let min_zoom = store.get_min_zoom();
        let max_zoom = store.get_max_zoom();

        let per_zoom: serde_json::Map<String, serde_json::Value> = (min_zoom..=max_zoom)
            .filter_map(|zoom| {
                store
                    .get_zoom_bbox31(zoom)
                    .map(|bbox| (zoom.to_string(), json!(bbox)))
            })
            .collect();

        let report = json!({
            "path": database.display().to_string(),
            "meta": meta,
            "min_zoom": min_zoom,
            "max_zoom": max_zoom,
            "empty": store.is_empty()?,
            "time_supported": store.is_tile_time_supported(),
            "specification_supported": store.is_tile_specification_supported(),
            "bbox31": store.get_bbox31(),
            "zoom_bbox31": per_zoom,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    })
}

fn get(
    database: &Path,
    x: i32,
    y: i32,
    zoom: u8,
    specification: i64,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    with_store(database, specification != 0, |store| {
        let key = TileKey::new(x, y, zoom).with_specification(specification);
        let Some(record) = store.obtain_tile_data(&key)? else {
            bail!("no tile at {}/{}/{}", zoom, x, y);
        };
        match output {
            Some(path) => fs::write(path, &record.data)
                .with_context(|| format!("writing {}", path.display()))?,
            None => io::stdout().write_all(&record.data)?,
        }
        Ok(())
    })
}

fn put(
    database: &Path,
    x: i32,
    y: i32,
    zoom: u8,
    input: &Path,
    specification: i64,
    time: Option<i64>,
) -> anyhow::Result<()> {
    let data = fs::read(input).with_context(|| format!("reading {}", input.display()))?;

    with_store(database, specification != 0, |store| {
        if time.is_some() && !store.is_tile_time_supported() {
            store.enable_tile_time_support(false)?;
        }
        let key = TileKey::new(x, y, zoom).with_specification(specification);
        store.store_tile_data(&key, &data, time)?;
        Ok(())
    })
}
