use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Inspect and maintain tilestore databases", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print metadata, zoom range and coverage as JSON
    Info {
        /// Tile database file
        database: PathBuf,
    },

    /// Read one tile payload
    Get {
        database: PathBuf,
        x: i32,
        y: i32,
        zoom: u8,

        /// Payload-set discriminator
        #[arg(long, default_value_t = 0)]
        specification: i64,

        /// Write the payload here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Store one tile payload from a file
    Put {
        database: PathBuf,
        x: i32,
        y: i32,
        zoom: u8,

        /// File holding the payload
        input: PathBuf,

        /// Payload-set discriminator
        #[arg(long, default_value_t = 0)]
        specification: i64,

        /// Freshness time in milliseconds since the Unix epoch; enables
        /// time support on the database if needed
        #[arg(long)]
        time: Option<i64>,
    },

    /// Remove one tile
    Remove {
        database: PathBuf,
        x: i32,
        y: i32,
        zoom: u8,

        /// Payload-set discriminator
        #[arg(long, default_value_t = 0)]
        specification: i64,
    },

    /// Remove every tile at one zoom level
    RemoveZoom {
        database: PathBuf,
        zoom: u8,
    },

    /// Remove tiles whose freshness time is older than the cutoff
    RemoveOlder {
        database: PathBuf,

        /// Cutoff in milliseconds since the Unix epoch
        cutoff: i64,
    },

    /// Remove every tile
    RemoveAll {
        database: PathBuf,
    },

    /// Merge tiles from another database, preferring newer payloads
    Merge {
        database: PathBuf,

        /// Database to merge from
        source: PathBuf,

        /// Specification column name in the source database
        #[arg(long)]
        specification_column: Option<String>,
    },

    /// Rewrite the database file to reclaim free space
    Vacuum {
        database: PathBuf,
    },
}
