//! Command-line interface.
//!
//! ```bash
//! # Scan ~/Photos, move duplicates to ~/Photos_duplicates
//! dupestash ~/Photos
//!
//! # Show what would move, as JSON
//! dupestash --dry-run --json ~/Photos
//!
//! # Throw away the previous index and hash with 4 threads
//! dupestash --fresh --hash-threads 4 ~/Photos
//! ```

use bytesize::ByteSize;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

/// Find files with identical content and move the extra copies into a
/// mirrored sibling directory.
///
/// The first run hashes every file under TARGET and stores the results in
/// `<TARGET>.db` next to it; later runs reuse that index. For each set of
/// identical files the one with the lexicographically smallest path stays,
/// the others move to `<TARGET>_duplicates/<same relative path>`.
#[derive(Debug, Parser)]
#[command(name = "dupestash")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory to deduplicate
    #[arg(value_name = "TARGET")]
    pub target: PathBuf,

    /// Base name for the index file and duplicates directory
    /// (default: TARGET's own name)
    #[arg(short, long, value_name = "NAME")]
    pub name: Option<String>,

    /// Delete the existing index first and rescan
    #[arg(long)]
    pub fresh: bool,

    /// Plan relocations without moving anything
    #[arg(long)]
    pub dry_run: bool,

    /// Number of hashing threads (default: 1)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    pub hash_threads: Option<u16>,

    /// Read size per hashing chunk, e.g. 64KiB or 1MiB (minimum 4KiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_chunk_size)]
    pub chunk_size: Option<usize>,

    /// Follow symbolic links during the scan
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Read settings from this TOML file instead of the default location
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Suffix of the duplicates directory (default: _duplicates)
    #[arg(long, value_name = "SUFFIX")]
    pub suffix: Option<String>,

    /// Print the kept → relocated mapping as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,

    /// Report errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,

    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// The configuration keys a command line can override.
///
/// Unset fields are skipped so lower configuration layers show through.
#[derive(Debug, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    hash_threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    follow_symlinks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip_hidden: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duplicates_suffix: Option<String>,
}

impl Cli {
    /// Overrides for the configuration layers.
    ///
    /// Boolean flags only override when given; their absence keeps the
    /// configured value.
    #[must_use]
    pub fn config_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            hash_threads: self.hash_threads.map(usize::from),
            chunk_size: self.chunk_size,
            follow_symlinks: self.follow_symlinks.then_some(true),
            skip_hidden: self.skip_hidden.then_some(true),
            duplicates_suffix: self.suffix.clone(),
        }
    }

    /// Whether progress bars should be drawn.
    #[must_use]
    pub fn show_progress(&self) -> bool {
        !(self.quiet || self.no_progress || self.json)
    }
}

/// Parse a human-readable chunk size such as `64KiB`, `1 MiB` or `65536`.
///
/// # Errors
///
/// Returns an error for unparsable input or a zero size.
pub fn parse_chunk_size(s: &str) -> Result<usize, String> {
    let size: ByteSize = s
        .trim()
        .parse()
        .map_err(|e| format!("Invalid size '{}': {}", s, e))?;
    let bytes = usize::try_from(size.as_u64()).map_err(|_| format!("Size too large: '{}'", s))?;
    if bytes == 0 {
        return Err("Size cannot be zero".to_string());
    }
    Ok(bytes)
}
