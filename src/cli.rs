//! Command-line interface definitions.
//!
//! Defines the argument parser and subcommands using clap's derive API.
//! Each subcommand corresponds to a distinct operation: previewing what would
//! move into the catalog, applying the migration, inspecting an existing
//! catalog, or listing scan targets.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Move inline Gradle dependency and plugin versions into a version catalog.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

/// Where to look for build scripts.
#[derive(Debug, ClapArgs)]
pub struct ScanArgs {
    /// Paths to scan. Defaults to current directory.
    #[arg(short, long)]
    pub paths: Option<Vec<PathBuf>>,

    /// Glob patterns for directories/files to exclude (e.g., "buildSrc", "*.gradle").
    /// By default, entries starting with `.` are excluded.
    #[arg(short, long)]
    pub exclude: Vec<String>,

    /// Disable default exclusion of `.` prefixed entries.
    #[arg(long)]
    pub no_default_excludes: bool,
}

/// What to write and where.
#[derive(Debug, ClapArgs)]
pub struct CatalogArgs {
    /// Catalog to merge into. Defaults to the first `libs.versions.toml` found,
    /// else `gradle/libs.versions.toml` under the first scanned path.
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Catalog accessor used in rewritten build scripts.
    #[arg(long, default_value = "libs", value_parser = parse_alias)]
    pub alias: String,

    /// Error log location. Defaults to `catalog-errors.log` next to the catalog.
    #[arg(long)]
    pub log: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan build scripts and report the catalog entries and version keys they would produce.
    Detect {
        #[command(flatten)]
        scan: ScanArgs,

        #[command(flatten)]
        catalog: CatalogArgs,

        /// Emit JSON instead of human-readable output.
        #[arg(long)]
        json: bool,

        /// Print additional diagnostics to stderr.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Write the catalog and rewrite build scripts to reference it.
    Apply {
        #[command(flatten)]
        scan: ScanArgs,

        #[command(flatten)]
        catalog: CatalogArgs,

        /// Print the catalog and replacements without writing anything.
        #[arg(long)]
        dry_run: bool,

        /// Interactively confirm each file's changes before applying.
        #[arg(short, long)]
        interactive: bool,

        /// Emit the run report as JSON.
        #[arg(long)]
        json: bool,

        /// Print additional diagnostics to stderr.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the sections of an existing catalog.
    Catalog {
        /// Catalog file. Defaults to the first `libs.versions.toml` under the current directory.
        path: Option<PathBuf>,
    },

    /// List files that would be scanned without processing them.
    Scan {
        #[command(flatten)]
        scan: ScanArgs,
    },
}

fn parse_alias(s: &str) -> Result<String, String> {
    let valid = s
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(format!(
            "Invalid catalog alias '{}', expected an identifier like 'libs'",
            s
        ));
    }
    Ok(s.to_string())
}
