//! gradle-catalog: Move inline Gradle versions into a version catalog.
//!
//! This tool scans Gradle build scripts for dependency and plugin declarations
//! with literal versions, merges them into `libs.versions.toml`, and rewrites
//! the scripts to reference the catalog instead.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Args, CatalogArgs, Commands, ScanArgs};
use colored::Colorize;
use dialoguer::Confirm;
use gradle_catalog::ErrorLog;
use gradle_catalog::catalog;
use gradle_catalog::declaration::Declaration;
use gradle_catalog::pipeline::{self, Phase, RunOptions, RunStatus};
use gradle_catalog::reconciler::{KeyCollision, MergeStats};
use gradle_catalog::rewriter::FileBundle;
use gradle_catalog::scanner::{self, CATALOG_FILE_NAME, FileScan, ScanTargets, offset_to_line_col};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tracing_subscriber::EnvFilter;

const ERROR_LOG_NAME: &str = "catalog-errors.log";

/// A declaration found by `detect`, with where it is and what it becomes
#[derive(Debug, Serialize)]
struct DetectedDeclaration {
    file: PathBuf,
    /// Line number (1-indexed)
    line: usize,
    /// Column number (1-indexed)
    column: usize,
    kind: &'static str,
    original: String,
    version: String,
    catalog_key: String,
    version_key: String,
    replacement: String,
}

/// Detection results
#[derive(Debug, Serialize)]
struct DetectionResult<'a> {
    catalog: &'a Path,
    declarations: Vec<DetectedDeclaration>,
    collisions: &'a [KeyCollision],
    stats: &'a MergeStats,
    errors: &'a ErrorLog,
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Detect {
            scan,
            catalog,
            json,
            verbose,
        } => {
            init_tracing(verbose);
            cmd_detect(scan, catalog, json, verbose)
        }
        Commands::Apply {
            scan,
            catalog,
            dry_run,
            interactive,
            json,
            verbose,
        } => {
            init_tracing(verbose);
            cmd_apply(scan, catalog, dry_run, interactive, json, verbose)
        }
        Commands::Catalog { path } => {
            init_tracing(false);
            cmd_catalog(path)
        }
        Commands::Scan { scan } => {
            init_tracing(false);
            cmd_scan(scan)
        }
    }
}

/// Logs go to stderr at `warn`, or `debug` with `--verbose`. `RUST_LOG` wins over both.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_detect(
    scan: ScanArgs,
    catalog_args: CatalogArgs,
    json_output: bool,
    verbose: bool,
) -> Result<()> {
    let (targets, options) = prepare(scan, catalog_args, verbose)?;
    let plan = pipeline::plan(&targets.build_files, &options);

    let mut declarations = Vec::new();
    for scan in &plan.scans {
        declarations.extend(describe(scan, &options.alias));
    }

    let result = DetectionResult {
        catalog: &options.catalog_path,
        declarations,
        collisions: &plan.merged.collisions,
        stats: &plan.merged.stats,
        errors: &plan.errors,
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_detection_result(&result);
    }

    Ok(())
}

fn cmd_apply(
    scan: ScanArgs,
    catalog_args: CatalogArgs,
    dry_run: bool,
    interactive: bool,
    json_output: bool,
    verbose: bool,
) -> Result<()> {
    let (targets, options) = prepare(scan, catalog_args, verbose)?;

    if dry_run {
        let plan = pipeline::plan(&targets.build_files, &options);
        println!(
            "{} {}",
            "Would write:".yellow().bold(),
            options.catalog_path.display()
        );
        println!("{}", plan.render_catalog(&options.marker));
        for bundle in &plan.bundles {
            print_bundle(bundle, "Would update:");
        }
        print_errors(&plan.errors);
        println!(
            "\n{} Run without --dry-run to apply changes",
            "hint:".cyan().bold()
        );
        return Ok(());
    }

    let mut build_files = targets.build_files;
    if interactive {
        let plan = pipeline::plan(&build_files, &options);
        let mut accepted = HashSet::new();
        for bundle in &plan.bundles {
            print_bundle(bundle, "Changes for:");
            let apply = Confirm::new()
                .with_prompt(format!("Apply {} replacements?", bundle.len()))
                .default(true)
                .interact()
                .context("Failed to read confirmation")?;
            if apply {
                accepted.insert(bundle.file.clone());
            }
        }
        build_files.retain(|file| accepted.contains(file));
    }

    if build_files.is_empty() {
        println!("{} No changes to apply", "info:".blue().bold());
        return Ok(());
    }

    let progress = |phase: Phase, fraction: f64| {
        if verbose {
            eprintln!(
                "{} {:>3.0}% {}",
                "info:".blue().bold(),
                fraction * 100.0,
                phase
            );
        }
    };
    let report = pipeline::run(&build_files, &options, &progress, &AtomicBool::new(false));

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.status == RunStatus::Cancelled {
        println!(
            "{} Run cancelled, nothing was written",
            "warn:".yellow().bold()
        );
        return Ok(());
    }

    if let Some(path) = &report.catalog_written {
        println!(
            "{} Wrote {} ({} new libraries, {} new plugins, {} new versions)",
            "ok:".green().bold(),
            path.display(),
            report.stats.libraries_added,
            report.stats.plugins_added,
            report.stats.versions_added
        );
    }
    for file in &report.files_rewritten {
        println!("{} {}", "Updated:".yellow().bold(), file.display());
    }

    if !report.errors.is_empty() {
        let log = options
            .log_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        println!(
            "{} {} problems recorded, see {}",
            "warn:".yellow().bold(),
            report.errors.len(),
            log
        );
    }

    Ok(())
}

fn cmd_catalog(path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => scanner::collect_targets(&[PathBuf::from(".")], &[], true)?
            .catalog
            .context("No libs.versions.toml found under the current directory")?,
    };

    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let contents = catalog::parse(&text, catalog::DEFAULT_MARKER);

    println!("{}", path.display().to_string().bold());
    let mut versions = contents.version_literals.clone();
    for (key, version) in &contents.versions {
        versions.insert(key.clone(), format!("\"{}\"", version));
    }
    print_section(catalog::VERSIONS, &versions);
    print_section(catalog::LIBRARIES, &contents.libraries);
    print_section(catalog::PLUGINS, &contents.plugins);

    let other = contents.leftover.trim();
    if !other.is_empty() {
        println!(
            "\n{} {} other lines kept as-is",
            "info:".blue().bold(),
            other.lines().count()
        );
    }

    Ok(())
}

fn cmd_scan(scan: ScanArgs) -> Result<()> {
    let (paths, targets) = collect(scan)?;

    println!("Would scan {} files:", targets.build_files.len());
    for file in &targets.build_files {
        println!("  {}", file.display());
    }

    match &targets.catalog {
        Some(catalog) => println!("Catalog: {}", catalog.display()),
        None => println!(
            "Catalog: none found, would create {}",
            default_catalog_path(&paths).display()
        ),
    }

    Ok(())
}

fn collect(scan: ScanArgs) -> Result<(Vec<PathBuf>, ScanTargets)> {
    let paths = scan.paths.unwrap_or_else(|| vec![PathBuf::from(".")]);
    let targets = scanner::collect_targets(&paths, &scan.exclude, !scan.no_default_excludes)
        .context("Failed to collect build files")?;
    Ok((paths, targets))
}

/// Collects targets and resolves catalog, alias and log settings into run options.
fn prepare(
    scan: ScanArgs,
    catalog_args: CatalogArgs,
    verbose: bool,
) -> Result<(ScanTargets, RunOptions)> {
    let (paths, targets) = collect(scan)?;

    let catalog_path = catalog_args
        .catalog
        .or_else(|| targets.catalog.clone())
        .unwrap_or_else(|| default_catalog_path(&paths));
    let log_path = catalog_args
        .log
        .unwrap_or_else(|| catalog_path.with_file_name(ERROR_LOG_NAME));

    if verbose {
        eprintln!(
            "{} Found {} build files to scan",
            "info:".blue().bold(),
            targets.build_files.len()
        );
        eprintln!(
            "{} Using catalog {}",
            "info:".blue().bold(),
            catalog_path.display()
        );
    }

    let options = RunOptions {
        alias: catalog_args.alias,
        log_path: Some(log_path),
        ..RunOptions::new(catalog_path)
    };
    Ok((targets, options))
}

fn default_catalog_path(paths: &[PathBuf]) -> PathBuf {
    let root = paths
        .first()
        .map(PathBuf::as_path)
        .unwrap_or(Path::new("."));
    root.join("gradle").join(CATALOG_FILE_NAME)
}

fn describe(scan: &FileScan, alias: &str) -> Vec<DetectedDeclaration> {
    let source = std::fs::read_to_string(&scan.file).unwrap_or_default();
    let mut detected = Vec::new();
    for dependency in &scan.dependencies {
        let found = detected_declaration(&scan.file, &source, "dependency", dependency, alias);
        detected.push(found);
    }
    for plugin in &scan.plugins {
        let found = detected_declaration(&scan.file, &source, "plugin", plugin, alias);
        detected.push(found);
    }
    detected.sort_by_key(|d| (d.line, d.column));
    detected
}

fn detected_declaration<D: Declaration>(
    file: &Path,
    source: &str,
    kind: &'static str,
    declaration: &D,
    alias: &str,
) -> DetectedDeclaration {
    let (start, _) = declaration.span();
    let (line, column) = offset_to_line_col(source, start);
    DetectedDeclaration {
        file: file.to_path_buf(),
        line,
        column,
        kind,
        original: declaration.original_text().trim().to_string(),
        version: declaration.version().to_string(),
        catalog_key: declaration.catalog_key(),
        version_key: declaration.version_key(),
        replacement: declaration.replacement_text(alias),
    }
}

fn print_detection_result(result: &DetectionResult<'_>) {
    if result.declarations.is_empty() {
        println!("{} No inline versions found", "ok:".green().bold());
        print_errors(result.errors);
        return;
    }

    let mut by_file: BTreeMap<&Path, Vec<&DetectedDeclaration>> = BTreeMap::new();
    for declaration in &result.declarations {
        by_file
            .entry(&declaration.file)
            .or_default()
            .push(declaration);
    }

    for (file, declarations) in by_file {
        println!("\n{}", file.display().to_string().bold());
        for d in declarations {
            println!(
                "  {}:{}: {} -> {}",
                d.line,
                d.column,
                d.original.red(),
                d.replacement.green()
            );
            println!(
                "      {} {} = \"{}\"",
                "version:".dimmed(),
                d.version_key,
                d.version
            );
        }
    }

    for collision in result.collisions {
        println!(
            "{} {} keeps {}, {} from {} has no key",
            "warn:".yellow().bold(),
            collision.key,
            collision.kept,
            collision.rejected,
            collision.file.display()
        );
    }
    print_errors(result.errors);

    let stats = result.stats;
    println!(
        "\n{} {} declarations in {} files: {} new libraries, {} new plugins, {} new versions ({} discriminated)",
        "info:".blue().bold(),
        result.declarations.len(),
        stats.files_merged,
        stats.libraries_added,
        stats.plugins_added,
        stats.versions_added,
        stats.discriminated_versions
    );
    println!(
        "{} Catalog: {}",
        "info:".blue().bold(),
        result.catalog.display()
    );
}

fn print_bundle(bundle: &FileBundle, heading: &str) {
    println!("\n{} {}", heading.yellow().bold(), bundle.file.display());
    for replacement in bundle.replacements() {
        println!(
            "  {} -> {}",
            replacement.original.trim().red(),
            replacement.replacement.green()
        );
    }
}

fn print_section(name: &str, entries: &BTreeMap<String, String>) {
    println!("\n{}", format!("[{}]", name).cyan().bold());
    for (key, value) in entries {
        println!("  {} = {}", key, value);
    }
}

fn print_errors(errors: &ErrorLog) {
    for entry in errors.entries() {
        println!(
            "{} [{}] {}",
            "warn:".yellow().bold(),
            entry.context,
            entry.message
        );
    }
}
