//! Orchestration of a catalog run.
//!
//! A run moves through fixed phases: build scripts are scanned in parallel, the
//! existing catalog is read, everything is merged sequentially, the catalog is
//! written and finally each build script is rewritten in parallel. The caller
//! observes progress through a [`ProgressSink`] and may stop the run between
//! phases with a cancellation flag.
//!
//! [`run`] never fails. Every problem ends up in the report's [`ErrorLog`].

use crate::catalog::{self, CatalogContents, TIMESTAMP_FORMAT};
use crate::error::{ErrorLog, RunError};
use crate::reconciler::{self, KeyCollision, MergeStats, MergedCatalog};
use crate::rewriter::{self, FileBundle};
use crate::scanner::{self, FileScan};
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Log heading for discriminated version keys that were already taken.
const COLLISION_CONTEXT: &str = "merging versions";

/// Stages of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    ExtractDeclarations,
    ExtractCatalog,
    Merge,
    WriteCatalog,
    Rewrite,
    Done,
}

impl Phase {
    /// Share of the run completed when this phase starts.
    pub fn fraction(self) -> f64 {
        match self {
            Phase::ExtractDeclarations => 0.0,
            Phase::ExtractCatalog => 0.4,
            Phase::Merge => 0.5,
            Phase::WriteCatalog => 0.6,
            Phase::Rewrite => 0.7,
            Phase::Done => 1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::ExtractDeclarations => "extracting declarations",
            Phase::ExtractCatalog => "reading catalog",
            Phase::Merge => "merging",
            Phase::WriteCatalog => "writing catalog",
            Phase::Rewrite => "updating build files",
            Phase::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Receives `(phase, fraction)` notifications. Purely observational.
pub trait ProgressSink {
    fn report(&self, phase: Phase, fraction: f64);
}

impl<F: Fn(Phase, f64)> ProgressSink for F {
    fn report(&self, phase: Phase, fraction: f64) {
        self(phase, fraction)
    }
}

/// Sink that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _phase: Phase, _fraction: f64) {}
}

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Catalog to read and then overwrite. Need not exist yet.
    pub catalog_path: PathBuf,
    /// Accessor name used in rewritten build scripts (`libs` in `libs.foo`).
    pub alias: String,
    /// Where the error log goes; `None` keeps it in the report only.
    pub log_path: Option<PathBuf>,
    /// Comment line opening every generated catalog.
    pub marker: String,
}

impl RunOptions {
    pub fn new(catalog_path: impl Into<PathBuf>) -> Self {
        Self {
            catalog_path: catalog_path.into(),
            alias: "libs".to_string(),
            log_path: None,
            marker: catalog::DEFAULT_MARKER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Done,
    Cancelled,
}

/// Outcome of [`run`].
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub files_scanned: usize,
    pub stats: MergeStats,
    pub collisions: Vec<KeyCollision>,
    /// Set once the catalog has been persisted.
    pub catalog_written: Option<PathBuf>,
    pub files_rewritten: Vec<PathBuf>,
    pub errors: ErrorLog,
}

impl RunReport {
    fn new() -> Self {
        Self {
            status: RunStatus::Done,
            files_scanned: 0,
            stats: MergeStats::default(),
            collisions: Vec::new(),
            catalog_written: None,
            files_rewritten: Vec::new(),
            errors: ErrorLog::new(),
        }
    }
}

/// Everything a run would do, computed without writing anything.
#[derive(Debug, Serialize)]
pub struct Plan {
    pub scans: Vec<FileScan>,
    pub merged: MergedCatalog,
    /// Non-empty bundles only, sorted by file.
    pub bundles: Vec<FileBundle>,
    pub errors: ErrorLog,
}

impl Plan {
    /// Catalog text the run would write, stamped with the current time.
    pub fn render_catalog(&self, marker: &str) -> String {
        catalog::render(&self.merged.catalog, marker, &timestamp())
    }
}

/// Scans, reads the catalog and merges, without touching any file.
pub fn plan(build_files: &[PathBuf], options: &RunOptions) -> Plan {
    let mut errors = ErrorLog::new();
    let scans = scan_files(build_files, &mut errors);
    let existing = load_catalog(&options.catalog_path, &options.marker, &mut errors);
    let merged = merge(existing, &scans, &mut errors);
    let bundles = bundles_for(&scans, &options.alias);

    Plan {
        scans,
        merged,
        bundles,
        errors,
    }
}

/// Runs every phase over `build_files`.
///
/// `cancel` is polled before each phase. Once it is set, the remaining phases
/// are skipped and the report comes back as [`RunStatus::Cancelled`]; a catalog
/// still sitting in its temporary file at that point is discarded.
pub fn run(
    build_files: &[PathBuf],
    options: &RunOptions,
    progress: &impl ProgressSink,
    cancel: &AtomicBool,
) -> RunReport {
    let mut report = RunReport::new();
    execute(build_files, options, progress, cancel, &mut report);

    if let Some(log_path) = &options.log_path
        && let Err(e) = report.errors.write_to(log_path)
    {
        tracing::warn!(path = %log_path.display(), "failed to write error log: {e}");
    }

    if report.status == RunStatus::Done {
        progress.report(Phase::Done, Phase::Done.fraction());
    }
    report
}

fn execute(
    build_files: &[PathBuf],
    options: &RunOptions,
    progress: &impl ProgressSink,
    cancel: &AtomicBool,
    report: &mut RunReport,
) {
    let enter = |phase: Phase, report: &mut RunReport| {
        if cancel.load(Ordering::Relaxed) {
            tracing::info!("run cancelled before {phase}");
            report.status = RunStatus::Cancelled;
            return false;
        }
        tracing::info!("{phase}");
        progress.report(phase, phase.fraction());
        true
    };

    if !enter(Phase::ExtractDeclarations, report) {
        return;
    }
    let scans = scan_files(build_files, &mut report.errors);
    report.files_scanned = scans.len();

    if !enter(Phase::ExtractCatalog, report) {
        return;
    }
    let existing = load_catalog(
        &options.catalog_path,
        &options.marker,
        &mut report.errors,
    );

    if !enter(Phase::Merge, report) {
        return;
    }
    let merged = merge(existing, &scans, &mut report.errors);
    report.stats = merged.stats.clone();
    report.collisions = merged.collisions.clone();

    if !enter(Phase::WriteCatalog, report) {
        return;
    }
    let text = catalog::render(&merged.catalog, &options.marker, &timestamp());
    match write_catalog(&options.catalog_path, &text, cancel) {
        Ok(true) => report.catalog_written = Some(options.catalog_path.clone()),
        Ok(false) => {
            report.status = RunStatus::Cancelled;
            return;
        }
        Err(e) => {
            // Without a catalog the rewritten references would dangle.
            report.errors.record(&e);
            return;
        }
    }

    if !enter(Phase::Rewrite, report) {
        return;
    }
    let bundles = bundles_for(&scans, &options.alias);
    report.files_rewritten = rewrite_files(&bundles, &mut report.errors);
}

/// Scans build scripts on the rayon pool. Unreadable files are logged and
/// contribute nothing.
pub fn scan_files(build_files: &[PathBuf], errors: &mut ErrorLog) -> Vec<FileScan> {
    let results: Vec<Result<FileScan, RunError>> = build_files
        .par_iter()
        .map(|file| scanner::scan_build_file(file))
        .collect();

    let mut scans = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(scan) => scans.push(scan),
            Err(e) => errors.record(&e),
        }
    }
    scans
}

/// Reads the existing catalog. A missing catalog is an empty one; an
/// unreadable one is logged and treated as empty.
pub fn load_catalog(path: &Path, marker: &str, errors: &mut ErrorLog) -> CatalogContents {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let contents = catalog::parse(&text, marker);
            tracing::debug!(
                path = %path.display(),
                versions = contents.versions.len(),
                libraries = contents.libraries.len(),
                plugins = contents.plugins.len(),
                "read catalog"
            );
            contents
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no existing catalog");
            CatalogContents::default()
        }
        Err(source) => {
            errors.record(&RunError::Read {
                path: path.to_path_buf(),
                source,
            });
            CatalogContents::default()
        }
    }
}

fn merge(existing: CatalogContents, scans: &[FileScan], errors: &mut ErrorLog) -> MergedCatalog {
    let merged = reconciler::merge(existing, scans);
    for collision in &merged.collisions {
        errors.push(
            COLLISION_CONTEXT,
            format!(
                "{}: {} is already stored under {}, dropped {} from {}",
                collision.key,
                collision.kept,
                collision.key,
                collision.rejected,
                collision.file.display()
            ),
        );
    }
    merged
}

/// Writes the catalog through a temporary file next to `path`.
///
/// Returns `Ok(false)` without touching `path` if `cancel` was set while the
/// temporary file was being written.
pub fn write_catalog(path: &Path, text: &str, cancel: &AtomicBool) -> Result<bool, RunError> {
    let write_error = |source: std::io::Error| RunError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_error)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(write_error)?;
    temp.write_all(text.as_bytes()).map_err(write_error)?;
    temp.flush().map_err(write_error)?;

    if cancel.load(Ordering::Relaxed) {
        tracing::info!("run cancelled, discarding catalog");
        return Ok(false);
    }

    temp.persist(path).map_err(|e| write_error(e.error))?;
    tracing::info!(path = %path.display(), "wrote catalog");
    Ok(true)
}

fn bundles_for(scans: &[FileScan], alias: &str) -> Vec<FileBundle> {
    let mut bundles: Vec<FileBundle> = scans
        .iter()
        .filter(|scan| !scan.is_empty())
        .map(|scan| FileBundle::from_scan(scan, alias))
        .collect();
    bundles.sort_by(|a, b| a.file.cmp(&b.file));
    bundles
}

/// Rewrites each bundle's file on the rayon pool. Returns the files that were
/// rewritten; failures are logged per file.
pub fn rewrite_files(bundles: &[FileBundle], errors: &mut ErrorLog) -> Vec<PathBuf> {
    let results: Vec<(PathBuf, Result<(), RunError>)> = bundles
        .par_iter()
        .map(|bundle| (bundle.file.clone(), rewriter::apply_bundle(bundle)))
        .collect();

    let mut rewritten = Vec::new();
    for (file, result) in results {
        match result {
            Ok(()) => rewritten.push(file),
            Err(e) => errors.record(&e),
        }
    }
    rewritten
}

/// Local time in the catalog marker format.
pub fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}
