//! Build script scanner.
//!
//! Recursively walks directories to collect Gradle build scripts and the
//! project's `libs.versions.toml`, skipping entries whose names start with `.`.
//! Each script is then matched against a small set of declaration shapes inside
//! its `dependencies { }` and `plugins { }` blocks. This is pattern matching, not
//! a Kotlin/Groovy parser: anything that does not fit a known shape is skipped.

use crate::declaration::{DependencyDeclaration, PluginDeclaration};
use crate::error::RunError;
use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

/// File name of the version catalog Gradle picks up by default.
pub const CATALOG_FILE_NAME: &str = "libs.versions.toml";

static DEPENDENCIES_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bdependencies\s*\{").expect("hardcoded regex must compile")
});

static PLUGINS_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bplugins\s*\{").expect("hardcoded regex must compile"));

/// `configuration(arguments)`, arguments running up to the first `)`.
static CONFIGURATION_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w*)\s*\(\s*([^)]*)\s*\)").expect("hardcoded regex must compile")
});

/// `"group:artifact:version"` with a purely numeric version.
static COORDINATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([\w.-]+):([\w.-]+):([0-9.]+)""#).expect("hardcoded regex must compile")
});

/// `key = "value"`
static NAMED_ARGUMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([\w.-]+)\s*=\s*"([^"]*)""#).expect("hardcoded regex must compile")
});

static NUMERIC_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9.]+$").expect("hardcoded regex must compile"));

/// `id("plugin.id") version "x.y.z"`, including any leading spaces and comment
/// characters so commented-out lines can be told apart.
static PLUGIN_WITH_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[/ *]*\bid\s*\(\s*"([^"]+)"\s*\)\s*version\s*"([0-9.]+)\s*""#)
        .expect("hardcoded regex must compile")
});

/// Files a run operates on.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanTargets {
    /// Build scripts, sorted by path.
    pub build_files: Vec<PathBuf>,
    /// First `libs.versions.toml` found, if any.
    pub catalog: Option<PathBuf>,
}

/// Declarations recognized in one piece of source text.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Extraction {
    pub dependencies: Vec<DependencyDeclaration>,
    pub plugins: Vec<PluginDeclaration>,
}

/// Declarations recognized in one build script.
#[derive(Debug, Clone, Serialize)]
pub struct FileScan {
    pub file: PathBuf,
    pub dependencies: Vec<DependencyDeclaration>,
    pub plugins: Vec<PluginDeclaration>,
}

impl FileScan {
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty() && self.plugins.is_empty()
    }
}

/// Returns true for `build.gradle`, `build.gradle.kts` and friends.
pub fn is_build_script(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".gradle") || n.ends_with(".gradle.kts"))
}

/// Collects build scripts and the version catalog under `paths`.
///
/// Entries starting with `.` are skipped when `default_excludes` is set (this
/// keeps Gradle's own `.gradle` cache out). Entries whose file name or path
/// matches any of `exclude` are always skipped.
pub fn collect_targets(
    paths: &[PathBuf],
    exclude: &[String],
    default_excludes: bool,
) -> Result<ScanTargets> {
    let patterns = exclude
        .iter()
        .map(|p| glob::Pattern::new(p))
        .collect::<Result<Vec<_>, _>>()?;

    let mut targets = ScanTargets::default();
    let mut catalogs = Vec::new();

    for path in paths {
        for entry in WalkDir::new(path)
            .into_iter()
            .filter_entry(|e| !is_excluded(e, &patterns, default_excludes))
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.file_name() == CATALOG_FILE_NAME {
                catalogs.push(entry.into_path());
            } else if is_build_script(entry.path()) {
                targets.build_files.push(entry.into_path());
            }
        }
    }

    targets.build_files.sort();
    targets.build_files.dedup();
    // Shallowest catalog wins, ties broken by path.
    catalogs.sort_by_key(|p| (p.components().count(), p.clone()));
    targets.catalog = catalogs.into_iter().next();

    Ok(targets)
}

fn is_excluded(
    entry: &walkdir::DirEntry,
    patterns: &[glob::Pattern],
    default_excludes: bool,
) -> bool {
    // Never exclude the roots the caller asked for.
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_str().unwrap_or_default();
    if default_excludes && name.starts_with('.') {
        return true;
    }
    patterns
        .iter()
        .any(|p| p.matches(name) || p.matches_path(entry.path()))
}

/// Reads a build script and extracts its declarations.
pub fn scan_build_file(file: &Path) -> Result<FileScan, RunError> {
    let source = std::fs::read_to_string(file).map_err(|source| RunError::Read {
        path: file.to_path_buf(),
        source,
    })?;

    let extraction = extract(&source);
    tracing::debug!(
        file = %file.display(),
        dependencies = extraction.dependencies.len(),
        plugins = extraction.plugins.len(),
        "scanned build file"
    );

    Ok(FileScan {
        file: file.to_path_buf(),
        dependencies: extraction.dependencies,
        plugins: extraction.plugins,
    })
}

/// Extracts every recognized dependency and plugin declaration from `source`.
pub fn extract(source: &str) -> Extraction {
    Extraction {
        dependencies: extract_dependencies(source),
        plugins: extract_plugins(source),
    }
}

/// Extracts declarations from every `dependencies { }` block.
///
/// Each `configuration(...)` call inside a block is tried against two shapes:
/// `"group:artifact:version"` and `group = .., name = .., version = ..`. Calls
/// wrapping another call (`platform(..)`, `project(..)`, `fileTree(..)`) are
/// ignored, as are versions that are not plain digits and dots, and calls on a
/// line that is commented out.
pub fn extract_dependencies(source: &str) -> Vec<DependencyDeclaration> {
    let mut dependencies = Vec::new();

    for (start, end) in block_regions(source, &DEPENDENCIES_BLOCK) {
        let region = &source[start..end];

        for caps in CONFIGURATION_CALL.captures_iter(region) {
            let Some(whole) = caps.get(0) else { continue };
            if is_commented(source, start + whole.start(), start + whole.end()) {
                continue;
            }
            let configuration = &caps[1];
            let content = &caps[2];

            if configuration.is_empty() || content.is_empty() || content.contains('(') {
                continue;
            }

            let parsed = if content.contains(':') {
                parse_coordinate(content)
            } else {
                parse_named_arguments(content)
            };

            if let Some((group, artifact, version)) = parsed {
                dependencies.push(DependencyDeclaration {
                    configuration: configuration.to_string(),
                    group,
                    artifact,
                    version,
                    original_text: whole.as_str().to_string(),
                    start_offset: start + whole.start(),
                    end_offset: start + whole.end(),
                });
            }
        }
    }

    dependencies
}

/// Extracts `id(..) version ".."` lines from every `plugins { }` block,
/// skipping those behind `//` or `/*`.
pub fn extract_plugins(source: &str) -> Vec<PluginDeclaration> {
    let mut plugins = Vec::new();

    for (start, end) in block_regions(source, &PLUGINS_BLOCK) {
        let region = &source[start..end];

        for caps in PLUGIN_WITH_VERSION.captures_iter(region) {
            let Some(whole) = caps.get(0) else { continue };
            if is_commented(source, start + whole.start(), start + whole.end()) {
                continue;
            }
            let text = whole.as_str();

            plugins.push(PluginDeclaration {
                plugin_id: caps[1].to_string(),
                version: caps[2].to_string(),
                original_text: text.to_string(),
                start_offset: start + whole.start(),
                end_offset: start + whole.end(),
            });
        }
    }

    plugins
}

/// True when `//` or `/*` appears between the start of the line holding
/// `start` and `end`.
fn is_commented(source: &str, start: usize, end: usize) -> bool {
    let line_start = source[..start].rfind('\n').map_or(0, |newline| newline + 1);
    let line = &source[line_start..end];
    line.contains("//") || line.contains("/*")
}

/// Parses `"group:artifact:version"`.
fn parse_coordinate(content: &str) -> Option<(String, String, String)> {
    let caps = COORDINATE.captures(content)?;
    Some((caps[1].to_string(), caps[2].to_string(), caps[3].to_string()))
}

/// Parses exactly three `group`/`name`/`version` named arguments, in any order.
fn parse_named_arguments(content: &str) -> Option<(String, String, String)> {
    let arguments: Vec<_> = NAMED_ARGUMENT.captures_iter(content).collect();
    if arguments.len() != 3 {
        return None;
    }

    let (mut group, mut name, mut version) = (None, None, None);
    for caps in &arguments {
        let value = caps[2].to_string();
        match &caps[1] {
            "group" => group = Some(value),
            "name" => name = Some(value),
            "version" => version = Some(value),
            _ => return None,
        }
    }

    let (group, name, version) = (group?, name?, version?);
    if group.is_empty() || name.is_empty() || !NUMERIC_VERSION.is_match(&version) {
        return None;
    }
    Some((group, name, version))
}

/// Byte ranges of the bodies of all `keyword { ... }` blocks.
///
/// The end of a block is found by brace matching. Blocks nested inside an
/// earlier match are not reported twice, and unterminated blocks are dropped.
fn block_regions(source: &str, opening: &Regex) -> Vec<(usize, usize)> {
    let mut regions = Vec::new();
    let mut covered_until = 0;

    for m in opening.find_iter(source) {
        if m.start() < covered_until {
            continue;
        }
        let open = m.end() - 1;
        if let Some(close) = matching_brace(source, open) {
            regions.push((open + 1, close));
            covered_until = close;
        }
    }

    regions
}

/// Finds the `}` closing the `{` at byte `open`.
pub(crate) fn matching_brace(source: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in source.as_bytes()[open..].iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Converts a byte offset into a 1-indexed `(line, column)` pair.
pub fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, c) in source.char_indices() {
        if i >= offset {
            break;
        }
        if c == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}
