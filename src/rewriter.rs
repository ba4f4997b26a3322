//! Build script rewriting.
//!
//! Performs position-aware replacement of recognized declarations using the
//! byte offsets captured during extraction. Replacements are sorted by position
//! and applied in reverse order to preserve offset validity. Identical text
//! elsewhere in the file (a commented-out copy, say) is never touched.

use crate::declaration::Declaration;
use crate::error::RunError;
use crate::scanner::FileScan;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A single text replacement with position information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Replacement {
    pub start: usize,
    pub end: usize,
    /// Text expected at `start..end`.
    pub original: String,
    /// Catalog reference written in its place, without the leading tab.
    pub replacement: String,
}

impl Replacement {
    fn from_declaration<D: Declaration>(declaration: &D, alias: &str) -> Self {
        let (start, end) = declaration.span();
        Self {
            start,
            end,
            original: declaration.original_text().to_string(),
            replacement: declaration.replacement_text(alias),
        }
    }
}

/// Every replacement for one build script.
#[derive(Debug, Clone, Serialize)]
pub struct FileBundle {
    pub file: PathBuf,
    pub dependencies: Vec<Replacement>,
    pub plugins: Vec<Replacement>,
}

impl FileBundle {
    /// Builds the replacements for a scanned file, referencing catalog `alias`.
    pub fn from_scan(scan: &FileScan, alias: &str) -> Self {
        Self {
            file: scan.file.clone(),
            dependencies: scan
                .dependencies
                .iter()
                .map(|d| Replacement::from_declaration(d, alias))
                .collect(),
            plugins: scan
                .plugins
                .iter()
                .map(|p| Replacement::from_declaration(p, alias))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty() && self.plugins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len() + self.plugins.len()
    }

    pub fn replacements(&self) -> impl Iterator<Item = &Replacement> {
        self.dependencies.iter().chain(self.plugins.iter())
    }
}

/// Rewrites a build script in place.
///
/// The file is re-read so the check against each replacement's original text
/// sees what is on disk now, not what was scanned.
pub fn apply_bundle(bundle: &FileBundle) -> Result<(), RunError> {
    if bundle.is_empty() {
        return Ok(());
    }

    let content =
        std::fs::read_to_string(&bundle.file).map_err(|e| rewrite_error(&bundle.file, e))?;
    let new_content = rewrite(&content, bundle)?;
    std::fs::write(&bundle.file, new_content).map_err(|e| rewrite_error(&bundle.file, e))?;

    tracing::debug!(
        file = %bundle.file.display(),
        replacements = bundle.len(),
        "rewrote build file"
    );
    Ok(())
}

fn rewrite_error(path: &Path, error: std::io::Error) -> RunError {
    RunError::Rewrite {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}

/// Applies a bundle to source content, returning the modified string.
///
/// Each replacement is written tab-indented. Fails without changing anything
/// if a span is out of bounds or no longer holds its original text.
pub fn rewrite(content: &str, bundle: &FileBundle) -> Result<String, RunError> {
    let mut replacements: Vec<&Replacement> = bundle.replacements().collect();

    // Sort by start offset descending so we can apply from end to start
    replacements.sort_by(|a, b| b.start.cmp(&a.start));

    for rep in &replacements {
        if content.get(rep.start..rep.end) != Some(rep.original.as_str()) {
            return Err(RunError::Rewrite {
                path: bundle.file.clone(),
                reason: format!(
                    "expected `{}` at bytes {}..{}; the file changed after it was scanned",
                    rep.original.trim(),
                    rep.start,
                    rep.end
                ),
            });
        }
    }

    let mut result = content.to_string();
    let mut applied_from = usize::MAX;
    for rep in replacements {
        // Overlapping spans cannot come out of one scan; ignore rather than corrupt.
        if rep.end > applied_from {
            continue;
        }
        result.replace_range(rep.start..rep.end, &format!("\t{}", rep.replacement));
        applied_from = rep.start;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{extract, scan_build_file};

    fn bundle_for(source: &str) -> FileBundle {
        let extraction = extract(source);
        FileBundle::from_scan(
            &FileScan {
                file: PathBuf::from("build.gradle.kts"),
                dependencies: extraction.dependencies,
                plugins: extraction.plugins,
            },
            "libs",
        )
    }

    fn make_rep(start: usize, end: usize, original: &str, replacement: &str) -> Replacement {
        Replacement {
            start,
            end,
            original: original.to_string(),
            replacement: replacement.to_string(),
        }
    }

    #[test]
    fn replaces_single_dependency() {
        let content = "dependencies {\n    implementation(\"androidx.core:core-ktx:1.12.0\")\n}\n";
        let result = rewrite(content, &bundle_for(content)).unwrap();
        assert_eq!(
            result,
            "dependencies {\n    \timplementation(libs.androidx.core.ktx)\n}\n"
        );
    }

    #[test]
    fn replaces_plugin_including_leading_spaces() {
        let content = "plugins {\n    id(\"com.android.application\") version \"8.2.0\" apply false\n}\n";
        let result = rewrite(content, &bundle_for(content)).unwrap();
        assert_eq!(
            result,
            "plugins {\n\talias(libs.plugins.android.application) apply false\n}\n"
        );
    }

    #[test]
    fn does_not_modify_comments_with_same_text() {
        let content = "// implementation(\"a.b:c:1.0\")\ndependencies {\n    implementation(\"a.b:c:1.0\")\n}\n";
        let result = rewrite(content, &bundle_for(content)).unwrap();
        assert_eq!(
            result,
            "// implementation(\"a.b:c:1.0\")\ndependencies {\n    \timplementation(libs.b.c)\n}\n"
        );
    }

    #[test]
    fn handles_multiple_replacements_of_different_lengths() {
        let content = "plugins {\n    id(\"org.jetbrains.kotlin.jvm\") version \"1.9.22\"\n}\ndependencies {\n    api(\"x:y:1.0\")\n    testImplementation(group = \"junit\", name = \"junit\", version = \"4.13.2\")\n}\n";
        let result = rewrite(content, &bundle_for(content)).unwrap();
        assert_eq!(
            result,
            "plugins {\n\talias(libs.plugins.jetbrains.kotlin.jvm)\n}\ndependencies {\n    \tapi(libs.x.y)\n    \ttestImplementation(libs.junit)\n}\n"
        );
    }

    #[test]
    fn empty_bundle_returns_original() {
        let content = "dependencies { implementation(project(\":core\")) }";
        let bundle = bundle_for(content);
        assert!(bundle.is_empty());
        assert_eq!(rewrite(content, &bundle).unwrap(), content);
    }

    #[test]
    fn stale_span_is_rejected() {
        let bundle = FileBundle {
            file: PathBuf::from("build.gradle"),
            dependencies: vec![make_rep(0, 5, "hello", "x")],
            plugins: vec![],
        };
        let err = rewrite("howdy there", &bundle).unwrap_err();
        assert!(matches!(err, RunError::Rewrite { .. }));
        assert!(err.to_string().contains("changed after it was scanned"));
    }

    #[test]
    fn out_of_bounds_span_is_rejected() {
        let bundle = FileBundle {
            file: PathBuf::from("build.gradle"),
            dependencies: vec![make_rep(10, 50, "x", "y")],
            plugins: vec![],
        };
        assert!(rewrite("short", &bundle).is_err());
    }

    #[test]
    fn replacement_text_does_not_depend_on_other_files() {
        let content = "dependencies {\n    implementation(\"com.example:lib:2.0\")\n}\n";
        let first = bundle_for(content);
        let second = bundle_for(content);
        assert_eq!(first.dependencies, second.dependencies);
        assert_eq!(
            first.dependencies[0].replacement,
            "implementation(libs.example.lib)"
        );
    }

    #[test]
    fn rewrites_fixture_file_on_disk() {
        let fixture = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures/android-app/core/build.gradle.kts");
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("build.gradle.kts");
        std::fs::copy(&fixture, &target).unwrap();

        let bundle = FileBundle::from_scan(&scan_build_file(&target).unwrap(), "libs");
        apply_bundle(&bundle).unwrap();

        let rewritten = std::fs::read_to_string(&target).unwrap();
        assert!(rewritten.contains("\talias(libs.plugins.jetbrains.kotlin.jvm)"));
        assert!(rewritten.contains("\timplementation(libs.androidx.core.ktx)"));
        assert!(rewritten.contains("\tapi(libs.jetbrains.kotlinx.coroutines.core)"));
        assert!(rewritten.contains("\ttestImplementation(libs.junit)"));
        assert!(!rewritten.contains("1.7.3"));
    }
}
