//! Merging scanned declarations into a catalog.
//!
//! Scans are reduced one file at a time onto the existing catalog. Entries that
//! are already present always win, so hand-written library and plugin tables
//! are never overwritten. Versions are reconciled per `version.ref` key: the
//! first version seen for a key keeps the plain key, and every later, different
//! version is stored under a key suffixed with the version itself.

use crate::catalog::CatalogContents;
use crate::declaration::Declaration;
use crate::scanner::FileScan;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A discriminated version key that was already taken by a different version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCollision {
    pub key: String,
    /// Version already stored under `key`.
    pub kept: String,
    /// Version that could not be stored.
    pub rejected: String,
    /// Build script the rejected version came from.
    pub file: PathBuf,
}

/// Counts describing what a merge added on top of the existing catalog.
#[derive(Debug, Default, Clone, Serialize)]
pub struct MergeStats {
    pub files_merged: usize,
    pub dependencies: usize,
    pub plugins: usize,
    pub libraries_added: usize,
    pub plugins_added: usize,
    pub versions_added: usize,
    pub discriminated_versions: usize,
}

/// Result of reconciling every scan with the existing catalog.
#[derive(Debug, Default, Clone, Serialize)]
pub struct MergedCatalog {
    pub catalog: CatalogContents,
    pub collisions: Vec<KeyCollision>,
    pub stats: MergeStats,
}

/// How one declaration's version was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionOutcome {
    /// The declaration has no version.
    Skipped,
    Inserted,
    /// The key already held the same version.
    Unchanged,
    /// The key held another version; stored under this suffixed key instead.
    Discriminated(String),
    Collision,
}

/// Reduces `scans` onto `existing`.
///
/// Scans are sorted by file path first, so the outcome does not depend on the
/// order the caller discovered or scanned files in. Within a file, dependencies
/// are merged before plugins, each in source order.
pub fn merge(existing: CatalogContents, scans: &[FileScan]) -> MergedCatalog {
    let mut ordered: Vec<&FileScan> = scans.iter().collect();
    ordered.sort_by(|a, b| a.file.cmp(&b.file));

    let mut merged = MergedCatalog {
        catalog: existing,
        ..Default::default()
    };
    for scan in ordered {
        merged.absorb(scan);
    }

    tracing::info!(
        files = merged.stats.files_merged,
        libraries_added = merged.stats.libraries_added,
        plugins_added = merged.stats.plugins_added,
        versions_added = merged.stats.versions_added,
        collisions = merged.collisions.len(),
        "merged declarations"
    );

    merged
}

impl MergedCatalog {
    /// Merges one file's declarations.
    pub fn absorb(&mut self, scan: &FileScan) {
        self.stats.files_merged += 1;
        self.stats.dependencies += scan.dependencies.len();
        self.stats.plugins += scan.plugins.len();

        self.stats.libraries_added +=
            insert_entries(&mut self.catalog.libraries, &scan.dependencies);
        self.stats.plugins_added += insert_entries(&mut self.catalog.plugins, &scan.plugins);

        for dependency in &scan.dependencies {
            self.merge_version(dependency, &scan.file);
        }
        for plugin in &scan.plugins {
            self.merge_version(plugin, &scan.file);
        }
    }

    /// Stores a declaration's version under its `version.ref` key.
    ///
    /// Keys holding a verbatim value such as `{ strictly = "1.0" }` count as
    /// taken by a different version.
    pub fn merge_version<D: Declaration>(
        &mut self,
        declaration: &D,
        file: &Path,
    ) -> VersionOutcome {
        let version = declaration.version();
        if version.is_empty() {
            return VersionOutcome::Skipped;
        }

        let key = declaration.version_key();
        let outcome = match self.catalog.version(&key) {
            None => {
                self.catalog.versions.insert(key, version.to_string());
                VersionOutcome::Inserted
            }
            Some(existing) if existing == version => VersionOutcome::Unchanged,
            Some(_) => {
                let discriminated = discriminated_key(&key, version);
                match self.catalog.version(&discriminated) {
                    None => {
                        self.catalog
                            .versions
                            .insert(discriminated.clone(), version.to_string());
                        VersionOutcome::Discriminated(discriminated)
                    }
                    Some(existing) if existing == version => VersionOutcome::Unchanged,
                    Some(existing) => {
                        tracing::warn!(
                            key = %discriminated,
                            kept = %existing,
                            rejected = %version,
                            file = %file.display(),
                            "version key already taken"
                        );
                        self.collisions.push(KeyCollision {
                            key: discriminated,
                            kept: existing.to_string(),
                            rejected: version.to_string(),
                            file: file.to_path_buf(),
                        });
                        VersionOutcome::Collision
                    }
                }
            }
        };

        match outcome {
            VersionOutcome::Inserted => self.stats.versions_added += 1,
            VersionOutcome::Discriminated(_) => {
                self.stats.versions_added += 1;
                self.stats.discriminated_versions += 1;
            }
            _ => {}
        }
        outcome
    }
}

/// Inserts each declaration's table under its alias unless the alias exists.
/// Returns how many aliases were new.
fn insert_entries<D: Declaration>(
    table: &mut BTreeMap<String, String>,
    declarations: &[D],
) -> usize {
    let mut added = 0;
    for declaration in declarations {
        let key = declaration.catalog_key();
        if !table.contains_key(&key) {
            table.insert(key, declaration.catalog_value());
            added += 1;
        }
    }
    added
}

/// `androidxCoreKtxDep` + `1.10.0` gives `androidxCoreKtxDep-1-10-0`.
pub fn discriminated_key(version_key: &str, version: &str) -> String {
    format!("{}-{}", version_key, version.replace('.', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{self, DEFAULT_MARKER};
    use crate::declaration::{DependencyDeclaration, PluginDeclaration};
    use crate::scanner::scan_build_file;

    fn dep(group: &str, artifact: &str, version: &str) -> DependencyDeclaration {
        let original_text = format!("implementation(\"{group}:{artifact}:{version}\")");
        DependencyDeclaration {
            configuration: "implementation".to_string(),
            group: group.to_string(),
            artifact: artifact.to_string(),
            version: version.to_string(),
            end_offset: original_text.len(),
            original_text,
            start_offset: 0,
        }
    }

    fn plugin(id: &str, version: &str) -> PluginDeclaration {
        PluginDeclaration {
            plugin_id: id.to_string(),
            version: version.to_string(),
            original_text: format!("id(\"{id}\") version \"{version}\""),
            start_offset: 0,
            end_offset: 0,
        }
    }

    fn scan(
        file: &str,
        dependencies: Vec<DependencyDeclaration>,
        plugins: Vec<PluginDeclaration>,
    ) -> FileScan {
        FileScan {
            file: PathBuf::from(file),
            dependencies,
            plugins,
        }
    }

    fn fixture(path: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests/fixtures/android-app")
            .join(path)
    }

    #[test]
    fn later_conflicting_version_gets_discriminated_key() {
        let scans = vec![scan(
            "build.gradle.kts",
            vec![
                dep("com.example", "lib", "1.0"),
                dep("com.example", "lib", "2.0"),
            ],
            vec![],
        )];
        let merged = merge(CatalogContents::default(), &scans);

        assert_eq!(merged.catalog.version("exampleLibDep"), Some("1.0"));
        assert_eq!(merged.catalog.version("exampleLibDep-2-0"), Some("2.0"));
        assert_eq!(merged.catalog.versions.len(), 2);
        assert_eq!(merged.stats.discriminated_versions, 1);
    }

    #[test]
    fn same_version_is_a_no_op() {
        let mut merged = MergedCatalog::default();
        let file = Path::new("a.gradle");
        assert_eq!(
            merged.merge_version(&dep("a.b", "c", "1.0"), file),
            VersionOutcome::Inserted
        );
        assert_eq!(
            merged.merge_version(&dep("a.b", "c", "1.0"), file),
            VersionOutcome::Unchanged
        );
        assert_eq!(
            merged.merge_version(&dep("a.b", "c", "1.1"), file),
            VersionOutcome::Discriminated("bCDep-1-1".to_string())
        );
        assert_eq!(
            merged.merge_version(&dep("a.b", "c", "1.1"), file),
            VersionOutcome::Unchanged
        );
        assert_eq!(merged.catalog.versions.len(), 2);
    }

    #[test]
    fn third_distinct_version_gets_its_own_slot() {
        let mut merged = MergedCatalog::default();
        let file = Path::new("a.gradle");
        for version in ["1.0", "2.0", "3.0"] {
            merged.merge_version(&dep("x.y", "z", version), file);
        }
        let keys: Vec<_> = merged.catalog.versions.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["yZDep", "yZDep-2-0", "yZDep-3-0"]);
    }

    #[test]
    fn taken_discriminated_key_is_reported() {
        let mut existing = CatalogContents::default();
        existing
            .versions
            .insert("yZDep".to_string(), "1.0".to_string());
        existing
            .versions
            .insert("yZDep-2-0".to_string(), "9.9".to_string());
        let scans = [scan("a.gradle", vec![dep("x.y", "z", "2.0")], vec![])];
        let merged = merge(existing, &scans);

        assert_eq!(merged.catalog.versions["yZDep-2-0"], "9.9");
        assert_eq!(
            merged.collisions,
            vec![KeyCollision {
                key: "yZDep-2-0".to_string(),
                kept: "9.9".to_string(),
                rejected: "2.0".to_string(),
                file: PathBuf::from("a.gradle"),
            }]
        );
    }

    #[test]
    fn dependency_and_plugin_versions_never_alias() {
        let scans = vec![scan(
            "build.gradle.kts",
            vec![dep("com.android", "application", "1.0")],
            vec![plugin("com.android.application", "8.2.0")],
        )];
        let merged = merge(CatalogContents::default(), &scans);
        assert_eq!(merged.catalog.versions["androidApplicationDep"], "1.0");
        assert_eq!(merged.catalog.versions["androidApplicationPlugin"], "8.2.0");
        assert!(merged.collisions.is_empty());
    }

    #[test]
    fn existing_entries_win() {
        let mut existing = CatalogContents::default();
        existing.libraries.insert(
            "example-lib".to_string(),
            "{ module = \"com.example:lib\" }".to_string(),
        );
        existing.plugins.insert(
            "android-application".to_string(),
            "{ id = \"custom\" }".to_string(),
        );

        let scans = vec![scan(
            "build.gradle.kts",
            vec![dep("com.example", "lib", "1.0")],
            vec![plugin("com.android.application", "8.2.0")],
        )];
        let merged = merge(existing, &scans);

        assert_eq!(
            merged.catalog.libraries["example-lib"],
            "{ module = \"com.example:lib\" }"
        );
        assert_eq!(
            merged.catalog.plugins["android-application"],
            "{ id = \"custom\" }"
        );
        assert_eq!(merged.stats.libraries_added, 0);
        assert_eq!(merged.stats.plugins_added, 0);
    }

    #[test]
    fn existing_version_occupies_base_key() {
        let mut existing = CatalogContents::default();
        existing
            .versions
            .insert("exampleLibDep".to_string(), "0.9".to_string());
        let file_scan = scan("a.gradle", vec![dep("com.example", "lib", "1.0")], vec![]);
        let merged = merge(existing, &[file_scan]);
        assert_eq!(merged.catalog.versions["exampleLibDep"], "0.9");
        assert_eq!(merged.catalog.versions["exampleLibDep-1-0"], "1.0");
    }

    #[test]
    fn verbatim_version_occupies_its_key() {
        let mut existing = CatalogContents::default();
        existing.version_literals.insert(
            "exampleLibDep".to_string(),
            "{ strictly = \"0.9\" }".to_string(),
        );
        let file_scan = scan("a.gradle", vec![dep("com.example", "lib", "1.0")], vec![]);
        let merged = merge(existing, &[file_scan]);

        assert_eq!(
            merged.catalog.version("exampleLibDep"),
            Some("{ strictly = \"0.9\" }")
        );
        assert!(!merged.catalog.versions.contains_key("exampleLibDep"));
        assert_eq!(merged.catalog.versions["exampleLibDep-1-0"], "1.0");
    }

    #[test]
    fn merge_is_independent_of_scan_order() {
        let a = scan("a/build.gradle", vec![dep("com.example", "lib", "1.0")], vec![]);
        let b = scan("b/build.gradle", vec![dep("com.example", "lib", "2.0")], vec![]);

        let forward = merge(CatalogContents::default(), &[a.clone(), b.clone()]);
        let backward = merge(CatalogContents::default(), &[b, a]);

        assert_eq!(forward.catalog, backward.catalog);
        assert_eq!(forward.catalog.versions["exampleLibDep"], "1.0");
    }

    #[test]
    fn merges_fixture_project() {
        let path = fixture("gradle/libs.versions.toml");
        let existing = catalog::parse(&std::fs::read_to_string(path).unwrap(), DEFAULT_MARKER);
        let files = [
            "core/build.gradle.kts",
            "app/build.gradle.kts",
            "build.gradle.kts",
        ];
        let scans: Vec<_> = files
            .iter()
            .map(|p| scan_build_file(&fixture(p)).unwrap())
            .collect();
        let merged = merge(existing, &scans);
        let versions = &merged.catalog.versions;

        // app sorts before core, so app's core-ktx agrees with the catalog and
        // core's older one is discriminated.
        assert_eq!(versions["androidxCoreKtxDep"], "1.12.0");
        assert_eq!(versions["androidxCoreKtxDep-1-10-0"], "1.10.0");
        assert_eq!(versions["junitDep"], "4.13.2");
        assert_eq!(versions["googleDevtoolsKspPlugin"], "1.9.22.1.0.17");
        assert_eq!(versions["jetbrainsKotlinJvmPlugin"], "1.9.22");
        assert_eq!(versions["agp"], "8.1.0");

        let libraries: Vec<_> = merged.catalog.libraries.keys().map(String::as_str).collect();
        assert_eq!(
            libraries,
            vec![
                "androidx-appcompat",
                "androidx-compose-ui-tooling",
                "androidx-core-ktx",
                "androidx-test-espresso-core",
                "jetbrains-kotlinx-coroutines-core",
                "junit",
                "material",
                "squareup-okhttp3",
            ]
        );
        let plugins: Vec<_> = merged.catalog.plugins.keys().map(String::as_str).collect();
        assert_eq!(
            plugins,
            vec![
                "android-application",
                "android-library",
                "google-devtools-ksp",
                "jetbrains-kotlin-android",
                "jetbrains-kotlin-jvm",
            ]
        );
        assert!(merged.collisions.is_empty());
        assert_eq!(merged.stats.files_merged, 3);
    }
}
