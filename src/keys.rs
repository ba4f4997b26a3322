//! Catalog key derivation.
//!
//! Maps Maven coordinates and plugin ids onto the hyphenated aliases used as
//! table keys in `libs.versions.toml`, and maps those aliases onto the
//! camel-cased names used in `version.ref`.

use regex::Regex;
use std::sync::LazyLock;

/// Short leading group segment such as `com.`, `io.` or `org.`.
static TLD_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w{1,3}\.").expect("hardcoded regex must compile"));

/// Derives the catalog alias for a group and optional artifact name.
///
/// `com.squareup.okhttp3` + `okhttp` becomes `squareup-okhttp3`, because
/// `okhttp` already occurs in the group. Artifact segments (split on `.` and
/// `-`) are only appended when the group-derived part does not contain them.
/// Plugins pass `None` and get the group-derived part alone.
pub fn derive_key(group: &str, artifact: Option<&str>) -> String {
    let base = TLD_PREFIX.replace(group, "").replace('.', "-");
    let mut key = base.clone();

    if let Some(name) = artifact {
        for segment in name.split(['.', '-']) {
            if !segment.is_empty() && !base.contains(segment) {
                key.push('-');
                key.push_str(segment);
            }
        }
    }

    key
}

/// Derives the `version.ref` name for a catalog alias.
///
/// `androidx-core-ktx` becomes `androidxCoreKtxDep`, or `androidxCoreKtxPlugin`
/// when `is_plugin` is set, so a library and a plugin sharing an alias never
/// share a version entry.
pub fn derive_version_key(catalog_key: &str, is_plugin: bool) -> String {
    let mut version_key = String::with_capacity(catalog_key.len() + 6);

    for (index, segment) in catalog_key.split('-').enumerate() {
        if index == 0 {
            version_key.push_str(&segment.to_lowercase());
        } else {
            let mut chars = segment.chars();
            if let Some(first) = chars.next() {
                version_key.extend(first.to_uppercase());
                version_key.push_str(chars.as_str());
            }
        }
    }

    version_key.push_str(if is_plugin { "Plugin" } else { "Dep" });
    version_key
}

/// Turns a catalog alias into the accessor path Gradle generates for it.
pub fn dotted(catalog_key: &str) -> String {
    catalog_key.replace('-', ".")
}
