//! Declarations recognized in build scripts.
//!
//! Two kinds exist: library dependencies inside `dependencies { }` and
//! versioned plugins inside `plugins { }`. Both implement [`Declaration`], which
//! supplies the three derivations the rest of the pipeline needs: the catalog
//! table value, the `version.ref` key and the replacement expression.

use crate::keys::{derive_key, derive_version_key, dotted};
use serde::Serialize;
use std::hash::{Hash, Hasher};

/// Behaviour shared by dependency and plugin declarations.
pub trait Declaration {
    /// Alias under `[libraries]` or `[plugins]`.
    fn catalog_key(&self) -> String;

    /// Inline table stored under [`Declaration::catalog_key`].
    fn catalog_value(&self) -> String;

    /// Name of the `[versions]` entry this declaration references.
    fn version_key(&self) -> String;

    /// Expression that replaces the declaration in the build script.
    fn replacement_text(&self, alias: &str) -> String;

    fn version(&self) -> &str;

    /// Exact text matched in the source, including captured whitespace.
    fn original_text(&self) -> &str;

    /// Byte range of [`Declaration::original_text`] in the scanned source.
    fn span(&self) -> (usize, usize);
}

/// A `configuration("group:artifact:version")` or
/// `configuration(group = .., name = .., version = ..)` call.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyDeclaration {
    pub configuration: String,
    pub group: String,
    pub artifact: String,
    pub version: String,
    pub original_text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl PartialEq for DependencyDeclaration {
    fn eq(&self, other: &Self) -> bool {
        self.configuration == other.configuration
            && self.group == other.group
            && self.artifact == other.artifact
            && self.version == other.version
    }
}

impl Eq for DependencyDeclaration {}

impl Hash for DependencyDeclaration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.configuration.hash(state);
        self.group.hash(state);
        self.artifact.hash(state);
        self.version.hash(state);
    }
}

impl Declaration for DependencyDeclaration {
    fn catalog_key(&self) -> String {
        derive_key(&self.group, Some(&self.artifact))
    }

    fn catalog_value(&self) -> String {
        format!(
            "{{group = \"{}\", name = \"{}\", version.ref = \"{}\"}}",
            self.group,
            self.artifact,
            self.version_key()
        )
    }

    fn version_key(&self) -> String {
        derive_version_key(&self.catalog_key(), false)
    }

    fn replacement_text(&self, alias: &str) -> String {
        format!(
            "{}({}.{})",
            self.configuration,
            alias,
            dotted(&self.catalog_key())
        )
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn original_text(&self) -> &str {
        &self.original_text
    }

    fn span(&self) -> (usize, usize) {
        (self.start_offset, self.end_offset)
    }
}

/// An `id("plugin.id") version "x.y.z"` line.
#[derive(Debug, Clone, Serialize)]
pub struct PluginDeclaration {
    pub plugin_id: String,
    pub version: String,
    pub original_text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl PartialEq for PluginDeclaration {
    fn eq(&self, other: &Self) -> bool {
        self.plugin_id == other.plugin_id && self.version == other.version
    }
}

impl Eq for PluginDeclaration {}

impl Hash for PluginDeclaration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.plugin_id.hash(state);
        self.version.hash(state);
    }
}

impl Declaration for PluginDeclaration {
    fn catalog_key(&self) -> String {
        derive_key(&self.plugin_id, None)
    }

    fn catalog_value(&self) -> String {
        format!(
            "{{id = \"{}\", version.ref = \"{}\"}}",
            self.plugin_id,
            self.version_key()
        )
    }

    fn version_key(&self) -> String {
        derive_version_key(&self.catalog_key(), true)
    }

    fn replacement_text(&self, alias: &str) -> String {
        format!("alias({}.plugins.{})", alias, dotted(&self.catalog_key()))
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn original_text(&self) -> &str {
        &self.original_text
    }

    fn span(&self) -> (usize, usize) {
        (self.start_offset, self.end_offset)
    }
}
