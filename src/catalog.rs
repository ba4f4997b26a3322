//! Version catalog parsing and rendering.
//!
//! Only the three sections this tool manages are understood: `[versions]`,
//! `[libraries]` and `[plugins]`. Library and plugin entries are kept as opaque
//! literals so an existing entry can be written back exactly as it was found.
//! Lines inside a managed section that are not entries (comments, mostly) stay
//! with their section and are written after its entries. Everything outside the
//! managed sections (`[bundles]`, custom sections) is carried through as
//! leftover text after `[plugins]`.

use crate::scanner::matching_brace;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// First line of every generated catalog, followed by a timestamp.
pub const DEFAULT_MARKER: &str = "# gradle-catalog generated at";

/// `chrono` format of the timestamp after the marker.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const VERSIONS: &str = "versions";
pub const LIBRARIES: &str = "libraries";
pub const PLUGINS: &str = "plugins";

static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*\[([\w.-]+)\]").expect("hardcoded regex must compile")
});

/// `key =` at the start of a line; the value is read separately.
static ENTRY_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*([\w.-]+)[ \t]*=[ \t]*").expect("hardcoded regex must compile")
});

/// Text inside each managed section that is not an entry.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SectionResidue {
    pub versions: String,
    pub libraries: String,
    pub plugins: String,
}

/// Contents of a version catalog.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogContents {
    /// `[versions]` entries with plain string values: name to version.
    pub versions: BTreeMap<String, String>,
    /// `[versions]` entries kept verbatim, such as `{ strictly = "1.0" }`.
    pub version_literals: BTreeMap<String, String>,
    /// `[libraries]`: alias to literal (`{ .. }` table or quoted notation).
    pub libraries: BTreeMap<String, String>,
    /// `[plugins]`: alias to literal.
    pub plugins: BTreeMap<String, String>,
    pub residue: SectionResidue,
    /// Text outside the managed sections, in original order.
    pub leftover: String,
}

impl CatalogContents {
    /// Value stored under a `[versions]` key, plain or verbatim.
    pub fn version(&self, key: &str) -> Option<&str> {
        self.versions
            .get(key)
            .or_else(|| self.version_literals.get(key))
            .map(String::as_str)
    }
}

/// Parses catalog text.
///
/// Everything up to and including the last line containing `marker` is
/// dropped so a regenerated catalog does not collect one marker per run. When
/// a key appears twice within a section the first occurrence wins.
pub fn parse(text: &str, marker: &str) -> CatalogContents {
    let text = strip_through_marker(text, marker);
    let mut contents = CatalogContents::default();

    let headers: Vec<_> = SECTION_HEADER.captures_iter(text).collect();
    let first_header = headers
        .first()
        .and_then(|c| c.get(0))
        .map_or(text.len(), |m| m.start());
    contents.leftover.push_str(&text[..first_header]);

    for (index, caps) in headers.iter().enumerate() {
        let (Some(header), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let section_end = headers
            .get(index + 1)
            .and_then(|c| c.get(0))
            .map_or(text.len(), |m| m.start());
        let body = &text[header.end()..section_end];

        match name.as_str() {
            VERSIONS => {
                let residue = parse_versions(body, &mut contents);
                append_residue(&mut contents.residue.versions, &residue);
            }
            LIBRARIES => {
                let residue = parse_literals(body, &mut contents.libraries);
                append_residue(&mut contents.residue.libraries, &residue);
            }
            PLUGINS => {
                let residue = parse_literals(body, &mut contents.plugins);
                append_residue(&mut contents.residue.plugins, &residue);
            }
            _ => contents.leftover.push_str(&text[header.start()..section_end]),
        }
    }

    contents
}

fn strip_through_marker<'a>(text: &'a str, marker: &str) -> &'a str {
    match text.rfind(marker) {
        Some(pos) => match text[pos..].find('\n') {
            Some(newline) => &text[pos + newline + 1..],
            None => "",
        },
        None => text,
    }
}

fn append_residue(target: &mut String, residue: &str) {
    let residue = residue.trim();
    if residue.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push('\n');
    }
    target.push_str(residue);
    target.push('\n');
}

/// Reads `[versions]` entries. Plain strings land in `versions`, anything
/// else (rich version tables, strings with escapes) in `version_literals`.
fn parse_versions(body: &str, contents: &mut CatalogContents) -> String {
    split_entries(body, |key, value| {
        if contents.version(key).is_some() {
            return;
        }
        match plain_string(value) {
            Some(version) => {
                contents
                    .versions
                    .insert(key.to_string(), version.to_string());
            }
            None => {
                contents
                    .version_literals
                    .insert(key.to_string(), value.to_string());
            }
        }
    })
}

/// Reads `key = { .. }` and `key = ".."` entries, keeping the value verbatim.
fn parse_literals(body: &str, entries: &mut BTreeMap<String, String>) -> String {
    split_entries(body, |key, value| {
        entries
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    })
}

/// Hands every `key = value` entry of a section body to `on_entry` and
/// returns the text between entries.
///
/// Tables are delimited by brace matching so nested inline tables such as
/// `version = { strictly = "1.0" }` stay intact, and lines inside a multi-line
/// table are never mistaken for entries of their own.
fn split_entries(body: &str, mut on_entry: impl FnMut(&str, &str)) -> String {
    let mut residue = String::new();
    let mut last = 0;
    let mut pos = 0;

    while let Some(caps) = ENTRY_KEY.captures_at(body, pos) {
        let Some(whole) = caps.get(0) else { break };
        let value_start = whole.end();

        match value_end(body, value_start) {
            Some(end) => {
                on_entry(&caps[1], &body[value_start..end]);
                residue.push_str(&body[last..whole.start()]);
                last = end;
                pos = end;
            }
            None => pos = whole.end(),
        }

        if pos >= body.len() {
            break;
        }
    }

    residue.push_str(&body[last..]);
    residue
}

/// End of the value starting at `start`: an inline table, a basic string or a
/// literal string.
fn value_end(body: &str, start: usize) -> Option<usize> {
    let bytes = body.as_bytes();
    match bytes.get(start)? {
        b'{' => matching_brace(body, start).map(|close| close + 1),
        b'\'' => body[start + 1..].find('\'').map(|close| start + close + 2),
        b'"' => {
            let mut i = start + 1;
            while let Some(&b) = bytes.get(i) {
                match b {
                    b'\\' => i += 2,
                    b'"' => return Some(i + 1),
                    b'\n' => return None,
                    _ => i += 1,
                }
            }
            None
        }
        _ => None,
    }
}

/// Contents of a quoted value that reads the same inside double quotes.
fn plain_string(literal: &str) -> Option<&str> {
    let inner = literal
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| literal.strip_prefix('\'')?.strip_suffix('\''))?;
    let plain = !inner.is_empty() && !inner.contains(['"', '\\']);
    plain.then_some(inner)
}

/// Renders a catalog.
///
/// Sections are written in the fixed order versions, libraries, plugins with
/// keys ascending and each section's residue after its entries, followed by
/// the trimmed leftover text. `timestamp` is appended to the marker line
/// verbatim.
pub fn render(contents: &CatalogContents, marker: &str, timestamp: &str) -> String {
    let mut out = format!("{} {}\n\n", marker, timestamp);

    let mut versions: BTreeMap<&str, String> = BTreeMap::new();
    for (key, literal) in &contents.version_literals {
        versions.insert(key, literal.clone());
    }
    for (key, version) in &contents.versions {
        versions.insert(key, format!("\"{}\"", version));
    }
    let versions = versions.iter().map(|(key, value)| (*key, value.as_str()));
    push_section(&mut out, VERSIONS, versions, &contents.residue.versions);

    out.push('\n');
    let libraries = contents
        .libraries
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()));
    push_section(&mut out, LIBRARIES, libraries, &contents.residue.libraries);

    out.push('\n');
    let plugins = contents
        .plugins
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()));
    push_section(&mut out, PLUGINS, plugins, &contents.residue.plugins);

    push_block(&mut out, &contents.leftover);
    out
}

fn push_section<'a>(
    out: &mut String,
    name: &str,
    entries: impl Iterator<Item = (&'a str, &'a str)>,
    residue: &str,
) {
    out.push_str(&format!("[{}]\n", name));
    for (key, value) in entries {
        out.push_str(&format!("{} = {}\n", key, value));
    }
    push_block(out, residue);
}

/// Appends trimmed `text` after a blank line, if there is any.
fn push_block(out: &mut String, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        out.push('\n');
        out.push_str(text);
        out.push('\n');
    }
}
