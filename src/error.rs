//! Run errors and the error log.
//!
//! Failures never abort a run as a panic or an `Err` from [`crate::pipeline::run`].
//! They are recorded in an [`ErrorLog`], which is written next to the catalog so
//! the user can see which files were skipped and why.

use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A failure confined to one file or one phase of a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// A build script or the catalog could not be read; it contributes nothing.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The catalog could not be written; nothing is rewritten.
    #[error("failed to write catalog {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// One build script could not be rewritten; other files are unaffected.
    #[error("failed to rewrite {}: {reason}", path.display())]
    Rewrite { path: PathBuf, reason: String },
}

impl RunError {
    /// Phase label used as the log entry heading.
    pub fn context(&self) -> &'static str {
        match self {
            RunError::Read { path, .. } if is_catalog(path) => "reading catalog",
            RunError::Read { .. } => "reading build file",
            RunError::Write { .. } => "creating catalog",
            RunError::Rewrite { .. } => "updating build file",
        }
    }
}

fn is_catalog(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}

/// One entry of the error log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub context: String,
    pub message: String,
}

/// Append-only record of everything that went wrong during one run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ErrorLog {
    entries: Vec<LogEntry>,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, context: impl Into<String>, message: impl Into<String>) {
        self.entries.push(LogEntry {
            context: context.into(),
            message: message.into(),
        });
    }

    /// Records a run error under its phase context.
    pub fn record(&mut self, error: &RunError) {
        tracing::warn!("{error}");
        self.push(error.context(), error.to_string());
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Renders every entry as `[context]\n\tmessage`, one per line pair.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&format!("[{}]\n\t{}\n", entry.context, entry.message));
        }
        out
    }

    /// Writes the log to `path`, replacing any log from a previous run.
    ///
    /// An empty log removes the stale file instead of writing an empty one.
    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        if self.is_empty() {
            return match std::fs::remove_file(path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            };
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_entries_in_order() {
        let mut log = ErrorLog::new();
        log.push("creating catalog", "disk full");
        log.push("updating build file", "permission denied");
        assert_eq!(
            log.render(),
            "[creating catalog]\n\tdisk full\n[updating build file]\n\tpermission denied\n"
        );
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn context_depends_on_error_kind() {
        let read = RunError::Read {
            path: PathBuf::from("app/build.gradle.kts"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        let catalog = RunError::Read {
            path: PathBuf::from("gradle/libs.versions.toml"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        let rewrite = RunError::Rewrite {
            path: PathBuf::from("build.gradle"),
            reason: "changed".to_string(),
        };
        assert_eq!(read.context(), "reading build file");
        assert_eq!(catalog.context(), "reading catalog");
        assert_eq!(rewrite.context(), "updating build file");
    }

    #[test]
    fn record_uses_display_message() {
        let mut log = ErrorLog::new();
        log.record(&RunError::Rewrite {
            path: PathBuf::from("build.gradle"),
            reason: "span changed".to_string(),
        });
        assert_eq!(
            log.entries()[0],
            LogEntry {
                context: "updating build file".to_string(),
                message: "failed to rewrite build.gradle: span changed".to_string(),
            }
        );
    }

    #[test]
    fn write_to_replaces_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gradle/catalog-errors.log");

        let mut log = ErrorLog::new();
        log.push("reading build file", "boom");
        log.write_to(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[reading build file]\n\tboom\n"
        );

        ErrorLog::new().write_to(&path).unwrap();
        assert!(!path.exists());
    }
}
