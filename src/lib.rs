//! gradle-catalog library for moving inline Gradle versions into a version catalog.
//!
//! This library provides programmatic access to the catalog migration. A run
//! has three stages:
//!
//! 1. **Scanning**: Collect build scripts and extract `dependencies { }` and
//!    `plugins { }` declarations that carry literal versions
//! 2. **Merging**: Reconcile those declarations with an existing
//!    `libs.versions.toml`, keeping every distinct version under its own key
//! 3. **Rewriting**: Write the catalog and replace each declaration with a
//!    `libs.*` reference
//!
//! # Example
//!
//! ```no_run
//! use gradle_catalog::{pipeline, scanner};
//! use std::path::PathBuf;
//! use std::sync::atomic::AtomicBool;
//!
//! // Collect build scripts and the catalog they share
//! let targets = scanner::collect_targets(&[PathBuf::from(".")], &[], true).unwrap();
//! let catalog = targets
//!     .catalog
//!     .unwrap_or_else(|| PathBuf::from("gradle/libs.versions.toml"));
//!
//! // Run every phase, printing progress as it goes
//! let options = pipeline::RunOptions::new(catalog);
//! let progress = |phase: pipeline::Phase, fraction: f64| {
//!     println!("{:>3.0}% {}", fraction * 100.0, phase);
//! };
//! let report = pipeline::run(&targets.build_files, &options, &progress, &AtomicBool::new(false));
//!
//! println!("Rewrote {} build files", report.files_rewritten.len());
//! ```

pub mod catalog;
pub mod declaration;
pub mod error;
pub mod keys;
pub mod pipeline;
pub mod reconciler;
pub mod rewriter;
pub mod scanner;

// Re-export commonly used types at crate root
pub use catalog::CatalogContents;
pub use declaration::{Declaration, DependencyDeclaration, PluginDeclaration};
pub use error::{ErrorLog, RunError};
pub use pipeline::{Phase, ProgressSink, RunOptions, RunReport, RunStatus};
pub use scanner::FileScan;
