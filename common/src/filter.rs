//! Ignore patterns for directory copies
//!
//! Every transfer step may carry a list of glob patterns. While a step's source directory is
//! walked, each entry's path relative to the step source is checked against those patterns and
//! matching entries are skipped; a matching directory is not descended into.
//!
//! # Pattern Syntax
//!
//! - `*` matches anything except `/`
//! - `**` matches anything including `/` (crosses directories)
//! - `?` matches a single character (except `/`)
//! - `[...]` character classes
//! - Leading `/` anchors to the step source
//! - Trailing `/` matches only directories
//!
//! # Examples
//!
//! ```
//! use common::filter::IgnoreSettings;
//! use std::path::Path;
//!
//! let ignore = IgnoreSettings::compile(&["*.log", "cache/"]).unwrap();
//!
//! assert_eq!(ignore.matched(Path::new("app/debug.log"), false), Some("*.log"));
//! assert_eq!(ignore.matched(Path::new("app/cache"), true), Some("cache/"));
//! assert_eq!(ignore.matched(Path::new("app/main.rs"), false), None);
//! ```

use anyhow::{Context, anyhow};
use std::path::Path;

/// A compiled ignore pattern with metadata about its original form
#[derive(Debug, Clone)]
pub struct IgnorePattern {
    /// original pattern string, reported when an entry is skipped
    pub original: String,
    matcher: globset::GlobMatcher,
    /// pattern ends with / (matches only directories)
    pub dir_only: bool,
    /// pattern starts with / (anchored to the step source)
    pub anchored: bool,
}

impl IgnorePattern {
    pub fn parse(pattern: &str) -> Result<Self, anyhow::Error> {
        if pattern.is_empty() {
            return Err(anyhow!("empty ignore pattern is not allowed"));
        }
        let dir_only = pattern.ends_with('/');
        let anchored = pattern.starts_with('/');
        // strip leading/trailing markers for glob compilation
        let pattern_str = pattern.trim_start_matches('/').trim_end_matches('/');
        if pattern_str.is_empty() {
            return Err(anyhow!(
                "ignore pattern '{}' results in empty glob after stripping / markers",
                pattern
            ));
        }
        let glob = globset::GlobBuilder::new(pattern_str)
            .literal_separator(true) // * doesn't match /
            .build()
            .with_context(|| format!("invalid ignore pattern: {pattern}"))?;
        Ok(Self {
            original: pattern.to_string(),
            matcher: glob.compile_matcher(),
            dir_only,
            anchored,
        })
    }

    /// Path patterns (containing `/` besides the markers) must match the whole relative path.
    fn is_path_pattern(&self) -> bool {
        let core = self.original.trim_start_matches('/').trim_end_matches('/');
        core.contains('/')
    }

    pub fn matches(&self, relative_path: &Path, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        if self.matcher.is_match(relative_path) {
            return true;
        }
        if self.anchored || self.is_path_pattern() {
            return false;
        }
        // simple patterns also match the entry name at any depth
        relative_path
            .file_name()
            .is_some_and(|name| self.matcher.is_match(Path::new(name)))
    }
}

/// The compiled ignore list of one transfer step
#[derive(Debug, Clone, Default)]
pub struct IgnoreSettings {
    pub patterns: Vec<IgnorePattern>,
}

impl IgnoreSettings {
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Result<Self, anyhow::Error> {
        let patterns = patterns
            .iter()
            .map(|pattern| IgnorePattern::parse(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns the first pattern matching `relative_path`, if any.
    ///
    /// The walk root (empty relative path) is never matched.
    pub fn matched(&self, relative_path: &Path, is_dir: bool) -> Option<&str> {
        if relative_path.as_os_str().is_empty() {
            return None;
        }
        self.patterns
            .iter()
            .find(|pattern| pattern.matches(relative_path, is_dir))
            .map(|pattern| pattern.original.as_str())
    }
}
