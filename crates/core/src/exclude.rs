//! Exclude patterns for archiving
//!
//! Patterns use gitignore syntax (`*.tmp`, `node_modules/`, `/build`), matched
//! relative to the directory being archived. They are validated once, when
//! the configuration is loaded, and compiled against a concrete root later.

use anyhow::Result;
use globset::GlobBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

/// A rejected exclude pattern
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid exclude pattern '{pattern}': {reason}")]
pub struct InvalidPattern {
    pub pattern: String,
    pub reason: String,
}

/// Validated list of exclude globs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludeRules {
    patterns: Vec<String>,
}

impl ExcludeRules {
    /// Validate each pattern; blank entries are dropped
    pub fn new<I, S>(patterns: I) -> Result<Self, InvalidPattern>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut validator = GitignoreBuilder::new("/");
        let mut accepted = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            let invalid = |reason: String| InvalidPattern {
                pattern: pattern.to_string(),
                reason,
            };
            validate_glob(pattern).map_err(invalid)?;
            validator
                .add_line(None, pattern)
                .map_err(|e| invalid(e.to_string()))?;
            accepted.push(pattern.to_string());
        }

        Ok(Self { patterns: accepted })
    }

    /// Parse a comma-separated list (`"*.tmp, *.log,cache/"`)
    pub fn parse_list(raw: &str) -> Result<Self, InvalidPattern> {
        Self::new(raw.split(','))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Compile the patterns against a root directory
    pub fn matcher(&self, root: &Path) -> Result<ExcludeMatcher> {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in &self.patterns {
            builder.add_line(None, pattern)?;
        }
        Ok(ExcludeMatcher {
            gitignore: builder.build()?,
        })
    }
}

/// Compile the glob part of a gitignore line strictly
///
/// The gitignore matcher reads an unclosed `[` as a literal; a config value
/// like that is almost always a typo, so it is rejected here.
fn validate_glob(pattern: &str) -> Result<(), String> {
    let glob = pattern.strip_prefix('!').unwrap_or(pattern);
    let glob = glob.strip_prefix('/').unwrap_or(glob);
    let glob = glob.strip_suffix('/').unwrap_or(glob);
    if glob.is_empty() {
        return Err("pattern matches nothing".to_string());
    }

    GlobBuilder::new(glob)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map(|_| ())
        .map_err(|e| e.kind().to_string())
}

/// Exclude patterns compiled for one root
pub struct ExcludeMatcher {
    gitignore: Gitignore,
}

impl ExcludeMatcher {
    /// Check a path under the root (absolute or root-relative)
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        self.gitignore.matched(path, is_dir).is_ignore()
    }
}
