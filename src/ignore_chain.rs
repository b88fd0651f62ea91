// src/ignore_chain.rs
//!
//! # Ignore-Rule Chain
//!
//! Per-directory `.gitignore`/`.ignore` matchers, inherited downward by
//! cloning the parent's rule list and appending; never mutated in place.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

/// One compiled ignore matcher, anchored at the directory it was loaded from.
#[derive(Clone)]
pub struct IgnoreRule {
    base: PathBuf,
    matcher: Gitignore,
}

impl IgnoreRule {
    fn matches(&self, path: &Path, is_dir: bool) -> bool {
        let rel = match path.strip_prefix(&self.base) {
            Ok(rel) => rel,
            Err(_) => return false,
        };
        self.matcher.matched(rel, is_dir).is_ignore()
    }
}

/// The chain of rules in effect for a directory: parent-inherited rules
/// followed by any rules newly loaded in this directory.
#[derive(Clone, Default)]
pub struct IgnoreChain {
    rules: Vec<IgnoreRule>,
}

impl IgnoreChain {
    pub fn empty() -> Self {
        IgnoreChain { rules: Vec::new() }
    }

    /// Loads `.gitignore` then `.ignore` from `dir` and returns a new chain
    /// extending `self` with whichever compiles successfully. `self` is left
    /// untouched.
    pub fn extend_for_dir(&self, dir: &Path) -> IgnoreChain {
        let mut rules = self.rules.clone();
        for filename in [".gitignore", ".ignore"] {
            let candidate = dir.join(filename);
            if !candidate.is_file() {
                continue;
            }
            let mut builder = GitignoreBuilder::new(dir);
            if let Some(err) = builder.add(&candidate) {
                tracing::warn!(path = ?candidate, error = %err, "failed to read ignore file");
                continue;
            }
            match builder.build() {
                Ok(matcher) => rules.push(IgnoreRule {
                    base: dir.to_path_buf(),
                    matcher,
                }),
                Err(err) => {
                    tracing::warn!(path = ?candidate, error = %err, "failed to compile ignore matcher");
                }
            }
        }
        IgnoreChain { rules }
    }

    /// True iff any rule in the chain matches `path` relative to its base.
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.rules.iter().any(|rule| rule.matches(path, is_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn empty_chain_ignores_nothing() {
        let chain = IgnoreChain::empty();
        assert!(!chain.is_ignored(Path::new("/tmp/whatever.txt"), false));
    }

    #[test]
    fn loads_gitignore_and_matches() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".gitignore"), "*.txt\n").unwrap();

        let chain = IgnoreChain::empty().extend_for_dir(dir.path());
        assert!(chain.is_ignored(&dir.path().join("y.txt"), false));
        assert!(!chain.is_ignored(&dir.path().join("x.go"), false));
    }

    #[test]
    fn child_inherits_parent_rules_without_mutating_parent() {
        let root = tempdir().unwrap();
        fs::write(root.path().join(".gitignore"), "*.log\n").unwrap();
        let sub = root.path().join("sub");
        fs::create_dir(&sub).unwrap();

        let parent_chain = IgnoreChain::empty().extend_for_dir(root.path());
        let child_chain = parent_chain.extend_for_dir(&sub);

        assert!(child_chain.is_ignored(&sub.join("a.log"), false));
        assert_eq!(parent_chain.rules.len(), 1);
        assert_eq!(child_chain.rules.len(), 1);
    }

    #[test]
    fn missing_ignore_files_yield_unchanged_chain() {
        let dir = tempdir().unwrap();
        let chain = IgnoreChain::empty();
        let extended = chain.extend_for_dir(dir.path());
        assert_eq!(extended.rules.len(), 0);
    }
}
