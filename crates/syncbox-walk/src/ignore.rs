//! Ignore, hidden-file, and dependency-directory rules applied during a walk.
//!
//! Patterns come in three forms:
//! - `"foo/"`: directory prefix, matches `foo` anywhere as a directory
//!   segment and everything beneath it;
//! - anything containing `*`: a wildcard anchored to a segment start and the
//!   end of the path (`"*.log"` matches `a/b.log`);
//! - anything else: exact suffix, matches a path equal to the pattern or
//!   ending in `/pattern`.

use regex::Regex;

/// Patterns ignored in every walk.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git/",
    ".svn/",
    ".hg/",
    "__pycache__/",
    ".pytest_cache/",
    ".mypy_cache/",
    ".idea/",
    ".vscode/",
    ".next/",
    ".cache/",
    "coverage/",
    "*.pyc",
    "*.pyo",
    "*.swp",
    "*.tmp",
    ".DS_Store",
    "Thumbs.db",
];

/// A directory holding fetched dependencies. Only the listed manifest or
/// lock files directly inside it are kept; the rest can be restored from them.
#[derive(Debug, Clone, Copy)]
pub struct DependencyRoot {
    pub dir: &'static str,
    pub manifests: &'static [&'static str],
}

pub const DEPENDENCY_ROOTS: &[DependencyRoot] = &[
    DependencyRoot {
        dir: "node_modules",
        manifests: &[".package-lock.json", ".yarn-integrity", ".modules.yaml", ".yarn-state.yml"],
    },
    DependencyRoot {
        dir: "vendor",
        manifests: &["modules.txt", "autoload.php"],
    },
    DependencyRoot {
        dir: "bower_components",
        manifests: &[".bower.json"],
    },
    DependencyRoot {
        dir: ".venv",
        manifests: &["pyvenv.cfg"],
    },
    DependencyRoot {
        dir: "venv",
        manifests: &["pyvenv.cfg"],
    },
    DependencyRoot {
        dir: "Pods",
        manifests: &["Manifest.lock"],
    },
];

/// Outcome of evaluating one walked path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    /// Matched an ignore pattern.
    Ignored,
    /// Name starts with `.` and hidden entries are excluded.
    Hidden,
    /// Inside a dependency root and not one of its manifests.
    Dependency,
}

impl Verdict {
    pub fn is_keep(self) -> bool {
        self == Verdict::Keep
    }
}

#[derive(Debug)]
pub struct IgnoreRules {
    dir_prefixes: Vec<String>,
    wildcards: Vec<Regex>,
    exact: Vec<String>,
    include_hidden: bool,
}

impl IgnoreRules {
    /// Built-in patterns plus `custom`.
    pub fn new(custom: &[String], include_hidden: bool) -> anyhow::Result<Self> {
        let mut rules = Self {
            dir_prefixes: Vec::new(),
            wildcards: Vec::new(),
            exact: Vec::new(),
            include_hidden,
        };
        let patterns = DEFAULT_IGNORE_PATTERNS
            .iter()
            .copied()
            .chain(custom.iter().map(String::as_str));
        for pattern in patterns {
            rules.add(pattern)?;
        }
        Ok(rules)
    }

    fn add(&mut self, pattern: &str) -> anyhow::Result<()> {
        let pattern = pattern.trim();
        if pattern.is_empty() || pattern.starts_with('#') {
            return Ok(());
        }
        if pattern.contains('*') {
            self.wildcards.push(wildcard_regex(pattern)?);
        } else if let Some(dir) = pattern.strip_suffix('/') {
            self.dir_prefixes
                .push(format!("/{}/", dir.trim_start_matches('/')));
        } else {
            self.exact.push(pattern.trim_start_matches('/').to_string());
        }
        Ok(())
    }

    /// Whether `rel_path` matches any ignore pattern.
    pub fn matches_pattern(&self, rel_path: &str, is_dir: bool) -> bool {
        let haystack = if is_dir {
            format!("/{rel_path}/")
        } else {
            format!("/{rel_path}")
        };
        if self.dir_prefixes.iter().any(|p| haystack.contains(p.as_str())) {
            return true;
        }
        if self.wildcards.iter().any(|re| re.is_match(rel_path)) {
            return true;
        }
        self.exact.iter().any(|name| {
            rel_path == name
                || rel_path
                    .strip_suffix(name.as_str())
                    .is_some_and(|head| head.ends_with('/'))
        })
    }

    /// Evaluate a `/`-separated path relative to the selection root.
    pub fn classify(&self, rel_path: &str, is_dir: bool) -> Verdict {
        if self.matches_pattern(rel_path, is_dir) {
            return Verdict::Ignored;
        }

        let segments: Vec<&str> = rel_path.split('/').collect();
        if let Some(verdict) = dependency_verdict(&segments, is_dir) {
            return verdict;
        }

        let name = segments.last().copied().unwrap_or_default();
        if !self.include_hidden && name.starts_with('.') {
            return Verdict::Hidden;
        }
        Verdict::Keep
    }
}

/// `Some` when the path is a dependency root or lies inside one.
fn dependency_verdict(segments: &[&str], is_dir: bool) -> Option<Verdict> {
    let (idx, root) = segments.iter().enumerate().find_map(|(i, seg)| {
        DEPENDENCY_ROOTS
            .iter()
            .find(|root| root.dir == *seg)
            .map(|root| (i, root))
    })?;

    let depth_below = segments.len() - 1 - idx;
    match depth_below {
        // The dependency directory itself: walk into it to reach its manifests.
        0 if is_dir => Some(Verdict::Keep),
        1 if !is_dir && root.manifests.contains(&segments[idx + 1]) => Some(Verdict::Keep),
        _ => Some(Verdict::Dependency),
    }
}

fn wildcard_regex(pattern: &str) -> anyhow::Result<Regex> {
    let body = pattern
        .trim_start_matches('/')
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("[^/]*");
    Ok(Regex::new(&format!("(^|/){body}$"))?)
}
