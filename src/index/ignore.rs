use glob::Pattern;
use std::path::Path;

/// Glob patterns for directories that should not be scanned for image
/// definitions, e.g. `legacy/*` or `**/vendor`.
#[derive(Debug, Clone, Default)]
pub struct ExcludeRules {
    patterns: Vec<Pattern>,
}

impl ExcludeRules {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds rules from a list of patterns. Invalid patterns are logged and skipped.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty() && !p.starts_with('#'))
            .filter_map(|p| match Pattern::new(&p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!(pattern = %p, error = %e, "Ignoring invalid exclude pattern");
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns true if the given path (relative to the scan directory) should be skipped
    pub fn is_excluded(&self, path: &Path) -> bool {
        // Check the path itself and all its parents
        for ancestor in path.ancestors() {
            let path_str = ancestor.to_string_lossy();
            if path_str.is_empty() || path_str == "." {
                continue;
            }
            if self.patterns.iter().any(|p| p.matches(&path_str)) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let rules = ExcludeRules::new(["legacy", ".git"]);
        assert!(rules.is_excluded(Path::new("legacy/app/Dockerfile")));
        assert!(rules.is_excluded(Path::new(".git")));
        assert!(!rules.is_excluded(Path::new("web/Dockerfile")));
    }

    #[test]
    fn test_wildcard() {
        let rules = ExcludeRules::new(["*-old"]);
        assert!(rules.is_excluded(Path::new("api-old/Dockerfile")));
        assert!(!rules.is_excluded(Path::new("api/Dockerfile")));
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let rules = ExcludeRules::new(["[", "", "# comment"]);
        assert!(rules.is_empty());
    }
}
