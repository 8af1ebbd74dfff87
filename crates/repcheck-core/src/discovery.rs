use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

/// Include/exclude matcher for candidate script paths.
///
/// A pattern matches when it matches the path relative to the search root,
/// or, for patterns without a `/`, the bare file name.
pub struct ScriptMatcher {
    include: GlobSet,
    exclude: GlobSet,
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).with_context(|| format!("invalid glob pattern '{pattern}'"))?;
        builder.add(glob);
    }
    builder.build().context("failed to compile glob patterns")
}

impl ScriptMatcher {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    /// `true` if `rel_path` matches any include pattern and no exclude pattern.
    pub fn is_match(&self, rel_path: &Path) -> bool {
        matches_any(&self.include, rel_path) && !matches_any(&self.exclude, rel_path)
    }
}

fn matches_any(set: &GlobSet, rel_path: &Path) -> bool {
    let normalized = rel_path.to_string_lossy().replace('\\', "/");
    if set.is_match(&normalized) {
        return true;
    }
    rel_path
        .file_name()
        .is_some_and(|name| set.is_match(Path::new(name)))
}

/// Find scripts under `root` matching `include` and not `exclude`.
///
/// Returns canonical paths, sorted and deduplicated.
pub fn discover_scripts(root: &Path, include: &[String], exclude: &[String]) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        anyhow::bail!("'{}' is not a directory", root.display());
    }
    let matcher = ScriptMatcher::new(include, exclude)?;

    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {e}");
                None
            }
        })
        // Symlinked files count; symlinked directories are not descended.
        .filter(|e| e.file_type().is_file() || (e.path_is_symlink() && e.path().is_file()))
        .filter(|e| {
            let rel = e.path().strip_prefix(root).unwrap_or(e.path());
            matcher.is_match(rel)
        })
        .map(|e| {
            let path = e.into_path();
            path.canonicalize().unwrap_or(path)
        })
        .collect();

    found.sort();
    found.dedup();
    tracing::debug!(root = %root.display(), count = found.len(), "discovered scripts");
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    fn names(root: &Path, found: &[PathBuf]) -> Vec<String> {
        let root = root.canonicalize().unwrap();
        found
            .iter()
            .map(|p| {
                p.strip_prefix(&root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn test_discovers_sorted_matches() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "z.py");
        touch(tmp.path(), "a.py");
        touch(tmp.path(), "sub/m.py");
        touch(tmp.path(), "notes.txt");

        let found = discover_scripts(tmp.path(), &patterns(&["**/*.py"]), &[]).unwrap();
        assert_eq!(names(tmp.path(), &found), vec!["a.py", "sub/m.py", "z.py"]);
        assert!(found.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn test_character_class_matches_both_cases() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "upper.R");
        touch(tmp.path(), "lower.r");
        touch(tmp.path(), "other.Rmd");

        let found = discover_scripts(tmp.path(), &patterns(&["**/*.[Rr]"]), &[]).unwrap();
        assert_eq!(names(tmp.path(), &found), vec!["lower.r", "upper.R"]);
    }

    #[test]
    fn test_excludes_by_directory_and_file_name() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "keep.R");
        touch(tmp.path(), "plot_draft.R");
        touch(tmp.path(), "ignored/old.R");

        let found = discover_scripts(
            tmp.path(),
            &patterns(&["**/*.R"]),
            &patterns(&["*_draft.R", "ignored/**"]),
        )
        .unwrap();
        assert_eq!(names(tmp.path(), &found), vec!["keep.R"]);
    }

    #[test]
    fn test_multiple_include_patterns_do_not_duplicate() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "a.py");

        let found =
            discover_scripts(tmp.path(), &patterns(&["**/*.py", "*.py", "a.*"]), &[]).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_script_is_discovered() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "proj/main.sh");
        touch(tmp.path(), "shared/real.sh");
        std::os::unix::fs::symlink(
            tmp.path().join("shared/real.sh"),
            tmp.path().join("proj/linked.sh"),
        )
        .unwrap();

        let found =
            discover_scripts(&tmp.path().join("proj"), &patterns(&["**/*.sh"]), &[]).unwrap();
        let target = tmp.path().join("shared/real.sh").canonicalize().unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&target));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_and_target_are_merged() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "real.sh");
        std::os::unix::fs::symlink(tmp.path().join("real.sh"), tmp.path().join("alias.sh"))
            .unwrap();

        let found = discover_scripts(tmp.path(), &patterns(&["*.sh"]), &[]).unwrap();
        assert_eq!(names(tmp.path(), &found), vec!["real.sh"]);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = discover_scripts(&tmp.path().join("nope"), &patterns(&["*.py"]), &[]);
        assert!(err.is_err());
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = discover_scripts(tmp.path(), &patterns(&["[unclosed"]), &[]).unwrap_err();
        assert!(format!("{err:#}").contains("[unclosed"));
    }
}
