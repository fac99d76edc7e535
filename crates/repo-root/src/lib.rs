use std::path::{Path, PathBuf};

pub fn find_git_root() -> PathBuf {
    let cwd = std::env::current_dir().unwrap();
    find_git_root_from(&cwd)
}

pub fn find_git_root_from(search_start: &Path) -> PathBuf {
    find_ancestor_with_markers(search_start, &[".git"]).unwrap_or_else(|| search_start.to_path_buf())
}

/// Walk up from `search_start` looking for the nearest ancestor directory
/// containing any of `markers` (files or directories, matched by name).
/// Returns `None` if no ancestor (including `search_start` itself) matches.
pub fn find_ancestor_with_markers(search_start: &Path, markers: &[&str]) -> Option<PathBuf> {
    let mut path = PathBuf::from(search_start);
    loop {
        if markers.iter().any(|m| path.join(m).exists()) {
            return Some(path);
        }
        if !path.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn finds_nearest_marker() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        std::fs::write(dir.path().join("a/pyproject.toml"), "").unwrap();

        let found = find_ancestor_with_markers(&dir.path().join("a/b/c"), &["pyproject.toml", ".git"]);
        assert_eq!(found, Some(dir.path().join("a")));
    }

    #[test]
    fn falls_back_to_none_when_unmarked() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("x/y")).unwrap();
        let found = find_ancestor_with_markers(&dir.path().join("x/y"), &["setup.py"]);
        assert_eq!(found, None);
    }
}
