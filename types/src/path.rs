use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path: drop `.` components and fold `..` into the
/// preceding component. Does not touch the filesystem or follow symlinks.
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = Vec::new();
    for c in path.components() {
        match c {
            Component::ParentDir => {
                match out.last() {
                    Some(Component::Normal(_)) => {
                        out.pop();
                    }
                    None | Some(Component::ParentDir) => out.push(c),
                    // `..` at the filesystem root stays at the root.
                    Some(_) => {}
                }
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_current_and_parent_components() {
        assert_eq!(
            normalize_path(Path::new("/work/./contracts/../lib/jetton.tact")),
            PathBuf::from("/work/lib/jetton.tact")
        );
    }

    #[test]
    fn parent_of_root_stays_at_root() {
        assert_eq!(
            normalize_path(Path::new("/../etc/x.tact")),
            PathBuf::from("/etc/x.tact")
        );
    }

    #[test]
    fn leading_parent_of_relative_path_is_kept() {
        assert_eq!(
            normalize_path(Path::new("../shared/./a.tact")),
            PathBuf::from("../shared/a.tact")
        );
    }

    #[test]
    fn equal_paths_normalize_equal() {
        assert_eq!(
            normalize_path(Path::new("/p/sub/../main.tact")),
            normalize_path(Path::new("/p/./main.tact"))
        );
    }
}
