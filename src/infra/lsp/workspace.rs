//! Workspace path resolution
//!
//! Maps caller-supplied paths onto the session's workspace root. Keys are
//! lexically normalized relative paths; canonicalization is only used to
//! reject symlinks that leave the root.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{SessionError, SessionResult};

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    canonical_root: PathBuf,
}

impl Workspace {
    pub fn new(root: &Path) -> io::Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            canonical_root: root.canonicalize()?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalized workspace-relative key for `path`.
    ///
    /// Absolute paths must lie under the root. `..` may not climb above it.
    pub fn relative_key(&self, path: &Path) -> SessionResult<PathBuf> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root)
                .or_else(|_| path.strip_prefix(&self.canonical_root))
                .map_err(|_| SessionError::PathEscapesWorkspace(path.to_path_buf()))?
        } else {
            path
        };

        let mut key = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::CurDir => {}
                Component::Normal(part) => key.push(part),
                Component::ParentDir => {
                    if !key.pop() {
                        return Err(SessionError::PathEscapesWorkspace(path.to_path_buf()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(SessionError::PathEscapesWorkspace(path.to_path_buf()));
                }
            }
        }

        if key.as_os_str().is_empty() {
            return Err(SessionError::FileNotFound(path.to_path_buf()));
        }
        Ok(key)
    }

    pub fn absolute(&self, key: &Path) -> PathBuf {
        self.root.join(key)
    }

    /// Resolve an existing regular file, returning its key and absolute path
    pub fn resolve_existing(&self, path: &Path) -> SessionResult<(PathBuf, PathBuf)> {
        let key = self.relative_key(path)?;
        let absolute = self.absolute(&key);

        let canonical = match absolute.canonicalize() {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SessionError::FileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        if !canonical.starts_with(&self.canonical_root) {
            return Err(SessionError::PathEscapesWorkspace(path.to_path_buf()));
        }
        if !canonical.is_file() {
            return Err(SessionError::FileNotFound(path.to_path_buf()));
        }

        Ok((key, absolute))
    }

    /// Relative form of a backend-reported path when it lies inside the root
    pub fn display_path(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root)
            .or_else(|_| path.strip_prefix(&self.canonical_root))
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("main.py"), "print('hi')\n").unwrap();
        std::fs::write(dir.path().join("pkg/util.py"), "").unwrap();
        let ws = Workspace::new(dir.path()).unwrap();
        (dir, ws)
    }

    #[test]
    fn test_relative_key_normalizes() {
        let (_dir, ws) = workspace();
        assert_eq!(
            ws.relative_key(Path::new("./pkg/../main.py")).unwrap(),
            PathBuf::from("main.py")
        );
        assert_eq!(
            ws.relative_key(&ws.root().join("pkg/util.py")).unwrap(),
            PathBuf::from("pkg/util.py")
        );
    }

    #[test]
    fn test_relative_key_rejects_escape() {
        let (_dir, ws) = workspace();
        assert!(matches!(
            ws.relative_key(Path::new("../etc/passwd")),
            Err(SessionError::PathEscapesWorkspace(_))
        ));
        assert!(matches!(
            ws.relative_key(Path::new("/definitely/elsewhere.py")),
            Err(SessionError::PathEscapesWorkspace(_))
        ));
    }

    #[test]
    fn test_resolve_existing() {
        let (_dir, ws) = workspace();
        let (key, abs) = ws.resolve_existing(Path::new("main.py")).unwrap();
        assert_eq!(key, PathBuf::from("main.py"));
        assert!(abs.ends_with("main.py"));

        assert!(matches!(
            ws.resolve_existing(Path::new("missing.py")),
            Err(SessionError::FileNotFound(_))
        ));
        assert!(matches!(
            ws.resolve_existing(Path::new("pkg")),
            Err(SessionError::FileNotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_escape() {
        let (dir, ws) = workspace();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.py"), "").unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.py"), dir.path().join("link.py"))
            .unwrap();

        assert!(matches!(
            ws.resolve_existing(Path::new("link.py")),
            Err(SessionError::PathEscapesWorkspace(_))
        ));
    }

    #[test]
    fn test_display_path() {
        let (_dir, ws) = workspace();
        assert_eq!(
            ws.display_path(&ws.root().join("pkg/util.py")),
            PathBuf::from("pkg/util.py")
        );
        assert_eq!(
            ws.display_path(Path::new("/usr/lib/python3/os.py")),
            PathBuf::from("/usr/lib/python3/os.py")
        );
    }
}
