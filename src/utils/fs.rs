//! Sandbox filesystem helpers
//!
//! Every path that reaches the sandbox comes from the request, so each one is
//! validated against absolute and parent-relative traversal before any file
//! is created.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{JudgeError, JudgeResult};
use crate::models::{CodeNode, CodeTree};

/// Resolve a request-provided relative path under `root`.
///
/// Rejects absolute paths and any `..` component.
pub fn resolve_sandbox_path(root: &Path, key: &str) -> JudgeResult<PathBuf> {
    let relative = Path::new(key);
    if relative.is_absolute() {
        return Err(JudgeError::UnsafePath(key.to_string()));
    }
    for component in relative.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(JudgeError::UnsafePath(key.to_string())),
        }
    }
    Ok(root.join(relative))
}

/// Write a code tree under `save_dir`, creating directories as needed.
///
/// Returns the paths of every file written, in tree order.
pub fn save_code(save_dir: &Path, code: &CodeTree) -> JudgeResult<Vec<PathBuf>> {
    fs::create_dir_all(save_dir)?;
    let mut saved_paths = Vec::new();
    for (name, node) in code {
        let path = resolve_sandbox_path(save_dir, name)?;
        match node {
            CodeNode::File(content) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&path, content)?;
                saved_paths.push(path);
            }
            CodeNode::Dir(subtree) => {
                saved_paths.extend(save_code(&path, subtree)?);
            }
        }
    }
    Ok(saved_paths)
}

/// Remove everything inside `root` without removing `root` itself.
///
/// Creates `root` when it does not exist yet.
pub fn wipe_dir(root: &Path) -> std::io::Result<()> {
    if !root.exists() {
        return fs::create_dir_all(root);
    }
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        let result = if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(e) = result {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn test_resolve_rejects_traversal() {
        let root = Path::new("/sandbox");
        assert!(resolve_sandbox_path(root, "main.py").is_ok());
        assert!(resolve_sandbox_path(root, "dir/helper.py").is_ok());
        assert!(resolve_sandbox_path(root, "./notes.txt").is_ok());
        assert!(resolve_sandbox_path(root, "../escape.txt").is_err());
        assert!(resolve_sandbox_path(root, "dir/../../escape.txt").is_err());
        assert!(resolve_sandbox_path(root, "/etc/passwd").is_err());
    }

    #[test]
    fn test_save_code_writes_nested_tree() {
        let dir = tempfile::tempdir().unwrap();
        let mut inner = BTreeMap::new();
        inner.insert(
            "helper.py".to_string(),
            CodeNode::File("def f(): pass".to_string()),
        );
        let mut tree = CodeTree::new();
        tree.insert("main.py".to_string(), CodeNode::File("print(1)".to_string()));
        tree.insert("lib".to_string(), CodeNode::Dir(inner));

        let saved = save_code(dir.path(), &tree).unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("main.py")).unwrap(),
            "print(1)"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("lib/helper.py")).unwrap(),
            "def f(): pass"
        );
    }

    #[test]
    fn test_wipe_dir_keeps_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        wipe_dir(dir.path()).unwrap();
        assert!(dir.path().exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
