//! Module-source resolution for `GET /modules/{name}`: given a dotted module name, locates its
//! source file under the resource service's search roots (the working directory plus any
//! directories named on `PYTHONPATH`), the same lookup order CPython's import system uses.

use std::path::{Path, PathBuf};

use super::error::ResourceError;

/// Resolves `module` (a dotted name, e.g. `pkg.sub.mod`) against `search_roots` in order and
/// returns its source text. Fails with [`ResourceError::NotFound`] if no candidate file exists
/// under any root, or [`ResourceError::NotPurePython`] if the module resolves to a directory with
/// no `__init__.py` (a namespace package or compiled-extension package) rather than to source.
pub(crate) async fn resolve_source(
    search_roots: &[PathBuf],
    module: &str,
) -> Result<String, ResourceError> {
    if module.is_empty() || module.contains("..") || module.starts_with('/') {
        return Err(ResourceError::InvalidPath(module.to_string()));
    }

    let relative = module.replace('.', "/");

    for root in search_roots {
        let as_module_file = root.join(format!("{relative}.py"));
        if is_file(&as_module_file).await {
            return Ok(tokio::fs::read_to_string(&as_module_file).await?);
        }

        let as_package_dir = root.join(&relative);
        let package_init = as_package_dir.join("__init__.py");
        if is_file(&package_init).await {
            return Ok(tokio::fs::read_to_string(&package_init).await?);
        }
        if is_dir(&as_package_dir).await {
            return Err(ResourceError::NotPurePython {
                module: module.to_string(),
            });
        }
    }

    Err(ResourceError::NotFound {
        path: module.to_string(),
    })
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_a_plain_module_file() {
        let root = tempfile::tempdir().unwrap();
        tokio::fs::write(root.path().join("greet.py"), "def hi():\n    pass\n")
            .await
            .unwrap();

        let source = resolve_source(&[root.path().to_path_buf()], "greet")
            .await
            .unwrap();
        assert!(source.contains("def hi"));
    }

    #[tokio::test]
    async fn resolves_a_package_init() {
        let root = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(root.path().join("pkg")).await.unwrap();
        tokio::fs::write(root.path().join("pkg/__init__.py"), "X = 1\n")
            .await
            .unwrap();

        let source = resolve_source(&[root.path().to_path_buf()], "pkg")
            .await
            .unwrap();
        assert_eq!(source, "X = 1\n");
    }

    #[tokio::test]
    async fn reports_not_pure_python_for_extension_packages() {
        let root = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(root.path().join("native")).await.unwrap();
        tokio::fs::write(root.path().join("native/_core.so"), b"\0")
            .await
            .unwrap();

        let err = resolve_source(&[root.path().to_path_buf()], "native")
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::NotPurePython { .. }));
    }

    #[tokio::test]
    async fn reports_not_found_when_absent_from_every_root() {
        let root = tempfile::tempdir().unwrap();
        let err = resolve_source(&[root.path().to_path_buf()], "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::NotFound { .. }));
    }
}
