pub mod json;
pub mod text;

use std::path::Path;

/// Path shown to users: relative to the project root when possible.
pub(crate) fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}
