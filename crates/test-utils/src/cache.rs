//! Temporary directories standing in for the unit file cache.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Create an empty temporary cache directory. Removed when dropped.
pub fn temp_cache_dir() -> TempDir {
    tempfile::Builder::new()
        .prefix("agweather-cache-")
        .tempdir()
        .expect("failed to create temp cache dir")
}

/// Write `contents` to `dir/name`, creating parent directories.
pub fn write_unit_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("failed to create unit dir");
    }
    std::fs::write(&path, contents).expect("failed to write unit file");
    path
}
