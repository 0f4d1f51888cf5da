use std::path::{Path, PathBuf};

use crate::random::random_string;

/// A path in the system temp directory which does not exist yet.
pub fn temp_file() -> PathBuf {
    std::env::temp_dir().join(random_string(16))
}

/// Creates an empty directory in the system temp directory.
///
/// The directory is left behind, so tests can inspect it after a failure.
pub fn temp_dir() -> PathBuf {
    let path = temp_file();
    std::fs::create_dir_all(&path)
        .unwrap_or_else(|err| panic!("create temp dir {path:?} failed, {err}"));
    path
}

/// Writes `content` to `dir/name`, creating parent directories as needed,
/// and returns the written path.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .unwrap_or_else(|err| panic!("create dir {parent:?} failed, {err}"));
    }

    std::fs::write(&path, content)
        .unwrap_or_else(|err| panic!("write {path:?} failed, {err}"));
    path
}
