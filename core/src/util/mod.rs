//! Small shared helpers that don't belong to any single component.

use std::path::{Path, PathBuf};

/// Produces a path under `dir` named `<name>.<ext>`, appending `_1`, `_2`, …
/// before the extension until a non-existent path is found — `spec.md` §6
/// "Final output directory".
///
/// `exists` is injected so tests can simulate collisions without touching
/// the real filesystem; production call sites pass `Path::exists`.
pub fn unique_path(dir: &Path, name: &str, ext: &str, exists: impl Fn(&Path) -> bool) -> PathBuf {
    let candidate = join_name(dir, name, ext, None);
    if !exists(&candidate) {
        return candidate;
    }
    let mut n = 1u64;
    loop {
        let candidate = join_name(dir, name, ext, Some(n));
        if !exists(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn join_name(dir: &Path, name: &str, ext: &str, suffix: Option<u64>) -> PathBuf {
    let filename = match (suffix, ext.is_empty()) {
        (None, true) => name.to_string(),
        (None, false) => format!("{name}.{ext}"),
        (Some(n), true) => format!("{name}_{n}"),
        (Some(n), false) => format!("{name}_{n}.{ext}"),
    };
    dir.join(filename)
}
