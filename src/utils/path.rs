//! Lexical path normalization.
//!
//! Resources are deduplicated by path, so `./a/b.png` and `a/b.png` must resolve
//! to the same slot. Normalization is purely lexical - it never touches the
//! filesystem, since the path may name a file that does not exist yet (missing
//! assets still get a slot so they can resolve to a fallback).

use std::path::{Component, Path, PathBuf};

use inlinable_string::InlinableString;

/// Normalizes `path` by folding `.` segments and resolving `..` against the
/// preceding component where possible.
pub fn normalize<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut out = PathBuf::new();

    for c in path.as_ref().components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                let poppable = match out.components().next_back() {
                    Some(Component::Normal(_)) => true,
                    // `..` at the root stays at the root.
                    Some(Component::RootDir) | Some(Component::Prefix(_)) => {
                        continue;
                    }
                    _ => false,
                };

                if poppable {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            _ => out.push(c.as_os_str()),
        }
    }

    if out.as_os_str().is_empty() {
        out.push(".");
    }

    out
}

/// Returns the lower-cased extension of `path` without the leading dot.
pub fn extension(path: &Path) -> Option<InlinableString> {
    path.extension()
        .and_then(|v| v.to_str())
        .map(|v| InlinableString::from(v.to_lowercase().as_str()))
}
