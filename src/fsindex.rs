//! Filesystem indexing.
//!
//! Builds a basename lookup over one or more root directories so the
//! planner can find raw and partially-downloaded files by name alone,
//! regardless of which subdirectory they ended up in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Maps a file's basename to every regular file under the indexed roots
/// that carries that name, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct BasenameIndex {
    entries: HashMap<String, Vec<PathBuf>>,
}

impl BasenameIndex {
    pub fn get(&self, basename: &str) -> &[PathBuf] {
        self.entries.get(basename).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Recursively walk `roots`, indexing every regular file by its basename.
///
/// Symlinks and non-regular files are ignored. A root that does not exist
/// is skipped rather than treated as an error.
pub fn build_index<I, P>(roots: I) -> BasenameIndex
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut entries: HashMap<String, Vec<PathBuf>> = HashMap::new();
    for root in roots {
        let root = root.as_ref();
        if !root.exists() {
            continue;
        }
        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            entries.entry(name.to_string()).or_default().push(entry.path().to_path_buf());
        }
    }
    BasenameIndex { entries }
}

/// Pick the best candidate path out of `paths` for an expected file size.
///
/// When `expected_size` is known, prefer paths whose size matches exactly:
/// a single size match wins outright, multiple matches fall back to the
/// latest modification time among them. With no size hint, or no size
/// match, the latest-mtime entry from the full list wins. An empty list
/// yields `None`.
pub fn choose_candidate(paths: &[PathBuf], expected_size: Option<u64>) -> Option<PathBuf> {
    if paths.is_empty() {
        return None;
    }

    if let Some(expected_size) = expected_size {
        let sized: Vec<&PathBuf> = paths
            .iter()
            .filter(|p| std::fs::metadata(p).map(|m| m.len() == expected_size).unwrap_or(false))
            .collect();
        match sized.len() {
            0 => {}
            1 => return Some(sized[0].clone()),
            _ => return latest_mtime(sized.into_iter()),
        }
    }

    latest_mtime(paths.iter())
}

fn latest_mtime<'a, I>(paths: I) -> Option<PathBuf>
where
    I: Iterator<Item = &'a PathBuf>,
{
    paths
        .max_by_key(|p| {
            std::fs::metadata(p)
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        })
        .cloned()
}
