//! Search roots and the candidate library index.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

/// Split a search-path string into candidate roots.
///
/// Accepts the host path-list separator as well as `;`, the list separator
/// CMake uses for `CMAKE_MODULE_PATH`/`CMAKE_PREFIX_PATH`. Empty entries are
/// dropped, so an empty string yields no roots.
pub fn split_search_path(search_path: &str) -> Vec<PathBuf> {
    search_path
        .split(';')
        .flat_map(|entry| std::env::split_paths(entry))
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}

/// Is this directory name one an install tree nests libraries or build
/// metadata under (`lib`, `lib64`, `bin`, `lib/cmake`, ...)?
fn is_install_subdir(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    matches!(
        name.as_str(),
        "bin" | "sbin" | "lib" | "lib32" | "lib64" | "libexec"
    ) || name.contains("cmake")
}

/// Climb from a search root to the package root that contains it.
///
/// `/deps/zlib/lib/cmake/ZLIB` and `/deps/zlib/lib64` both give `/deps/zlib`.
/// A relative root that climbs to nothing (`lib`) is the current directory.
#[must_use = "the package root should be walked"]
pub fn package_root(path: &Path) -> PathBuf {
    let mut root = path.to_path_buf();
    loop {
        let Some(name) = root.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            break;
        };
        let under_cmake = root
            .parent()
            .and_then(Path::file_name)
            .is_some_and(|p| p.to_string_lossy().to_ascii_lowercase().contains("cmake"));
        if !(is_install_subdir(&name) || under_cmake) {
            break;
        }
        if !root.pop() {
            break;
        }
    }
    if root.as_os_str().is_empty() {
        root.push(".");
    }
    root
}

/// Does the file name look like a shared object (`*.so` or `*.so.*`)?
#[must_use]
pub fn is_shared_object(name: &str) -> bool {
    name.ends_with(".so") || name.contains(".so.")
}

/// Shared objects available under the search roots, by file name.
///
/// When several roots provide the same file name, the root listed first
/// wins, like `PATH` lookup.
#[derive(Debug, Clone, Default)]
pub struct CandidateIndex {
    by_name: HashMap<String, PathBuf>,
}

impl CandidateIndex {
    /// Walk every root's package root and index its shared objects.
    ///
    /// Roots that cannot be read are skipped with a warning.
    pub fn build(roots: &[PathBuf]) -> Self {
        let mut index = Self::default();
        let mut walked = HashSet::new();

        for root in roots {
            let root = package_root(root);
            if !walked.insert(root.clone()) {
                continue;
            }
            if !root.is_dir() {
                warn!("Skipping search root {}: not a directory", root.display());
                continue;
            }
            debug!("Indexing shared objects under {}", root.display());
            index.add_root(&root);
        }

        index
    }

    fn add_root(&mut self, root: &Path) {
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            // Symlinks count only when they lead to a regular file.
            if !is_shared_object(&name) || !entry.path().is_file() {
                continue;
            }
            self.by_name
                .entry(name.into_owned())
                .or_insert_with(|| entry.into_path());
        }
    }

    /// Where to copy `name` from, if any root provides it.
    pub fn get(&self, name: &str) -> Option<&Path> {
        self.by_name.get(name).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
