//! Shared test utilities for solib-vendor tests.
#![allow(dead_code)]

use std::cell::Cell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use solib_vendor::{Binary, Introspector, LinkTarget, LinkedLibrary, ResolveError};
use tempfile::TempDir;

/// Test environment: a binary directory plus room for search roots.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Base directory all other paths live under
    pub base: PathBuf,
    /// Directory holding the binary under repair
    pub bin_dir: PathBuf,
}

impl TestEnv {
    /// Create a new environment with an executable `bin/app`.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = fs::canonicalize(temp_dir.path()).expect("Failed to canonicalize temp dir");
        let bin_dir = base.join("bin");
        create_mock_binary(&bin_dir.join("app"));

        Self {
            _temp_dir: temp_dir,
            base,
            bin_dir,
        }
    }

    pub fn binary(&self) -> Binary {
        Binary::open(self.bin_dir.join("app")).expect("Failed to open mock binary")
    }

    /// Create a library file at `rel` under the base directory.
    pub fn library(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.base.join(rel);
        create_mock_library(&path, contents);
        path
    }

    /// Is `name` present next to the binary?
    pub fn vendored(&self, name: &str) -> bool {
        self.bin_dir.join(name).exists()
    }
}

/// Create a mock executable binary file.
pub fn create_mock_binary(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir for binary");
    }
    fs::write(path, "#!/bin/sh\necho mock\n").expect("Failed to create mock binary");
    let mut perms = fs::metadata(path).expect("Failed to get metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("Failed to set permissions");
}

/// Create a mock shared library file.
pub fn create_mock_library(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir for library");
    }
    fs::write(path, contents).expect("Failed to create mock library");
}

/// Is `tool` installed on this machine?
pub fn have_tool(tool: &str) -> bool {
    Command::new(tool).arg("--version").output().is_ok()
}

/// A dynamic linker simulated over the filesystem.
///
/// Like `ldd`, it reports the transitive closure of libraries it can load:
/// a library is loaded from the binary's directory if present there, else
/// from the dependency cache if registered, else it is "not found" and its
/// own dependencies stay invisible.
#[derive(Default)]
pub struct FakeLinker {
    needs: HashMap<String, Vec<String>>,
    cache: HashMap<String, PathBuf>,
    system: HashSet<String>,
    ignore_binary_dir: bool,
    calls: Cell<usize>,
}

impl FakeLinker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `object` (the binary's file name or a library name) links `libs`.
    pub fn needs(mut self, object: &str, libs: &[&str]) -> Self {
        self.needs
            .insert(object.to_string(), libs.iter().map(|l| l.to_string()).collect());
        self
    }

    /// `lib` is served from the dependency cache at `path`.
    pub fn cached(mut self, lib: &str, path: PathBuf) -> Self {
        self.cache.insert(lib.to_string(), path);
        self
    }

    /// `lib` lives on a system path and is always found.
    pub fn system(mut self, lib: &str) -> Self {
        self.system.insert(lib.to_string());
        self
    }

    /// Never load libraries from the binary's directory (no `$ORIGIN` runpath).
    pub fn without_origin(mut self) -> Self {
        self.ignore_binary_dir = true;
        self
    }

    /// Number of introspection calls so far.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Introspector for FakeLinker {
    fn linked_libraries(&self, binary: &Path) -> Result<Vec<LinkedLibrary>, ResolveError> {
        self.calls.set(self.calls.get() + 1);

        let dir = binary.parent().expect("binary has a parent");
        let root = binary
            .file_name()
            .expect("binary has a file name")
            .to_string_lossy()
            .into_owned();

        let mut libs = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<String> =
            self.needs.get(&root).cloned().unwrap_or_default().into();

        while let Some(name) = queue.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let local = dir.join(&name);
            let target = if !self.ignore_binary_dir && local.exists() {
                LinkTarget::Loaded(local)
            } else if let Some(path) = self.cache.get(&name) {
                LinkTarget::Loaded(path.clone())
            } else if self.system.contains(&name) {
                LinkTarget::Loaded(PathBuf::from("/usr/lib").join(&name))
            } else {
                LinkTarget::Missing
            };
            if target != LinkTarget::Missing {
                queue.extend(self.needs.get(&name).cloned().unwrap_or_default());
            }
            libs.push(LinkedLibrary::new(name, target));
        }

        Ok(libs)
    }
}
