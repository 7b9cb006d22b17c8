//! Linker introspection: which shared libraries a binary pulls in, and from where.
//!
//! Two backends are provided. [`Ldd`] asks the host dynamic linker (it runs
//! the target's loader in trace mode), [`Readelf`] reads the dynamic section
//! headers and performs the library search itself, which also works for
//! binaries built for another architecture.

use std::collections::{HashSet, VecDeque};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ResolveError;

/// Where the linker would load a declared library from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkTarget {
    /// The linker reports "not found".
    Missing,
    /// Loaded from an absolute path.
    Loaded(PathBuf),
    /// Provided by the kernel or loader itself (e.g. `linux-vdso.so.1`).
    Virtual,
}

/// One dependency line as the linker reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedLibrary {
    pub name: String,
    pub target: LinkTarget,
}

impl LinkedLibrary {
    pub fn new(name: impl Into<String>, target: LinkTarget) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }
}

/// A source of dynamic-link information for a binary.
///
/// Implementations report the full transitive set of libraries the loader
/// would need, not only the binary's direct `NEEDED` entries.
pub trait Introspector {
    fn linked_libraries(&self, binary: &Path) -> Result<Vec<LinkedLibrary>, ResolveError>;
}

impl<T: Introspector + ?Sized> Introspector for &T {
    fn linked_libraries(&self, binary: &Path) -> Result<Vec<LinkedLibrary>, ResolveError> {
        (**self).linked_libraries(binary)
    }
}

impl<T: Introspector + ?Sized> Introspector for Box<T> {
    fn linked_libraries(&self, binary: &Path) -> Result<Vec<LinkedLibrary>, ResolveError> {
        (**self).linked_libraries(binary)
    }
}

/// Introspection through the host's `ldd`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldd;

impl Introspector for Ldd {
    fn linked_libraries(&self, binary: &Path) -> Result<Vec<LinkedLibrary>, ResolveError> {
        let output = Command::new("ldd")
            .arg(binary)
            .output()
            .map_err(|e| {
                ResolveError::introspection("ldd", binary, format!("could not run ldd: {e}"))
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(ResolveError::introspection(
                "ldd",
                binary,
                format!("{}: {}", output.status, text.trim()),
            ));
        }

        Ok(parse_ldd_output(&text))
    }
}

/// Parse `ldd` output into link entries.
///
/// Example ldd output:
/// ```text
///     linux-vdso.so.1 (0x00007ffc8a1f2000)
///     libfoo.so.1 => not found
///     libc.so.6 => /lib/x86_64-linux-gnu/libc.so.6 (0x00007f0e5e200000)
///     /lib64/ld-linux-x86-64.so.2 (0x00007f0e5e4a1000)
/// ```
///
/// Lines that are not dependency lines (`statically linked`, the header
/// ldd prints when given several files) are skipped.
#[must_use = "parsed link entries should be classified"]
pub fn parse_ldd_output(output: &str) -> Vec<LinkedLibrary> {
    let mut libs = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some((name, rest)) = line.split_once("=>") {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let rest = rest.trim();
            let target = if rest.starts_with("not found") {
                LinkTarget::Missing
            } else {
                let location = strip_load_address(rest);
                if location.starts_with('/') {
                    LinkTarget::Loaded(PathBuf::from(location))
                } else {
                    LinkTarget::Virtual
                }
            };
            libs.push(LinkedLibrary::new(name, target));
        } else if let Some(location) = line
            .strip_suffix(')')
            .and_then(|l| l.rfind(" (0x"))
            .map(|i| line[..i].trim())
        {
            let target = if location.starts_with('/') {
                LinkTarget::Loaded(PathBuf::from(location))
            } else {
                LinkTarget::Virtual
            };
            libs.push(LinkedLibrary::new(location, target));
        }
    }

    libs
}

/// `/usr/lib/libc.so.6 (0x00007f...)` -> `/usr/lib/libc.so.6`
fn strip_load_address(location: &str) -> &str {
    match location.rfind("(0x") {
        Some(i) => location[..i].trim(),
        None => location.trim(),
    }
}

/// Introspection through `readelf -d`, searching for libraries the way the
/// loader does: `RPATH` (only without `RUNPATH`), `RUNPATH`, then the system
/// default directories.
#[derive(Debug, Clone)]
pub struct Readelf {
    default_dirs: Vec<PathBuf>,
}

impl Default for Readelf {
    fn default() -> Self {
        Self {
            default_dirs: system_library_dirs(),
        }
    }
}

impl Readelf {
    /// Use `dirs` instead of the host's default library directories.
    pub fn with_default_dirs(dirs: Vec<PathBuf>) -> Self {
        Self { default_dirs: dirs }
    }

    fn locate(&self, name: &str, search: &[PathBuf]) -> Option<PathBuf> {
        if name.contains('/') {
            let path = PathBuf::from(name);
            return path.is_file().then_some(path);
        }
        search
            .iter()
            .chain(&self.default_dirs)
            .map(|dir| dir.join(name))
            .find(|p| p.is_file())
    }
}

impl Introspector for Readelf {
    fn linked_libraries(&self, binary: &Path) -> Result<Vec<LinkedLibrary>, ResolveError> {
        let root = read_dynamic_section(binary)?.ok_or_else(|| {
            ResolveError::introspection("readelf", binary, "not an ELF file")
        })?;

        let mut libs = Vec::new();
        let mut seen = HashSet::new();
        let mut processed = HashSet::new();
        let mut to_process = VecDeque::from([(binary.to_path_buf(), root)]);

        while let Some((object, section)) = to_process.pop_front() {
            let origin = object.parent().unwrap_or_else(|| Path::new("/"));
            let search = section.search_dirs(origin);

            for name in &section.needed {
                if !seen.insert(name.clone()) {
                    continue;
                }
                let Some(path) = self.locate(name, &search) else {
                    libs.push(LinkedLibrary::new(name.as_str(), LinkTarget::Missing));
                    continue;
                };
                libs.push(LinkedLibrary::new(
                    name.as_str(),
                    LinkTarget::Loaded(path.clone()),
                ));
                if processed.insert(path.clone()) {
                    // A library that turns out not to be ELF simply adds nothing.
                    if let Some(dynamic) = read_dynamic_section(&path)? {
                        to_process.push_back((path, dynamic));
                    }
                }
            }
        }

        Ok(libs)
    }
}

/// Contents of an object's dynamic section relevant to library lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicSection {
    pub needed: Vec<String>,
    pub runpath: Vec<String>,
    pub rpath: Vec<String>,
}

impl DynamicSection {
    /// Directories this object asks the loader to search, `$ORIGIN` expanded.
    pub fn search_dirs(&self, origin: &Path) -> Vec<PathBuf> {
        let entries = if self.runpath.is_empty() {
            &self.rpath
        } else {
            &self.runpath
        };
        let origin = origin.to_string_lossy();
        entries
            .iter()
            .filter(|e| !e.is_empty())
            .map(|e| PathBuf::from(e.replace("${ORIGIN}", &origin).replace("$ORIGIN", &origin)))
            .collect()
    }
}

/// Run `readelf -d` on `path`.
///
/// Returns `Ok(None)` if the file is not an ELF object.
fn read_dynamic_section(path: &Path) -> Result<Option<DynamicSection>, ResolveError> {
    let output = Command::new("readelf")
        .args(["-d", "-W"])
        .arg(path)
        .output()
        .map_err(|e| {
            ResolveError::introspection(
                "readelf",
                path,
                format!("readelf command not found - install binutils ({e})"),
            )
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    // readelf exits 0 on some versions even for non-ELF input.
    if stderr.contains("Not an ELF file") || stderr.contains("File format not recognized") {
        return Ok(None);
    }
    if !output.status.success() {
        return Err(ResolveError::introspection(
            "readelf",
            path,
            stderr.trim().to_string(),
        ));
    }

    Ok(Some(parse_readelf_output(&String::from_utf8_lossy(
        &output.stdout,
    ))))
}

/// Parse `readelf -d` output.
///
/// Example readelf output:
/// ```text
/// Dynamic section at offset 0x2d0e0 contains 28 entries:
///   Tag        Type                         Name/Value
///  0x0000000000000001 (NEEDED)             Shared library: [libtinfo.so.6]
///  0x0000000000000001 (NEEDED)             Shared library: [libc.so.6]
///  0x000000000000001d (RUNPATH)            Library runpath: [$ORIGIN:$ORIGIN/../lib]
/// ```
#[must_use = "parsed dynamic section should be used"]
pub fn parse_readelf_output(output: &str) -> DynamicSection {
    let mut section = DynamicSection::default();

    for line in output.lines() {
        let Some(value) = bracketed(line) else {
            continue;
        };
        if line.contains("(NEEDED)") {
            section.needed.push(value.to_string());
        } else if line.contains("(RUNPATH)") {
            section.runpath.extend(value.split(':').map(str::to_string));
        } else if line.contains("(RPATH)") {
            section.rpath.extend(value.split(':').map(str::to_string));
        }
    }

    section
}

fn bracketed(line: &str) -> Option<&str> {
    let start = line.find('[')?;
    let end = line.rfind(']')?;
    (start < end).then(|| &line[start + 1..end])
}

/// Default loader search directories of the host.
pub fn system_library_dirs() -> Vec<PathBuf> {
    let multiarch = format!("{}-linux-gnu", std::env::consts::ARCH);
    vec![
        PathBuf::from("/lib").join(&multiarch),
        PathBuf::from("/usr/lib").join(&multiarch),
        PathBuf::from("/lib64"),
        PathBuf::from("/usr/lib64"),
        PathBuf::from("/lib"),
        PathBuf::from("/usr/lib"),
    ]
}

/// How a declared dependency is satisfied from the binary's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyStatus {
    /// Colocated with the binary or found on a system path.
    ResolvedLocal,
    /// Loaded from the dependency cache; must be vendored.
    ResolvedExternal(PathBuf),
    /// The linker cannot find it.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRecord {
    pub name: String,
    pub status: DependencyStatus,
}

/// Classified dependencies of one binary, as of one introspection call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inspection {
    records: Vec<DependencyRecord>,
}

impl Inspection {
    /// Classify raw linker entries for a binary living in `binary_dir`.
    ///
    /// A library is external when its resolved path has a component equal
    /// to `marker` and no file of the same name sits in `binary_dir` yet.
    /// Unresolved names are only kept when `track_unresolved` is set.
    pub fn classify(
        binary_dir: &Path,
        entries: Vec<LinkedLibrary>,
        marker: &OsStr,
        track_unresolved: bool,
    ) -> Self {
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for entry in entries {
            if !seen.insert(entry.name.clone()) {
                continue;
            }
            let status = match entry.target {
                LinkTarget::Missing if track_unresolved => DependencyStatus::Unresolved,
                LinkTarget::Missing => continue,
                LinkTarget::Loaded(path)
                    if path.components().any(|c| c.as_os_str() == marker)
                        && !binary_dir.join(&entry.name).exists() =>
                {
                    DependencyStatus::ResolvedExternal(path)
                }
                LinkTarget::Loaded(_) | LinkTarget::Virtual => DependencyStatus::ResolvedLocal,
            };
            records.push(DependencyRecord {
                name: entry.name,
                status,
            });
        }

        Self { records }
    }

    pub fn records(&self) -> &[DependencyRecord] {
        &self.records
    }

    /// Names the linker could not find.
    pub fn unresolved(&self) -> impl Iterator<Item = &str> {
        self.records
            .iter()
            .filter(|r| r.status == DependencyStatus::Unresolved)
            .map(|r| r.name.as_str())
    }

    /// Cache-resident libraries not yet placed next to the binary.
    pub fn external(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.records.iter().filter_map(|r| match &r.status {
            DependencyStatus::ResolvedExternal(path) => Some((r.name.as_str(), path.as_path())),
            _ => None,
        })
    }

    /// True when nothing is unresolved and nothing remains to vendor.
    pub fn is_satisfied(&self) -> bool {
        self.records
            .iter()
            .all(|r| r.status == DependencyStatus::ResolvedLocal)
    }
}
