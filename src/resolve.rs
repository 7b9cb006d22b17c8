//! Closure resolution: vendor libraries next to a binary until the linker
//! finds everything it needs.
//!
//! The dependency graph is discovered as it is satisfied. Copying a library
//! can surface that library's own missing dependencies, so every pass starts
//! with a fresh introspection. A pass that copies nothing ends the loop.
//! Each pass either copies a file that was not yet present or marks a name
//! as not found for the rest of the run, so the loop always terminates.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::analyze::{Inspection, Introspector};
use crate::copy::vendor_library;
use crate::error::ResolveError;
use crate::paths::CandidateIndex;

/// Path segment identifying libraries served from the dependency cache.
pub const DEFAULT_CACHE_MARKER: &str = ".edm";

/// The executable or shared library being made self-contained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    path: PathBuf,
    dir: PathBuf,
}

impl Binary {
    /// Resolve `path` to an absolute path.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::BinaryNotFound`] if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ResolveError> {
        let given = path.as_ref();
        let path = fs::canonicalize(given)
            .map_err(|_| ResolveError::BinaryNotFound(given.to_path_buf()))?;
        if !path.is_file() {
            return Err(ResolveError::BinaryNotFound(path));
        }
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ResolveError::BinaryNotFound(path.clone()))?;
        Ok(Self { path, dir })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where vendored libraries are placed.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Path segment marking the dependency cache (see [`DEFAULT_CACHE_MARKER`]).
    pub marker: OsString,
    /// Roots to search for missing libraries. Empty disables the search;
    /// cache-resident libraries are still vendored.
    pub search_roots: Vec<PathBuf>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            marker: OsString::from(DEFAULT_CACHE_MARKER),
            search_roots: Vec::new(),
        }
    }
}

/// A library copied into the binary's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedLibrary {
    pub name: String,
    pub source: PathBuf,
}

/// Outcome of a resolution run that did not hit a fatal error.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Passes that had something to resolve.
    pub passes: usize,
    /// Copies performed, in order.
    pub imported: Vec<ImportedLibrary>,
    /// Names no search root provides, sorted.
    pub not_found: Vec<String>,
    /// The final introspection, which decides the verdict.
    pub outstanding: Inspection,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.outstanding.is_satisfied()
    }

    /// Dependencies the linker still cannot find.
    pub fn still_missing(&self) -> Vec<&str> {
        self.outstanding.unresolved().collect()
    }

    /// Cache-resident libraries that are still not next to the binary.
    pub fn not_vendored(&self) -> Vec<&str> {
        self.outstanding.external().map(|(name, _)| name).collect()
    }

    /// Write the failure summary: one line per dependency left unsatisfied.
    ///
    /// Returns `Ok(true)` if there was nothing to report.
    pub fn report(&self, mut out: impl Write) -> io::Result<bool> {
        for name in self.outstanding.unresolved() {
            writeln!(out, "{} is still missing.", name)?;
        }
        for (name, path) in self.outstanding.external() {
            writeln!(out, "{} could not be vendored from {}.", name, path.display())?;
        }
        Ok(self.is_complete())
    }
}

/// Per-run bookkeeping. A fresh one is made for every [`Resolver::resolve`].
#[derive(Debug, Default)]
struct ResolutionState {
    /// Names never retried once no candidate was found.
    not_found: HashSet<String>,
    /// Names already present next to the binary that the linker still
    /// reports missing.
    stuck: HashSet<String>,
    copies_this_pass: usize,
    passes: usize,
    imported: Vec<ImportedLibrary>,
    index: Option<CandidateIndex>,
}

impl ResolutionState {
    /// The candidate index, built on first use.
    fn candidates(&mut self, roots: &[PathBuf]) -> &CandidateIndex {
        self.index.get_or_insert_with(|| {
            let index = CandidateIndex::build(roots);
            debug!("Indexed {} shared objects", index.len());
            index
        })
    }

    fn vendor(&mut self, src: &Path, binary: &Binary, name: &str) -> Result<bool, ResolveError> {
        if !vendor_library(src, binary.dir(), name)? {
            return Ok(false);
        }
        info!("Importing {} from {}", name, src.display());
        self.copies_this_pass += 1;
        self.imported.push(ImportedLibrary {
            name: name.to_string(),
            source: src.to_path_buf(),
        });
        Ok(true)
    }

    fn finish(self, outstanding: Inspection) -> Resolution {
        let mut not_found: Vec<String> = self.not_found.into_iter().collect();
        not_found.sort();
        Resolution {
            passes: self.passes,
            imported: self.imported,
            not_found,
            outstanding,
        }
    }
}

/// Vendors a binary's missing and cache-resident libraries into its directory.
pub struct Resolver<I> {
    introspector: I,
    options: ResolverOptions,
}

impl<I: Introspector> Resolver<I> {
    pub fn new(introspector: I, options: ResolverOptions) -> Self {
        Self {
            introspector,
            options,
        }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Introspect and classify the binary's dependencies once.
    pub fn inspect(&self, binary: &Binary) -> Result<Inspection, ResolveError> {
        let entries = self.introspector.linked_libraries(binary.path())?;
        Ok(Inspection::classify(
            binary.dir(),
            entries,
            &self.options.marker,
            !self.options.search_roots.is_empty(),
        ))
    }

    /// Copy libraries into the binary's directory until nothing is missing
    /// or no further progress is possible.
    ///
    /// # Errors
    ///
    /// Introspection and copy failures abort the run. Libraries that cannot
    /// be found are not errors; check [`Resolution::is_complete`].
    pub fn resolve(&self, binary: &Binary) -> Result<Resolution, ResolveError> {
        let mut state = ResolutionState::default();

        loop {
            let inspection = self.inspect(binary)?;
            if inspection.is_satisfied() {
                return Ok(state.finish(inspection));
            }

            state.passes += 1;
            state.copies_this_pass = 0;
            debug!(
                "Pass {}: {} unresolved, {} external",
                state.passes,
                inspection.unresolved().count(),
                inspection.external().count()
            );

            for name in inspection.unresolved() {
                if state.not_found.contains(name) || state.stuck.contains(name) {
                    continue;
                }
                let candidate = state
                    .candidates(&self.options.search_roots)
                    .get(name)
                    .map(Path::to_path_buf);
                match candidate {
                    Some(src) => {
                        if !state.vendor(&src, binary, name)? {
                            warn!(
                                "{} is already in {} but the linker does not load it from there",
                                name,
                                binary.dir().display()
                            );
                            state.stuck.insert(name.to_string());
                        }
                    }
                    None => {
                        warn!("Dependency {} not found", name);
                        state.not_found.insert(name.to_string());
                    }
                }
            }

            for (name, path) in inspection.external() {
                if !state.vendor(path, binary, name)? {
                    warn!(
                        "Cannot vendor {} from {}: {} is in the way",
                        name,
                        path.display(),
                        binary.dir().join(name).display()
                    );
                }
            }

            if state.copies_this_pass == 0 {
                debug!("No progress in pass {}, stopping", state.passes);
                break;
            }
        }

        let outstanding = self.inspect(binary)?;
        Ok(state.finish(outstanding))
    }
}
