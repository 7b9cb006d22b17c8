//! Vendoring of shared-library dependencies.
//!
//! Copies the libraries a binary needs at runtime into the binary's own
//! directory so it can run without the build environment. Dependencies are
//! discovered with `ldd` (or `readelf -d` plus a loader-style search) and
//! resolved against a set of search roots, repeating until the linker has
//! nothing left to complain about.

mod analyze;
mod copy;
mod error;
mod paths;
mod resolve;

pub use analyze::{
    parse_ldd_output, parse_readelf_output, system_library_dirs, DependencyRecord,
    DependencyStatus, DynamicSection, Inspection, Introspector, Ldd, LinkTarget, LinkedLibrary,
    Readelf,
};
pub use copy::{make_executable, vendor_library};
pub use error::ResolveError;
pub use paths::{is_shared_object, package_root, split_search_path, CandidateIndex};
pub use resolve::{
    Binary, ImportedLibrary, Resolution, Resolver, ResolverOptions, DEFAULT_CACHE_MARKER,
};
