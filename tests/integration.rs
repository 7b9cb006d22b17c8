//! Integration tests against real system binaries and tools.
//!
//! Tests needing `ldd` or `readelf` return early when the tool is absent.

mod helpers;

use helpers::{have_tool, TestEnv};
use solib_vendor::{
    Binary, Introspector, Ldd, LinkTarget, Readelf, ResolveError, Resolver, ResolverOptions,
};
use std::fs;
use std::path::Path;
use std::process::Command;

#[test]
fn test_ldd_reports_libc_of_real_binary() {
    if !have_tool("ldd") {
        return;
    }
    // /bin/sh exists on all Linux systems and is dynamically linked
    let libs = Ldd.linked_libraries(Path::new("/bin/sh")).unwrap();
    assert!(
        libs.iter()
            .any(|l| l.name.contains("libc") && matches!(l.target, LinkTarget::Loaded(_))),
        "Expected a loaded libc for /bin/sh, got: {:?}",
        libs
    );
}

#[test]
fn test_readelf_reports_libc_of_real_binary() {
    if !have_tool("readelf") {
        return;
    }
    let libs = Readelf::default()
        .linked_libraries(Path::new("/bin/sh"))
        .unwrap();
    assert!(
        libs.iter().any(|l| l.name.contains("libc")),
        "Expected libc dependency in /bin/sh, got: {:?}",
        libs
    );
}

#[test]
fn test_readelf_without_default_dirs_reports_missing() {
    if !have_tool("readelf") {
        return;
    }
    let libs = Readelf::with_default_dirs(Vec::new())
        .linked_libraries(Path::new("/bin/sh"))
        .unwrap();
    assert!(
        libs.iter()
            .any(|l| l.name.contains("libc") && l.target == LinkTarget::Missing),
        "Expected libc to be unresolvable without search dirs, got: {:?}",
        libs
    );
}

#[test]
fn test_ldd_failure_is_introspection_error() {
    if !have_tool("ldd") {
        return;
    }
    let err = Ldd
        .linked_libraries(Path::new("/nonexistent/path/to/binary"))
        .unwrap_err();
    assert!(matches!(err, ResolveError::IntrospectionFailed { .. }));
}

#[test]
fn test_readelf_rejects_non_elf_binary() {
    if !have_tool("readelf") {
        return;
    }
    let env = TestEnv::new();
    // The mock binary is a shell script
    let err = Readelf::default()
        .linked_libraries(&env.bin_dir.join("app"))
        .unwrap_err();
    assert!(matches!(err, ResolveError::IntrospectionFailed { .. }));
}

#[test]
fn test_system_binary_needs_nothing_vendored() {
    if !have_tool("ldd") {
        return;
    }
    let env = TestEnv::new();
    let sh = env.bin_dir.join("sh");
    fs::copy("/bin/sh", &sh).unwrap();

    let binary = Binary::open(&sh).unwrap();
    let resolver = Resolver::new(Ldd, ResolverOptions::default());
    let resolution = resolver.resolve(&binary).unwrap();

    assert!(resolution.is_complete());
    assert!(resolution.imported.is_empty());
    assert_eq!(fs::read_dir(&env.bin_dir).unwrap().count(), 2);
}

#[test]
fn test_cli_missing_binary_exits_with_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_solib-vendor"))
        .args(["/nonexistent/path/to/binary", ""])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("does not exist"),
        "Expected 'does not exist' on stderr, got: {}",
        stderr
    );
}

#[test]
fn test_cli_system_binary_succeeds() {
    if !have_tool("ldd") {
        return;
    }
    let env = TestEnv::new();
    let sh = env.bin_dir.join("sh");
    fs::copy("/bin/sh", &sh).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_solib-vendor"))
        .arg(&sh)
        .arg("")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
}
