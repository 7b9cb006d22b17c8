//! solib-vendor - copy a binary's shared-library dependencies next to it.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use tracing::Level;

use solib_vendor::{
    split_search_path, Binary, Introspector, Ldd, Readelf, Resolver, ResolverOptions,
    DEFAULT_CACHE_MARKER,
};

#[derive(Parser)]
#[command(name = "solib-vendor")]
#[command(about = "Copy the shared libraries a binary needs into its directory")]
struct Cli {
    /// The binary (or shared library) to make self-contained
    binary: PathBuf,

    /// Search roots, separated by ';' or the platform path separator.
    /// An empty string disables the search for missing libraries.
    #[arg(default_value = "")]
    search_path: String,

    /// Path segment identifying libraries served from the dependency cache
    #[arg(long, default_value = DEFAULT_CACHE_MARKER)]
    marker: OsString,

    /// How to discover dependencies
    #[arg(long, value_enum, default_value_t = Backend::Ldd)]
    introspector: Backend,

    /// More output (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// Ask the host dynamic linker (`ldd`)
    Ldd,
    /// Read dynamic sections with `readelf -d` and search like the loader
    Readelf,
}

impl Backend {
    fn introspector(self) -> Box<dyn Introspector> {
        match self {
            Backend::Ldd => Box::new(Ldd),
            Backend::Readelf => Box::new(Readelf::default()),
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = match (cli.quiet, cli.verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<bool> {
    let binary = Binary::open(&cli.binary)?;
    let options = ResolverOptions {
        marker: cli.marker,
        search_roots: split_search_path(&cli.search_path),
    };
    let resolver = Resolver::new(cli.introspector.introspector(), options);

    let resolution = resolver
        .resolve(&binary)
        .with_context(|| format!("Resolving dependencies of {}", binary.path().display()))?;

    let complete = resolution
        .report(std::io::stdout().lock())
        .context("Writing dependency report")?;
    Ok(complete)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
