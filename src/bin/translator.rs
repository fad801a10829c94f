//! The binary translator's CLI entry point.
//!
//! Translates an SVM binary to x86-64 ahead of time, runs it, and caches
//! the native code next to the source file so unchanged programs skip
//! retranslation on their next run.
//!
//! Run with `--help` for more info.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use svmjit::error::TranslatorError;
use svmjit::translator::Translator;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the SVM binary to translate and run
    program: PathBuf,
}

const EXIT_OK: u8 = 0;
const EXIT_OPEN_FAILURE: u8 = 1;
const EXIT_WRONG_ARGS: u8 = 2;
const EXIT_MISSING_FILE: u8 = 3;
const EXIT_ALLOCATION: u8 = 4;
const EXIT_RUNTIME: u8 = 9;

fn native_cache_path(program: &std::path::Path) -> PathBuf {
    let mut os = program.as_os_str().to_owned();
    os.push(".x86");
    PathBuf::from(os)
}

/// Is the native cache usable? Mirrors the reference CLI: the cache is
/// used when the guest binary's mtime is not newer than the cache's.
fn cache_is_fresh(program: &std::path::Path, cache: &std::path::Path) -> bool {
    let (Ok(program_meta), Ok(cache_meta)) = (program.metadata(), cache.metadata()) else {
        return false;
    };
    let (Ok(program_mtime), Ok(cache_mtime)) = (program_meta.modified(), cache_meta.modified())
    else {
        return false;
    };
    program_mtime <= cache_mtime
}

fn run(args: &Args) -> Result<(), TranslatorError> {
    let cache_path = native_cache_path(&args.program);
    let mut translator = Translator::new()?;

    if args.program.exists() && cache_path.exists() && cache_is_fresh(&args.program, &cache_path) {
        translator.load_native_cache(&cache_path)?;
    } else {
        translator.load_and_translate(&args.program)?;
    }

    translator.execute_stdio();
    translator.save_native_cache(&cache_path)
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(_) => {
            eprintln!("Usage: translator PROGRAM");
            return ExitCode::from(EXIT_WRONG_ARGS);
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(err @ TranslatorError::MissingFile { .. }) => {
            eprintln!("IO error: {err}");
            ExitCode::from(EXIT_MISSING_FILE)
        }
        Err(err @ TranslatorError::OpenFailure { .. }) => {
            eprintln!("IO error: {err}");
            ExitCode::from(EXIT_OPEN_FAILURE)
        }
        Err(err @ TranslatorError::Allocation { .. }) => {
            eprintln!("Allocation error: {err}");
            ExitCode::from(EXIT_ALLOCATION)
        }
        Err(err) => {
            eprintln!("Runtime error: {err}");
            ExitCode::from(EXIT_RUNTIME)
        }
    }
}
