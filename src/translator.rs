//! Top-level orchestration: load a guest binary (or a cached native
//! image), translate it to x86-64, and run it.

use std::fs;
use std::path::Path;

use crate::back::arena::JitArena;
use crate::back::runner::{self, InputFn, OutputFn};
use crate::back::{emit, link};
use crate::error::{Result, TranslatorError};
use crate::ir::{self, Program};
use crate::optimize::optimize;

/// Default arena size, matching the reference implementation's
/// `MAX_OUTPUT_SIZE` (`4096 * 16`).
pub const DEFAULT_ALLOCATED_SIZE: usize = 4096 * 16;

pub struct Translator {
    arena: JitArena,
    native_size: usize,
    program: Option<Program>,
}

impl Translator {
    pub fn new() -> Result<Self> {
        Self::with_allocated_size(DEFAULT_ALLOCATED_SIZE)
    }

    pub fn with_allocated_size(allocated_size: usize) -> Result<Self> {
        Ok(Translator {
            arena: JitArena::new(allocated_size)?,
            native_size: 0,
            program: None,
        })
    }

    /// Decode `binary`, build the IR, run the peephole optimizer, emit
    /// x86-64 code into the arena, and patch its branch displacements.
    /// Leaves the arena executable and ready for `run`.
    pub fn translate(&mut self, binary: &[u8]) -> Result<()> {
        let mut program = ir::build(binary)?;
        optimize(&mut program);

        let mut code = emit::emit(&mut program)?;
        link::link(&program, &mut code);

        self.arena.load(&code)?;
        self.arena.make_executable()?;
        self.native_size = code.len();
        self.program = Some(program);
        Ok(())
    }

    /// Load a guest binary from disk and translate it.
    pub fn load_and_translate(&mut self, path: &Path) -> Result<()> {
        let binary = read_file(path)?;
        self.translate(&binary)
    }

    /// Run the translated (or cache-loaded) code with the given host I/O
    /// callbacks.
    pub fn execute(&self, input: InputFn, output: OutputFn) {
        unsafe {
            runner::run(&self.arena, input, output);
        }
    }

    /// Run with the standard stdin/stdout host callbacks.
    pub fn execute_stdio(&self) {
        self.execute(runner::host_input, runner::host_output);
    }

    /// Load raw x86-64 bytes from a native cache file, bypassing
    /// translation entirely.
    pub fn load_native_cache(&mut self, path: &Path) -> Result<()> {
        let bytes = read_file(path)?;
        self.native_size = bytes.len();
        self.arena.load(&bytes)?;
        self.arena.make_executable()?;
        self.program = None;
        Ok(())
    }

    /// Persist the currently-loaded native code to `path`, byte for byte.
    pub fn save_native_cache(&self, path: &Path) -> Result<()> {
        let bytes = self.arena.read(self.native_size);
        fs::write(path, bytes).map_err(|_| TranslatorError::OpenFailure {
            path: path.display().to_string(),
        })
    }

    pub fn native_size(&self) -> usize {
        self.native_size
    }

    /// Read back the emitted bytes currently loaded in the arena, for
    /// idempotence/round-trip checks.
    pub fn read_native_bytes(&self) -> Vec<u8> {
        self.arena.read(self.native_size)
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(TranslatorError::MissingFile {
            path: path.display().to_string(),
        });
    }
    fs::read(path).map_err(|_| TranslatorError::OpenFailure {
        path: path.display().to_string(),
    })
}
