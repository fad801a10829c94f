//! Runner: invokes the emitted code as a plain function call, passing the
//! two host I/O callbacks the generated code calls back into.
//!
//! The emitted function's signature, per the System V AMD64 ABI the
//! prologue hard-codes: `fn(input_fn, output_fn, unused_third_arg)`. The
//! generated code returns here when it executes `HALT`, which restores
//! `rsp` from `r13` and `ret`s — a plain call/return, not a signal or a
//! context switch.

use std::io::Read;
use std::sync::Mutex;

use crate::back::arena::JitArena;

pub type InputFn = extern "C" fn() -> i32;
pub type OutputFn = extern "C" fn(i32);
type JittedCode = extern "C" fn(InputFn, OutputFn, *mut u8);

/// Read one decimal integer from `reader`, skipping leading whitespace,
/// mirroring the reference host's `scanf("%d", ...)`.
fn read_decimal(reader: &mut dyn Read) -> i32 {
    fn read_byte(reader: &mut dyn Read) -> Option<u8> {
        let mut buf = [0u8; 1];
        match reader.read(&mut buf) {
            Ok(1) => Some(buf[0]),
            _ => None,
        }
    }

    let mut b = loop {
        match read_byte(reader) {
            Some(c) if c.is_ascii_whitespace() => continue,
            Some(c) => break c,
            None => return 0,
        }
    };

    let negative = b == b'-';
    if negative {
        b = match read_byte(reader) {
            Some(c) => c,
            None => return 0,
        };
    }

    let mut value: i32 = 0;
    while b.is_ascii_digit() {
        value = value * 10 + i32::from(b - b'0');
        b = match read_byte(reader) {
            Some(c) => c,
            None => break,
        };
    }

    if negative {
        -value
    } else {
        value
    }
}

static STDIN_READER: Mutex<Option<std::io::BufReader<std::io::Stdin>>> = Mutex::new(None);

/// Host `Input`: reads one decimal integer from standard input.
pub extern "C" fn host_input() -> i32 {
    let mut guard = STDIN_READER.lock().unwrap();
    let reader = guard.get_or_insert_with(|| std::io::BufReader::new(std::io::stdin()));
    read_decimal(reader)
}

/// Host `Output`: writes one decimal integer followed by a newline.
pub extern "C" fn host_output(val: i32) {
    println!("{val}");
}

/// Call the translated program. `arena` must already have been made
/// executable (`JitArena::make_executable`). The third argument the ABI
/// reserves is unused by any opcode this emitter supports.
///
/// # Safety
/// `arena` must contain code emitted by `back::emit`/`back::link` for this
/// same opcode set, and must have been transitioned to executable.
pub unsafe fn run(arena: &JitArena, input: InputFn, output: OutputFn) {
    let code: JittedCode = std::mem::transmute(arena.as_ptr());
    code(input, output, std::ptr::null_mut());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_plain_decimal() {
        let mut cur = Cursor::new(b"42".to_vec());
        assert_eq!(read_decimal(&mut cur), 42);
    }

    #[test]
    fn skips_leading_whitespace_and_newlines() {
        let mut cur = Cursor::new(b"  \n\t7".to_vec());
        assert_eq!(read_decimal(&mut cur), 7);
    }

    #[test]
    fn parses_negative_numbers() {
        let mut cur = Cursor::new(b"-13".to_vec());
        assert_eq!(read_decimal(&mut cur), -13);
    }

    #[test]
    fn stops_at_first_non_digit() {
        let mut cur = Cursor::new(b"123abc".to_vec());
        assert_eq!(read_decimal(&mut cur), 123);
    }
}
