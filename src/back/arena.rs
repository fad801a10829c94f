//! The JIT arena: a fixed-size, anonymous, private memory mapping that
//! holds emitted machine code for the lifetime of the translator.
//!
//! Modern platforms commonly forbid pages that are simultaneously
//! writable and executable (W^X). Rather than mapping
//! `PROT_READ | PROT_WRITE | PROT_EXEC` up front the way the reference
//! implementation does, this arena is mapped read+write, loaded with
//! code while still writable, then transitioned to read+execute via
//! `mprotect` before the first call into it.

use crate::error::{Result, TranslatorError};

pub struct JitArena {
    ptr: *mut u8,
    size: usize,
    executable: bool,
}

impl JitArena {
    /// Map `size` bytes read+write, private and anonymous.
    pub fn new(size: usize) -> Result<Self> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(TranslatorError::Allocation { size });
        }

        Ok(JitArena {
            ptr: ptr as *mut u8,
            size,
            executable: false,
        })
    }

    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Copy `code` into the arena. The arena must still be writable (not
    /// yet transitioned to executable) when this is called.
    pub fn load(&mut self, code: &[u8]) -> Result<()> {
        if code.len() > self.size {
            return Err(TranslatorError::CodeTooLarge {
                needed: code.len(),
                allocated: self.size,
            });
        }
        debug_assert!(!self.executable, "arena already made executable");
        unsafe {
            std::ptr::copy_nonoverlapping(code.as_ptr(), self.ptr, code.len());
        }
        Ok(())
    }

    /// Read `len` bytes back out, for persisting the native cache file.
    /// Valid whether or not the arena has been made executable.
    pub fn read(&self, len: usize) -> Vec<u8> {
        assert!(len <= self.size);
        unsafe { std::slice::from_raw_parts(self.ptr, len).to_vec() }
    }

    /// Transition the mapping to read+execute. No further `load` calls are
    /// permitted afterwards.
    pub fn make_executable(&mut self) -> Result<()> {
        let rc = unsafe {
            libc::mprotect(
                self.ptr as *mut libc::c_void,
                self.size,
                libc::PROT_READ | libc::PROT_EXEC,
            )
        };
        if rc != 0 {
            return Err(TranslatorError::Allocation { size: self.size });
        }
        self.executable = true;
        Ok(())
    }

    /// Base address of the mapping. Only safe to call through as a
    /// function pointer after `make_executable` has succeeded.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }
}

impl Drop for JitArena {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_and_frees_without_panic() {
        let arena = JitArena::new(4096).unwrap();
        assert_eq!(arena.capacity(), 4096);
    }

    #[test]
    fn load_then_read_round_trips_bytes() {
        let mut arena = JitArena::new(4096).unwrap();
        let code = vec![0xC3u8, 0x90, 0x90];
        arena.load(&code).unwrap();
        assert_eq!(arena.read(3), code);
    }

    #[test]
    fn rejects_code_larger_than_capacity() {
        let mut arena = JitArena::new(4).unwrap();
        let err = arena.load(&[0u8; 5]).unwrap_err();
        assert!(matches!(err, TranslatorError::CodeTooLarge { .. }));
    }

    #[test]
    fn make_executable_succeeds_on_ret_only_buffer() {
        let mut arena = JitArena::new(4096).unwrap();
        arena.load(&[0xC3]).unwrap(); // ret
        arena.make_executable().unwrap();
    }
}
