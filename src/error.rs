//! Error kinds raised by loading, translation, and emission.
//!
//! Every error here aborts the whole operation it was raised from; nothing
//! partial is retained beyond what `Drop` impls (the JIT arena, guest
//! binary buffer) clean up on the way out.

use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum TranslatorError {
    #[display("file \"{path}\" doesn't exist")]
    MissingFile { path: String },

    #[display("failed to open file \"{path}\"")]
    OpenFailure { path: String },

    #[display("undefined opcode '{tag:#x}' at guest offset {offset}")]
    UndefinedOpcode { tag: i8, offset: u32 },

    #[display("instruction at guest offset {offset} runs past end of binary")]
    Truncated { offset: u32 },

    #[display("jump/call at guest offset {source} targets undefined address {target}")]
    UndefinedTarget { source: u32, target: i32 },

    #[display("failed to allocate {size} bytes for the JIT arena")]
    Allocation { size: usize },

    #[display("translated code ({needed} bytes) exceeds the {allocated}-byte arena")]
    CodeTooLarge { needed: usize, allocated: usize },

    #[display("binary uses opcode {opcode:?}, which this emitter does not support")]
    UnsupportedOpcode { opcode: crate::common::Opcode },
}

pub type Result<T> = std::result::Result<T, TranslatorError>;
