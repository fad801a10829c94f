//! The back-end: turns an optimized IR program into executable x86-64
//! machine code and runs it.

pub mod arena;
pub mod emit;
pub mod link;
pub mod runner;
