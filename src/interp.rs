//! Reference interpreter oracle, ported from the original `zvm.cpp`
//! reference implementation.
//!
//! Not part of the CLI surface: the translator is this crate's only
//! product. This module exists so the JIT's output can be cross-checked
//! against a plain interpretation of the same binary, and because it
//! still implements `RET`/`PUSHBP`/`POPBP`, which the emitter deliberately
//! rejects.

use derive_more::{Display, Error};

use crate::common::{Data, GuestAddress, Opcode};
use crate::decode::{decode, ByteCursor};

#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum InterpError {
    #[display("{_0}")]
    OutOfBounds(#[error(not(source))] String),
    #[display("{_0}")]
    StackUnderflow(#[error(not(source))] String),
    #[display("division by zero")]
    DivisionByZero,
    #[display("undefined opcode '{tag:#x}'")]
    UndefinedOpcode { tag: i8 },
}

type Result<T> = std::result::Result<T, InterpError>;

/// A straightforward stack-machine interpreter: a data stack that doubles
/// as the local-variable frame (`LOAD`/`STORE` index into it relative to
/// `bp`), a call-address stack, and a base-pointer stack.
pub struct Interpreter {
    binary: Vec<u8>,
    data_stack: Vec<Data>,
    call_stack: Vec<GuestAddress>,
    bp_stack: Vec<usize>,
    pc: GuestAddress,
    bp: usize,
    halted: bool,
}

impl Interpreter {
    pub fn new(binary: Vec<u8>) -> Self {
        Interpreter {
            binary,
            data_stack: Vec::new(),
            call_stack: Vec::new(),
            bp_stack: Vec::new(),
            pc: 0,
            bp: 0,
            halted: false,
        }
    }

    /// Run to completion, calling `input` for every `INPUT` and `output`
    /// for every `OUTPUT`.
    pub fn run(
        &mut self,
        mut input: impl FnMut() -> Data,
        mut output: impl FnMut(Data),
    ) -> Result<()> {
        self.pc = 0;
        self.bp = 0;
        self.halted = false;

        while !self.halted {
            if self.pc as usize >= self.binary.len() {
                return Err(InterpError::OutOfBounds("pc out of bounds".into()));
            }
            let mut cursor = ByteCursor::new(&self.binary[self.pc as usize..]);
            let decoded = decode(&mut cursor).map_err(|_| {
                let tag = self.binary[self.pc as usize] as i8;
                InterpError::UndefinedOpcode { tag }
            })?;
            self.pc += cursor.position();
            self.execute(decoded.opcode, decoded.immediate, &mut input, &mut output)?;
        }
        Ok(())
    }

    fn push(&mut self, val: Data) {
        self.data_stack.push(val);
    }

    fn pop(&mut self) -> Result<Data> {
        self.data_stack
            .pop()
            .ok_or_else(|| InterpError::StackUnderflow("data stack underflow".into()))
    }

    fn execute(
        &mut self,
        opcode: Opcode,
        arg: Data,
        input: &mut impl FnMut() -> Data,
        output: &mut impl FnMut(Data),
    ) -> Result<()> {
        match opcode {
            Opcode::Halt => self.halted = true,
            Opcode::Push => self.push(arg),
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Add => {
                let op1 = self.pop()?;
                let op2 = self.pop()?;
                self.push(op1 + op2);
            }
            Opcode::Sub => {
                let op1 = self.pop()?;
                let op2 = self.pop()?;
                self.push(op2 - op1);
            }
            Opcode::Mul => {
                let op1 = self.pop()?;
                let op2 = self.pop()?;
                self.push(op1 * op2);
            }
            Opcode::Div => {
                let op1 = self.pop()?;
                let op2 = self.pop()?;
                if op1 == 0 {
                    return Err(InterpError::DivisionByZero);
                }
                self.push(op2 / op1);
            }
            Opcode::Load => {
                let idx = self.bp as i64 + arg as i64;
                let val = *self
                    .data_stack
                    .get(usize::try_from(idx).unwrap_or(usize::MAX))
                    .ok_or_else(|| InterpError::OutOfBounds("LOAD out of bounds".into()))?;
                self.push(val);
            }
            Opcode::Store => {
                let val = self.pop()?;
                let idx = self.bp as i64 + arg as i64;
                let slot = self
                    .data_stack
                    .get_mut(usize::try_from(idx).unwrap_or(usize::MAX))
                    .ok_or_else(|| InterpError::OutOfBounds("STORE out of bounds".into()))?;
                *slot = val;
            }
            Opcode::Input => {
                let val = input();
                self.push(val);
            }
            Opcode::Output => {
                let val = self.pop()?;
                output(val);
            }
            Opcode::Jmp => {
                self.jump_to(arg)?;
            }
            Opcode::Jmc => {
                let cond = self.pop()?;
                if cond != 0 {
                    self.jump_to(arg)?;
                }
            }
            Opcode::Gz => {
                let v = self.pop()?;
                self.push((v > 0) as Data);
            }
            Opcode::Bz => {
                let v = self.pop()?;
                self.push((v < 0) as Data);
            }
            Opcode::Gez => {
                let v = self.pop()?;
                self.push((v >= 0) as Data);
            }
            Opcode::Bez => {
                let v = self.pop()?;
                self.push((v <= 0) as Data);
            }
            Opcode::Eqz => {
                let v = self.pop()?;
                self.push((v == 0) as Data);
            }
            Opcode::Neqz => {
                let v = self.pop()?;
                self.push((v != 0) as Data);
            }
            Opcode::Call => {
                self.call_stack.push(self.pc);
                self.jump_to(arg)?;
            }
            Opcode::Ret => {
                self.pc = self
                    .call_stack
                    .pop()
                    .ok_or_else(|| InterpError::StackUnderflow("call stack underflow".into()))?;
            }
            Opcode::Pushbp => self.bp_stack.push(self.bp),
            Opcode::Popbp => {
                self.bp = self
                    .bp_stack
                    .pop()
                    .ok_or_else(|| InterpError::StackUnderflow("bp stack underflow".into()))?;
            }
        }
        Ok(())
    }

    fn jump_to(&mut self, arg: Data) -> Result<()> {
        if arg < 0 || arg as usize >= self.binary.len() {
            return Err(InterpError::OutOfBounds("jump out of bounds".into()));
        }
        self.pc = arg as GuestAddress;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(v: i32) -> Vec<u8> {
        let mut b = vec![0x01];
        b.extend_from_slice(&v.to_le_bytes());
        b
    }

    fn op(tag: u8) -> Vec<u8> {
        vec![tag]
    }

    #[test]
    fn add_and_output() {
        let mut bin = Vec::new();
        bin.extend(push(7));
        bin.extend(push(5));
        bin.extend(op(0x03)); // ADD
        bin.extend(op(0x07)); // OUTPUT
        bin.extend(op(0x00)); // HALT

        let mut out = Vec::new();
        Interpreter::new(bin).run(|| 0, |v| out.push(v)).unwrap();
        assert_eq!(out, vec![12]);
    }

    #[test]
    fn sub_computes_bottom_minus_top() {
        let mut bin = Vec::new();
        bin.extend(push(10));
        bin.extend(push(3));
        bin.extend(op(0x0B)); // SUB
        bin.extend(op(0x07)); // OUTPUT
        bin.extend(op(0x00)); // HALT

        let mut out = Vec::new();
        Interpreter::new(bin).run(|| 0, |v| out.push(v)).unwrap();
        assert_eq!(out, vec![7]);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut bin = Vec::new();
        bin.extend(push(1));
        bin.extend(push(0));
        bin.extend(op(0x0D)); // DIV

        let err = Interpreter::new(bin).run(|| 0, |_| {}).unwrap_err();
        assert_eq!(err, InterpError::DivisionByZero);
    }

    #[test]
    fn jmc_does_not_jump_on_zero_condition() {
        // PUSH 0; JMC TARGET; PUSH 1; OUTPUT; HALT; TARGET: PUSH 2; OUTPUT; HALT
        let mut prog = Vec::new();
        prog.extend(push(0)); // offset 0..5
        prog.extend({
            let mut b = vec![0x0A]; // JMC
            b.extend_from_slice(&17i32.to_le_bytes());
            b
        }); // offset 5..10, target 17
        prog.extend(push(1)); // offset 10..15
        prog.extend(op(0x07)); // offset 15 OUTPUT
        prog.extend(op(0x00)); // offset 16 HALT
        prog.extend(push(2)); // offset 17..22 (TARGET, unreached)
        prog.extend(op(0x07)); // offset 22 OUTPUT
        prog.extend(op(0x00)); // offset 23 HALT

        let mut out = Vec::new();
        Interpreter::new(prog).run(|| 0, |v| out.push(v)).unwrap();
        assert_eq!(out, vec![1]);
    }

    #[test]
    fn call_and_ret_roundtrip() {
        // PUSH 1; CALL <fn>; OUTPUT; HALT; fn (at offset 15): RET
        let mut prog = Vec::new();
        prog.extend(push(1)); // 0..5
        prog.extend({
            let mut b = vec![0x12]; // CALL
            b.extend_from_slice(&15i32.to_le_bytes());
            b
        }); // 5..10
        prog.extend(op(0x07)); // 10 OUTPUT
        prog.extend(op(0x00)); // 11 HALT
        prog.extend(vec![0x02, 0x02, 0x02]); // 12,13,14 POP (never executed, padding)
        prog.extend(op(0x13)); // 15 RET

        let mut out = Vec::new();
        Interpreter::new(prog).run(|| 0, |v| out.push(v)).unwrap();
        assert_eq!(out, vec![1]);
    }
}
