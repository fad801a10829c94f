//! Linker/patcher: rewrites the relative displacement of every emitted
//! `jmp`/`call`/`jne` branch now that every IR instruction's native offset
//! is known.
//!
//! Forward jump targets are not yet emitted when the branch instruction
//! itself is written, so `back::emit` leaves every displacement field
//! zeroed; this pass fills them in from `Program::jump_map`.

use crate::common::Opcode;
use crate::ir::Program;

/// Byte length of the branch instruction as emitted, and the offset of its
/// 4-byte displacement field relative to the instruction's `native_offset`.
fn branch_shape(opcode: Opcode) -> (usize, usize) {
    match opcode {
        // `jmp rel32` / `call rel32`: 1-byte opcode + 4-byte displacement.
        Opcode::Jmp | Opcode::Call => (5, 1),
        // `pop rax; cmp rax, 0; jne rel32`: 7 bytes of prologue before the
        // 4-byte displacement, 11 bytes total.
        Opcode::Jmc => (11, 7),
        other => unreachable!("{other:?} is not a branch opcode"),
    }
}

/// Patch every branch's displacement in `code` so it lands on its IR
/// target's native offset.
pub fn link(program: &Program, code: &mut [u8]) {
    for (&source, &target) in program.jump_map.iter() {
        let source_instr = &program.instrs[source];
        let target_instr = &program.instrs[target];

        let (instr_len, patch_delta) = branch_shape(source_instr.opcode);
        let patch_at = source_instr.native_offset + patch_delta;
        let end_of_branch = source_instr.native_offset + instr_len;
        let displacement = target_instr.native_offset as i64 - end_of_branch as i64;

        let bytes = (displacement as i32).to_le_bytes();
        code[patch_at..patch_at + 4].copy_from_slice(&bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::back::emit::emit;
    use crate::ir::build;

    #[test]
    fn patches_forward_jump_to_exact_displacement() {
        // JMP <target>; HALT (unreachable); TARGET: HALT
        let mut bin = Vec::new();
        bin.extend({
            let mut b = vec![0x09]; // JMP
            b.extend_from_slice(&6i32.to_le_bytes());
            b
        });
        bin.push(0x00); // HALT at offset 5 (skipped)
        bin.push(0x00); // HALT at offset 6 (target)

        let mut program = build(&bin).unwrap();
        let mut code = emit(&mut program).unwrap();
        link(&program, &mut code);

        let jmp_index = 0;
        let target_index = program.guest_addr_map[&6];
        let patch_at = program.instrs[jmp_index].native_offset + 1;
        let disp = i32::from_le_bytes(code[patch_at..patch_at + 4].try_into().unwrap());
        let end_of_branch = program.instrs[jmp_index].native_offset + 5;
        assert_eq!(
            end_of_branch as i64 + disp as i64,
            program.instrs[target_index].native_offset as i64
        );
    }

    #[test]
    fn patches_jmc_with_eleven_byte_instruction_length() {
        let mut bin = Vec::new();
        bin.extend({
            let mut b = vec![0x01]; // PUSH 0
            b.extend_from_slice(&0i32.to_le_bytes());
            b
        });
        bin.extend({
            let mut b = vec![0x0A]; // JMC
            b.extend_from_slice(&10i32.to_le_bytes());
            b
        });
        bin.push(0x00); // HALT at offset 10 == target

        let mut program = build(&bin).unwrap();
        let mut code = emit(&mut program).unwrap();
        link(&program, &mut code);

        let jmc_index = program.guest_addr_map[&5];
        let target_index = program.guest_addr_map[&10];
        let patch_at = program.instrs[jmc_index].native_offset + 7;
        let disp = i32::from_le_bytes(code[patch_at..patch_at + 4].try_into().unwrap());
        let end_of_branch = program.instrs[jmc_index].native_offset + 11;
        assert_eq!(
            end_of_branch as i64 + disp as i64,
            program.instrs[target_index].native_offset as i64
        );
    }
}
