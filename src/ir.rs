//! The intermediate representation: a linear, permanent-addressed list of
//! per-instruction records built from the decoded guest binary.
//!
//! The reference design hands out pointers into a node container and keys
//! maps by those pointers. We use indices into an append-only `Vec`
//! instead: the program never reorders or removes nodes, so an index is
//! just as stable as a pointer would be, without the unsafety.

use std::collections::HashMap;

use crate::common::{Data, GuestAddress, Opcode, OperandLocation};
use crate::decode::{decode, ByteCursor};
use crate::error::{Result, TranslatorError};

/// Index of an instruction within `Program::instrs`.
pub type IrIndex = usize;

/// One instruction of the intermediate representation.
#[derive(Clone, Debug)]
pub struct IrInstr {
    pub opcode: Opcode,
    pub immediate: Data,
    pub guest_offset: GuestAddress,
    /// Filled in during emission (`back::emit`).
    pub native_offset: usize,
    pub op1_loc: OperandLocation,
    pub op2_loc: OperandLocation,
    pub res_loc: OperandLocation,
}

impl IrInstr {
    /// Is this an arithmetic opcode eligible for peephole forwarding?
    pub fn is_arithmetic(&self) -> bool {
        self.opcode.is_arithmetic()
    }
}

/// The decoded program in source order, plus the maps used to resolve
/// cross-references between instructions.
#[derive(Debug)]
pub struct Program {
    pub instrs: Vec<IrInstr>,
    /// guest_offset -> IR index, one entry per decoded instruction.
    pub guest_addr_map: HashMap<GuestAddress, IrIndex>,
    /// IR index of a JMP/JMC/CALL -> IR index of its target.
    pub jump_map: HashMap<IrIndex, IrIndex>,
}

/// Canonical operand/result locations per opcode.
fn default_locations(opcode: Opcode) -> (OperandLocation, OperandLocation, OperandLocation) {
    use OperandLocation::*;
    match opcode {
        Opcode::Halt | Opcode::Pop | Opcode::Pushbp | Opcode::Popbp => (None, None, None),
        Opcode::Push | Opcode::Load | Opcode::Store => (Immediate, None, Stack),
        Opcode::Call | Opcode::Jmp | Opcode::Jmc => (Immediate, Stack, None),
        Opcode::Ret => (Stack, None, None),
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => (Stack, Stack, Stack),
        Opcode::Gz | Opcode::Bz | Opcode::Bez | Opcode::Gez | Opcode::Eqz | Opcode::Neqz => {
            (Stack, None, Stack)
        }
        Opcode::Input => (Stdin, None, Stack),
        Opcode::Output => (Stack, None, Stdout),
    }
}

/// Decode `binary` end to end and build the IR program.
///
/// The binary is fully decoded first; only then is the jump map resolved,
/// since a forward jump's target is not known until the instruction at
/// that guest offset has itself been decoded.
pub fn build(binary: &[u8]) -> Result<Program> {
    let mut cursor = ByteCursor::new(binary);
    let mut instrs = Vec::new();
    let mut guest_addr_map = HashMap::new();
    // (source index, target guest offset), resolved into jump_map below.
    let mut pending_branches: Vec<(IrIndex, Data)> = Vec::new();

    while !cursor.at_end() {
        let guest_offset = cursor.position();
        let decoded = decode(&mut cursor)?;
        let (op1_loc, op2_loc, res_loc) = default_locations(decoded.opcode);

        let index = instrs.len();
        instrs.push(IrInstr {
            opcode: decoded.opcode,
            immediate: decoded.immediate,
            guest_offset,
            native_offset: 0,
            op1_loc,
            op2_loc,
            res_loc,
        });
        guest_addr_map.insert(guest_offset, index);

        if decoded.opcode.is_branch() {
            pending_branches.push((index, decoded.immediate));
        }
    }

    let mut jump_map = HashMap::with_capacity(pending_branches.len());
    for (source, target_offset) in pending_branches {
        let target_index = *guest_addr_map
            .get(&(target_offset as GuestAddress))
            .ok_or(TranslatorError::UndefinedTarget {
                source: instrs[source].guest_offset,
                target: target_offset,
            })?;
        jump_map.insert(source, target_index);
    }

    Ok(Program {
        instrs,
        guest_addr_map,
        jump_map,
    })
}
