//! Decoding of code units into [`Instr`] values, and the reverse assembly.

use crate::errors::{DexError, DexResult};
use crate::instrs::{Instr, Instruction};
use nom::error::ErrorKind;

/// Largest size of a non-payload instruction, in code units.
const MAX_INSTR_UNITS: usize = 5;

fn to_le_bytes(units: &[u16]) -> Vec<u8> {
    units.iter().flat_map(|u| u.to_le_bytes()).collect()
}

/// Decodes the instruction starting at code unit `pc`.
pub fn decode(insns: &[u16], pc: usize) -> DexResult<Instr> {
    let first = *insns.get(pc).ok_or(DexError::Truncated(pc))?;
    let op = (first & 0xff) as u8;
    // only payloads (opcode 0x00) can be larger than MAX_INSTR_UNITS
    let window = if op == 0x00 {
        &insns[pc..]
    } else {
        &insns[pc..insns.len().min(pc + MAX_INSTR_UNITS)]
    };
    let bytes = to_le_bytes(window);

    match Instr::decode_opcode(op, &bytes[1..]) {
        Ok((_, instr)) => {
            if instr.size() > window.len() {
                Err(DexError::Truncated(pc))
            } else {
                Ok(instr)
            }
        }
        Err(nom::Err::Incomplete(_)) => Err(DexError::Truncated(pc)),
        Err(nom::Err::Error(DexError::Parsing(_, ErrorKind::Eof)))
        | Err(nom::Err::Failure(DexError::Parsing(_, ErrorKind::Eof))) => {
            Err(DexError::Truncated(pc))
        }
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => Err(err),
    }
}

/// Decodes a whole instruction stream, returning each instruction with its code unit offset.
pub fn decode_all(insns: &[u16]) -> DexResult<Vec<(usize, Instr)>> {
    let mut pc = 0;
    let mut instrs = Vec::new();
    while pc < insns.len() {
        let instr = decode(insns, pc)?;
        let size = instr.size();
        instrs.push((pc, instr));
        pc += size;
    }
    Ok(instrs)
}

/// Encodes instructions back to code units. Payload alignment is left to the caller.
pub fn assemble(instrs: &[Instr]) -> DexResult<Vec<u16>> {
    let mut bytes = Vec::new();
    for instr in instrs {
        instr.encode_into(&mut bytes)?;
    }
    log::trace!("assembled {} instructions into {} bytes", instrs.len(), bytes.len());
    Ok(bytes
        .chunks(2)
        .map(|c| u16::from_le_bytes([c[0], *c.get(1).unwrap_or(&0)]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{Reg, RegList};
    use crate::Index;

    #[test]
    fn decode_simple_stream() {
        let insns = [0x1012, 0x000e];
        let instrs = decode_all(&insns).unwrap();
        assert_eq!(instrs.len(), 2);
        assert_eq!(instrs[0], (0, Instr::Const4(Reg::from(0u8), 1)));
        assert_eq!(instrs[1], (1, Instr::ReturnVoid));
    }

    #[test]
    fn decode_truncated() {
        // const v0, <missing high half>
        assert!(matches!(
            decode(&[0x0014, 0x0001], 0),
            Err(DexError::Truncated(0))
        ));
        assert!(matches!(decode(&[0x000e], 3), Err(DexError::Truncated(3))));
    }

    #[test]
    fn decode_bad_arg_count() {
        // invoke-static with A=7
        assert!(matches!(
            decode(&[0x7071, 0x0000, 0x0000], 0),
            Err(DexError::InvalidArgCount(7))
        ));
    }

    #[test]
    fn payloads() {
        let code = vec![
            Instr::PackedSwitch(Reg::from(0u8), 5),
            Instr::ReturnVoid,
            Instr::Nop,
            Instr::PackedSwitchPayload(10, vec![3, 4]),
        ];
        let insns = assemble(&code).unwrap();
        assert_eq!(insns.len(), 3 + 1 + 1 + 8);
        assert_eq!(insns[5], 0x0100);
        assert_eq!(decode(&insns, 5).unwrap(), code[3]);
        let fill = assemble(&[Instr::FillArrayDataPayload(1, vec![1, 2, 3])]).unwrap();
        assert_eq!(decode(&fill, 0).unwrap(), Instr::FillArrayDataPayload(1, vec![1, 2, 3]));
        // a high byte other than a payload identifier is a nop
        assert_eq!(decode(&[0x0400, 0x000e], 0).unwrap(), Instr::Nop);
        let instrs = decode_all(&[0x0e00, 0x000e]).unwrap();
        assert_eq!(instrs, vec![(0, Instr::Nop), (1, Instr::ReturnVoid)]);
    }

    #[test]
    fn assemble_then_decode() {
        let code = vec![
            Instr::InvokeDirect(RegList::from(vec![0u8, 1u8]), Index::new(3)),
            Instr::MoveResultObject(Reg::from(2u8)),
            Instr::ConstWide(Reg::from(4u8), -5),
            Instr::Unused(0x3e),
        ];
        let insns = assemble(&code).unwrap();
        let decoded: Vec<Instr> = decode_all(&insns)
            .unwrap()
            .into_iter()
            .map(|(_, i)| i)
            .collect();
        assert_eq!(decoded, code);
    }
}
