//! Operand codecs of the Dalvik instruction formats.
//!
//! Parsers start right after the opcode byte and read the little-endian view of
//! the code units. Each parser returns a tuple of raw operands which the derived
//! decoder converts into the variant field types. Emitters are the reverse
//! operation and receive references to the variant fields.
//!
//! The names follow the Dex format identifiers
//! (see [Dalvik Executable instruction formats](https://source.android.com/devices/tech/dalvik/instruction-formats)).

use crate::errors::{DexError, DexResult};
use crate::registers::{Reg, RegList, RegRange};
use crate::Index;
use nom::bits::bits;
use nom::bits::complete::take as take_bits;
use nom::number::complete::{le_i16, le_i32, le_i64, le_i8, le_u16, le_u32, le_u8};
use nom::sequence::{pair, tuple};
use nom::IResult;

type PResult<'a, T> = IResult<&'a [u8], T, DexError>;

/// Reads a `B|A` byte, high nibble first, and returns `(A, B)`.
fn nibbles(input: &[u8]) -> PResult<(u8, u8)> {
    let (input, (b, a)): (&[u8], (u8, u8)) =
        bits::<_, _, DexError, _, _>(pair(take_bits(4_usize), take_bits(4_usize)))(input)?;
    Ok((input, (a, b)))
}

pub(crate) fn parse_10x(input: &[u8]) -> PResult<()> {
    // high byte is not checked, as the runtime does
    let (input, _) = le_u8(input)?;
    Ok((input, ()))
}

pub(crate) fn parse_12x(input: &[u8]) -> PResult<(u8, u8)> {
    nibbles(input)
}

pub(crate) fn parse_11n(input: &[u8]) -> PResult<(u8, i8)> {
    let (input, (a, b)) = nibbles(input)?;
    // sign-extension of the 4 bits literal
    Ok((input, (a, ((b << 4) as i8) >> 4)))
}

pub(crate) fn parse_11x(input: &[u8]) -> PResult<(u8,)> {
    let (input, a) = le_u8(input)?;
    Ok((input, (a,)))
}

pub(crate) fn parse_10t(input: &[u8]) -> PResult<(i8,)> {
    let (input, a) = le_i8(input)?;
    Ok((input, (a,)))
}

pub(crate) fn parse_20t(input: &[u8]) -> PResult<(i16,)> {
    let (input, (_, a)) = pair(le_u8, le_i16)(input)?;
    Ok((input, (a,)))
}

pub(crate) fn parse_22x(input: &[u8]) -> PResult<(u8, u16)> {
    pair(le_u8, le_u16)(input)
}

pub(crate) fn parse_21t(input: &[u8]) -> PResult<(u8, i16)> {
    pair(le_u8, le_i16)(input)
}

pub(crate) fn parse_21s(input: &[u8]) -> PResult<(u8, i16)> {
    pair(le_u8, le_i16)(input)
}

pub(crate) fn parse_21h(input: &[u8]) -> PResult<(u8, i16)> {
    pair(le_u8, le_i16)(input)
}

pub(crate) fn parse_21c(input: &[u8]) -> PResult<(u8, u16)> {
    pair(le_u8, le_u16)(input)
}

pub(crate) fn parse_23x(input: &[u8]) -> PResult<(u8, u8, u8)> {
    tuple((le_u8, le_u8, le_u8))(input)
}

pub(crate) fn parse_22b(input: &[u8]) -> PResult<(u8, u8, i8)> {
    tuple((le_u8, le_u8, le_i8))(input)
}

pub(crate) fn parse_22t(input: &[u8]) -> PResult<(u8, u8, i16)> {
    let (input, (a, b)) = nibbles(input)?;
    let (input, c) = le_i16(input)?;
    Ok((input, (a, b, c)))
}

pub(crate) fn parse_22s(input: &[u8]) -> PResult<(u8, u8, i16)> {
    parse_22t(input)
}

pub(crate) fn parse_22c(input: &[u8]) -> PResult<(u8, u8, u16)> {
    let (input, (a, b)) = nibbles(input)?;
    let (input, c) = le_u16(input)?;
    Ok((input, (a, b, c)))
}

pub(crate) fn parse_30t(input: &[u8]) -> PResult<(i32,)> {
    let (input, (_, a)) = pair(le_u8, le_i32)(input)?;
    Ok((input, (a,)))
}

pub(crate) fn parse_32x(input: &[u8]) -> PResult<(u16, u16)> {
    let (input, (_, a, b)) = tuple((le_u8, le_u16, le_u16))(input)?;
    Ok((input, (a, b)))
}

pub(crate) fn parse_31i(input: &[u8]) -> PResult<(u8, i32)> {
    pair(le_u8, le_i32)(input)
}

pub(crate) fn parse_31t(input: &[u8]) -> PResult<(u8, i32)> {
    pair(le_u8, le_i32)(input)
}

pub(crate) fn parse_31c(input: &[u8]) -> PResult<(u8, u32)> {
    pair(le_u8, le_u32)(input)
}

pub(crate) fn parse_51l(input: &[u8]) -> PResult<(u8, i64)> {
    pair(le_u8, le_i64)(input)
}

/// Argument list of the `A|G BBBB F|E|D|C` layout, `A` being the count.
fn arg_list(input: &[u8]) -> PResult<(RegList, u16)> {
    let (input, (g, count)) = nibbles(input)?;
    let (input, index) = le_u16(input)?;
    let (input, (c, d)) = nibbles(input)?;
    let (input, (e, f)) = nibbles(input)?;
    if count > 5 {
        return Err(nom::Err::Failure(DexError::InvalidArgCount(count)));
    }
    let regs: Vec<u8> = [c, d, e, f, g][..usize::from(count)].to_vec();
    Ok((input, (RegList::from(regs), index)))
}

fn arg_range(input: &[u8]) -> PResult<(RegRange, u16)> {
    let (input, (count, index, first)) = tuple((le_u8, le_u16, le_u16))(input)?;
    Ok((input, (RegRange::new(Reg::from(first), count), index)))
}

pub(crate) fn parse_35c(input: &[u8]) -> PResult<(RegList, u16)> {
    arg_list(input)
}

pub(crate) fn parse_3rc(input: &[u8]) -> PResult<(RegRange, u16)> {
    arg_range(input)
}

pub(crate) fn parse_45cc(input: &[u8]) -> PResult<(RegList, u16, u16)> {
    let (input, (args, method)) = arg_list(input)?;
    let (input, proto) = le_u16(input)?;
    Ok((input, (args, method, proto)))
}

pub(crate) fn parse_4rcc(input: &[u8]) -> PResult<(RegRange, u16, u16)> {
    let (input, (args, method)) = arg_range(input)?;
    let (input, proto) = le_u16(input)?;
    Ok((input, (args, method, proto)))
}

fn reg8(r: Reg) -> DexResult<u8> {
    u8::try_from(r.value()).map_err(|_| DexError::OperandOverflow(i64::from(r.value())))
}

fn reg4(r: Reg) -> DexResult<u8> {
    if r.value() < 16 {
        Ok(r.value() as u8)
    } else {
        Err(DexError::OperandOverflow(i64::from(r.value())))
    }
}

fn index16<T>(idx: Index<T>) -> DexResult<u16> {
    u16::try_from(idx.value()).map_err(|_| DexError::OperandOverflow(i64::from(idx.value())))
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_nibbles(out: &mut Vec<u8>, low: u8, high: u8) {
    out.push((high << 4) | (low & 0xf));
}

pub(crate) fn emit_10x(out: &mut Vec<u8>, op: u8, (): ()) -> DexResult<()> {
    out.extend_from_slice(&[op, 0]);
    Ok(())
}

pub(crate) fn emit_12x(out: &mut Vec<u8>, op: u8, (a, b): (&Reg, &Reg)) -> DexResult<()> {
    out.push(op);
    push_nibbles(out, reg4(*a)?, reg4(*b)?);
    Ok(())
}

pub(crate) fn emit_11n(out: &mut Vec<u8>, op: u8, (a, b): (&Reg, &i8)) -> DexResult<()> {
    if !(-8..8).contains(b) {
        return Err(DexError::OperandOverflow(i64::from(*b)));
    }
    out.push(op);
    push_nibbles(out, reg4(*a)?, (*b as u8) & 0xf);
    Ok(())
}

pub(crate) fn emit_11x(out: &mut Vec<u8>, op: u8, (a,): (&Reg,)) -> DexResult<()> {
    out.extend_from_slice(&[op, reg8(*a)?]);
    Ok(())
}

pub(crate) fn emit_10t(out: &mut Vec<u8>, op: u8, (a,): (&i8,)) -> DexResult<()> {
    out.extend_from_slice(&[op, *a as u8]);
    Ok(())
}

pub(crate) fn emit_20t(out: &mut Vec<u8>, op: u8, (a,): (&i16,)) -> DexResult<()> {
    out.extend_from_slice(&[op, 0]);
    out.extend_from_slice(&a.to_le_bytes());
    Ok(())
}

pub(crate) fn emit_22x(out: &mut Vec<u8>, op: u8, (a, b): (&Reg, &Reg)) -> DexResult<()> {
    out.extend_from_slice(&[op, reg8(*a)?]);
    push_u16(out, b.value());
    Ok(())
}

fn emit_aa_i16(out: &mut Vec<u8>, op: u8, a: Reg, b: i16) -> DexResult<()> {
    out.extend_from_slice(&[op, reg8(a)?]);
    out.extend_from_slice(&b.to_le_bytes());
    Ok(())
}

pub(crate) fn emit_21t(out: &mut Vec<u8>, op: u8, (a, b): (&Reg, &i16)) -> DexResult<()> {
    emit_aa_i16(out, op, *a, *b)
}

pub(crate) fn emit_21s(out: &mut Vec<u8>, op: u8, (a, b): (&Reg, &i16)) -> DexResult<()> {
    emit_aa_i16(out, op, *a, *b)
}

pub(crate) fn emit_21h(out: &mut Vec<u8>, op: u8, (a, b): (&Reg, &i16)) -> DexResult<()> {
    emit_aa_i16(out, op, *a, *b)
}

pub(crate) fn emit_21c<T>(out: &mut Vec<u8>, op: u8, (a, b): (&Reg, &Index<T>)) -> DexResult<()> {
    out.extend_from_slice(&[op, reg8(*a)?]);
    push_u16(out, index16(*b)?);
    Ok(())
}

pub(crate) fn emit_23x(out: &mut Vec<u8>, op: u8, (a, b, c): (&Reg, &Reg, &Reg)) -> DexResult<()> {
    out.extend_from_slice(&[op, reg8(*a)?, reg8(*b)?, reg8(*c)?]);
    Ok(())
}

pub(crate) fn emit_22b(out: &mut Vec<u8>, op: u8, (a, b, c): (&Reg, &Reg, &i8)) -> DexResult<()> {
    out.extend_from_slice(&[op, reg8(*a)?, reg8(*b)?, *c as u8]);
    Ok(())
}

pub(crate) fn emit_22t(out: &mut Vec<u8>, op: u8, (a, b, c): (&Reg, &Reg, &i16)) -> DexResult<()> {
    out.push(op);
    push_nibbles(out, reg4(*a)?, reg4(*b)?);
    out.extend_from_slice(&c.to_le_bytes());
    Ok(())
}

pub(crate) fn emit_22s(out: &mut Vec<u8>, op: u8, operands: (&Reg, &Reg, &i16)) -> DexResult<()> {
    emit_22t(out, op, operands)
}

pub(crate) fn emit_22c<T>(
    out: &mut Vec<u8>,
    op: u8,
    (a, b, c): (&Reg, &Reg, &Index<T>),
) -> DexResult<()> {
    out.push(op);
    push_nibbles(out, reg4(*a)?, reg4(*b)?);
    push_u16(out, index16(*c)?);
    Ok(())
}

pub(crate) fn emit_30t(out: &mut Vec<u8>, op: u8, (a,): (&i32,)) -> DexResult<()> {
    out.extend_from_slice(&[op, 0]);
    out.extend_from_slice(&a.to_le_bytes());
    Ok(())
}

pub(crate) fn emit_32x(out: &mut Vec<u8>, op: u8, (a, b): (&Reg, &Reg)) -> DexResult<()> {
    out.extend_from_slice(&[op, 0]);
    push_u16(out, a.value());
    push_u16(out, b.value());
    Ok(())
}

fn emit_aa_i32(out: &mut Vec<u8>, op: u8, a: Reg, b: i32) -> DexResult<()> {
    out.extend_from_slice(&[op, reg8(a)?]);
    out.extend_from_slice(&b.to_le_bytes());
    Ok(())
}

pub(crate) fn emit_31i(out: &mut Vec<u8>, op: u8, (a, b): (&Reg, &i32)) -> DexResult<()> {
    emit_aa_i32(out, op, *a, *b)
}

pub(crate) fn emit_31t(out: &mut Vec<u8>, op: u8, (a, b): (&Reg, &i32)) -> DexResult<()> {
    emit_aa_i32(out, op, *a, *b)
}

pub(crate) fn emit_31c<T>(out: &mut Vec<u8>, op: u8, (a, b): (&Reg, &Index<T>)) -> DexResult<()> {
    out.extend_from_slice(&[op, reg8(*a)?]);
    out.extend_from_slice(&b.value().to_le_bytes());
    Ok(())
}

pub(crate) fn emit_51l(out: &mut Vec<u8>, op: u8, (a, b): (&Reg, &i64)) -> DexResult<()> {
    out.extend_from_slice(&[op, reg8(*a)?]);
    out.extend_from_slice(&b.to_le_bytes());
    Ok(())
}

fn emit_arg_list(out: &mut Vec<u8>, op: u8, args: &RegList, index: u16) -> DexResult<()> {
    if args.len() > 5 {
        return Err(DexError::InvalidArgCount(args.len() as u8));
    }
    let mut regs = [0u8; 5];
    for (i, r) in args.iter().enumerate() {
        regs[i] = reg4(r)?;
    }
    out.push(op);
    push_nibbles(out, regs[4], args.len() as u8);
    push_u16(out, index);
    push_nibbles(out, regs[0], regs[1]);
    push_nibbles(out, regs[2], regs[3]);
    Ok(())
}

fn emit_arg_range(out: &mut Vec<u8>, op: u8, args: &RegRange, index: u16) -> DexResult<()> {
    let count = u8::try_from(args.len()).map_err(|_| DexError::OperandOverflow(args.len() as i64))?;
    out.extend_from_slice(&[op, count]);
    push_u16(out, index);
    push_u16(out, args.first().value());
    Ok(())
}

pub(crate) fn emit_35c<T>(out: &mut Vec<u8>, op: u8, (a, b): (&RegList, &Index<T>)) -> DexResult<()> {
    emit_arg_list(out, op, a, index16(*b)?)
}

pub(crate) fn emit_3rc<T>(out: &mut Vec<u8>, op: u8, (a, b): (&RegRange, &Index<T>)) -> DexResult<()> {
    emit_arg_range(out, op, a, index16(*b)?)
}

pub(crate) fn emit_45cc<T, U>(
    out: &mut Vec<u8>,
    op: u8,
    (a, b, h): (&RegList, &Index<T>, &Index<U>),
) -> DexResult<()> {
    emit_arg_list(out, op, a, index16(*b)?)?;
    push_u16(out, index16(*h)?);
    Ok(())
}

pub(crate) fn emit_4rcc<T, U>(
    out: &mut Vec<u8>,
    op: u8,
    (a, b, h): (&RegRange, &Index<T>, &Index<U>),
) -> DexResult<()> {
    emit_arg_range(out, op, a, index16(*b)?)?;
    push_u16(out, index16(*h)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nibble_order() {
        // v1 <- v2: B|A = 0x21
        assert_eq!(parse_12x(&[0x21]).unwrap().1, (1, 2));
        // const/4 v0, #-1
        assert_eq!(parse_11n(&[0xf0]).unwrap().1, (0, -1));
        assert_eq!(parse_11n(&[0x73]).unwrap().1, (3, 7));
    }

    #[test]
    fn arg_list_layout() {
        // invoke {v1, v2, v3}, meth@5: A=3 G=0, BBBB=5, FEDC=0x0321
        let (rest, (args, idx)) = parse_35c(&[0x30, 0x05, 0x00, 0x21, 0x03]).unwrap();
        assert!(rest.is_empty());
        assert_eq!(idx, 5);
        assert_eq!(format!("{args}"), "{v1, v2, v3}");
    }

    #[test]
    fn arg_list_too_long() {
        let res = parse_35c(&[0x60, 0x05, 0x00, 0x21, 0x03]);
        assert!(matches!(
            res,
            Err(nom::Err::Failure(DexError::InvalidArgCount(6)))
        ));
    }

    #[test]
    fn empty_range() {
        let (_, (args, idx)) = parse_3rc(&[0x00, 0x02, 0x00, 0x07, 0x00]).unwrap();
        assert!(args.is_empty());
        assert_eq!(idx, 2);
    }

    #[test]
    fn truncated() {
        assert!(parse_21c(&[0x01, 0x02]).is_err());
    }

    #[test]
    fn emit_nibbles() {
        let mut out = Vec::new();
        emit_12x(&mut out, 0x01, (&Reg::from(1u8), &Reg::from(2u8))).unwrap();
        assert_eq!(out, vec![0x01, 0x21]);
        assert!(emit_12x(&mut out, 0x01, (&Reg::from(16u8), &Reg::from(2u8))).is_err());
    }
}
