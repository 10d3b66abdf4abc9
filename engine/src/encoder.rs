//! Converts a parsed instruction or data pseudo-op into its emitted bytes
//! (spec.md 4.7).

use crate::error::{AssemblyError, Result};
use crate::evaluator::Evaluator;
use crate::literals;
use crate::opcodes::{Form, OpCodeSpec};
use byteorder::{BigEndian, ByteOrder};

/// Registers are ordinary symbols (`R0..R15`, pre-bound per spec.md 4.5), so
/// an operand like `R1` resolves through the normal label-lookup path; this
/// also lets a register be named through any expression that evaluates to
/// 0-15 (e.g. an `EQU`'d alias).
fn parse_register(operand: &str, evaluator: &Evaluator) -> Result<u8> {
    let value = evaluator.evaluate(operand)?;
    if !(0..=15).contains(&value) {
        return Err(AssemblyError::error(format!(
            "Register out of range: {}",
            operand
        )));
    }
    Ok(value as u8)
}

fn parse_immediate_byte(operand: &str, evaluator: &Evaluator) -> Result<u8> {
    let value = evaluator.evaluate(operand)?;
    if (-128..=255).contains(&value) {
        Ok((value & 0xFF) as u8)
    } else if (0xFF80..=0xFFFF).contains(&value) {
        Ok((value & 0xFF) as u8)
    } else {
        Err(AssemblyError::error(format!(
            "Immediate value out of range: {}",
            value
        )))
    }
}

fn parse_address(operand: &str, evaluator: &Evaluator) -> Result<u16> {
    let value = evaluator.evaluate(operand)?;
    if !(0..=0xFFFF).contains(&value) {
        return Err(AssemblyError::error(format!(
            "Address out of range: {}",
            value
        )));
    }
    Ok(value as u16)
}

fn parse_port(operand: &str, evaluator: &Evaluator) -> Result<u8> {
    let value = evaluator.evaluate(operand)?;
    if !(1..=7).contains(&value) {
        return Err(AssemblyError::error("I/O port must be 1-7"));
    }
    Ok(value as u8)
}

/// Encodes one instruction. `mnemonic` is needed only to apply `LDN`'s
/// register-zero exclusion (it shares `IDL`'s opcode at `R0`).
pub fn encode_instruction(
    mnemonic: &str,
    spec: OpCodeSpec,
    operands: &[String],
    pc: u16,
    evaluator: &Evaluator,
) -> Result<Vec<u8>> {
    let op = spec.opcode;
    match spec.form {
        Form::Basic => Ok(vec![op as u8]),
        Form::Register => {
            let r = require_one(operands)?;
            let reg = parse_register(r, evaluator)?;
            if mnemonic == "LDN" && reg == 0 {
                return Err(AssemblyError::error("LDN R0 is reserved for IDL"));
            }
            Ok(vec![op as u8 | reg])
        }
        Form::Immediate => {
            let r = require_one(operands)?;
            let byte = parse_immediate_byte(r, evaluator)?;
            Ok(vec![op as u8, byte])
        }
        Form::ShortBranch => {
            let r = require_one(operands)?;
            let addr = parse_address(r, evaluator)?;
            let next = pc.wrapping_add(1);
            if (next & 0xFF00) != (addr & 0xFF00) {
                return Err(AssemblyError::error("Short branch target out of range"));
            }
            Ok(vec![op as u8, (addr & 0xFF) as u8])
        }
        Form::LongBranch => {
            let r = require_one(operands)?;
            let addr = parse_address(r, evaluator)?;
            let mut bytes = [0u8; 2];
            BigEndian::write_u16(&mut bytes, addr);
            Ok(vec![op as u8, bytes[0], bytes[1]])
        }
        Form::Io => {
            let r = require_one(operands)?;
            let port = parse_port(r, evaluator)?;
            Ok(vec![op as u8 | port])
        }
        Form::Extended => {
            let hi = (op >> 8) as u8;
            let lo = (op & 0xFF) as u8;
            Ok(vec![hi, lo])
        }
        Form::ExtendedRegister => {
            let r = require_one(operands)?;
            let reg = parse_register(r, evaluator)?;
            let hi = (op >> 8) as u8;
            let lo = (op & 0xFF) as u8 | reg;
            Ok(vec![hi, lo])
        }
        Form::ExtendedImmediate => {
            let r = require_one(operands)?;
            let byte = parse_immediate_byte(r, evaluator)?;
            let hi = (op >> 8) as u8;
            let lo = (op & 0xFF) as u8;
            Ok(vec![hi, lo, byte])
        }
        Form::ExtendedShortBranch => {
            let r = require_one(operands)?;
            let addr = parse_address(r, evaluator)?;
            let next = pc.wrapping_add(2);
            if (next & 0xFF00) != (addr & 0xFF00) {
                return Err(AssemblyError::error("Short branch target out of range"));
            }
            let hi = (op >> 8) as u8;
            let lo = (op & 0xFF) as u8;
            Ok(vec![hi, lo, (addr & 0xFF) as u8])
        }
        Form::ExtendedRegisterImm16 => {
            if operands.len() != 2 {
                return Err(AssemblyError::error("Expected register and 16-bit value"));
            }
            let reg = parse_register(&operands[0], evaluator)?;
            let addr = parse_address(&operands[1], evaluator)?;
            let hi = (op >> 8) as u8;
            let lo = (op & 0xFF) as u8 | reg;
            let mut addr_bytes = [0u8; 2];
            BigEndian::write_u16(&mut addr_bytes, addr);
            Ok(vec![hi, lo, addr_bytes[0], addr_bytes[1]])
        }
    }
}

fn require_one(operands: &[String]) -> Result<&str> {
    match operands {
        [only] => Ok(only.as_str()),
        _ => Err(AssemblyError::error("Expected exactly one operand")),
    }
}

/// Encodes one element of a `DB` operand list: an expression (one byte),
/// a quoted string (byte-expanded), or an `@"path"` file include.
pub fn db_element_bytes(operand: &str, evaluator: &Evaluator) -> Result<Vec<u8>> {
    if literals::is_string_literal(operand) {
        literals::string_to_bytes(operand)
    } else if literals::is_file_operand(operand) {
        literals::read_file_operand(operand)
    } else {
        let value = evaluator.evaluate(operand)?;
        if !(0..=255).contains(&value) && !(-128..0).contains(&value) {
            return Err(AssemblyError::error(format!(
                "Byte value out of range: {}",
                value
            )));
        }
        Ok(vec![(value & 0xFF) as u8])
    }
}

/// Encodes one `DW`/`DL`/`DQ` operand as a big-endian integer of `width`
/// bytes (2, 4, or 8).
pub fn wide_element_bytes(operand: &str, evaluator: &Evaluator, width: usize) -> Result<Vec<u8>> {
    let value = evaluator.evaluate(operand)?;
    let mut bytes = vec![0u8; 8];
    BigEndian::write_i64(&mut bytes, value);
    Ok(bytes[8 - width..].to_vec())
}

/// Size in bytes of one `DB` element, for pass-1 sizing. Expressions
/// always cost one byte; strings/file includes cost their expanded
/// length. Does not evaluate expressions (labels may not exist yet).
pub fn db_element_size(operand: &str) -> Result<u16> {
    if literals::is_string_literal(operand) {
        Ok(literals::string_to_bytes(operand)?.len() as u16)
    } else if literals::is_file_operand(operand) {
        Ok(literals::read_file_operand(operand)?.len() as u16)
    } else {
        Ok(1)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::opcodes::CpuVariant;
    use crate::symbols::SymbolTable;

    fn eval(pc: u16) -> (SymbolTable, CpuVariant) {
        (SymbolTable::global(), CpuVariant::Cpu1806A)
    }

    #[test]
    fn basic_form_example() {
        let (global, cpu) = eval(0);
        let evaluator = Evaluator::new(&global, 0, cpu);
        let spec = OpCodeSpec {
            opcode: 0xF8,
            form: Form::Immediate,
            min_cpu: CpuVariant::Cpu1802,
        };
        let bytes = encode_instruction("LDI", spec, &["0x55".to_string()], 0, &evaluator).unwrap();
        assert_eq!(bytes, vec![0xF8, 0x55]);
    }

    #[test]
    fn short_branch_same_page() {
        let (global, cpu) = eval(0x0100);
        let evaluator = Evaluator::new(&global, 0x0100, cpu);
        let spec = OpCodeSpec {
            opcode: 0x30,
            form: Form::ShortBranch,
            min_cpu: CpuVariant::Cpu1802,
        };
        let bytes = encode_instruction("BR", spec, &["0x0100".to_string()], 0x0100, &evaluator).unwrap();
        assert_eq!(bytes, vec![0x30, 0x00]);
    }

    #[test]
    fn short_branch_cross_page_errors() {
        let (global, cpu) = eval(0x00FF);
        let evaluator = Evaluator::new(&global, 0x00FF, cpu);
        let spec = OpCodeSpec {
            opcode: 0x30,
            form: Form::ShortBranch,
            min_cpu: CpuVariant::Cpu1802,
        };
        assert!(encode_instruction("BR", spec, &["0x0200".to_string()], 0x00FF, &evaluator).is_err());
    }

    #[test]
    fn long_branch_across_pages() {
        let (global, cpu) = eval(0x80);
        let evaluator = Evaluator::new(&global, 0x80, cpu);
        let spec = OpCodeSpec {
            opcode: 0xC0,
            form: Form::LongBranch,
            min_cpu: CpuVariant::Cpu1802,
        };
        let bytes = encode_instruction("LBR", spec, &["0x1234".to_string()], 0x80, &evaluator).unwrap();
        assert_eq!(bytes, vec![0xC0, 0x12, 0x34]);
    }

    #[test]
    fn ldn_register_zero_rejected() {
        let (global, cpu) = eval(0);
        let evaluator = Evaluator::new(&global, 0, cpu);
        let spec = OpCodeSpec {
            opcode: 0x00,
            form: Form::Register,
            min_cpu: CpuVariant::Cpu1802,
        };
        assert!(encode_instruction("LDN", spec, &["R0".to_string()], 0, &evaluator).is_err());
        assert!(encode_instruction("LDN", spec, &["R1".to_string()], 0, &evaluator).is_ok());
    }

    #[test]
    fn extended_register_imm16_form() {
        let (global, cpu) = eval(0);
        let evaluator = Evaluator::new(&global, 0, cpu);
        let spec = OpCodeSpec {
            opcode: 0x68C0,
            form: Form::ExtendedRegisterImm16,
            min_cpu: CpuVariant::Cpu1806,
        };
        let bytes = encode_instruction(
            "RLDI",
            spec,
            &["R3".to_string(), "0xBEEF".to_string()],
            0,
            &evaluator,
        )
        .unwrap();
        assert_eq!(bytes, vec![0x68, 0xC3, 0xBE, 0xEF]);
    }

    #[test]
    fn db_string_element() {
        let (global, cpu) = eval(0);
        let evaluator = Evaluator::new(&global, 0, cpu);
        assert_eq!(
            db_element_bytes("\"AB\"", &evaluator).unwrap(),
            vec![b'A', b'B']
        );
    }

    #[test]
    fn dw_big_endian() {
        let (global, cpu) = eval(0);
        let evaluator = Evaluator::new(&global, 0, cpu);
        assert_eq!(wide_element_bytes("0x1234", &evaluator, 2).unwrap(), vec![0x12, 0x34]);
    }
}
