//! Static catalog of 1802/1806/1806A mnemonics and pseudo-ops.
//!
//! Opcode values, encoding forms and minimum CPU variants are reproduced
//! from the reference assembler's opcode table; they are the one part of
//! this crate where the literal numeric constants matter more than the
//! Rust idiom used to express them.

use num_derive::{FromPrimitive, ToPrimitive};

/// Total order over the instruction-set generations: `Cpu1802 < Cpu1806 < Cpu1806A`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, FromPrimitive, ToPrimitive)]
pub enum CpuVariant {
    Cpu1802,
    Cpu1806,
    Cpu1806A,
}

/// One of the eleven fixed-length instruction encodings, or a pseudo-op.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Form {
    Basic,
    Register,
    Immediate,
    ShortBranch,
    LongBranch,
    Io,
    Extended,
    ExtendedRegister,
    ExtendedImmediate,
    ExtendedShortBranch,
    ExtendedRegisterImm16,
}

impl Form {
    /// Byte length of this form's encoding, independent of operand values.
    pub fn byte_len(self) -> u16 {
        match self {
            Form::Basic => 1,
            Form::Register => 1,
            Form::Immediate => 2,
            Form::ShortBranch => 2,
            Form::LongBranch => 3,
            Form::Io => 1,
            Form::Extended => 2,
            Form::ExtendedRegister => 2,
            Form::ExtendedImmediate => 3,
            Form::ExtendedShortBranch => 3,
            Form::ExtendedRegisterImm16 => 4,
        }
    }
}

/// A real instruction: its base opcode bits, encoding form, and the oldest
/// CPU variant it is legal on.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct OpCodeSpec {
    pub opcode: u16,
    pub form: Form,
    pub min_cpu: CpuVariant,
}

/// Assembler directives that never reach the encoder.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PseudoOp {
    Equ,
    Sub,
    EndSub,
    Org,
    Db,
    Dw,
    Dl,
    Dq,
    Rb,
    Rw,
    Rl,
    Rq,
    Processor,
    Align,
    Assert,
    Macro,
    EndMacro,
    End,
}

/// What a mnemonic resolved against the opcode table turns out to be.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mnemonic {
    Instruction(OpCodeSpec),
    Pseudo(PseudoOp),
}

macro_rules! instr {
    ($opcode:expr, $form:ident, $cpu:ident) => {
        Some(Mnemonic::Instruction(OpCodeSpec {
            opcode: $opcode,
            form: Form::$form,
            min_cpu: CpuVariant::$cpu,
        }))
    };
}

macro_rules! pseudo {
    ($variant:ident) => {
        Some(Mnemonic::Pseudo(PseudoOp::$variant))
    };
}

/// Resolve an upper-cased mnemonic to its opcode table entry.
///
/// Returns `None` for anything not recognized as either a real instruction
/// or a pseudo-op; the line parser and pass driver then try it as a macro
/// expansion site.
pub fn lookup(mnemonic: &str) -> Option<Mnemonic> {
    match mnemonic {
        // 1802 base set
        "IDL" | "LDN" => instr!(0x00, Register, Cpu1802),
        "INC" => instr!(0x10, Register, Cpu1802),
        "DEC" => instr!(0x20, Register, Cpu1802),
        "BR" => instr!(0x30, ShortBranch, Cpu1802),
        "BQ" => instr!(0x31, ShortBranch, Cpu1802),
        "BZ" => instr!(0x32, ShortBranch, Cpu1802),
        "BDF" | "BPZ" | "BGE" => instr!(0x33, ShortBranch, Cpu1802),
        "B1" => instr!(0x34, ShortBranch, Cpu1802),
        "B2" => instr!(0x35, ShortBranch, Cpu1802),
        "B3" => instr!(0x36, ShortBranch, Cpu1802),
        "B4" => instr!(0x37, ShortBranch, Cpu1802),
        "NBR" | "SKP" => instr!(0x38, Basic, Cpu1802),
        "BNQ" => instr!(0x39, ShortBranch, Cpu1802),
        "BNZ" => instr!(0x3A, ShortBranch, Cpu1802),
        "BNF" | "BM" | "BL" => instr!(0x3B, ShortBranch, Cpu1802),
        "BN1" => instr!(0x3C, ShortBranch, Cpu1802),
        "BN2" => instr!(0x3D, ShortBranch, Cpu1802),
        "BN3" => instr!(0x3E, ShortBranch, Cpu1802),
        "BN4" => instr!(0x3F, ShortBranch, Cpu1802),
        "LDA" => instr!(0x40, Register, Cpu1802),
        "STR" => instr!(0x50, Register, Cpu1802),
        "IRX" => instr!(0x60, Basic, Cpu1802),
        "OUT" => instr!(0x60, Io, Cpu1802),
        "INP" => instr!(0x68, Io, Cpu1802),
        "RET" => instr!(0x70, Basic, Cpu1802),
        "DIS" => instr!(0x71, Basic, Cpu1802),
        "LDXA" => instr!(0x72, Basic, Cpu1802),
        "STXD" => instr!(0x73, Basic, Cpu1802),
        "ADC" => instr!(0x74, Basic, Cpu1802),
        "SDB" => instr!(0x75, Basic, Cpu1802),
        "SHRC" | "RSHR" => instr!(0x76, Basic, Cpu1802),
        "SMB" => instr!(0x77, Basic, Cpu1802),
        "SAV" => instr!(0x78, Basic, Cpu1802),
        "MARK" => instr!(0x79, Basic, Cpu1802),
        "REQ" => instr!(0x7A, Basic, Cpu1802),
        "SEQ" => instr!(0x7B, Basic, Cpu1802),
        "ADCI" => instr!(0x7C, Immediate, Cpu1802),
        "SDBI" => instr!(0x7D, Immediate, Cpu1802),
        "SHLC" | "RSHL" => instr!(0x7E, Basic, Cpu1802),
        "SMBI" => instr!(0x7F, Immediate, Cpu1802),
        "GLO" => instr!(0x80, Register, Cpu1802),
        "GHI" => instr!(0x90, Register, Cpu1802),
        "PLO" => instr!(0xA0, Register, Cpu1802),
        "PHI" => instr!(0xB0, Register, Cpu1802),
        "LBR" => instr!(0xC0, LongBranch, Cpu1802),
        "LBQ" => instr!(0xC1, LongBranch, Cpu1802),
        "LBZ" => instr!(0xC2, LongBranch, Cpu1802),
        "LBDF" => instr!(0xC3, LongBranch, Cpu1802),
        "NOP" => instr!(0xC4, Basic, Cpu1802),
        "LSNQ" => instr!(0xC5, Basic, Cpu1802),
        "LSNZ" => instr!(0xC6, Basic, Cpu1802),
        "LSNF" => instr!(0xC7, Basic, Cpu1802),
        "LSKP" => instr!(0xC8, Basic, Cpu1802),
        "NLBR" | "LBNQ" => instr!(0xC9, Basic, Cpu1802),
        "LBNZ" => instr!(0xCA, LongBranch, Cpu1802),
        "LBNF" => instr!(0xCB, LongBranch, Cpu1802),
        "LSIE" => instr!(0xCC, Basic, Cpu1802),
        "LSQ" => instr!(0xCD, Basic, Cpu1802),
        "LSZ" => instr!(0xCE, Basic, Cpu1802),
        "LSDF" => instr!(0xCF, Basic, Cpu1802),
        "SEP" => instr!(0xD0, Register, Cpu1802),
        "SEX" => instr!(0xE0, Register, Cpu1802),
        "LDX" => instr!(0xF0, Basic, Cpu1802),
        "OR" => instr!(0xF1, Basic, Cpu1802),
        "AND" => instr!(0xF2, Basic, Cpu1802),
        "XOR" => instr!(0xF3, Basic, Cpu1802),
        "ADD" => instr!(0xF4, Basic, Cpu1802),
        "SD" => instr!(0xF5, Basic, Cpu1802),
        "SHR" => instr!(0xF6, Basic, Cpu1802),
        "SM" => instr!(0xF7, Basic, Cpu1802),
        "LDI" => instr!(0xF8, Immediate, Cpu1802),
        "ORI" => instr!(0xF9, Immediate, Cpu1802),
        "ANI" => instr!(0xFA, Immediate, Cpu1802),
        "XRI" => instr!(0xFB, Immediate, Cpu1802),
        "ADI" => instr!(0xFC, Immediate, Cpu1802),
        "SDI" => instr!(0xFD, Immediate, Cpu1802),
        "SHL" => instr!(0xFE, Basic, Cpu1802),
        "SMI" => instr!(0xFF, Immediate, Cpu1802),

        // 1806 additions
        "STPC" => instr!(0x6800, Extended, Cpu1806),
        "DTC" => instr!(0x6801, Extended, Cpu1806),
        "SPM2" => instr!(0x6802, Extended, Cpu1806),
        "SCM2" => instr!(0x6803, Extended, Cpu1806),
        "SPM1" => instr!(0x6804, Extended, Cpu1806),
        "SCM1" => instr!(0x6805, Extended, Cpu1806),
        "LDC" => instr!(0x6806, Extended, Cpu1806),
        "STM" => instr!(0x6807, Extended, Cpu1806),
        "GEX" => instr!(0x6808, Extended, Cpu1806),
        "ETQ" => instr!(0x6809, Extended, Cpu1806),
        "XIE" => instr!(0x680A, Extended, Cpu1806),
        "XID" => instr!(0x680B, Extended, Cpu1806),
        "CIE" => instr!(0x680C, Extended, Cpu1806),
        "CID" => instr!(0x680D, Extended, Cpu1806),
        "BCI" => instr!(0x683E, ExtendedShortBranch, Cpu1806),
        "BXI" => instr!(0x683F, ExtendedShortBranch, Cpu1806),
        "RLXA" => instr!(0x6860, ExtendedRegister, Cpu1806),
        "SCAL" => instr!(0x6880, ExtendedRegisterImm16, Cpu1806),
        "SRET" => instr!(0x6890, ExtendedRegister, Cpu1806),
        "RSXD" => instr!(0x68A0, ExtendedRegister, Cpu1806),
        "RNX" => instr!(0x68B0, ExtendedRegister, Cpu1806),
        "RLDI" => instr!(0x68C0, ExtendedRegisterImm16, Cpu1806),

        // 1806A additions
        "DBNZ" => instr!(0x6820, ExtendedRegisterImm16, Cpu1806A),
        "DADC" => instr!(0x6874, Extended, Cpu1806A),
        "DSAV" => instr!(0x6876, Extended, Cpu1806A),
        "DSMB" => instr!(0x6877, Extended, Cpu1806A),
        "DACI" => instr!(0x687C, ExtendedImmediate, Cpu1806A),
        "DSBI" => instr!(0x687F, ExtendedImmediate, Cpu1806A),
        "DADD" => instr!(0x68F4, Extended, Cpu1806A),
        "DSM" => instr!(0x68F7, Extended, Cpu1806A),
        "DADI" => instr!(0x68FC, ExtendedImmediate, Cpu1806A),
        "DSMI" => instr!(0x68FF, ExtendedImmediate, Cpu1806A),

        // Pseudo-ops
        "EQU" => pseudo!(Equ),
        "SUB" | "SUBROUTINE" => pseudo!(Sub),
        "ENDSUB" => pseudo!(EndSub),
        "ORG" => pseudo!(Org),
        "DB" => pseudo!(Db),
        "DW" => pseudo!(Dw),
        "DL" => pseudo!(Dl),
        "DQ" => pseudo!(Dq),
        "RB" => pseudo!(Rb),
        "RW" => pseudo!(Rw),
        "RL" => pseudo!(Rl),
        "RQ" => pseudo!(Rq),
        "CPU" | "PROCESSOR" => pseudo!(Processor),
        "ALIGN" => pseudo!(Align),
        "ASSERT" => pseudo!(Assert),
        "MACRO" => pseudo!(Macro),
        "ENDMACRO" | "ENDM" => pseudo!(EndMacro),
        "END" => pseudo!(End),

        _ => None,
    }
}

/// Resolve a processor designation (`1802`, `CDP1806A`, …) to a [`CpuVariant`].
pub fn parse_cpu_variant(designation: &str) -> Option<CpuVariant> {
    match designation {
        "1802" | "CDP1802" => Some(CpuVariant::Cpu1802),
        "1804" | "CDP1804" | "1805" | "CDP1805" | "1806" | "CDP1806" => Some(CpuVariant::Cpu1806),
        "1804A" | "CDP1804A" | "1805A" | "CDP1805A" | "1806A" | "CDP1806A" => {
            Some(CpuVariant::Cpu1806A)
        }
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn idl_and_ldn_share_opcode() {
        assert_eq!(lookup("IDL"), lookup("LDN"));
    }

    #[test]
    fn sub_and_subroutine_alias() {
        assert_eq!(lookup("SUB"), Some(Mnemonic::Pseudo(PseudoOp::Sub)));
        assert_eq!(lookup("SUBROUTINE"), Some(Mnemonic::Pseudo(PseudoOp::Sub)));
    }

    #[test]
    fn endm_aliases_endmacro() {
        assert_eq!(lookup("ENDM"), Some(Mnemonic::Pseudo(PseudoOp::EndMacro)));
    }

    #[test]
    fn unknown_mnemonic_is_none() {
        assert_eq!(lookup("MYMACRO"), None);
    }

    #[test]
    fn form_byte_lengths() {
        assert_eq!(Form::Basic.byte_len(), 1);
        assert_eq!(Form::Immediate.byte_len(), 2);
        assert_eq!(Form::LongBranch.byte_len(), 3);
        assert_eq!(Form::ExtendedRegisterImm16.byte_len(), 4);
    }

    #[test]
    fn cpu_variant_total_order() {
        assert!(CpuVariant::Cpu1802 < CpuVariant::Cpu1806);
        assert!(CpuVariant::Cpu1806 < CpuVariant::Cpu1806A);
    }

    #[test]
    fn processor_designation_aliases() {
        assert_eq!(parse_cpu_variant("1804"), Some(CpuVariant::Cpu1806));
        assert_eq!(parse_cpu_variant("CDP1805A"), Some(CpuVariant::Cpu1806A));
        assert_eq!(parse_cpu_variant("bogus"), None);
    }

    #[test]
    fn ldi_is_immediate_form() {
        match lookup("LDI") {
            Some(Mnemonic::Instruction(spec)) => {
                assert_eq!(spec.opcode, 0xF8);
                assert_eq!(spec.form, Form::Immediate);
            }
            _ => panic!("expected instruction"),
        }
    }

    #[test]
    fn scal_is_1806_extended_register_imm16() {
        match lookup("SCAL") {
            Some(Mnemonic::Instruction(spec)) => {
                assert_eq!(spec.opcode, 0x6880);
                assert_eq!(spec.form, Form::ExtendedRegisterImm16);
                assert_eq!(spec.min_cpu, CpuVariant::Cpu1806);
            }
            _ => panic!("expected instruction"),
        }
    }
}
