//! Multi-pass cross-assembler engine for the RCA 1802/1806/1806A family.
//!
//! [`assemble`] takes one flattened, already-preprocessed source (macro
//! `#include`/conditional-compilation handling is an external concern, same
//! as the reference assembler's split between its preprocessor and its
//! three-pass core) and runs it through sizing, layout, and emission,
//! restarting once from pass one if dead-code elimination finds a
//! subroutine nobody referenced.
//!
//! The output is a sparse, non-overlapping [`AssembleOutcome::code_map`] of
//! `start address -> bytes`; turning that into Intel HEX, Idiot/4, ELF/OS or
//! raw binary is the `objfile` crate's job.

mod align;
mod driver;
mod encoder;
mod error;
mod evaluator;
mod line_parser;
mod listing;
mod literals;
mod macros;
mod opcodes;
mod symbols;
mod tokenizer;

pub use driver::{assemble, AssembleOptions, AssembleOutcome};
pub use error::{AssemblyError, LoggedError, Result, Severity};
pub use evaluator::Evaluator;
pub use listing::ListingEvent;
pub use opcodes::{parse_cpu_variant, CpuVariant, Form, Mnemonic, OpCodeSpec, PseudoOp};
pub use symbols::{Symbol, SymbolTable};

#[cfg(test)]
mod test {
    use super::*;

    fn assemble_ok(source: &str) -> AssembleOutcome {
        let outcome = assemble(source, "test.asm", AssembleOptions::default());
        assert!(
            outcome.success,
            "expected successful assembly, got errors: {:?}",
            outcome.errors
        );
        outcome
    }

    // Column convention: a label starts in column one (with or without a
    // trailing `:`); a line with no label must be indented, per the line
    // grammar in `line_parser`.

    #[test]
    fn basic_program_assembles_and_orgs_correctly() {
        let source = "\n    ORG 0\n    LDI 0x55\n    PLO R2\n    NOP\n    END START\nSTART: EQU 0\n";
        let outcome = assemble_ok(source);
        let bytes = outcome.code_map.get(&0).unwrap();
        assert_eq!(bytes, &vec![0xF8, 0x55, 0xA2, 0xC4]);
        assert_eq!(outcome.entry_point, Some(0));
    }

    #[test]
    fn long_branch_encodes_big_endian_target() {
        let source = "\n    ORG 0x100\n    LBR TARGET\nTARGET: NOP\n    END 0x100\n";
        let outcome = assemble_ok(source);
        let bytes = outcome.code_map.get(&0x100).unwrap();
        assert_eq!(bytes, &vec![0xC0, 0x01, 0x03, 0xC4]);
    }

    #[test]
    fn subroutine_auto_aligns_across_page_boundary() {
        let mut source = String::from("\n    ORG 0x00F8\nGREET: SUB ALIGN=AUTO");
        for _ in 0..16 {
            source.push_str("\n    NOP");
        }
        source.push_str("\n    ENDSUB\n    END GREET\n");
        let outcome = assemble_ok(&source);
        assert_eq!(outcome.entry_point, Some(0x100));
        assert!(outcome.code_map.contains_key(&0x100));
        assert!(!outcome.code_map.contains_key(&0x00F8) || outcome.code_map[&0x00F8].is_empty());
    }

    #[test]
    fn unreferenced_subroutine_is_dead_code_eliminated() {
        let source = "\n    ORG 0\n    NOP\nDEAD: SUB\n    NOP\n    NOP\n    ENDSUB\n    END 0\n";
        let outcome = assemble_ok(source);
        assert_eq!(outcome.code_map.get(&0).unwrap(), &vec![0xC4]);
        assert_eq!(outcome.optimized_out_bytes, 2);
    }

    #[test]
    fn referenced_subroutine_survives_dce() {
        let source = "\n    ORG 0\n    LBR LIVE\nLIVE: SUB\n    NOP\n    ENDSUB\n    END 0\n";
        let outcome = assemble_ok(source);
        assert_eq!(outcome.optimized_out_bytes, 0);
    }

    #[test]
    fn macro_expands_with_argument_substitution() {
        let source = "\n    ORG 0\nLOADCONST: MACRO VALUE\n    LDI VALUE\n    ENDMACRO\n    LOADCONST 0x42\n    END 0\n";
        let outcome = assemble_ok(source);
        assert_eq!(outcome.code_map.get(&0).unwrap(), &vec![0xF8, 0x42]);
    }

    #[test]
    fn undefined_label_is_reported_as_error() {
        let source = "\n    ORG 0\n    LBR NOWHERE\n    END 0\n";
        let outcome = assemble(source, "test.asm", AssembleOptions::default());
        assert!(!outcome.success);
        assert!(outcome.errors.iter().any(|e| e.message.contains("NOWHERE")));
    }

    #[test]
    fn db_mixes_strings_and_expressions() {
        let source = "\n    ORG 0\n    DB \"HI\", 0, 1+1\n    END 0\n";
        let outcome = assemble_ok(source);
        assert_eq!(outcome.code_map.get(&0).unwrap(), &vec![b'H', b'I', 0, 2]);
    }
}
