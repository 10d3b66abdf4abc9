//! End-to-end scenario: a plain sequence of instructions with no
//! subroutines, macros, or alignment, assembled in one pass driver run.

use engine::{assemble, AssembleOptions};

#[test]
fn straight_line_program_assembles_to_one_segment() {
    let source = "\n    ORG 0\n    LDI 0x12\n    PLO R1\n    LDI 0x34\n    PHI R1\n    SEP R1\n";
    let outcome = assemble(source, "basic.asm", AssembleOptions::default());
    assert!(outcome.success, "errors: {:?}", outcome.errors);
    assert_eq!(
        outcome.code_map.get(&0).unwrap(),
        &vec![0xF8, 0x12, 0xA1, 0xF8, 0x34, 0xB1, 0xD1]
    );
}

#[test]
fn equ_defines_a_constant_used_by_a_later_instruction() {
    let source = "\n    ORG 0\nCOUNT: EQU 10\n    LDI COUNT\n    END 0\n";
    let outcome = assemble(source, "basic.asm", AssembleOptions::default());
    assert!(outcome.success, "errors: {:?}", outcome.errors);
    assert_eq!(outcome.code_map.get(&0).unwrap(), &vec![0xF8, 10]);
}

#[test]
fn org_opens_a_new_segment_leaving_a_gap_in_the_code_map() {
    let source = "\n    ORG 0\n    NOP\n    ORG 0x200\n    NOP\n    END 0\n";
    let outcome = assemble(source, "basic.asm", AssembleOptions::default());
    assert!(outcome.success, "errors: {:?}", outcome.errors);
    assert_eq!(outcome.code_map.get(&0).unwrap(), &vec![0xC4]);
    assert_eq!(outcome.code_map.get(&0x200).unwrap(), &vec![0xC4]);
}
