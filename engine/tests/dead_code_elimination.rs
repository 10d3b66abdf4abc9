//! End-to-end scenario: an unreferenced `SUB` is dropped from the final
//! code map and its bytes counted, while a referenced one survives; a
//! `STATIC` subroutine is kept even when nothing calls it.

use engine::{assemble, AssembleOptions};

#[test]
fn unreferenced_subroutine_is_removed_and_its_bytes_counted() {
    let source = "\n    ORG 0\n    NOP\nDEAD: SUB\n    NOP\n    NOP\n    ENDSUB\n    END 0\n";
    let outcome = assemble(source, "dce.asm", AssembleOptions::default());
    assert!(outcome.success, "errors: {:?}", outcome.errors);
    assert_eq!(outcome.code_map.get(&0).unwrap(), &vec![0xC4]);
    assert_eq!(outcome.optimized_out_bytes, 2);
}

#[test]
fn a_reference_from_another_subroutine_keeps_both_alive() {
    let source = "\n    ORG 0\n    LBR ENTRY\nHELPER: SUB\n    NOP\n    ENDSUB\nENTRY: SUB\n    LBR HELPER\n    ENDSUB\n    END ENTRY\n";
    let outcome = assemble(source, "dce.asm", AssembleOptions::default());
    assert!(outcome.success, "errors: {:?}", outcome.errors);
    assert_eq!(outcome.optimized_out_bytes, 0);
}

#[test]
fn static_subroutine_survives_even_without_a_reference() {
    let source = "\n    ORG 0\n    NOP\nKEEPME: SUB STATIC\n    NOP\n    ENDSUB\n    END 0\n";
    let outcome = assemble(source, "dce.asm", AssembleOptions::default());
    assert!(outcome.success, "errors: {:?}", outcome.errors);
    assert_eq!(outcome.optimized_out_bytes, 0);
}
