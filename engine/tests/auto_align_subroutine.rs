//! End-to-end scenario: a `SUB ALIGN=AUTO` subroutine that does, and does
//! not, need to move to avoid straddling a 256-byte page.

use engine::{assemble, AssembleOptions};

#[test]
fn auto_align_pads_forward_when_the_body_would_straddle_a_page() {
    let mut source = String::from("\n    ORG 0x00F8\nGREET: SUB ALIGN=AUTO");
    for _ in 0..16 {
        source.push_str("\n    NOP");
    }
    source.push_str("\n    ENDSUB\n    END GREET\n");
    let outcome = assemble(&source, "align.asm", AssembleOptions::default());
    assert!(outcome.success, "errors: {:?}", outcome.errors);
    assert_eq!(outcome.entry_point, Some(0x0100));
    assert_eq!(outcome.code_map.get(&0x0100).unwrap().len(), 16);
}

#[test]
fn auto_align_is_a_no_op_when_the_body_already_fits_the_page() {
    let mut source = String::from("\n    ORG 0x0000\nGREET: SUB ALIGN=AUTO");
    for _ in 0..16 {
        source.push_str("\n    NOP");
    }
    source.push_str("\n    ENDSUB\n    END GREET\n");
    let outcome = assemble(&source, "align.asm", AssembleOptions::default());
    assert!(outcome.success, "errors: {:?}", outcome.errors);
    assert_eq!(outcome.entry_point, Some(0));
    assert_eq!(outcome.code_map.get(&0).unwrap().len(), 16);
}

#[test]
fn explicit_align_value_pads_to_the_requested_boundary() {
    let source = "\n    ORG 3\nTBL: SUB ALIGN=16\n    NOP\n    ENDSUB\n    END TBL\n";
    let outcome = assemble(source, "align.asm", AssembleOptions::default());
    assert!(outcome.success, "errors: {:?}", outcome.errors);
    assert_eq!(outcome.entry_point, Some(16));
}
