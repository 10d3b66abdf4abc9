//! End-to-end scenario: short- and long-branch encoding, including the
//! short-branch same-page restriction surfacing as a pass-3 error.

#[macro_use]
extern crate matches;

use engine::{assemble, AssembleOptions, Severity};

#[test]
fn short_branch_within_the_same_page() {
    let source = "\n    ORG 0x0100\n    BR TARGET\nTARGET: NOP\n    END 0x0100\n";
    let outcome = assemble(source, "branch.asm", AssembleOptions::default());
    assert!(outcome.success, "errors: {:?}", outcome.errors);
    assert_eq!(outcome.code_map.get(&0x0100).unwrap(), &vec![0x30, 0x02, 0xC4]);
}

#[test]
fn long_branch_crosses_pages_freely() {
    let source = "\n    ORG 0x00F0\n    LBR TARGET\n    ORG 0x0200\nTARGET: NOP\n    END TARGET\n";
    let outcome = assemble(source, "branch.asm", AssembleOptions::default());
    assert!(outcome.success, "errors: {:?}", outcome.errors);
    assert_eq!(
        outcome.code_map.get(&0x00F0).unwrap(),
        &vec![0xC0, 0x02, 0x00]
    );
    assert_eq!(outcome.entry_point, Some(0x0200));
}

#[test]
fn short_branch_crossing_a_page_boundary_is_an_error() {
    let source = "\n    ORG 0x00FE\n    BR TARGET\n    ORG 0x0200\nTARGET: NOP\n    END 0x0200\n";
    let outcome = assemble(source, "branch.asm", AssembleOptions::default());
    assert!(!outcome.success);
    let error = outcome
        .errors
        .iter()
        .find(|e| e.message.contains("Short branch"))
        .expect("expected a short-branch range error");
    assert_matches!(error.severity, Severity::Error);
}
