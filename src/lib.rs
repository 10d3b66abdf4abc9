//! Top-level crate for the RCA 1802 family cross-assembler workspace.
//!
//! The actual assembly engine lives in the [`engine`] crate; this crate is a
//! thin re-export that gives the workspace a single library entry point
//! above its `engine`/`objfile`/`asm1802-cli` members.

pub use engine::*;
