//! Global and per-subroutine symbol scopes.
//!
//! One global table always exists; zero or more subroutine tables are
//! opened and closed as `SUB`/`ENDSUB` pairs are processed. Each table also
//! owns the macro definitions registered while it was the active scope, per
//! spec.md's "macros also scoped per subroutine."

use crate::macros::Macro;
use std::cell::Cell;
use std::collections::HashMap;

/// A named value, with the bookkeeping the pass driver needs for
/// dead-code elimination and listing suppression.
///
/// `ref_count` is a `Cell` because lookups happen through a shared
/// reference to the owning table (the evaluator borrows global and local
/// tables simultaneously) but still need to record that a reference
/// occurred.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub value: Option<u16>,
    pub hide_from_listing: bool,
    pub ref_count: Cell<u32>,
}

impl Symbol {
    pub fn new(value: Option<u16>) -> Self {
        Symbol {
            value,
            hide_from_listing: false,
            ref_count: Cell::new(0),
        }
    }

    pub fn hidden(value: u16) -> Self {
        Symbol {
            value: Some(value),
            hide_from_listing: true,
            ref_count: Cell::new(0),
        }
    }

    pub fn is_defined(&self) -> bool {
        self.value.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct SymbolTable {
    pub name: String,
    pub code_size: u16,
    pub symbols: HashMap<String, Symbol>,
    pub macros: HashMap<String, Macro>,
    pub is_static: bool,
}

impl SymbolTable {
    pub fn global() -> Self {
        SymbolTable {
            name: String::new(),
            code_size: 0,
            symbols: HashMap::new(),
            macros: HashMap::new(),
            is_static: true,
        }
    }

    pub fn subroutine(name: impl Into<String>) -> Self {
        SymbolTable {
            name: name.into(),
            code_size: 0,
            symbols: HashMap::new(),
            macros: HashMap::new(),
            is_static: false,
        }
    }

    /// Bind (or rebind) `name` to `value` in this table.
    pub fn bind(&mut self, name: &str, value: u16) {
        self.symbols
            .entry(name.to_owned())
            .and_modify(|s| s.value = Some(value))
            .or_insert_with(|| Symbol::new(Some(value)));
    }

    /// Declare `name` without a value yet (used when a `SUB` label is
    /// created before its address is known, or a forward `EQU` target).
    pub fn declare(&mut self, name: &str) {
        self.symbols
            .entry(name.to_owned())
            .or_insert_with(|| Symbol::new(None));
    }

    pub fn bind_hidden(&mut self, name: &str, value: u16) {
        self.symbols.insert(name.to_owned(), Symbol::hidden(value));
    }

    /// Pre-pass initialization described in spec.md 4.5: bind `R0..R15`
    /// (decimal and hex-suffix spellings) and `P1..P7`, all hidden from the
    /// listing.
    pub fn bind_registers(&mut self) {
        for r in 0u16..16 {
            self.bind_hidden(&format!("R{}", r), r);
            self.bind_hidden(&format!("R{:X}", r), r);
        }
    }

    pub fn bind_ports(&mut self) {
        for p in 1u16..8 {
            self.bind_hidden(&format!("P{}", p), p);
        }
    }

    pub fn register_macro(&mut self, name: String, macro_def: Macro) {
        self.macros.insert(name, macro_def);
    }

    /// `ref_count == 0` over every symbol whose name equals this table's
    /// own subroutine label is checked by the driver, not here; this just
    /// exposes the lookup the driver needs for that check.
    pub fn clear_non_hidden(&mut self) {
        self.symbols.retain(|_, s| s.hide_from_listing);
        self.macros.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bind_registers_covers_decimal_and_hex() {
        let mut t = SymbolTable::global();
        t.bind_registers();
        assert_eq!(t.symbols.get("R0").unwrap().value, Some(0));
        assert_eq!(t.symbols.get("RF").unwrap().value, Some(15));
        assert_eq!(t.symbols.get("R15").unwrap().value, Some(15));
        assert!(t.symbols.get("R0").unwrap().hide_from_listing);
    }

    #[test]
    fn bind_ports_range_is_one_to_seven() {
        let mut t = SymbolTable::global();
        t.bind_ports();
        assert!(t.symbols.get("P1").is_some());
        assert!(t.symbols.get("P7").is_some());
        assert!(t.symbols.get("P0").is_none());
        assert!(t.symbols.get("P8").is_none());
    }

    #[test]
    fn declare_then_bind() {
        let mut t = SymbolTable::global();
        t.declare("FOO");
        assert!(!t.symbols.get("FOO").unwrap().is_defined());
        t.bind("FOO", 0x100);
        assert_eq!(t.symbols.get("FOO").unwrap().value, Some(0x100));
    }

    #[test]
    fn clear_non_hidden_keeps_registers_drops_labels() {
        let mut t = SymbolTable::global();
        t.bind_registers();
        t.bind("USERLABEL", 5);
        t.clear_non_hidden();
        assert!(t.symbols.contains_key("R0"));
        assert!(!t.symbols.contains_key("USERLABEL"));
    }
}
