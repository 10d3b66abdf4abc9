//! The pass driver: orchestrates passes 1-3 plus the single permitted DCE
//! replay, maintaining the program counter, dispatching each parsed line to
//! a pseudo-op or opcode-form handler, and accumulating errors (spec.md
//! 4.5-4.6, 9).

use crate::align;
use crate::encoder;
use crate::error::{AssemblyError, LoggedError, Result, Severity};
use crate::evaluator::Evaluator;
use crate::line_parser::{self, ParsedLine};
use crate::listing::{ListingEvent, ListingStream};
use crate::macros::Macro;
use crate::opcodes::{self, CpuVariant, Mnemonic, PseudoOp};
use crate::symbols::SymbolTable;
use std::collections::{BTreeMap, HashSet};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Pass {
    One,
    Two,
    Three,
}

#[derive(Clone, Debug)]
pub struct AssembleOptions {
    pub initial_processor: CpuVariant,
    pub bind_registers: bool,
    pub bind_ports: bool,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        AssembleOptions {
            initial_processor: CpuVariant::Cpu1802,
            bind_registers: true,
            bind_ports: true,
        }
    }
}

#[derive(Debug)]
pub struct AssembleOutcome {
    pub code_map: BTreeMap<u16, Vec<u8>>,
    pub entry_point: Option<u16>,
    pub global: SymbolTable,
    pub subroutines: std::collections::HashMap<String, SymbolTable>,
    pub listing: Vec<ListingEvent>,
    pub errors: Vec<LoggedError>,
    pub optimized_out_bytes: u32,
    pub success: bool,
}

struct MacroFrame {
    name: String,
    lines: Vec<String>,
    idx: usize,
    macro_line: u32,
}

/// Wraps the flat, preprocessed line stream plus the driver's own macro
/// expansion pushdown (spec.md 1: the file-inclusion stack is an external
/// concern; the macro stack is the core's own).
struct LineReader<'a> {
    source: &'a [String],
    idx: usize,
    current_file: String,
    current_line: u32,
    macro_stack: Vec<MacroFrame>,
}

struct LineRecord {
    file: String,
    line: u32,
    macro_name: Option<String>,
    macro_line: Option<u32>,
    text: String,
}

impl<'a> LineReader<'a> {
    fn new(source: &'a [String], file_name: &str) -> Self {
        LineReader {
            source,
            idx: 0,
            current_file: file_name.to_owned(),
            current_line: 1,
            macro_stack: Vec::new(),
        }
    }

    fn in_macro(&self) -> bool {
        !self.macro_stack.is_empty()
    }

    fn push_macro(&mut self, name: String, lines: Vec<String>) {
        self.macro_stack.push(MacroFrame {
            name,
            lines,
            idx: 0,
            macro_line: 0,
        });
    }

    fn next_record(&mut self) -> Option<LineRecord> {
        loop {
            if let Some(frame) = self.macro_stack.last_mut() {
                if frame.idx < frame.lines.len() {
                    let text = frame.lines[frame.idx].clone();
                    frame.idx += 1;
                    frame.macro_line += 1;
                    return Some(LineRecord {
                        file: self.current_file.clone(),
                        line: self.current_line,
                        macro_name: Some(frame.name.clone()),
                        macro_line: Some(frame.macro_line),
                        text,
                    });
                }
                self.macro_stack.pop();
                continue;
            }

            if self.idx >= self.source.len() {
                return None;
            }
            let raw = self.source[self.idx].clone();
            self.idx += 1;

            if let Some(marker) = parse_line_marker(&raw) {
                self.current_file = marker.0;
                self.current_line = marker.1;
                continue;
            }

            let line_no = self.current_line;
            self.current_line += 1;
            return Some(LineRecord {
                file: self.current_file.clone(),
                line: line_no,
                macro_name: None,
                macro_line: None,
                text: raw,
            });
        }
    }
}

/// `#line "FILE" N` — resets the reported file/line (spec.md 6).
fn parse_line_marker(text: &str) -> Option<(String, u32)> {
    let trimmed = text.trim_start();
    let rest = trimmed.strip_prefix("#line")?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    let file = rest[..end].to_owned();
    let num_part = rest[end + 1..].trim();
    let n: u32 = num_part.parse().ok()?;
    Some((file, n))
}

enum Directive {
    Processor(String),
    List(bool),
    Symbols(bool),
    Unknown(String),
}

fn parse_directive(text: &str) -> Option<Directive> {
    let trimmed = text.trim();
    let rest = trimmed.strip_prefix('#')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let keyword = parts.next().unwrap_or("").to_ascii_uppercase();
    let arg = parts.next().unwrap_or("").trim();
    match keyword.as_str() {
        "PROCESSOR" => Some(Directive::Processor(arg.trim_matches('"').to_owned())),
        "LIST" => Some(Directive::List(arg.eq_ignore_ascii_case("on"))),
        "SYMBOLS" => Some(Directive::Symbols(arg.eq_ignore_ascii_case("on"))),
        _ => Some(Directive::Unknown(keyword)),
    }
}

struct Driver {
    options: AssembleOptions,
    global: SymbolTable,
    subs: std::collections::HashMap<String, SymbolTable>,
    sub_order: Vec<String>,
    current_sub: Option<String>,
    pc: u16,
    processor: CpuVariant,
    unreferenced_subs: HashSet<String>,
    errors: Vec<LoggedError>,
    listing: ListingStream,
    code_map: BTreeMap<u16, Vec<u8>>,
    current_segment: Option<u16>,
    entry_point: Option<u16>,
    in_auto_aligned_sub: bool,
    optimized_out_bytes: u32,
    list_enabled: bool,
    symbols_enabled: bool,
    stop: bool,
}

impl Driver {
    fn new(options: AssembleOptions) -> Self {
        let mut global = SymbolTable::global();
        if options.bind_registers {
            global.bind_registers();
        }
        if options.bind_ports {
            global.bind_ports();
        }
        Driver {
            processor: options.initial_processor,
            global,
            subs: std::collections::HashMap::new(),
            sub_order: Vec::new(),
            current_sub: None,
            pc: 0,
            unreferenced_subs: HashSet::new(),
            errors: Vec::new(),
            listing: ListingStream::new(),
            code_map: BTreeMap::new(),
            current_segment: None,
            entry_point: None,
            in_auto_aligned_sub: false,
            optimized_out_bytes: 0,
            list_enabled: true,
            symbols_enabled: false,
            stop: false,
            options,
        }
    }

    fn current_table(&self) -> &SymbolTable {
        match &self.current_sub {
            Some(name) => self.subs.get(name).unwrap(),
            None => &self.global,
        }
    }

    fn current_table_mut(&mut self) -> &mut SymbolTable {
        match &self.current_sub {
            Some(name) => self.subs.get_mut(name).unwrap(),
            None => &mut self.global,
        }
    }

    fn evaluator(&self) -> Evaluator {
        let ev = Evaluator::new(&self.global, self.pc, self.processor);
        match &self.current_sub {
            Some(name) => ev.with_local(self.subs.get(name).unwrap()),
            None => ev,
        }
    }

    fn record_error(&mut self, file: &str, line: u32, macro_name: Option<&str>, macro_line: Option<u32>, err: &AssemblyError) {
        let logged = LoggedError {
            file: file.to_owned(),
            line,
            macro_name: macro_name.map(|s| s.to_owned()),
            macro_line,
            message: err.message.clone(),
            severity: err.severity,
        };
        if !self.errors.contains(&logged) {
            self.errors.push(logged);
        }
    }

    fn has_fatal_errors(&self) -> bool {
        self.errors.iter().any(|e| e.severity == Severity::Error)
    }

    fn lookup_macro(&self, name: &str) -> Option<Macro> {
        if let Some(sub_name) = &self.current_sub {
            if let Some(m) = self.subs.get(sub_name).unwrap().macros.get(name) {
                return Some(m.clone());
            }
        }
        self.global.macros.get(name).cloned()
    }

    fn start_segment_if_needed(&mut self) {
        if self.current_segment != Some(self.pc) && !self.code_map.contains_key(&self.pc) {
            self.code_map.entry(self.pc).or_insert_with(Vec::new);
        }
        self.current_segment = Some(self.pc);
    }

    fn emit_bytes(&mut self, bytes: &[u8]) {
        self.start_segment_if_needed();
        let start = self.current_segment.unwrap();
        self.code_map.get_mut(&start).unwrap().extend_from_slice(bytes);
        self.pc = self.pc.wrapping_add(bytes.len() as u16);
    }

    /// Opens a new, empty segment at the current PC without writing into
    /// the old one (used for `ORG`, unpadded `ALIGN`, and reserve ops).
    fn open_new_segment(&mut self) {
        self.code_map.entry(self.pc).or_insert_with(Vec::new);
        self.current_segment = Some(self.pc);
    }

    fn check_overlaps(&mut self) {
        let mut prev_end: Option<u16> = None;
        let mut overlap = false;
        for (&start, bytes) in self.code_map.iter() {
            if bytes.is_empty() {
                continue;
            }
            if let Some(end) = prev_end {
                if start < end {
                    overlap = true;
                }
            }
            prev_end = Some(start.wrapping_add(bytes.len() as u16));
        }
        if overlap {
            self.errors.push(LoggedError {
                file: String::new(),
                line: 0,
                macro_name: None,
                macro_line: None,
                message: "Code segments overlap".to_owned(),
                severity: Severity::Warning,
            });
        }
    }

    fn run(&mut self, source_lines: &[String], file_name: &str) {
        let mut dce_used = false;
        loop {
            self.reset_pass_state();
            self.run_one_pass(Pass::One, source_lines, file_name);
            if self.has_fatal_errors() {
                return;
            }

            self.reset_pass_state();
            self.run_one_pass(Pass::Two, source_lines, file_name);
            if self.has_fatal_errors() {
                return;
            }

            self.reset_pass_state();
            self.code_map.clear();
            self.current_segment = None;
            self.entry_point = None;
            self.run_one_pass(Pass::Three, source_lines, file_name);

            if self.entry_point.is_none() {
                self.errors.push(LoggedError {
                    file: String::new(),
                    line: 0,
                    macro_name: None,
                    macro_line: None,
                    message: "END did not specify an entry point".to_owned(),
                    severity: Severity::Warning,
                });
            }
            self.check_overlaps();

            if self.has_fatal_errors() || dce_used {
                return;
            }

            let newly_dead: Vec<String> = self
                .sub_order
                .iter()
                .filter(|name| {
                    !self.unreferenced_subs.contains(*name)
                        && !self.subs.get(*name).unwrap().is_static
                        && self
                            .global
                            .symbols
                            .get(*name)
                            .map_or(false, |s| s.ref_count.get() == 0)
                })
                .cloned()
                .collect();

            if newly_dead.is_empty() {
                return;
            }

            for name in &newly_dead {
                self.unreferenced_subs.insert(name.clone());
                self.optimized_out_bytes += self.subs.get(name).unwrap().code_size as u32;
            }

            self.global.clear_non_hidden();
            self.subs.clear();
            self.sub_order.clear();
            self.listing.reset();
            dce_used = true;
        }
    }

    fn reset_pass_state(&mut self) {
        self.pc = 0;
        self.processor = self.options.initial_processor;
        self.current_sub = None;
        self.current_segment = None;
        self.in_auto_aligned_sub = false;
        self.stop = false;
    }

    fn run_one_pass(&mut self, pass: Pass, source_lines: &[String], file_name: &str) {
        let mut reader = LineReader::new(source_lines, file_name);
        while let Some(rec) = reader.next_record() {
            if self.stop {
                break;
            }
            self.process_record(pass, rec, &mut reader);
        }
    }

    fn process_record(&mut self, pass: Pass, rec: LineRecord, reader: &mut LineReader) {
        let stripped = line_parser::strip_comment(&rec.text);

        if let Some(directive) = parse_directive(stripped) {
            match directive {
                Directive::Processor(designation) => {
                    if pass == Pass::Three {
                        match opcodes::parse_cpu_variant(&designation) {
                            Some(v) => self.processor = v,
                            None => self.report(pass, &rec, &AssemblyError::error("Unrecognised processor designation")),
                        }
                    }
                }
                Directive::List(on) => {
                    if pass == Pass::Three {
                        self.list_enabled = on;
                    }
                }
                Directive::Symbols(on) => {
                    if pass == Pass::Three {
                        self.symbols_enabled = on;
                    }
                }
                Directive::Unknown(keyword) => {
                    if pass == Pass::One {
                        self.report(pass, &rec, &AssemblyError::error(format!("Unknown directive '#{}'", keyword)));
                    }
                }
            }
            return;
        }

        let parsed = match line_parser::parse_line(stripped) {
            Ok(p) => p,
            Err(err) => {
                self.report(pass, &rec, &err);
                return;
            }
        };

        if let Err(err) = self.dispatch(pass, &parsed, reader, &rec) {
            let skip_to = err.skip_to;
            self.report(pass, &rec, &err);
            if let Some(target) = skip_to {
                self.skip_to_closer(reader, target);
            }
        }

        if pass == Pass::Three && self.list_enabled {
            self.listing.push(ListingEvent {
                file: rec.file.clone(),
                file_line: rec.line,
                stream_name: rec.macro_name.clone().unwrap_or_else(|| rec.file.clone()),
                stream_line: rec.macro_line.unwrap_or(rec.line),
                text: rec.text.clone(),
                in_macro: rec.macro_name.is_some(),
                pc: None,
                bytes: None,
            });
        }
    }

    fn report(&mut self, _pass: Pass, rec: &LineRecord, err: &AssemblyError) {
        self.record_error(&rec.file, rec.line, rec.macro_name.as_deref(), rec.macro_line, err);
    }

    fn skip_to_closer(&mut self, reader: &mut LineReader, target: PseudoOp) {
        let target_name = match target {
            PseudoOp::EndSub => "ENDSUB",
            PseudoOp::EndMacro => "ENDMACRO",
            _ => return,
        };
        while let Some(rec) = reader.next_record() {
            let stripped = line_parser::strip_comment(&rec.text);
            if let Ok(parsed) = line_parser::parse_line(stripped) {
                if let Some(mnemonic) = &parsed.mnemonic {
                    let upper = mnemonic.to_ascii_uppercase();
                    if upper == target_name || (target_name == "ENDMACRO" && upper == "ENDM") {
                        return;
                    }
                }
            }
        }
    }

    fn dispatch(&mut self, pass: Pass, parsed: &ParsedLine, reader: &mut LineReader, rec: &LineRecord) -> Result<()> {
        let mnemonic = match &parsed.mnemonic {
            None => {
                if let Some(label) = &parsed.label {
                    self.bind_label(pass, label)?;
                }
                return Ok(());
            }
            Some(m) => m.clone(),
        };

        match opcodes::lookup(&mnemonic) {
            Some(Mnemonic::Pseudo(op)) => self.dispatch_pseudo(pass, op, parsed, reader, rec),
            Some(Mnemonic::Instruction(spec)) => {
                if let Some(label) = &parsed.label {
                    self.bind_label(pass, label)?;
                }
                if spec.min_cpu > self.processor {
                    return Err(AssemblyError::error(format!(
                        "'{}' requires a newer processor than currently selected",
                        mnemonic
                    )));
                }
                let len = spec.form.byte_len();
                match pass {
                    Pass::One => {
                        self.current_table_mut().code_size += len;
                    }
                    Pass::Two => {
                        self.pc = self.pc.wrapping_add(len);
                    }
                    Pass::Three => {
                        let operands = line_parser::split_operands(&parsed.operands);
                        let evaluator = self.evaluator();
                        let bytes = encoder::encode_instruction(&mnemonic, spec, &operands, self.pc, &evaluator)?;
                        self.emit_bytes(&bytes);
                    }
                }
                Ok(())
            }
            None => {
                if let Some(label) = &parsed.label {
                    self.bind_label(pass, label)?;
                }
                self.dispatch_macro_call(&mnemonic, &parsed.operands, reader)
            }
        }
    }

    fn bind_label(&mut self, pass: Pass, label: &str) -> Result<()> {
        match pass {
            Pass::Two => {
                if let Some(existing) = self.current_table().symbols.get(label) {
                    if existing.is_defined() {
                        return Err(AssemblyError::error(format!("Label '{}' is already defined", label)));
                    }
                }
                let pc = self.pc;
                self.current_table_mut().bind(label, pc);
            }
            Pass::One | Pass::Three => {}
        }
        Ok(())
    }

    fn dispatch_macro_call(&mut self, mnemonic: &str, operands: &str, reader: &mut LineReader) -> Result<()> {
        let macro_def = self
            .lookup_macro(mnemonic)
            .ok_or_else(|| AssemblyError::error(format!("Unrecognised mnemonic or macro '{}'", mnemonic)))?;
        let args = line_parser::split_operands(operands);
        let expanded = macro_def.expand(&args)?;
        reader.push_macro(mnemonic.to_owned(), expanded);
        Ok(())
    }

    fn dispatch_pseudo(&mut self, pass: Pass, op: PseudoOp, parsed: &ParsedLine, reader: &mut LineReader, rec: &LineRecord) -> Result<()> {
        match op {
            PseudoOp::Equ => self.handle_equ(pass, parsed),
            PseudoOp::Org => self.handle_org(pass, parsed),
            PseudoOp::Sub => self.handle_sub(pass, parsed, reader),
            PseudoOp::EndSub => self.handle_endsub(pass, parsed),
            PseudoOp::Align => self.handle_align(pass, parsed),
            PseudoOp::Db => self.handle_db(pass, parsed),
            PseudoOp::Dw => self.handle_wide(pass, parsed, 2),
            PseudoOp::Dl => self.handle_wide(pass, parsed, 4),
            PseudoOp::Dq => self.handle_wide(pass, parsed, 8),
            PseudoOp::Rb => self.handle_reserve(pass, parsed, 1),
            PseudoOp::Rw => self.handle_reserve(pass, parsed, 2),
            PseudoOp::Rl => self.handle_reserve(pass, parsed, 4),
            PseudoOp::Rq => self.handle_reserve(pass, parsed, 8),
            PseudoOp::Processor => self.handle_processor(pass, parsed),
            PseudoOp::Assert => self.handle_assert(pass, parsed),
            PseudoOp::Macro => self.handle_macro_def(pass, parsed, reader, rec),
            PseudoOp::EndMacro => Err(AssemblyError::error("ENDMACRO without matching MACRO")),
            PseudoOp::End => {
                self.handle_end(pass, parsed)?;
                self.stop = true;
                Ok(())
            }
        }
    }

    fn handle_equ(&mut self, pass: Pass, parsed: &ParsedLine) -> Result<()> {
        let label = parsed
            .label
            .clone()
            .ok_or_else(|| AssemblyError::error("EQU requires a label"))?;
        if pass != Pass::Two {
            return Ok(());
        }
        let value = self.evaluator().evaluate(&parsed.operands)?;
        self.current_table_mut().bind(&label, value as u16);
        Ok(())
    }

    fn handle_org(&mut self, pass: Pass, parsed: &ParsedLine) -> Result<()> {
        if self.current_sub.is_some() {
            return Err(AssemblyError::error("ORG is not allowed inside a SUB"));
        }
        match pass {
            Pass::Two => {
                let value = self.evaluator().evaluate(&parsed.operands)?;
                if !(0..=0xFFFF).contains(&value) {
                    return Err(AssemblyError::error("ORG address out of range"));
                }
                self.pc = value as u16;
                if let Some(label) = &parsed.label {
                    self.bind_label(pass, label)?;
                }
            }
            Pass::Three => {
                let value = self.evaluator().evaluate(&parsed.operands)?;
                self.pc = value as u16;
                self.open_new_segment();
            }
            Pass::One => {}
        }
        Ok(())
    }

    fn handle_sub(&mut self, pass: Pass, parsed: &ParsedLine, reader: &mut LineReader) -> Result<()> {
        if self.current_sub.is_some() {
            return Err(AssemblyError::error("Nested SUB is not allowed").skip_to(PseudoOp::EndSub));
        }
        let label = parsed
            .label
            .clone()
            .or_else(|| {
                line_parser::split_operands(&parsed.operands)
                    .first()
                    .cloned()
            });
        let label = label.ok_or_else(|| AssemblyError::error("SUB requires a label"))?;
        let fields = line_parser::split_operands(&parsed.operands);
        // first operand is the subroutine label unless carried via the
        // line's own label slot (both spellings are tolerated).
        let option_fields: Vec<String> = if parsed.label.is_some() {
            fields
        } else {
            fields.into_iter().skip(1).collect()
        };
        let options: Vec<String> = option_fields
            .iter()
            .flat_map(|f| line_parser::split_fields(f, ';'))
            .collect();

        match pass {
            Pass::One => {
                if self.subs.contains_key(&label) {
                    return Err(
                        AssemblyError::error(format!("Subroutine '{}' is already defined", label))
                            .skip_to(PseudoOp::EndSub),
                    );
                }
                self.global.declare(&label);
                self.subs.insert(label.clone(), SymbolTable::subroutine(label.clone()));
                self.sub_order.push(label.clone());
                self.current_sub = Some(label);
                self.apply_sub_options_sizing(&options)?;
                Ok(())
            }
            Pass::Two => {
                if self.unreferenced_subs.contains(&label) {
                    self.skip_subroutine_body(reader);
                    return Ok(());
                }
                self.current_sub = Some(label.clone());
                self.apply_sub_options_layout(&options, false)?;
                self.global.bind(&label, self.pc);
                Ok(())
            }
            Pass::Three => {
                if self.unreferenced_subs.contains(&label) {
                    self.skip_subroutine_body(reader);
                    return Ok(());
                }
                self.current_sub = Some(label);
                self.apply_sub_options_layout(&options, true)?;
                Ok(())
            }
        }
    }

    fn apply_sub_options_sizing(&mut self, options: &[String]) -> Result<()> {
        for opt in options {
            if opt.eq_ignore_ascii_case("STATIC") {
                self.current_table_mut().is_static = true;
            }
        }
        Ok(())
    }

    fn apply_sub_options_layout(&mut self, options: &[String], emit: bool) -> Result<()> {
        let mut align_value: Option<u16> = None;
        let mut auto_align = false;
        let mut static_sub = false;
        let mut pad: Option<u8> = None;

        for opt in options {
            let (key, value) = match opt.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (opt.trim(), None),
            };
            match key.to_ascii_uppercase().as_str() {
                "ALIGN" => match value {
                    None => {
                        let size = self.current_table().code_size;
                        align_value = Some(align::align_from_size(size));
                    }
                    Some(v) if v.eq_ignore_ascii_case("AUTO") => auto_align = true,
                    Some(v) => {
                        align_value = Some(match align::align_from_keyword(v) {
                            Some(n) => n,
                            None => self.evaluator().evaluate(v)? as u16,
                        });
                    }
                },
                "STATIC" => static_sub = true,
                "PAD" => {
                    pad = Some(match value {
                        Some(v) => self.evaluator().evaluate(v)? as u8,
                        None => 0,
                    });
                }
                _ => return Err(AssemblyError::error(format!("Unrecognised SUB option '{}'", key))),
            }
        }

        if static_sub {
            self.current_table_mut().is_static = true;
        }

        if auto_align {
            self.in_auto_aligned_sub = true;
            let size = self.current_table().code_size;
            let would_cross = (self.pc / 256) != ((self.pc + size.saturating_sub(1)) / 256);
            if would_cross {
                let extra = align::extra_bytes(self.pc, 256);
                self.advance_or_pad(extra, pad, emit);
            }
        } else if let Some(a) = align_value {
            let extra = align::extra_bytes(self.pc, a);
            self.advance_or_pad(extra, pad, emit);
        }

        Ok(())
    }

    fn advance_or_pad(&mut self, extra: u16, pad: Option<u8>, emit: bool) {
        if emit {
            match pad {
                Some(byte) => self.emit_bytes(&vec![byte; extra as usize]),
                None => {
                    self.pc = self.pc.wrapping_add(extra);
                    self.open_new_segment();
                }
            }
        } else {
            self.pc = self.pc.wrapping_add(extra);
        }
    }

    fn skip_subroutine_body(&mut self, reader: &mut LineReader) {
        self.skip_to_closer(reader, PseudoOp::EndSub);
    }

    fn handle_endsub(&mut self, pass: Pass, parsed: &ParsedLine) -> Result<()> {
        let sub_name = self
            .current_sub
            .clone()
            .ok_or_else(|| AssemblyError::error("ENDSUB without matching SUB"))?;

        if pass == Pass::Two && !parsed.operands.trim().is_empty() {
            let entry = self.evaluator().evaluate(&parsed.operands)?;
            self.global.bind(&sub_name, entry as u16);
        }

        self.current_sub = None;
        self.in_auto_aligned_sub = false;
        Ok(())
    }

    fn handle_align(&mut self, pass: Pass, parsed: &ParsedLine) -> Result<()> {
        if self.in_auto_aligned_sub {
            return Err(AssemblyError::error("ALIGN is not allowed inside an ALIGN=AUTO subroutine"));
        }
        let fields = line_parser::split_operands(&parsed.operands);
        let expr = fields.first().cloned().unwrap_or_default();
        let mut pad: Option<u8> = None;
        for field in fields.iter().skip(1) {
            if let Some((key, value)) = field.split_once('=') {
                if key.trim().eq_ignore_ascii_case("PAD") {
                    pad = Some(self.evaluator().evaluate(value.trim())? as u8);
                }
            }
        }

        match pass {
            Pass::Two => {
                let align_value = match align::align_from_keyword(&expr) {
                    Some(n) => n,
                    None => self.evaluator().evaluate(&expr)? as u16,
                };
                let extra = align::extra_bytes(self.pc, align_value);
                self.advance_or_pad(extra, pad, false);
                if let Some(label) = &parsed.label {
                    self.bind_label(pass, label)?;
                }
                Ok(())
            }
            Pass::Three => {
                let align_value = match align::align_from_keyword(&expr) {
                    Some(n) => n,
                    None => self.evaluator().evaluate(&expr)? as u16,
                };
                let extra = align::extra_bytes(self.pc, align_value);
                self.advance_or_pad(extra, pad, true);
                Ok(())
            }
            Pass::One => Ok(()),
        }
    }

    fn handle_db(&mut self, pass: Pass, parsed: &ParsedLine) -> Result<()> {
        let fields = line_parser::split_operands(&parsed.operands);
        match pass {
            Pass::One => {
                let mut total = 0u16;
                for f in &fields {
                    total += encoder::db_element_size(f)?;
                }
                self.current_table_mut().code_size += total;
                Ok(())
            }
            Pass::Two => {
                let mut total = 0u16;
                for f in &fields {
                    total += encoder::db_element_size(f)?;
                }
                if let Some(label) = &parsed.label {
                    self.bind_label(pass, label)?;
                }
                self.pc = self.pc.wrapping_add(total);
                Ok(())
            }
            Pass::Three => {
                if let Some(label) = &parsed.label {
                    self.bind_label(pass, label)?;
                }
                let evaluator = self.evaluator();
                let mut bytes = Vec::new();
                for f in &fields {
                    bytes.extend(encoder::db_element_bytes(f, &evaluator)?);
                }
                self.emit_bytes(&bytes);
                Ok(())
            }
        }
    }

    fn handle_wide(&mut self, pass: Pass, parsed: &ParsedLine, width: u16) -> Result<()> {
        let fields = line_parser::split_operands(&parsed.operands);
        let total = fields.len() as u16 * width;
        match pass {
            Pass::One => {
                self.current_table_mut().code_size += total;
                Ok(())
            }
            Pass::Two => {
                if let Some(label) = &parsed.label {
                    self.bind_label(pass, label)?;
                }
                self.pc = self.pc.wrapping_add(total);
                Ok(())
            }
            Pass::Three => {
                if let Some(label) = &parsed.label {
                    self.bind_label(pass, label)?;
                }
                let evaluator = self.evaluator();
                let mut bytes = Vec::new();
                for f in &fields {
                    bytes.extend(encoder::wide_element_bytes(f, &evaluator, width as usize)?);
                }
                self.emit_bytes(&bytes);
                Ok(())
            }
        }
    }

    fn handle_reserve(&mut self, pass: Pass, parsed: &ParsedLine, width: u16) -> Result<()> {
        match pass {
            Pass::One => {
                let count = self.evaluator().evaluate(&parsed.operands)? as u16;
                self.current_table_mut().code_size += count * width;
                Ok(())
            }
            Pass::Two => {
                let count = self.evaluator().evaluate(&parsed.operands)? as u16;
                if let Some(label) = &parsed.label {
                    self.bind_label(pass, label)?;
                }
                self.pc = self.pc.wrapping_add(count * width);
                Ok(())
            }
            Pass::Three => {
                let count = self.evaluator().evaluate(&parsed.operands)? as u16;
                if let Some(label) = &parsed.label {
                    self.bind_label(pass, label)?;
                }
                self.pc = self.pc.wrapping_add(count * width);
                self.open_new_segment();
                Ok(())
            }
        }
    }

    fn handle_processor(&mut self, pass: Pass, parsed: &ParsedLine) -> Result<()> {
        if pass != Pass::Three {
            return Ok(());
        }
        let designation = parsed.operands.trim().trim_matches('"');
        let variant = opcodes::parse_cpu_variant(designation)
            .ok_or_else(|| AssemblyError::error("Unrecognised processor designation"))?;
        self.processor = variant;
        Ok(())
    }

    fn handle_assert(&mut self, pass: Pass, parsed: &ParsedLine) -> Result<()> {
        if pass != Pass::Three {
            return Ok(());
        }
        let fields = line_parser::split_operands(&parsed.operands);
        let expr = fields.first().cloned().unwrap_or_default();
        let message = fields.get(1).cloned();
        let value = self.evaluator().evaluate(&expr)?;
        if value == 0 {
            let text = message.unwrap_or_else(|| "Assertion failed".to_owned());
            return Err(AssemblyError::error(text.trim_matches('"').to_owned()));
        }
        Ok(())
    }

    fn handle_macro_def(&mut self, pass: Pass, parsed: &ParsedLine, reader: &mut LineReader, rec: &LineRecord) -> Result<()> {
        if pass != Pass::One {
            // macro bodies are only captured once; later passes skip the
            // definition entirely (the macro table already holds it).
            self.skip_to_closer(reader, PseudoOp::EndMacro);
            return Ok(());
        }

        let name = parsed
            .label
            .clone()
            .ok_or_else(|| AssemblyError::error("MACRO requires a name"))?;

        if opcodes::lookup(&name).is_some() {
            return Err(AssemblyError::error(format!(
                "Cannot use reserved word '{}' as a Macro name",
                name
            )));
        }
        if self.current_table().macros.contains_key(&name) {
            return Err(AssemblyError::error(format!("Macro '{}' is already defined", name)));
        }

        let parameters: Vec<String> = line_parser::split_operands(&parsed.operands)
            .into_iter()
            .map(|p| p.to_ascii_uppercase())
            .collect();
        for p in &parameters {
            if !crate::macros::is_valid_parameter_name(p) {
                return Err(AssemblyError::error(format!("Invalid macro parameter name '{}'", p)));
            }
            if opcodes::lookup(p).is_some() {
                return Err(AssemblyError::error(format!(
                    "Macro parameter '{}' collides with a mnemonic",
                    p
                )));
            }
        }
        let mut seen_params = std::collections::HashSet::new();
        for p in &parameters {
            if !seen_params.insert(p) {
                return Err(AssemblyError::error("Macro arguments must be unique"));
            }
        }

        let mut body = Vec::new();
        let definition_file = rec.file.clone();
        loop {
            let line = reader
                .next_record()
                .ok_or_else(|| AssemblyError::error("MACRO without matching ENDMACRO"))?;
            if line.file != definition_file {
                return Err(AssemblyError::error("MACRO definition must not span source files"));
            }
            let stripped = line_parser::strip_comment(&line.text);
            let body_parsed = line_parser::parse_line(stripped)?;
            if let Some(mnemonic) = &body_parsed.mnemonic {
                let upper = mnemonic.to_ascii_uppercase();
                if upper == "ENDMACRO" || upper == "ENDM" {
                    break;
                }
            }
            if body_parsed.label.is_some() {
                return Err(AssemblyError::error("Labels are not allowed inside a macro body"));
            }
            body.push(line.text);
        }

        self.current_table_mut()
            .register_macro(name, Macro::new(parameters, body));
        Ok(())
    }

    fn handle_end(&mut self, pass: Pass, parsed: &ParsedLine) -> Result<()> {
        if pass != Pass::Three {
            return Ok(());
        }
        if !parsed.operands.trim().is_empty() {
            let evaluator = Evaluator::new(&self.global, self.pc, self.processor);
            let value = evaluator.evaluate(&parsed.operands)?;
            self.entry_point = Some(value as u16);
        }
        Ok(())
    }
}

pub fn assemble(source: &str, file_name: &str, options: AssembleOptions) -> AssembleOutcome {
    let lines: Vec<String> = source.lines().map(|s| s.to_owned()).collect();
    let mut driver = Driver::new(options);
    driver.run(&lines, file_name);

    AssembleOutcome {
        code_map: driver.code_map,
        entry_point: driver.entry_point,
        global: driver.global,
        subroutines: driver.subs,
        listing: driver.listing.into_events(),
        success: driver.errors.iter().all(|e| e.severity != Severity::Error),
        errors: driver.errors,
        optimized_out_bytes: driver.optimized_out_bytes,
    }
}
