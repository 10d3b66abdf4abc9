#[macro_use]
extern crate clap;

use clap::Arg;
use engine::{assemble, parse_cpu_variant, AssembleOptions, ListingEvent, LoggedError, Severity, SymbolTable};
use objfile::OutputFormat;
use std::fs::File;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Debug)]
enum IOErrorContext {
    ReadInput,
    WriteOutput,
    WriteListing,
}

#[derive(Debug)]
enum Error {
    Io(std::io::Error, IOErrorContext, PathBuf),
    UnknownProcessor(String),
    UnknownFormat(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(err, context, path) => write!(
                f,
                "{} file \"{}\" failed: {}",
                match context {
                    IOErrorContext::ReadInput => "Reading input",
                    IOErrorContext::WriteOutput => "Writing output",
                    IOErrorContext::WriteListing => "Writing listing",
                },
                path.display(),
                err
            ),
            Error::UnknownProcessor(name) => write!(f, "Unknown processor variant \"{}\"", name),
            Error::UnknownFormat(name) => write!(f, "Unknown output format \"{}\"", name),
        }
    }
}

fn main() {
    let matches = app_from_crate!()
        .arg(
            Arg::with_name("INPUT")
                .help("Sets the assembly source file to use")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("processor")
                .short("p")
                .long("processor")
                .takes_value(true)
                .value_name("VARIANT")
                .default_value("1802")
                .help("Sets the initial processor variant (1802, 1806, 1806A)"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .value_name("OUTPUT")
                .help("Sets the object file to write to"),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .takes_value(true)
                .value_name("FORMAT")
                .default_value("hex")
                .possible_values(&["hex", "idiot4", "elfos", "bin", "none"])
                .help("Sets the object file format"),
        )
        .arg(
            Arg::with_name("listing")
                .short("l")
                .long("listing")
                .takes_value(true)
                .value_name("LISTING")
                .help("Writes an assembly listing to this file"),
        )
        .arg(
            Arg::with_name("symbols")
                .short("s")
                .long("symbols")
                .help("Dumps the final global symbol table to stdout"),
        )
        .arg(
            Arg::with_name("no-registers")
                .long("no-registers")
                .help("Disables the pre-pass R0..R15 register binding"),
        )
        .arg(
            Arg::with_name("no-ports")
                .long("no-ports")
                .help("Disables the pre-pass P1..P7 port binding"),
        )
        .get_matches();

    let input = matches.value_of("INPUT").unwrap();
    let processor = matches.value_of("processor").unwrap();
    let format = matches.value_of("format").unwrap();
    let output = matches.value_of("output");
    let listing = matches.value_of("listing");
    let dump_symbols = matches.is_present("symbols");
    let bind_registers = !matches.is_present("no-registers");
    let bind_ports = !matches.is_present("no-ports");

    match run(
        input,
        processor,
        format,
        output,
        listing,
        dump_symbols,
        bind_registers,
        bind_ports,
    ) {
        Ok(success) => process::exit(if success { 0 } else { 1 }),
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    }
}

fn run(
    input: &str,
    processor: &str,
    format: &str,
    output: Option<&str>,
    listing: Option<&str>,
    dump_symbols: bool,
    bind_registers: bool,
    bind_ports: bool,
) -> Result<bool, Error> {
    let initial_processor =
        parse_cpu_variant(processor).ok_or_else(|| Error::UnknownProcessor(processor.to_owned()))?;
    let output_format =
        OutputFormat::parse(format).ok_or_else(|| Error::UnknownFormat(format.to_owned()))?;

    let input_path = Path::new(input);
    let source = read_input(input_path)?;

    let options = AssembleOptions {
        initial_processor,
        bind_registers,
        bind_ports,
    };
    let outcome = assemble(&source, input, options);

    for err in &outcome.errors {
        print_logged_error(err);
    }

    let output_path: PathBuf = output
        .map(PathBuf::from)
        .unwrap_or_else(|| input_path.with_extension(default_extension(output_format)));
    objfile::write_to_file(&output_path, output_format, &outcome.code_map, outcome.entry_point)
        .map_err(|err| Error::Io(err, IOErrorContext::WriteOutput, output_path))?;

    if let Some(listing_path) = listing {
        let listing_path = PathBuf::from(listing_path);
        write_listing(&listing_path, &outcome.listing)
            .map_err(|err| Error::Io(err, IOErrorContext::WriteListing, listing_path))?;
    }

    if dump_symbols {
        print_symbols(&outcome.global);
    }

    let error_count = outcome
        .errors
        .iter()
        .filter(|e| e.severity == Severity::Error)
        .count();
    println!(
        "{} error(s), {} warning(s), {} byte(s) dead-code eliminated",
        error_count,
        outcome.errors.len() - error_count,
        outcome.optimized_out_bytes
    );

    Ok(outcome.success)
}

fn default_extension(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::IntelHex => "hex",
        OutputFormat::Idiot4 => "i4",
        OutputFormat::ElfOs => "elf",
        OutputFormat::Binary => "bin",
        OutputFormat::None => "out",
    }
}

fn read_input(path: &Path) -> Result<String, Error> {
    let file = File::open(path)
        .map_err(|err| Error::Io(err, IOErrorContext::ReadInput, path.to_owned()))?;
    let mut reader = BufReader::new(file);
    let mut source = String::new();
    reader
        .read_to_string(&mut source)
        .map_err(|err| Error::Io(err, IOErrorContext::ReadInput, path.to_owned()))?;
    Ok(source)
}

fn print_logged_error(err: &LoggedError) {
    let severity = match err.severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
    };
    match (&err.macro_name, err.macro_line) {
        (Some(name), Some(macro_line)) => eprintln!(
            "{}:{}: {} (in macro {} line {}): {}",
            err.file, err.line, severity, name, macro_line, err.message
        ),
        _ => eprintln!("{}:{}: {}: {}", err.file, err.line, severity, err.message),
    }
}

fn write_listing(path: &Path, events: &[ListingEvent]) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for event in events {
        let pc = event
            .pc
            .map(|p| format!("{:04X}", p))
            .unwrap_or_else(|| "    ".to_owned());
        let bytes = event
            .bytes
            .as_ref()
            .map(|b| {
                b.iter()
                    .map(|byte| format!("{:02X}", byte))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();
        writeln!(
            out,
            "{:<4} {:<24} {}:{:<5} {}",
            pc, bytes, event.stream_name, event.stream_line, event.text
        )?;
    }
    Ok(())
}

fn print_symbols(global: &SymbolTable) {
    let mut names: Vec<&String> = global.symbols.keys().collect();
    names.sort();
    for name in names {
        let symbol = &global.symbols[name];
        if symbol.hide_from_listing {
            continue;
        }
        match symbol.value {
            Some(value) => println!("{:<24} {:04X}", name, value),
            None => println!("{:<24} <undefined>", name),
        }
    }
}
