// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Prints the header and records of one journal file.
//!
//! Usage:
//!   ./dump_journal <file>                # Human-readable output
//!   ./dump_journal <file> --json         # One JSON object per record
//!   ./dump_journal <file> --dangling     # Only unresolved COMMITTING records

use std::path::Path;
use std::process::ExitCode;

use xacoord::journal::{collect_dangling, JournalError, LogAppender, LogRecord};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let json_mode = args.iter().any(|a| a == "--json");
    let dangling_only = args.iter().any(|a| a == "--dangling");
    let Some(path) = args.iter().find(|a| !a.starts_with("--")) else {
        eprintln!("usage: dump_journal <file> [--json] [--dangling]");
        return ExitCode::from(2);
    };

    match dump(Path::new(path), json_mode, dangling_only) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// What one run of the tool shows.
struct Listing {
    appender: LogAppender,
    records: Vec<LogRecord>,
    corrupted: usize,
}

/// Reads `path`. With `dangling_only`, the records are the ones recovery
/// would see: replayed with corrupted records skipped.
fn load(path: &Path, dangling_only: bool) -> Result<Listing, JournalError> {
    let file_length = std::fs::metadata(path)?.len();
    let appender = LogAppender::open(path, file_length)?;

    let mut records = Vec::new();
    let mut corrupted = 0usize;
    let mut cursor = appender.cursor()?;
    loop {
        match cursor.read_record(!dangling_only) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => break,
            Err(e @ JournalError::Corrupted { .. }) => {
                corrupted += 1;
                eprintln!("corrupted: {}", e);
            }
            Err(e) => return Err(e),
        }
    }

    if dangling_only {
        records = collect_dangling(&mut appender.cursor()?, true)?
            .into_values()
            .collect();
    }
    Ok(Listing {
        appender,
        records,
        corrupted,
    })
}

fn dump(path: &Path, json_mode: bool, dangling_only: bool) -> Result<(), JournalError> {
    let listing = load(path, dangling_only)?;

    if !json_mode {
        let header = listing.appender.header();
        println!("file:      {}", path.display());
        println!("format id: {:#010x}", header.format_id());
        println!("timestamp: {}", header.timestamp());
        println!("state:     {}", header.state().as_str());
        println!("position:  {}", header.position());
        println!();
    }

    for record in &listing.records {
        if json_mode {
            print_json(record);
        } else {
            print_human(record);
        }
    }

    if !json_mode {
        println!();
        println!(
            "{} record(s), {} corrupted",
            listing.records.len(),
            listing.corrupted
        );
    }
    Ok(())
}

fn print_human(record: &LogRecord) {
    let names: Vec<&str> = record.unique_names().iter().map(String::as_str).collect();
    println!(
        "{:<15} seq={:<8} time={} gtrid={} crc={} names=[{}]",
        record.status().as_str(),
        record.sequence(),
        record.time(),
        record.gtrid(),
        if record.is_crc32_correct() { "ok" } else { "BAD" },
        names.join(", ")
    );
}

fn print_json(record: &LogRecord) {
    let names: Vec<String> = record
        .unique_names()
        .iter()
        .map(|n| format!("\"{}\"", n.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    println!(
        "{{\"status\": \"{}\", \"sequence\": {}, \"time\": {}, \"gtrid\": \"{}\", \"crc_ok\": {}, \"names\": [{}]}}",
        record.status().as_str(),
        record.sequence(),
        record.time(),
        record.gtrid(),
        record.is_crc32_correct(),
        names.join(", ")
    );
}
