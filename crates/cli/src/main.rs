//! # CLI - StrataKV Interactive Shell
//!
//! A REPL-style command-line interface for the StrataKV storage engine.
//! Reads commands from stdin, executes them against the engine, and prints
//! results to stdout. Designed for both interactive use and scripted testing
//! (pipe commands via stdin). Logs go to stderr.
//!
//! ## Commands
//!
//! ```text
//! PUT key value                        Insert or update a key
//! GET key                              Look up a key (prints value or "(nil)")
//! DELETE key                           Delete a key (writes a tombstone)
//! RANGE min max page_len page_num      One page of live keys in [min, max]
//! LIST prefix page_len page_num        One page of live keys with a prefix
//! COMPACT                              Run the configured compaction policy
//! FLUSH                                Force the memtable into level 1
//! VERIFY                               Check every table's Merkle root
//! WAL                                  Dump every WAL record
//! STATS                                Print engine debug info
//! EXIT / QUIT                          Shut down
//! ```
//!
//! A write or compaction refused by the admission gate prints `DENIED`.
//!
//! ## Configuration
//!
//! `STRATA_*` environment variables, see the `config` crate. `RUST_LOG`
//! controls log output (default `warn`).
//!
//! ## Example
//!
//! ```text
//! $ STRATA_DATA_DIR=/tmp/strata cargo run -p cli
//! StrataKV started (data_dir=/tmp/strata, memtable=BTree, compaction=SizeTiered)
//! > PUT name Alice
//! OK
//! > GET name
//! Alice
//! > LIST na 10 1
//! name -> Alice
//! (1 entries)
//! > EXIT
//! bye
//! ```
use anyhow::{Context, Result};
use config::Config;
use engine::{Engine, Page};
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let config = Config::from_env();
    let banner = format!(
        "StrataKV started (data_dir={}, memtable={:?}, compaction={:?})",
        config.data_dir.display(),
        config.memtable_kind,
        config.compaction
    );
    let mut engine = Engine::open(config).context("failed to open store")?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{banner}")?;
    writeln!(out, "Commands: PUT key value | GET key | DELETE key")?;
    writeln!(out, "          RANGE min max page_len page_num | LIST prefix page_len page_num")?;
    writeln!(out, "          COMPACT | FLUSH | VERIFY | WAL | STATS | EXIT")?;
    run(&mut engine, stdin.lock(), &mut out)
}

/// Feeds every line of `input` to the engine until EOF or `EXIT`.
fn run<R: BufRead, W: Write>(engine: &mut Engine, input: R, out: &mut W) -> Result<()> {
    write!(out, "> ")?;
    out.flush()?;

    for line in input.lines() {
        let line = line?;
        match execute(engine, &line, out) {
            Ok(Flow::Exit) => {
                writeln!(out, "bye")?;
                return Ok(());
            }
            Ok(Flow::Continue) => {}
            Err(e) => writeln!(out, "ERR {e:#}")?,
        }
        write!(out, "> ")?;
        out.flush()?;
    }
    Ok(())
}

enum Flow {
    Continue,
    Exit,
}

/// Runs one command line. Errors are reported by the caller and do not end
/// the session.
fn execute<W: Write>(engine: &mut Engine, line: &str, out: &mut W) -> Result<Flow> {
    let mut parts = line.split_whitespace();
    let Some(cmd) = parts.next() else {
        return Ok(Flow::Continue);
    };
    let args: Vec<&str> = parts.collect();

    match cmd.to_uppercase().as_str() {
        "PUT" => {
            let [key, value @ ..] = args.as_slice() else {
                return usage(out, "PUT key value");
            };
            if value.is_empty() {
                return usage(out, "PUT key value");
            }
            let admitted = engine.put(key, value.join(" "))?;
            writeln!(out, "{}", if admitted { "OK" } else { "DENIED" })?;
        }
        "GET" => {
            let [key] = args.as_slice() else {
                return usage(out, "GET key");
            };
            match engine.get(key)? {
                Some(record) => writeln!(out, "{}", String::from_utf8_lossy(&record.value))?,
                None => writeln!(out, "(nil)")?,
            }
        }
        "DELETE" | "DEL" => {
            let [key] = args.as_slice() else {
                return usage(out, "DELETE key");
            };
            let admitted = engine.delete(key)?;
            writeln!(out, "{}", if admitted { "OK" } else { "DENIED" })?;
        }
        "RANGE" => {
            let [min, max, page_len, page_num] = args.as_slice() else {
                return usage(out, "RANGE min max page_len page_num");
            };
            let page = engine.range_scan(min, max, parse_arg(page_len)?, parse_arg(page_num)?)?;
            print_page(out, page)?;
        }
        "LIST" => {
            let [prefix, page_len, page_num] = args.as_slice() else {
                return usage(out, "LIST prefix page_len page_num");
            };
            let page = engine.list_scan(prefix, parse_arg(page_len)?, parse_arg(page_num)?)?;
            print_page(out, page)?;
        }
        "COMPACT" => {
            if engine.compact()? {
                writeln!(out, "OK (levels={:?})", engine.level_sizes())?;
            } else {
                writeln!(out, "DENIED")?;
            }
        }
        "FLUSH" => {
            if engine.force_flush()? {
                writeln!(out, "OK (levels={:?})", engine.level_sizes())?;
            } else {
                writeln!(out, "OK (memtable empty)")?;
            }
        }
        "VERIFY" => {
            let failed = engine.verify_tables()?;
            if failed.is_empty() {
                writeln!(out, "OK ({} tables)", engine.levels().table_count())?;
            } else {
                for (level, index) in &failed {
                    writeln!(out, "CORRUPT level{level}/sstable{index}")?;
                }
                writeln!(out, "({} corrupt tables)", failed.len())?;
            }
        }
        "WAL" => {
            let entries = engine.wal_entries()?;
            for entry in &entries {
                if entry.record.tombstone {
                    writeln!(out, "{} {} (deleted)", entry.record.timestamp, entry.key)?;
                } else {
                    writeln!(
                        out,
                        "{} {} -> {}",
                        entry.record.timestamp,
                        entry.key,
                        String::from_utf8_lossy(&entry.record.value)
                    )?;
                }
            }
            writeln!(out, "({} records)", entries.len())?;
        }
        "STATS" => writeln!(out, "{engine:?}")?,
        "EXIT" | "QUIT" => return Ok(Flow::Exit),
        other => writeln!(out, "unknown command: {other}")?,
    }
    Ok(Flow::Continue)
}

fn usage<W: Write>(out: &mut W, text: &str) -> Result<Flow> {
    writeln!(out, "ERR usage: {text}")?;
    Ok(Flow::Continue)
}

fn parse_arg(arg: &str) -> Result<usize> {
    arg.parse()
        .with_context(|| format!("expected a page number, got {arg:?}"))
}

fn print_page<W: Write>(out: &mut W, page: Option<Page>) -> Result<()> {
    let Some((keys, records)) = page else {
        writeln!(out, "(empty)")?;
        return Ok(());
    };
    for (key, record) in keys.iter().zip(&records) {
        writeln!(out, "{key} -> {}", String::from_utf8_lossy(&record.value))?;
    }
    writeln!(out, "({} entries)", keys.len())?;
    Ok(())
}
