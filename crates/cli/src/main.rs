//! # CLI - HarborKV Sideload Shell
//!
//! A REPL-style inspection and maintenance shell for a replica's sideload
//! directory. Reads commands from stdin, executes them against the disk
//! sideload storage, and prints results to stdout. Designed for both
//! interactive use and scripted testing (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! PUT index term value   Store a payload at (index, term)
//! GET index term         Read a payload (prints value or "(not found)")
//! PURGE index term       Delete one payload
//! TRUNCATE first_index   Delete all payloads with index < first_index
//! CLEAR                  Delete everything including the directory
//! LS                     List stored payload keys and sizes
//! DIR                    Print the storage directory
//! STATS                  Print payload count and total bytes
//! EXIT / QUIT            Shut down
//! ```
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! HARBOR_BASE_DIR    Replica base directory   (default: "data")
//! HARBOR_RANGE_ID    Range id                 (default: 1)
//! HARBOR_REPLICA_ID  Replica id               (default: 1)
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! harborkv sideload shell (range=1, replica=1, dir=data/sideload_1_1)
//! > PUT 5 2 hello
//! OK
//! > GET 5 2
//! hello
//! > TRUNCATE 6
//! freed 5 bytes, retained 0 bytes
//! > EXIT
//! bye
//! ```

use anyhow::Result;
use context::OpContext;
use sideload::{DiskSideloadStorage, SideloadError, SideloadStorage};
use std::io::{self, BufRead, Write};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let base_dir = env_or("HARBOR_BASE_DIR", "data");
    let range_id: u64 = env_or("HARBOR_RANGE_ID", "1").parse().unwrap_or(1);
    let replica_id: u64 = env_or("HARBOR_REPLICA_ID", "1").parse().unwrap_or(1);

    let ctx = OpContext::background();
    let mut storage = DiskSideloadStorage::new(&base_dir, range_id, replica_id);

    println!(
        "harborkv sideload shell (range={}, replica={}, dir={})",
        range_id,
        replica_id,
        storage.dir().display()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match run_command(&ctx, &mut storage, line) {
            Ok(Output::Text(text)) => println!("{text}"),
            Ok(Output::Quit) => {
                println!("bye");
                break;
            }
            Err(e) => println!("ERR {e:#}"),
        }
        stdout.flush()?;
    }

    Ok(())
}

enum Output {
    Text(String),
    Quit,
}

fn parse_key<'a>(
    what: &str,
    parts: &mut impl Iterator<Item = &'a str>,
) -> Result<(u64, u64)> {
    let index: u64 = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("{what}: missing index"))?
        .parse()?;
    let term: u64 = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("{what}: missing term"))?
        .parse()?;
    Ok((index, term))
}

fn run_command(
    ctx: &OpContext,
    storage: &mut DiskSideloadStorage,
    line: &str,
) -> Result<Output> {
    let mut parts = line.splitn(4, char::is_whitespace);
    let cmd = parts.next().unwrap_or("").to_ascii_uppercase();

    let out = match cmd.as_str() {
        "PUT" => {
            let (index, term) = parse_key("PUT", &mut parts)?;
            let value = parts.next().unwrap_or("");
            storage.put(ctx, index, term, value.as_bytes())?;
            Output::Text("OK".to_string())
        }
        "GET" => {
            let (index, term) = parse_key("GET", &mut parts)?;
            match storage.get(ctx, index, term) {
                Ok(value) => Output::Text(String::from_utf8_lossy(&value).to_string()),
                Err(SideloadError::NotFound) => Output::Text("(not found)".to_string()),
                Err(e) => return Err(e.into()),
            }
        }
        "PURGE" => {
            let (index, term) = parse_key("PURGE", &mut parts)?;
            match storage.purge(ctx, index, term) {
                Ok(()) => Output::Text("OK".to_string()),
                Err(SideloadError::NotFound) => Output::Text("(not found)".to_string()),
                Err(e) => return Err(e.into()),
            }
        }
        "TRUNCATE" => {
            let first_index: u64 = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("TRUNCATE: missing first_index"))?
                .parse()?;
            let stats = storage.truncate_to(ctx, first_index)?;
            Output::Text(format!(
                "freed {} bytes, retained {} bytes",
                stats.freed, stats.retained
            ))
        }
        "CLEAR" => {
            storage.clear(ctx)?;
            Output::Text("OK".to_string())
        }
        "LS" => {
            let keys = storage.list(ctx)?;
            let mut lines = Vec::with_capacity(keys.len() + 1);
            for (index, term) in &keys {
                let size = storage.get(ctx, *index, *term).map(|v| v.len()).unwrap_or(0);
                lines.push(format!("i{index}t{term} {size}"));
            }
            lines.push(format!("({} payloads)", keys.len()));
            Output::Text(lines.join("\n"))
        }
        "DIR" => Output::Text(storage.dir().display().to_string()),
        "STATS" => {
            let keys = storage.list(ctx)?;
            let total: usize = keys
                .iter()
                .map(|&(i, t)| storage.get(ctx, i, t).map(|v| v.len()).unwrap_or(0))
                .sum();
            Output::Text(format!(
                "range={} replica={} payloads={} bytes={} dir={}",
                storage.range_id(),
                storage.replica_id(),
                keys.len(),
                total,
                storage.dir().display()
            ))
        }
        "EXIT" | "QUIT" => Output::Quit,
        other => anyhow::bail!("unknown command {other:?}"),
    };
    Ok(out)
}
