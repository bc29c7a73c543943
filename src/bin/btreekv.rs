//! CLI for exercising the embedded B-tree key-value store.
//!
//! Usage:
//!   btreekv <db_path> put <key> <value>
//!   btreekv <db_path> get <key>
//!   btreekv <db_path> delete <key>
//!   btreekv <db_path> print
//!   btreekv <db_path> stats
//!   btreekv <db_path> bulk_insert <count>

use btreekv::{Db, DbConfig};
use std::env;
use std::path::Path;
use std::process::exit;

fn open_or_create(path: &Path) -> Db {
    let config = DbConfig::new(path).log(|msg| eprintln!("[btreekv] {msg}"));
    if path.exists() {
        match Db::open(config) {
            Ok(db) => db,
            Err(e) => {
                eprintln!("ERROR: failed to open database: {e}");
                exit(1);
            }
        }
    } else {
        match Db::create(config) {
            Ok(db) => db,
            Err(e) => {
                eprintln!("ERROR: failed to create database: {e}");
                exit(1);
            }
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("Usage: btreekv <db_path> <command> [args...]");
        eprintln!("Commands:");
        eprintln!("  put <key> <value>    - Insert or update a key-value pair");
        eprintln!("  get <key>            - Get value for a key");
        eprintln!("  delete <key>         - Delete a key");
        eprintln!("  print                - Dump all entries in key order");
        eprintln!("  stats                - Show database statistics");
        eprintln!("  bulk_insert <count>  - Insert count test records");
        exit(1);
    }

    let db_path = Path::new(&args[1]);
    let command = args[2].as_str();
    let mut db = open_or_create(db_path);

    match command {
        "put" => {
            if args.len() < 5 {
                eprintln!("Usage: btreekv <db_path> put <key> <value>");
                exit(1);
            }
            match db.insert(args[3].as_bytes(), args[4].as_bytes()) {
                Ok(()) => println!("OK"),
                Err(e) => {
                    eprintln!("ERROR: {e}");
                    exit(1);
                }
            }
        }

        "get" => {
            if args.len() < 4 {
                eprintln!("Usage: btreekv <db_path> get <key>");
                exit(1);
            }
            match db.search(args[3].as_bytes()) {
                Ok(Some(value)) => match String::from_utf8(value) {
                    Ok(s) => println!("{s}"),
                    Err(_) => println!("<binary data>"),
                },
                Ok(None) => println!("NOT_FOUND"),
                Err(e) => {
                    eprintln!("ERROR: {e}");
                    exit(1);
                }
            }
        }

        "delete" => {
            if args.len() < 4 {
                eprintln!("Usage: btreekv <db_path> delete <key>");
                exit(1);
            }
            match db.delete(args[3].as_bytes()) {
                Ok(true) => println!("DELETED"),
                Ok(false) => println!("NOT_FOUND"),
                Err(e) => {
                    eprintln!("ERROR: {e}");
                    exit(1);
                }
            }
        }

        "print" => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            if let Err(e) = db.print(&mut handle) {
                eprintln!("ERROR: {e}");
                exit(1);
            }
        }

        "stats" => match db.stats() {
            Ok(stats) => {
                println!("n_pages: {}", stats.n_pages);
                println!("live_pages: {}", stats.live_pages);
                println!("key_len: {}", stats.key_len);
                println!("k_max: {}", stats.k_max);
                println!("height: {}", stats.height);
            }
            Err(e) => {
                eprintln!("ERROR: {e}");
                exit(1);
            }
        },

        "bulk_insert" => {
            if args.len() < 4 {
                eprintln!("Usage: btreekv <db_path> bulk_insert <count>");
                exit(1);
            }
            let count: usize = match args[3].parse() {
                Ok(n) => n,
                Err(_) => {
                    eprintln!("ERROR: invalid count");
                    exit(1);
                }
            };

            let start = std::time::Instant::now();
            for i in 0..count {
                let key = format!("key_{i:08}");
                let value = format!("value_{i}");
                if let Err(e) = db.insert(key.as_bytes(), value.as_bytes()) {
                    eprintln!("ERROR at {i}: {e}");
                    exit(1);
                }
            }
            let elapsed = start.elapsed();
            let ops_per_sec = count as f64 / elapsed.as_secs_f64();
            println!("INSERTED: {count}");
            println!("TIME_MS: {}", elapsed.as_millis());
            println!("OPS_PER_SEC: {ops_per_sec:.0}");
        }

        _ => {
            eprintln!("Unknown command: {command}");
            exit(1);
        }
    }
}
