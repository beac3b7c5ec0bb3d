//! Thin command layer over the index: extract sources into a persistent
//! store and poke at the result.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use defmap_codex::Codex;
use defmap_extract::{BatchWriter, FileScanner, TokenExtractor};
use defmap_model::{Def, GlobalRef, Kind, Source};
use defmap_store::{ProjectStore, Query, RedbStore};

#[derive(Parser)]
#[command(name = "defmap", version, about = "Index and query code metadata")]
struct Cli {
    /// Path of the index database.
    #[arg(long, global = true, default_value = "defmap.db")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Index the supported sources under a directory (or a single file).
    Index {
        path: PathBuf,
        /// Wipe the store and re-index everything from scratch.
        #[arg(long)]
        fresh: bool,
    },
    /// List the top-level defs in the store.
    Tops,
    /// Print a def and its members, recursively. The name is the
    /// space-joined global form, e.g. 'com.test Foo'.
    Dump { name: String },
    /// Search defs by name.
    Find {
        name: String,
        /// Match the name as a prefix instead of exactly.
        #[arg(long)]
        prefix: bool,
        /// Restrict to one kind: module, type, func, value.
        #[arg(long)]
        kind: Option<String>,
        /// Emit results as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let store = RedbStore::open("main", &cli.store)
        .with_context(|| format!("opening store {}", cli.store.display()))?;

    let result = match cli.command {
        Command::Index { path, fresh } => index(&store, &path, fresh),
        Command::Tops => tops(&store),
        Command::Dump { name } => dump(&store, &name),
        Command::Find {
            name,
            prefix,
            kind,
            json,
        } => find(&store, &name, prefix, kind.as_deref(), json),
    };

    store.close().context("closing store")?;
    result
}

fn index(store: &Arc<RedbStore>, path: &Path, fresh: bool) -> Result<()> {
    if fresh {
        store.clear().context("clearing store")?;
    }

    let files = if path.is_dir() {
        FileScanner::new(path).scan()
    } else {
        vec![path.to_path_buf()]
    };

    // skip files whose index is at least as fresh as the file itself
    let mut stale = Vec::new();
    for file in files {
        let source = Source::file(file.to_string_lossy());
        let modified = source
            .last_modified()
            .with_context(|| format!("reading mtime of {}", file.display()))?;
        if store.last_indexed(&source)? < modified {
            stale.push(file);
        }
    }

    if stale.is_empty() {
        println!("Everything up to date.");
        return Ok(());
    }

    let start = Instant::now();
    let count = stale.len();
    let mut writer = BatchWriter::new(store.clone());
    TokenExtractor::new().process_files(stale, &mut writer)?;
    log::info!("Indexed {count} files in {:?}", start.elapsed());

    println!("{} defs.", store.def_count()?);
    println!("{} names.", store.name_count()?);
    Ok(())
}

fn tops(store: &Arc<RedbStore>) -> Result<()> {
    for top in store.top_level_defs()? {
        if top.kind != Kind::Synthetic {
            println!("{} {}", top.kind, top.name);
        }
    }
    Ok(())
}

fn dump(store: &Arc<RedbStore>, name: &str) -> Result<()> {
    let gref = GlobalRef::from_string(name);
    let Some(def) = store.def_by_ref(&gref)? else {
        bail!("No def found for '{name}'.");
    };
    dump_def("", &def)
}

fn dump_def(indent: &str, def: &Def) -> Result<()> {
    match def.sig()? {
        Some(sig) => println!("{indent}{}", sig.text),
        None => println!("{indent}{} {}", def.kind, def.name),
    }
    if def.kind == Kind::Type {
        println!("{indent}  (source: {})", def.source()?);
    }
    for member in def.members()? {
        if member.kind != Kind::Synthetic {
            dump_def(&format!("{indent}  "), &member)?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct FindHit {
    name: String,
    kind: String,
    source: String,
    offset: u32,
    exported: bool,
}

fn find(
    store: &Arc<RedbStore>,
    name: &str,
    prefix: bool,
    kind: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut query = if prefix {
        Query::prefix(name)
    } else {
        Query::name(name)
    };
    if let Some(kind) = kind {
        let kind = Kind::from_name(&kind.to_uppercase())
            .with_context(|| format!("unknown kind '{kind}'"))?;
        query = query.kind(kind);
    }

    let codex = Codex::new(vec![store.clone()]);
    let hits = codex.find(&query)?;

    if json {
        let hits: Vec<FindHit> = hits
            .iter()
            .map(|def| {
                Ok(FindHit {
                    name: def.name.clone(),
                    kind: def.kind.to_string(),
                    source: def.source()?.to_string(),
                    offset: def.offset,
                    exported: def.exported,
                })
            })
            .collect::<Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        for def in &hits {
            println!("{} {} @ {}:{}", def.kind, def.name, def.source()?, def.offset);
        }
    }
    Ok(())
}
