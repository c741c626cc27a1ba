//! Kaede CLI - ヒープダンプ探索インターフェース
//!
//! go1.3形式のヒープダンプを読み込み、オブジェクトグラフをREPLで
//! 対話的に辿るためのインターフェース

mod command;
mod parse;
mod render;

use anyhow::Result;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use command::Command;
use kaede_core::{load_with_options, Dump, LoadOptions, ObjId, ObjectKind, Referrer, TypeId};

/// Kaede - Go Heap Dump Explorer
#[derive(Parser)]
#[command(name = "kaede")]
#[command(version = "0.1.0")]
#[command(about = "Offline analyzer for go1.3 heap dumps", long_about = None)]
struct Cli {
    /// Path to the heap dump file
    dump: String,

    /// Path to the executable that produced the dump
    executable: Option<String>,

    /// Continue with anonymous globals when the executable has no debug info
    #[arg(long)]
    anonymous_globals: bool,
}

fn main() -> Result<()> {
    // tracing subscriberを初期化
    // 環境変数 RUST_LOG でログレベルを制御可能 (例: RUST_LOG=debug kaede dump bin)
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_line_number(true)
        .with_thread_ids(false)
        .init();

    println!("Kaede - Go Heap Dump Explorer");
    println!();

    let cli = Cli::parse();
    println!("Loading dump: {}", cli.dump);
    if let Some(ref exe) = cli.executable {
        println!("Executable: {}", exe);
    }
    println!();

    let dump = load_with_options(
        &cli.dump,
        cli.executable.as_ref(),
        LoadOptions {
            anonymous_globals: cli.anonymous_globals,
        },
    )?;

    println!(
        "Loaded {} objects, {} types, {} goroutines",
        dump.num_objects(),
        dump.types.len(),
        dump.goroutines.len()
    );
    println!();

    run_repl(&dump)
}

/// REPLループを実行する
fn run_repl(d: &Dump) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("(kaede) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                if let Err(e) = handle_command(d, line) {
                    eprintln!("Error: {}", e);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

fn handle_command(d: &Dump, line: &str) -> Result<()> {
    match Command::parse(line) {
        Some(Command::Summary) => handle_summary(d),
        Some(Command::Histo(n)) => handle_histo(d, n),
        Some(Command::Obj(id)) => handle_obj(d, ObjId(id))?,
        Some(Command::Type(id)) => handle_type(d, id),
        Some(Command::Referrers(id)) => handle_referrers(d, ObjId(id))?,
        Some(Command::Reachable(id)) => {
            println!("{} bytes reachable", d.reachable(ObjId(id))?);
        }
        Some(Command::Goroutines) => handle_goroutines(d),
        Some(Command::Goroutine(addr)) => handle_goroutine(d, &addr)?,
        Some(Command::Globals) => handle_globals(d),
        Some(Command::Others) => handle_others(d),
        Some(Command::Find(pattern)) => handle_find(d, &pattern),
        Some(Command::Help) => print_help(),
        Some(Command::Quit) => {
            println!("Goodbye!");
            std::process::exit(0);
        }
        None => {
            println!("Unknown command: {}", line);
            println!("Type 'help' for available commands.");
        }
    }
    Ok(())
}

/// Summaryコマンドを処理する
fn handle_summary(d: &Dump) {
    let p = &d.params;
    println!("Dump parameters:");
    println!("  byte order   : {:?}", p.order);
    println!("  pointer size : {} bytes", p.ptr_size);
    println!("  chan header  : {} bytes", p.h_chan_size);
    println!("  heap range   : {:x}..{:x}", p.heap_start, p.heap_end);
    println!("  arch         : '{}'", p.arch_char as char);
    if !p.experiment.is_empty() {
        println!("  experiment   : {}", p.experiment);
    }
    println!("  ncpu         : {}", p.ncpu);
    println!();
    println!("Entities:");
    println!("  objects      : {}", d.num_objects());
    println!("  types        : {}", d.types.len());
    println!("  goroutines   : {}", d.goroutines.len());
    println!("  stack frames : {}", d.frames.len());
    println!(
        "  roots        : {} stack, {} data, {} other",
        d.stack_roots.len(),
        d.data_roots.len(),
        d.other_roots.len()
    );
    println!("  finalizers   : {}", d.finalizers.len());
    println!("  itabs        : {}", d.itabs.len());
    println!("  os threads   : {}", d.os_threads.len());

    if let Some(s) = &d.mem_stats {
        println!();
        println!("Memory statistics:");
        println!("  heap alloc   : {} bytes", s.heap_alloc);
        println!("  heap sys     : {} bytes", s.heap_sys);
        println!("  heap objects : {}", s.heap_objects);
        println!("  total alloc  : {} bytes", s.total_alloc);
        println!("  gc runs      : {}", s.num_gc);
        println!("  gc pause     : {} ns total", s.pause_total_ns);
    }
}

/// Histoコマンドを処理する
fn handle_histo(d: &Dump, limit: Option<usize>) {
    let mut entries: Vec<(String, usize, u64)> = d
        .types
        .iter()
        .zip(d.histogram())
        .filter(|(_, b)| !b.objects.is_empty())
        .map(|(t, b)| (t.name.clone(), b.objects.len(), b.bytes))
        .collect();
    let untyped = d.untyped_bucket();
    if !untyped.objects.is_empty() {
        entries.push(("(no type)".to_string(), untyped.objects.len(), untyped.bytes));
    }
    entries.sort_by(|a, b| b.2.cmp(&a.2));

    if entries.is_empty() {
        println!("No objects");
        return;
    }

    let limit = limit.unwrap_or(40);
    println!("{:>10}  {:>14}  type", "count", "bytes");
    for (name, count, bytes) in entries.iter().take(limit) {
        println!("{:>10}  {:>14}  {}", count, bytes, name);
    }
    if entries.len() > limit {
        println!("  ... and {} more", entries.len() - limit);
    }
}

/// Objコマンドを処理する
fn handle_obj(d: &Dump, id: ObjId) -> Result<()> {
    let addr = d.addr(id)?;
    let size = d.size(id)?;
    let typ = d.full_type(id)?;
    let data = d.contents(id)?;
    let edges = d.edges(id)?;

    match typ {
        Some(t) => println!("Object {:x} : {} ({} bytes)", addr, t.name, size),
        None => println!("Object {:x} : unknown type ({} bytes)", addr, size),
    }

    let kind = d.objects[id.index()].kind;
    match (typ, kind) {
        (Some(t), ObjectKind::Plain) => {
            println!();
            println!("{:<16} {:<16} value", "field", "type");
            for row in render::object_fields(d, data, &t.fields, edges) {
                println!("{:<16} {:<16} {}", row.name, row.typ, row.value);
            }
        }
        _ => {
            // 配列・チャネル・型不明はバイト列プレビューとエッジ一覧のみ
            let preview = &data[..data.len().min(64)];
            println!();
            println!("{}", render::raw_bytes(preview));
            if data.len() > 64 {
                println!("  ... {} more bytes", data.len() - 64);
            }
            if !edges.is_empty() {
                println!();
                println!("Edges:");
                for e in edges {
                    println!("  +{} -> {}", e.from_offset, render::edge_target(d, e));
                }
            }
        }
    }

    println!();
    println!("Referrers:");
    let referrers = d.referrers(id)?;
    if referrers.is_empty() {
        println!("  (none)");
    }
    for r in referrers {
        println!("  {}", referrer_line(d, &r));
    }

    println!();
    println!("Reachable memory: {} bytes", d.reachable(id)?);
    Ok(())
}

/// Typeコマンドを処理する
fn handle_type(d: &Dump, id: u32) {
    let Some(t) = d.types.get(id as usize) else {
        println!("No type with id {}", id);
        return;
    };
    println!("Type {} : {}", id, t.name);
    println!("  size     : {} bytes", t.size);
    println!("  eface ptr: {}", t.eface_ptr);
    if !t.fields.is_empty() {
        println!("  fields:");
        for f in &t.fields {
            println!("    +{:<6} {:?}", f.offset, f.kind);
        }
    }

    let bucket = d.bucket(TypeId(id));
    println!(
        "  instances: {} ({} bytes)",
        bucket.objects.len(),
        bucket.bytes
    );
    for &obj in bucket.objects.iter().take(20) {
        if let Ok(addr) = d.addr(obj) {
            println!("    object {:x} (id {})", addr, obj);
        }
    }
    if bucket.objects.len() > 20 {
        println!("    ... and {} more", bucket.objects.len() - 20);
    }
}

/// Referrersコマンドを処理する
fn handle_referrers(d: &Dump, id: ObjId) -> Result<()> {
    let referrers = d.referrers(id)?;
    if referrers.is_empty() {
        println!("No referrers");
        return Ok(());
    }
    for r in referrers {
        println!("  {}", referrer_line(d, &r));
    }
    Ok(())
}

/// 参照元1件の表示行を作る
fn referrer_line(d: &Dump, r: &Referrer) -> String {
    match r {
        Referrer::Object { from, edge } => {
            let addr = d.addr(*from).map(|a| format!("{:x}", a)).unwrap_or_default();
            format!("object {} (id {}) +{}", addr, from, edge.from_offset)
        }
        Referrer::Global { name } => format!("global {}", name),
        Referrer::Frame { frame } => {
            let f = &d.frames[frame.index()];
            match f.goroutine {
                Some(g) => format!(
                    "frame {} (depth {}, goroutine {:x})",
                    f.name,
                    f.depth,
                    d.goroutines[g.index()].addr
                ),
                None => format!("frame {} (depth {})", f.name, f.depth),
            }
        }
        Referrer::Other { description } => description.clone(),
    }
}

/// Goroutinesコマンドを処理する
fn handle_goroutines(d: &Dump) {
    if d.goroutines.is_empty() {
        println!("No goroutines");
        return;
    }

    let mut list: Vec<&kaede_core::GoRoutine> = d.goroutines.iter().collect();
    list.sort_by(|a, b| a.state_label().cmp(b.state_label()).then(a.goid.cmp(&b.goid)));

    println!("Goroutines ({} total):", list.len());
    for g in list {
        let mut flags = Vec::new();
        if g.is_system {
            flags.push("system");
        }
        if g.is_background {
            flags.push("background");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!(
            "  goroutine {:x} goid={} state={}{}",
            g.addr,
            g.goid,
            g.state_label(),
            flags
        );
    }
}

/// Goroutineコマンドを処理する
fn handle_goroutine(d: &Dump, addr_str: &str) -> Result<()> {
    let addr = parse::parse_address(addr_str)?;
    let Some(g) = d.goroutines.iter().find(|g| g.addr == addr) else {
        println!("No goroutine at {:x}", addr);
        return Ok(());
    };

    println!("Goroutine {:x}", g.addr);
    println!("  goid  : {}", g.goid);
    println!("  state : {}", g.state_label());
    if let Some(ctxt) = g.ctxt {
        println!("  ctxt  : object {:x} (id {})", d.addr(ctxt)?, ctxt);
    }

    println!("  stack (top to bottom):");
    let mut frame = Some(g.tos);
    while let Some(fid) = frame {
        let f = &d.frames[fid.index()];
        println!("    #{:<3} {} (sp {:x})", f.depth, f.name, f.addr);
        frame = f.parent;
    }
    Ok(())
}

/// Globalsコマンドを処理する
fn handle_globals(d: &Dump) {
    if d.data_roots.is_empty() {
        println!("No global roots");
        return;
    }
    println!("Global roots ({} total):", d.data_roots.len());
    for r in &d.data_roots {
        match &r.edge {
            Some(e) => println!("  {} -> {}", r.name, render::edge_target(d, e)),
            None => println!("  {} -> (target outside heap)", r.name),
        }
    }
}

/// Othersコマンドを処理する
fn handle_others(d: &Dump) {
    if d.other_roots.is_empty() {
        println!("No other roots");
        return;
    }
    println!("Other roots ({} total):", d.other_roots.len());
    for r in &d.other_roots {
        match &r.edge {
            Some(e) => println!("  {} -> {}", r.description, render::edge_target(d, e)),
            None => println!("  {} -> (target outside heap)", r.description),
        }
    }
}

/// Findコマンドを処理する
fn handle_find(d: &Dump, pattern: &str) {
    let matches: Vec<(usize, &kaede_core::Type)> = d
        .types
        .iter()
        .enumerate()
        .filter(|(_, t)| t.name.contains(pattern))
        .collect();

    if matches.is_empty() {
        println!("No types matching '{}'", pattern);
        return;
    }

    println!("Types matching '{}' ({} found):", pattern, matches.len());
    for (id, t) in matches.iter().take(20) {
        let bucket = d.bucket(TypeId(*id as u32));
        println!(
            "  {}. {} (size {}, {} instances)",
            id,
            t.name,
            t.size,
            bucket.objects.len()
        );
    }
    if matches.len() > 20 {
        println!("  ... and {} more", matches.len() - 20);
    }
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help             - Show this help message");
    println!("  quit/exit/q      - Exit the explorer");
    println!();
    println!("Dump commands:");
    println!("  summary          - Show dump parameters and memory statistics");
    println!("  histo [N]        - Type histogram sorted by bytes (top N)");
    println!("  obj <id>         - Show an object: fields, referrers, reachable memory");
    println!("  type <id>        - Show a type and its instances");
    println!("  referrers <id>   - List everything referring to an object");
    println!("  reachable <id>   - Total memory reachable from an object");
    println!("  goroutines       - List goroutines with state");
    println!("  goroutine <addr> - Show a goroutine's stack");
    println!("  globals          - List global roots");
    println!("  others           - List miscellaneous roots");
    println!("  find <substr>    - Find types by name");
    println!();
    println!("Examples:");
    println!("  histo 20");
    println!("  obj 0");
    println!("  find main.Node");
    println!("  goroutine 0xc000061e00");
}
