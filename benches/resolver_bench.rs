//! Quick benchmark of hierarchy resolution on a wide and deep log

use calltrace::{MemoryContainer, Reader, Resolver, TextRenderer, Tracer};
use std::io;
use std::time::Instant;

/// Binary call tree of the given depth, one message per writer
fn tree(tracer: &Tracer<'_>, depth: u32) -> calltrace::Result<()> {
    let call = format!("node(depth={depth})");
    let w = tracer.writer(Some(call.as_str()))?;
    w.write("working")?;
    if depth > 0 {
        tree(tracer, depth - 1)?;
        tree(tracer, depth - 1)?;
    }
    Ok(())
}

fn main() {
    println!("Hierarchy Resolution Performance Test");
    println!("=====================================\n");

    for depth in [8u32, 12, 15] {
        let log = MemoryContainer::new();
        let tracer = Tracer::new(&log).expect("open tracer");

        let start = Instant::now();
        tree(&tracer, depth).expect("write log");
        let write = start.elapsed();
        let events = log.len();

        let start = Instant::now();
        let resolution = Resolver::new(&log)
            .resolve_tracer(tracer.id())
            .expect("resolve");
        let resolve = start.elapsed();

        let start = Instant::now();
        let reader = Reader::new(&log).expect("reader");
        let stats = TextRenderer::default()
            .dump(&reader, &mut io::sink())
            .expect("dump");
        let render = start.elapsed();

        println!(
            "depth {:>2}: {:>7} events, {:>6} writers | write {:.2?} | resolve {:.2?} | resolve+render {:.2?} ({} lines)",
            depth,
            events,
            resolution.nodes.len(),
            write,
            resolve,
            render,
            stats.lines
        );
    }

    println!("\n✓ Resolution is a single sort plus one stack sweep per tracer");
}
